//! Servo assembly from config and the `run` / `timing` / `self-check` commands.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::WrapErr;
use serde_json::json;
use servo_core::{
    AcquisitionParams, GainParams, LoopCfg, LoopIterationRecord, OutputParams, RunParams,
    RunSummary, Seeds, Servo, Timing,
};
use servo_frontend::{DacHandle, DacReceiver, FrameLayout, GainHandle, GainRecorder, SimulatedAdc};

use crate::cli::StateOverride;

/// Servo wired to simulated front-ends, plus handles to observe them.
pub struct SimLoop {
    pub servo: Servo,
    pub dac: DacHandle,
    pub gains: GainHandle,
}

/// Options of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub passes: u64,
    pub max_cycles: Option<u64>,
    pub overlap: bool,
    pub set_state: Vec<StateOverride>,
    pub pace: bool,
    pub stats: bool,
    pub json: bool,
}

fn loop_cfg(cfg: &servo_config::Config, overlap: bool) -> LoopCfg {
    let mut l = LoopCfg::from(&cfg.servo);
    l.overlap_acquisition |= overlap;
    l
}

pub fn timing_for(cfg: &servo_config::Config, overlap: bool) -> Timing {
    Timing::from_params(
        &AcquisitionParams::from(&cfg.acquisition),
        &OutputParams::from(cfg),
        &loop_cfg(cfg, overlap),
    )
}

/// Build the loop described by `cfg` against the simulated front-ends.
pub fn build_sim(cfg: &servo_config::Config, overlap: bool) -> eyre::Result<SimLoop> {
    let channels = cfg.acquisition.channel_count;
    let mut inputs = vec![0; channels];
    for ch in &cfg.channel {
        if let Some(v) = inputs.get_mut(ch.index) {
            *v = ch.input;
        }
    }
    let dac = DacReceiver::new(FrameLayout {
        word_width: cfg.output.word_width,
        data_width: cfg.filter.output_word,
        address_offset: cfg.output.address_offset,
        channel_count: channels,
    });
    let gains = GainRecorder::new(channels);
    let (dac_h, gains_h) = (dac.handle(), gains.handle());

    let seeds = Seeds::try_from(cfg).wrap_err("invalid [[state]] entry")?;
    let servo = Servo::builder()
        .with_source(SimulatedAdc::with_values(inputs))
        .with_link(dac)
        .with_gain_sink(gains)
        .with_acquisition(AcquisitionParams::from(&cfg.acquisition))
        .with_filter(cfg.into())
        .with_output(cfg.into())
        .with_gain(GainParams::from(&cfg.gain))
        .with_loop(loop_cfg(cfg, overlap))
        .with_seeds(seeds)
        .build()
        .wrap_err("build servo")?;
    Ok(SimLoop {
        servo,
        dac: dac_h,
        gains: gains_h,
    })
}

fn record_json(pass: u64, r: &LoopIterationRecord) -> serde_json::Value {
    json!({
        "pass": pass,
        "channel": r.channel,
        "profile": r.active_profile,
        "sample": r.acquired_sample,
        "output": r.computed_output,
        "gain_code": r.gain_code_used,
    })
}

fn summary_json(s: &RunSummary) -> serde_json::Value {
    json!({
        "passes": s.passes,
        "cycles": s.cycles,
        "records": s.records,
        "cycles_per_pass": s.cycles_per_pass,
        "loop_period_ns": s.loop_period_ns,
        "wall_us": s.wall_us,
        "interrupted": s.interrupted,
    })
}

pub fn run_servo(cfg: &servo_config::Config, opts: &RunOpts) -> eyre::Result<RunSummary> {
    let SimLoop {
        mut servo,
        dac,
        gains,
    } = build_sim(cfg, opts.overlap)?;
    for o in &opts.set_state {
        servo
            .set_state(o.channel, o.profile, o.slot, o.value)
            .wrap_err_with(|| format!("--set-state for channel {} profile {}", o.channel, o.profile))?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let params = RunParams {
        passes: opts.passes,
        max_cycles: opts.max_cycles.unwrap_or(0),
        shutdown: Some(shutdown),
        pace: opts.pace,
        clock: None,
    };
    let channels = servo.channel_count() as u64;
    let mut emitted = 0u64;
    let summary = servo.run(&params, |r| {
        let pass = emitted / channels + 1;
        emitted += 1;
        if opts.json {
            println!("{}", record_json(pass, r));
        } else {
            println!(
                "pass {pass} ch {} profile {}: sample {} -> output {} (gain {})",
                r.channel, r.active_profile, r.acquired_sample, r.computed_output, r.gain_code_used
            );
        }
    })?;

    if opts.json {
        println!("{}", json!({ "summary": summary_json(&summary) }));
    } else {
        println!(
            "run complete: {} passes, {} cycles ({} cycles/pass, period {} ns){}",
            summary.passes,
            summary.cycles,
            summary
                .cycles_per_pass
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            summary
                .loop_period_ns
                .map_or_else(|| "-".to_string(), |ns| ns.to_string()),
            if summary.interrupted { ", interrupted" } else { "" }
        );
    }
    if opts.stats {
        print_stats(&summary, &dac, &gains);
    }
    Ok(summary)
}

/// Print cycle and link statistics to stderr.
fn print_stats(summary: &RunSummary, dac: &DacHandle, gains: &GainHandle) {
    let rate = if summary.wall_us > 0 {
        summary.cycles as f64 / (summary.wall_us as f64 / 1e6)
    } else {
        0.0
    };
    eprintln!("\n--- Servo Stats ---");
    eprintln!("Passes: {}", summary.passes);
    eprintln!("Cycles: {}", summary.cycles);
    eprintln!("Records: {}", summary.records);
    eprintln!("DAC frames latched: {}", dac.frame_count());
    eprintln!("Gain latches: {}", gains.log().len());
    eprintln!("Host time (us): {}", summary.wall_us);
    eprintln!("Simulated cycles/s: {rate:.0}");
    eprintln!("-------------------\n");
}

pub fn print_timing(cfg: &servo_config::Config, json_out: bool) {
    let t = timing_for(cfg, false);
    if json_out {
        println!(
            "{}",
            json!({
                "acquisition_latency": t.acquisition_latency,
                "cycle_budget": t.cycle_budget,
                "groups": t.groups,
                "lanes": t.lanes,
                "channels": t.channels,
                "pass_cycles": t.pass_cycles,
                "overlapped_pass_cycles": t.overlapped_pass_cycles,
                "clock_period_ns": t.clock_period_ns,
                "overlap": cfg.servo.overlap_acquisition,
            })
        );
        return;
    }
    let ns = u64::from(t.clock_period_ns);
    println!("acquisition latency   {:>8} cycles", t.acquisition_latency);
    println!("per-channel budget    {:>8} cycles", t.cycle_budget);
    println!("groups x lanes        {:>8}", format!("{}x{}", t.groups, t.lanes));
    println!(
        "pass (sequential)     {:>8} cycles  {:>8} ns",
        t.pass_cycles,
        (t.pass_cycles + 1) * ns
    );
    println!(
        "pass (overlapped)     {:>8} cycles  {:>8} ns",
        t.overlapped_pass_cycles,
        (t.overlapped_pass_cycles + 1) * ns
    );
}

/// Run one pass and check every channel's frame reached the simulated DAC.
pub fn self_check(cfg: &servo_config::Config) -> eyre::Result<()> {
    let SimLoop { mut servo, dac, .. } = build_sim(cfg, false)?;
    let records = servo.run_pass().wrap_err("self-check pass")?;
    // The last frame latches on the following idle cycle.
    servo.tick().wrap_err("self-check flush")?;

    let expected = servo.timing().expected_pass_cycles();
    if servo.last_pass_cycles() != Some(expected) {
        eyre::bail!(
            "self-check: pass took {:?} cycles, expected {expected}",
            servo.last_pass_cycles()
        );
    }
    if dac.frame_count() != records.len() {
        eyre::bail!(
            "self-check: {} records but {} DAC frames",
            records.len(),
            dac.frame_count()
        );
    }
    for r in &records {
        if dac.latest(r.channel) != Some(r.computed_output) {
            eyre::bail!(
                "self-check: channel {} wrote {} but the DAC holds {:?}",
                r.channel,
                r.computed_output,
                dac.latest(r.channel)
            );
        }
    }
    tracing::info!(channels = records.len(), cycles = expected, "self-check passed");
    println!(
        "self-check ok: {} channels, {expected} cycles/pass",
        records.len()
    );
    Ok(())
}
