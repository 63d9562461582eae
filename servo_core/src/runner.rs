//! Drive a servo for a number of passes with `start` held high.
//!
//! A shutdown request never aborts a pass in flight: `start` is released and
//! the loop ticks on until the current pass reports `done`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use servo_traits::clock::{Clock, MonotonicClock};
use servo_traits::{DacLink, GainSink, SampleSource};

use crate::core::ServoCore;
use crate::error::{Result, ServoError};
use crate::status::LoopIterationRecord;

/// How long to run and how to pace.
#[derive(Clone)]
pub struct RunParams {
    /// Passes to complete; 0 runs until `shutdown` is raised.
    pub passes: u64,
    /// Total logical cycles allowed for the run; 0 disables the cap.
    pub max_cycles: u64,
    pub shutdown: Option<Arc<AtomicBool>>,
    /// Sleep after each pass so passes land on the wall-clock period implied by
    /// `clock_period_ns`.
    pub pace: bool,
    /// Defaults to `MonotonicClock` when not provided.
    pub clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            passes: 1,
            max_cycles: 0,
            shutdown: None,
            pace: false,
            clock: None,
        }
    }
}

impl core::fmt::Debug for RunParams {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RunParams")
            .field("passes", &self.passes)
            .field("max_cycles", &self.max_cycles)
            .field("pace", &self.pace)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub passes: u64,
    pub cycles: u64,
    pub records: u64,
    /// Start to `done` of the last pass.
    pub cycles_per_pass: Option<u64>,
    /// Start-to-start period of the last pass on the target clock.
    pub loop_period_ns: Option<u64>,
    /// Host time spent inside `run`.
    pub wall_us: u64,
    /// Set when the run ended on a shutdown request.
    pub interrupted: bool,
}

fn shutdown_requested(flag: Option<&Arc<AtomicBool>>) -> bool {
    flag.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Run `servo` per `params`, handing every computed channel to `on_record`.
pub fn run<A, D, G, F>(
    servo: &mut ServoCore<A, D, G>,
    params: &RunParams,
    mut on_record: F,
) -> Result<RunSummary>
where
    A: SampleSource,
    D: DacLink,
    G: GainSink,
    F: FnMut(&LoopIterationRecord),
{
    let clock: Arc<dyn Clock + Send + Sync> = match &params.clock {
        Some(c) => Arc::clone(c),
        None => Arc::new(MonotonicClock::new()),
    };
    let epoch = clock.now();
    let mut pass_epoch = epoch;
    let period_ns = u64::from(servo.loop_cfg().clock_period_ns);

    tracing::info!(
        passes = params.passes,
        max_cycles = params.max_cycles,
        channels = servo.channel_count(),
        "servo run start"
    );

    let mut summary = RunSummary::default();
    let mut start = !shutdown_requested(params.shutdown.as_ref());
    servo.set_start(start);
    if !start && !servo.is_running() {
        summary.interrupted = true;
        return Ok(summary);
    }

    loop {
        if params.max_cycles > 0 && summary.cycles >= params.max_cycles {
            servo.set_start(false);
            tracing::warn!(limit = params.max_cycles, "run exceeded cycle cap");
            return Err(ServoError::CycleLimit(params.max_cycles).into());
        }
        let status = servo.tick()?;
        summary.cycles += 1;
        if let Some(record) = &status.record {
            summary.records += 1;
            on_record(record);
        }
        if !status.signals.done {
            if start && shutdown_requested(params.shutdown.as_ref()) {
                tracing::info!("shutdown requested; finishing current pass");
                start = false;
                summary.interrupted = true;
                servo.set_start(false);
            }
            continue;
        }

        summary.passes += 1;
        summary.cycles_per_pass = servo.last_pass_cycles();
        summary.loop_period_ns = summary.cycles_per_pass.map(|c| (c + 1) * period_ns);

        if let (true, Some(ns)) = (params.pace, summary.loop_period_ns) {
            let target = Duration::from_nanos(ns);
            let spent = clock.now().saturating_duration_since(pass_epoch);
            clock.sleep(target.saturating_sub(spent));
        }
        pass_epoch = clock.now();

        let reached = params.passes > 0 && summary.passes >= params.passes;
        if reached || !start || shutdown_requested(params.shutdown.as_ref()) {
            summary.interrupted = !reached;
            servo.set_start(false);
            break;
        }
    }

    summary.wall_us = clock.us_since(epoch);
    tracing::info!(
        passes = summary.passes,
        cycles = summary.cycles,
        records = summary.records,
        wall_us = summary.wall_us,
        "servo run finished"
    );
    Ok(summary)
}
