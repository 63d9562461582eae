//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use servo_core::StateSlot;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "servo", version, about = "Multi-channel fixed-point servo loop")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/servo_config.toml")]
    pub config: PathBuf,

    /// Optional coefficient CSV (strict header); rows override the TOML table
    #[arg(long, value_name = "FILE")]
    pub coefficients: Option<PathBuf>,

    /// Emit records, summaries and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); defaults to logging.level, then warn
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loop against the simulated front-ends
    Run {
        /// Passes to run; 0 runs until Ctrl-C
        #[arg(long, default_value_t = 1)]
        passes: u64,
        /// Abort once the run has used this many logical cycles
        #[arg(long, value_name = "CYCLES")]
        max_cycles: Option<u64>,
        /// Acquire the next channel group while the current one is written
        #[arg(long, action = ArgAction::SetTrue)]
        overlap: bool,
        /// Seed filter state before the first pass, e.g. `0:0:y1=0x1145`
        #[arg(long = "set-state", value_name = "CH:PROF:SLOT=VAL")]
        set_state: Vec<StateOverride>,
        /// Sleep between passes so they land on the configured clock period
        #[arg(long, action = ArgAction::SetTrue)]
        pace: bool,
        /// Print cycle and link statistics on completion
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
    },
    /// Print the derived timing of one pass
    Timing,
    /// Validate the config and run one pass end to end
    SelfCheck,
}

/// One `--set-state` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateOverride {
    pub channel: usize,
    pub profile: usize,
    pub slot: StateSlot,
    pub value: i32,
}

fn parse_int(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|e| format!("invalid number '{s}': {e}"))?;
    Ok(if neg { -v } else { v })
}

impl FromStr for StateOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected CH:PROF:SLOT=VAL, got '{s}'"))?;
        let parts: Vec<&str> = target.split(':').collect();
        let [channel, profile, slot] = parts.as_slice() else {
            return Err(format!("expected CH:PROF:SLOT=VAL, got '{s}'"));
        };
        let channel = channel
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid channel '{channel}': {e}"))?;
        let profile = profile
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid profile '{profile}': {e}"))?;
        let slot = slot.parse::<StateSlot>().map_err(|e| e.to_string())?;
        let value = parse_int(value)?;
        let value = i32::try_from(value).map_err(|_| format!("value {value} does not fit 32 bits"))?;
        Ok(Self {
            channel,
            profile,
            slot,
            value,
        })
    }
}
