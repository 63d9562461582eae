#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and coefficient table parsing for the servo loop.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Coefficient CSV loader enforces the exact header and reports row numbers.
//!
//! Every section is optional; omitted sections take the reference 8-channel
//! configuration.
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

/// One (channel, profile) coefficient set.
///
/// CSV header, exactly:
/// channel,profile,gain,integrator,zero,offset,set_point_input,set_point_output
///
/// Example:
/// channel,profile,gain,integrator,zero,offset,set_point_input,set_point_output
/// 0,0,2048,0,0,0,0,0
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CoefficientRow {
    pub channel: usize,
    #[serde(default)]
    pub profile: usize,
    #[serde(default)]
    pub gain: i32,
    #[serde(default)]
    pub integrator: i32,
    #[serde(default)]
    pub zero: i32,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub set_point_input: i32,
    #[serde(default)]
    pub set_point_output: i32,
}

pub const COEFFICIENT_HEADERS: [&str; 8] = [
    "channel",
    "profile",
    "gain",
    "integrator",
    "zero",
    "offset",
    "set_point_input",
    "set_point_output",
];

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Acquisition {
    pub sample_width: u32,
    pub channel_count: usize,
    pub lane_count: usize,
    pub hold_cycles: u32,
    pub convert_cycles: u32,
    pub settle_cycles: u32,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self {
            sample_width: 16,
            channel_count: 8,
            lane_count: 4,
            hold_cycles: 4,
            convert_cycles: 53,
            settle_cycles: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Filter {
    pub state: u32,
    pub coefficient: u32,
    pub sample: u32,
    pub output_word: u32,
    pub accumulator: u32,
    pub shift: u32,
    /// Derived from `acquisition.channel_count` when absent.
    pub channel_index: Option<u32>,
    pub profile_count: usize,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            state: 25,
            coefficient: 18,
            sample: 16,
            output_word: 16,
            accumulator: 48,
            shift: 11,
            channel_index: None,
            profile_count: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Output {
    pub word_width: u32,
    pub clock_divisor: u32,
    pub sync_high_cycles: u32,
    pub sync_low_cycles: u32,
    /// Two-bit write mode of framed words.
    pub mode: u8,
    pub address_offset: u32,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            word_width: 24,
            clock_divisor: 2,
            sync_high_cycles: 4,
            sync_low_cycles: 2,
            mode: 3,
            address_offset: 8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Gain {
    pub word_width: u32,
    pub clock_divisor: u32,
}

impl Default for Gain {
    fn default() -> Self {
        Self {
            word_width: 16,
            clock_divisor: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServoCfg {
    pub overlap_acquisition: bool,
    /// Per-pass cycle cap (0 disables).
    pub cycle_limit: u64,
    pub clock_period_ns: u32,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            overlap_acquisition: false,
            cycle_limit: 1_000_000,
            clock_period_ns: 8,
        }
    }
}

/// Per-channel setup.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelCfg {
    pub index: usize,
    /// Active profile.
    #[serde(default)]
    pub profile: usize,
    #[serde(default)]
    pub gain_code: u16,
    /// Value presented by the simulated front-end.
    #[serde(default)]
    pub input: i32,
}

/// Seed for x1 (previous input) or y1 (previous output).
#[derive(Debug, Deserialize, Clone)]
pub struct StateCfg {
    pub channel: usize,
    #[serde(default)]
    pub profile: usize,
    /// "x1" or "y1"
    pub slot: String,
    pub value: i64,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub acquisition: Acquisition,
    pub filter: Filter,
    pub output: Output,
    pub gain: Gain,
    pub servo: ServoCfg,
    pub channel: Vec<ChannelCfg>,
    pub coefficients: Vec<CoefficientRow>,
    pub state: Vec<StateCfg>,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Parse a coefficient table from any reader.
pub fn parse_coefficients_csv<R: Read>(reader: R) -> eyre::Result<Vec<CoefficientRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != COEFFICIENT_HEADERS {
        eyre::bail!(
            "coefficient CSV must have headers '{}', got: {}",
            COEFFICIENT_HEADERS.join(","),
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CoefficientRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if rows.is_empty() {
        eyre::bail!("coefficient CSV has no rows");
    }
    Ok(rows)
}

pub fn load_coefficients_csv(path: &Path) -> eyre::Result<Vec<CoefficientRow>> {
    let file = std::fs::File::open(path)
        .map_err(|e| eyre::eyre!("open coefficient CSV {:?}: {}", path, e))?;
    parse_coefficients_csv(file).map_err(|e| eyre::eyre!("{:?}: {}", path, e))
}

/// `true` when `value` is representable in `width` signed bits.
///
/// Shared with the core datapath, which re-exports it from `fixed_point`.
#[must_use]
pub fn fits(value: i64, width: u32) -> bool {
    if width == 0 || width > 64 {
        return false;
    }
    if width == 64 {
        return true;
    }
    let lo = -(1i64 << (width - 1));
    let hi = (1i64 << (width - 1)) - 1;
    (lo..=hi).contains(&value)
}

/// Bits needed to index `n` items (`ceil(log2(n))`, 0 for `n <= 1`).
#[must_use]
pub fn clog2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl Filter {
    /// Explicit `channel_index`, or the minimum width for `channel_count`.
    pub fn channel_index_for(&self, channel_count: usize) -> u32 {
        self.channel_index.unwrap_or_else(|| clog2(channel_count))
    }
}

impl Config {
    /// Replace or add coefficient rows, keyed by (channel, profile).
    pub fn merge_coefficients(&mut self, rows: impl IntoIterator<Item = CoefficientRow>) {
        for row in rows {
            match self
                .coefficients
                .iter_mut()
                .find(|r| r.channel == row.channel && r.profile == row.profile)
            {
                Some(existing) => *existing = row,
                None => self.coefficients.push(row),
            }
        }
    }

    pub fn validate(&self) -> eyre::Result<()> {
        let acq = &self.acquisition;
        let f = &self.filter;

        // Acquisition
        if !(1..=32).contains(&acq.sample_width) {
            eyre::bail!("acquisition.sample_width must be in 1..=32");
        }
        if acq.channel_count == 0 {
            eyre::bail!("acquisition.channel_count must be >= 1");
        }
        if acq.lane_count == 0 {
            eyre::bail!("acquisition.lane_count must be >= 1");
        }
        if acq.channel_count % acq.lane_count != 0 {
            eyre::bail!("acquisition.channel_count must be a multiple of acquisition.lane_count");
        }
        if acq.hold_cycles == 0 {
            eyre::bail!("acquisition.hold_cycles must be >= 1");
        }

        // Filter
        for (name, w) in [
            ("state", f.state),
            ("coefficient", f.coefficient),
            ("sample", f.sample),
            ("output_word", f.output_word),
        ] {
            if !(1..=32).contains(&w) {
                eyre::bail!("filter.{name} must be in 1..=32");
            }
        }
        if !(1..=64).contains(&f.accumulator) {
            eyre::bail!("filter.accumulator must be in 1..=64");
        }
        if f.accumulator < f.state + f.coefficient {
            eyre::bail!("filter.accumulator must be >= filter.state + filter.coefficient");
        }
        if f.shift >= f.accumulator {
            eyre::bail!("filter.shift must be < filter.accumulator");
        }
        if f.output_word > f.state {
            eyre::bail!("filter.output_word must be <= filter.state");
        }
        if f.sample < acq.sample_width {
            eyre::bail!("filter.sample must be >= acquisition.sample_width");
        }
        if let Some(ci) = f.channel_index
            && ci < clog2(acq.channel_count)
        {
            eyre::bail!("filter.channel_index is too small for acquisition.channel_count");
        }
        if f.profile_count == 0 {
            eyre::bail!("filter.profile_count must be >= 1");
        }

        // Output
        let out = &self.output;
        if !(1..=32).contains(&out.word_width) {
            eyre::bail!("output.word_width must be in 1..=32");
        }
        if out.word_width < f.output_word {
            eyre::bail!("output.word_width must be >= filter.output_word");
        }
        if out.word_width > f.output_word {
            if out.word_width < f.output_word + 2 {
                eyre::bail!("output.word_width must leave two mode bits above filter.output_word");
            }
            let addr_bits = out.word_width - 2 - f.output_word;
            let highest = (acq.channel_count - 1) as u64 + u64::from(out.address_offset);
            if addr_bits < 64 && highest >= (1u64 << addr_bits) {
                eyre::bail!("output.address_offset + channel does not fit the address field");
            }
        }
        if out.clock_divisor == 0 {
            eyre::bail!("output.clock_divisor must be >= 1");
        }
        if out.sync_high_cycles == 0 {
            eyre::bail!("output.sync_high_cycles must be >= 1");
        }
        if out.sync_low_cycles == 0 {
            eyre::bail!("output.sync_low_cycles must be >= 1");
        }
        if out.mode > 3 {
            eyre::bail!("output.mode must be in 0..=3");
        }

        // Gain
        if !(1..=16).contains(&self.gain.word_width) {
            eyre::bail!("gain.word_width must be in 1..=16");
        }
        if self.gain.clock_divisor == 0 {
            eyre::bail!("gain.clock_divisor must be >= 1");
        }
        if self.gain.clock_divisor > acq.hold_cycles {
            eyre::bail!("gain.clock_divisor must be <= acquisition.hold_cycles");
        }

        // Servo
        if self.servo.clock_period_ns == 0 {
            eyre::bail!("servo.clock_period_ns must be >= 1");
        }

        // Channels
        let mut seen = HashSet::new();
        for ch in &self.channel {
            if ch.index >= acq.channel_count {
                eyre::bail!("channel.index {} must be < acquisition.channel_count", ch.index);
            }
            if !seen.insert(ch.index) {
                eyre::bail!("channel.index {} is listed twice", ch.index);
            }
            if ch.profile >= f.profile_count {
                eyre::bail!("channel {}: profile must be < filter.profile_count", ch.index);
            }
            if self.gain.word_width < 16 && u32::from(ch.gain_code) >= (1u32 << self.gain.word_width) {
                eyre::bail!("channel {}: gain_code must fit gain.word_width", ch.index);
            }
            if !fits(i64::from(ch.input), acq.sample_width) {
                eyre::bail!("channel {}: input must fit acquisition.sample_width", ch.index);
            }
        }

        // Coefficients
        let mut seen = HashSet::new();
        for row in &self.coefficients {
            let at = format!("coefficients[{}:{}]", row.channel, row.profile);
            if row.channel >= acq.channel_count {
                eyre::bail!("{at}.channel must be < acquisition.channel_count");
            }
            if row.profile >= f.profile_count {
                eyre::bail!("{at}.profile must be < filter.profile_count");
            }
            if !seen.insert((row.channel, row.profile)) {
                eyre::bail!("{at} is listed twice");
            }
            for (name, v) in [("gain", row.gain), ("integrator", row.integrator), ("zero", row.zero)] {
                if !fits(i64::from(v), f.coefficient) {
                    eyre::bail!("{at}.{name} must fit filter.coefficient bits");
                }
            }
            if !fits(row.offset, f.accumulator) {
                eyre::bail!("{at}.offset must fit filter.accumulator bits");
            }
            if !fits(i64::from(row.set_point_input), f.sample) {
                eyre::bail!("{at}.set_point_input must fit filter.sample bits");
            }
            if !fits(i64::from(row.set_point_output), f.state) {
                eyre::bail!("{at}.set_point_output must fit filter.state bits");
            }
        }

        // State seeds
        for s in &self.state {
            let at = format!("state[{}:{}]", s.channel, s.profile);
            if s.channel >= acq.channel_count {
                eyre::bail!("{at}.channel must be < acquisition.channel_count");
            }
            if s.profile >= f.profile_count {
                eyre::bail!("{at}.profile must be < filter.profile_count");
            }
            let width = match s.slot.trim().to_ascii_lowercase().as_str() {
                "x1" => f.sample,
                "y1" => f.state,
                _ => eyre::bail!("{at}.slot must be \"x1\" or \"y1\""),
            };
            if !fits(s.value, width) {
                eyre::bail!("{at}.value must fit {width} signed bits");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "hourly" | "daily")
        {
            eyre::bail!("logging.rotation must be one of never|hourly|daily");
        }

        Ok(())
    }
}
