//! Type-state builder for `Servo` and generic `build_servo` constructor.
//!
//! The builder enforces at compile time that the sample source, output link and
//! gain sink are provided before `build()` is available. `try_build()` is always
//! available for dynamic checks.

use std::marker::PhantomData;

use servo_traits::{DacLink, GainSink, SampleSource};

use crate::acquisition::Acquisition;
use crate::config::*;
use crate::core::ServoCore;
use crate::error::{BuildError, Result};
use crate::gain::GainController;
use crate::iir::{FilterBank, FilterState, StateSlot};
use crate::output::SerialWriter;
use crate::runner::{self, RunParams, RunSummary};
use crate::status::{LoopIterationRecord, LoopState, TickStatus};
use crate::timing::Timing;

// ── Public dynamic-dispatch wrapper ──────────────────────────────────────────

/// Public dynamic (boxed) servo that wraps the generic core via composition.
pub struct Servo {
    pub(crate) inner: ServoCore<Box<dyn SampleSource>, Box<dyn DacLink>, Box<dyn GainSink>>,
}

impl core::fmt::Debug for Servo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Servo")
            .field("state", &self.inner.state())
            .field("channels", &self.inner.channel_count())
            .field("passes", &self.inner.passes_completed())
            .finish()
    }
}

impl Servo {
    /// Start building a Servo.
    pub fn builder() -> ServoBuilder<Missing, Missing, Missing> {
        ServoBuilder::default()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channel_count()
    }

    pub fn state(&self) -> LoopState {
        self.inner.state()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn done(&self) -> bool {
        self.inner.done()
    }

    pub fn cycle(&self) -> u64 {
        self.inner.cycle()
    }

    pub fn passes_completed(&self) -> u64 {
        self.inner.passes_completed()
    }

    pub fn last_pass_cycles(&self) -> Option<u64> {
        self.inner.last_pass_cycles()
    }

    /// Derived timing of the configured loop.
    pub fn timing(&self) -> Timing {
        self.inner.timing()
    }

    pub fn set_start(&mut self, level: bool) {
        self.inner.set_start(level);
    }

    pub fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    pub fn tick(&mut self) -> Result<TickStatus> {
        self.inner.tick()
    }

    pub fn run_pass(&mut self) -> Result<Vec<LoopIterationRecord>> {
        self.inner.run_pass()
    }

    /// Run with `start` held high; see [`runner::run`].
    pub fn run<F>(&mut self, params: &RunParams, on_record: F) -> Result<RunSummary>
    where
        F: FnMut(&LoopIterationRecord),
    {
        runner::run(&mut self.inner, params, on_record)
    }

    pub fn set_state(&mut self, channel: usize, profile: usize, slot: StateSlot, value: i32) -> Result<()> {
        self.inner.set_state(channel, profile, slot, value)
    }

    pub fn filter_state(&self, channel: usize, profile: usize) -> Result<FilterState> {
        self.inner.filter_state(channel, profile)
    }

    pub fn set_coefficients(&mut self, channel: usize, profile: usize, coefficients: CoefficientSet) -> Result<()> {
        self.inner.set_coefficients(channel, profile, coefficients)
    }

    pub fn set_profile(&mut self, channel: usize, profile: usize) -> Result<()> {
        self.inner.set_profile(channel, profile)
    }

    pub fn set_gain_code(&mut self, channel: usize, code: u16) -> Result<()> {
        self.inner.set_gain_code(channel, code)
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        self.inner.reset_filters()
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Coefficient, profile, gain and state assignments applied at build time.
#[derive(Debug, Clone, Default)]
pub struct Seeds {
    pub coefficients: Vec<(usize, usize, CoefficientSet)>,
    pub profiles: Vec<(usize, usize)>,
    pub gain_codes: Vec<(usize, u16)>,
    pub states: Vec<(usize, usize, StateSlot, i32)>,
}

/// Builder for `Servo`. All fields are validated on `build()`.
pub struct ServoBuilder<S, L, G> {
    source: Option<Box<dyn SampleSource>>,
    link: Option<Box<dyn DacLink>>,
    gain_sink: Option<Box<dyn GainSink>>,
    acquisition: Option<AcquisitionParams>,
    filter: Option<FilterWidths>,
    output: Option<OutputParams>,
    gain: Option<GainParams>,
    loop_cfg: Option<LoopCfg>,
    seeds: Seeds,
    _s: PhantomData<S>,
    _l: PhantomData<L>,
    _g: PhantomData<G>,
}

impl Default for ServoBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            source: None,
            link: None,
            gain_sink: None,
            acquisition: None,
            filter: None,
            output: None,
            gain: None,
            loop_cfg: None,
            seeds: Seeds::default(),
            _s: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

/// Validate configuration and construct a `ServoCore`.
///
/// This is the single source of truth for validation and construction,
/// used by both `ServoBuilder::try_build()` and `build_servo()`.
#[allow(clippy::too_many_arguments)]
fn validate_and_build<A: SampleSource, D: DacLink, G: GainSink>(
    source: A,
    link: D,
    gain_sink: G,
    acquisition: AcquisitionParams,
    filter: FilterWidths,
    output: OutputParams,
    gain: GainParams,
    loop_cfg: LoopCfg,
    seeds: Seeds,
) -> Result<ServoCore<A, D, G>> {
    // ── Validation ───────────────────────────────────────────────────────────
    acquisition.validate().map_err(eyre::Report::new)?;
    filter
        .validate(acquisition.channel_count)
        .map_err(eyre::Report::new)?;
    output
        .validate(filter.output_word)
        .map_err(eyre::Report::new)?;
    gain.validate(acquisition.hold_cycles)
        .map_err(eyre::Report::new)?;
    if output.channel_count != acquisition.channel_count {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "output channel_count must equal acquisition channel_count",
        )));
    }
    if acquisition.sample_width > filter.sample {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "acquisition sample_width must be <= filter sample width",
        )));
    }

    // ── Assemble ─────────────────────────────────────────────────────────────
    let channels = acquisition.channel_count;
    let output_word = filter.output_word;
    let mut core = ServoCore::from_parts(
        source,
        link,
        gain_sink,
        Acquisition::new(acquisition),
        FilterBank::new(filter, channels),
        SerialWriter::new(output, output_word),
        GainController::new(gain, channels),
        loop_cfg,
    );

    for (channel, profile, c) in seeds.coefficients {
        core.set_coefficients(channel, profile, c)?;
    }
    core.reset_filters()?;
    for (channel, profile) in seeds.profiles {
        core.set_profile(channel, profile)?;
    }
    for (channel, code) in seeds.gain_codes {
        core.set_gain_code(channel, code)?;
    }
    for (channel, profile, slot, value) in seeds.states {
        core.set_state(channel, profile, slot, value)?;
    }
    tracing::debug!(channels, "servo built");
    Ok(core)
}

impl<S, L, G> ServoBuilder<S, L, G> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Servo> {
        let source = self
            .source
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSource))?;
        let link = self
            .link
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLink))?;
        let gain_sink = self
            .gain_sink
            .ok_or_else(|| eyre::Report::new(BuildError::MissingGainSink))?;

        let inner = validate_and_build(
            source,
            link,
            gain_sink,
            self.acquisition.unwrap_or_default(),
            self.filter.unwrap_or_default(),
            self.output.unwrap_or_default(),
            self.gain.unwrap_or_default(),
            self.loop_cfg.unwrap_or_default(),
            self.seeds,
        )?;

        Ok(Servo { inner })
    }
}

/// Chainable setters that do not affect type-state.
impl<S, L, G> ServoBuilder<S, L, G> {
    pub fn with_acquisition(mut self, acquisition: AcquisitionParams) -> Self {
        self.acquisition = Some(acquisition);
        self
    }
    pub fn with_filter(mut self, filter: FilterWidths) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn with_output(mut self, output: OutputParams) -> Self {
        self.output = Some(output);
        self
    }
    pub fn with_gain(mut self, gain: GainParams) -> Self {
        self.gain = Some(gain);
        self
    }
    pub fn with_loop(mut self, loop_cfg: LoopCfg) -> Self {
        self.loop_cfg = Some(loop_cfg);
        self
    }
    pub fn with_coefficients(mut self, channel: usize, profile: usize, c: CoefficientSet) -> Self {
        self.seeds.coefficients.push((channel, profile, c));
        self
    }
    pub fn with_profile(mut self, channel: usize, profile: usize) -> Self {
        self.seeds.profiles.push((channel, profile));
        self
    }
    pub fn with_gain_code(mut self, channel: usize, code: u16) -> Self {
        self.seeds.gain_codes.push((channel, code));
        self
    }
    /// Inject x1/y1 after coefficients have been applied and filters reset.
    pub fn with_state(mut self, channel: usize, profile: usize, slot: StateSlot, value: i32) -> Self {
        self.seeds.states.push((channel, profile, slot, value));
        self
    }
    pub fn with_seeds(mut self, seeds: Seeds) -> Self {
        self.seeds.coefficients.extend(seeds.coefficients);
        self.seeds.profiles.extend(seeds.profiles);
        self.seeds.gain_codes.extend(seeds.gain_codes);
        self.seeds.states.extend(seeds.states);
        self
    }
}

// Setters that advance type-state
impl<L, G> ServoBuilder<Missing, L, G> {
    pub fn with_source(self, source: impl SampleSource + 'static) -> ServoBuilder<Set, L, G> {
        ServoBuilder {
            source: Some(Box::new(source)),
            link: self.link,
            gain_sink: self.gain_sink,
            acquisition: self.acquisition,
            filter: self.filter,
            output: self.output,
            gain: self.gain,
            loop_cfg: self.loop_cfg,
            seeds: self.seeds,
            _s: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl<S, G> ServoBuilder<S, Missing, G> {
    pub fn with_link(self, link: impl DacLink + 'static) -> ServoBuilder<S, Set, G> {
        ServoBuilder {
            source: self.source,
            link: Some(Box::new(link)),
            gain_sink: self.gain_sink,
            acquisition: self.acquisition,
            filter: self.filter,
            output: self.output,
            gain: self.gain,
            loop_cfg: self.loop_cfg,
            seeds: self.seeds,
            _s: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl<S, L> ServoBuilder<S, L, Missing> {
    pub fn with_gain_sink(self, sink: impl GainSink + 'static) -> ServoBuilder<S, L, Set> {
        ServoBuilder {
            source: self.source,
            link: self.link,
            gain_sink: Some(Box::new(sink)),
            acquisition: self.acquisition,
            filter: self.filter,
            output: self.output,
            gain: self.gain,
            loop_cfg: self.loop_cfg,
            seeds: self.seeds,
            _s: PhantomData,
            _l: PhantomData,
            _g: PhantomData,
        }
    }
}

impl ServoBuilder<Set, Set, Set> {
    /// Validate and build the Servo. Only available when source, link and gain sink are set.
    pub fn build(self) -> Result<Servo> {
        self.try_build()
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type ServoG<A, D, G> = ServoCore<A, D, G>;

/// Build a generic, statically-dispatched `ServoG` from concrete front-ends.
///
/// Delegates to the shared `validate_and_build`.
#[allow(clippy::too_many_arguments)]
pub fn build_servo<A, D, G>(
    source: A,
    link: D,
    gain_sink: G,
    acquisition: AcquisitionParams,
    filter: FilterWidths,
    output: OutputParams,
    gain: GainParams,
    loop_cfg: LoopCfg,
    seeds: Option<Seeds>,
) -> Result<ServoG<A, D, G>>
where
    A: SampleSource,
    D: DacLink,
    G: GainSink,
{
    validate_and_build(
        source,
        link,
        gain_sink,
        acquisition,
        filter,
        output,
        gain,
        loop_cfg,
        seeds.unwrap_or_default(),
    )
}
