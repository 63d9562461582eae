#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core servo loop logic (hardware-agnostic).
//!
//! This crate provides the cycle-stepped servo engine. All physical-layer
//! interactions go through the `servo_traits::SampleSource`,
//! `servo_traits::DacLink` and `servo_traits::GainSink` traits.
//!
//! ## Architecture
//!
//! - **Acquisition**: multi-lane sampling handshake (`acquisition` module)
//! - **Filter bank**: per-(channel, profile) fixed-point IIR (`iir` module)
//! - **Output**: serial write engine with framing (`output` module)
//! - **Gain**: gain-stage latch (`gain` module)
//! - **Orchestrator**: `ServoCore`, one logical cycle per `tick()`
//! - **Runner**: multi-pass driver with shutdown and pacing (`runner` module)
//!
//! ## Fixed-Point Arithmetic
//!
//! Every bus has an explicit signed width. Products are formed exactly in
//! `i128` and narrowed by saturation (`fixed_point` module); no floating point
//! is used in the datapath.

pub mod acquisition;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod core;
pub mod error;
pub mod fixed_point;
pub mod gain;
pub mod hw_error;
pub mod iir;
pub mod mocks;
pub mod output;
pub mod runner;
pub mod status;
pub mod timing;

pub use crate::acquisition::{AcqPhase, Acquisition};
pub use crate::builder::{Missing, Seeds, Servo, ServoBuilder, ServoG, Set, build_servo};
pub use crate::config::{
    AcquisitionParams, CoefficientSet, FilterWidths, GainParams, LoopCfg, OutputParams,
};
pub use crate::core::ServoCore;
pub use crate::error::{BuildError, ContractViolation, Report, Result, ServoError};
pub use crate::gain::GainController;
pub use crate::iir::{FilterBank, FilterState, StateSlot};
pub use crate::output::{SerialWriter, WritePhase};
pub use crate::runner::{RunParams, RunSummary};
pub use crate::status::{LoopIterationRecord, LoopState, Signals, TickStatus};
pub use crate::timing::Timing;
