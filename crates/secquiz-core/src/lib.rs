//! secquiz-core — Question banks, sampling, the timed session state machine
//! and scoring.
//!
//! This crate holds everything about a quiz attempt that does not depend on
//! where attempts are stored. Stores plug in through [`traits::AttemptRecorder`].

pub mod app;
pub mod bank;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod model;
pub mod report;
pub mod sampler;
pub mod scoring;
pub mod session;
pub mod traits;
