//! mountie core library.
//!
//! `mountie-core` decides which mount primitive (if any) brings a mount point
//! to its declared state and runs it through a `mountie_hal::MountBackend`.
//! Configuration loading, the multi-resource runner and logging setup used by
//! the `mountie` binary live here too.

pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod report;
pub mod runner;

pub use config::{MountResource, MountsConfig};
pub use engine::{ConvergenceEngine, DEFAULT_SETTLE};
pub use errors::ConvergeError;
pub use report::{ChangeReporter, ConvergenceResult, LogReporter, RecordingReporter};
pub use runner::Runner;

pub use mountie_hal::{Action, CurrentState, DesiredSpec};
