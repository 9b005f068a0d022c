//! Zerosync → Starknet proof pipeline
//!
//! Sequences the external tools of the demo (Cairo runner, Stone prover,
//! proof parser, Starknet calldata tool) as typed steps with explicit file
//! contracts, and reports the outcome of every step.

pub mod command;
pub mod download;
pub mod error;
pub mod layout;
pub mod runner;
pub mod shutdown;
pub mod stages;
pub mod step;

pub use error::StepError;
pub use layout::WorkspaceLayout;
pub use runner::{FailurePolicy, PipelineReport, RunnerConfig, Sequencer, StepStatus};
pub use step::{Action, Pipeline, Step};
