//! rmc-run - runner for RenzMC scripts
//!
//! Runs a `.rmc` script through the `renzmc` launcher after making sure the
//! Python runtime and the `renzmc` package are present, installing the
//! package on demand.
//!
//! # Architecture
//!
//! The run is an explicit state machine:
//! - Probe the runtime (`python --version`)
//! - Probe the package (`pip show renzmc`)
//! - If missing, ask for consent and install it (`pip install renzmc`)
//! - Execute the script (`renzmc <file>`)
//!
//! Every stage and every chunk of subprocess output is reported to a
//! [`WorkflowObserver`](crate::core::WorkflowObserver); the run ends in exactly one
//! [`WorkflowOutcome`](crate::domain::WorkflowOutcome).
//!
//! # Modules
//!
//! - `process`: Subprocess launching and output streaming
//! - `core`: Stages and the workflow state machine
//! - `domain`: Data structures (RunRequest, WorkflowEvent, outcomes)
//! - `config`: Toolchain configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run a script, asking before installing renzmc
//! rmc-run run demo.rmc
//!
//! # Check the environment
//! rmc-run doctor
//!
//! # Machine-readable transcript for editor integrations
//! rmc-run run demo.rmc --yes --json
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod process;

// Re-export main types at crate root for convenience
pub use core::{ConsentProvider, RunWorkflow, Toolchain, WorkflowObserver};
pub use domain::{RunRequest, Stage, StageResult, WorkflowEvent, WorkflowOutcome};
pub use process::{ProcessInvocation, ProcessRunner, SystemProcessRunner};
