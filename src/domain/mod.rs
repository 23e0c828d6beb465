//! Domain types for the rmc-run workflow.
//!
//! This module contains the core data structures:
//! - Request: the script to run
//! - Events: what the workflow reports while it runs
//! - Outcome: stage results and the terminal workflow outcome

pub mod events;
pub mod outcome;
pub mod request;

// Re-export commonly used types
pub use events::{EventRecord, OutputStream, Stage, WorkflowEvent};
pub use outcome::{FailureCode, StageResult, WorkflowOutcome};
pub use request::{RequestError, RunRequest, SCRIPT_EXTENSIONS};
