//! Core workflow logic.
//!
//! This module contains:
//! - Toolchain: the external executables and their argument shapes
//! - Probe / Installer / Executor: the three subprocess-bound stages
//! - Workflow: the state machine that sequences them
//! - Observer: hooks for the host (progress, consent)

pub mod executor;
pub mod installer;
pub mod observer;
pub mod probe;
mod relay;
pub mod toolchain;
pub mod workflow;

// Re-export commonly used types
pub use executor::Executor;
pub use installer::DependencyInstaller;
pub use observer::{
    AlwaysConsent, ConsentProvider, NeverConsent, NullObserver, RecordingObserver, WorkflowObserver,
};
pub use probe::EnvironmentProbe;
pub use toolchain::{CommandSpec, Toolchain};
pub use workflow::{RunWorkflow, WorkflowState};
