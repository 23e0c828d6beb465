//! Stage results and terminal workflow outcomes.

use std::fmt;

use serde::Serialize;

use super::events::Stage;

/// Why a subprocess counts as failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// Exited normally with a nonzero code
    Code(i32),

    /// Terminated without an exit code (e.g. killed by a signal)
    Abnormal { signal: Option<i32> },
}

impl FailureCode {
    /// The numeric exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        match self {
            FailureCode::Code(code) => Some(*code),
            FailureCode::Abnormal { .. } => None,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::Code(code) => write!(f, "{}", code),
            FailureCode::Abnormal { signal: Some(signal) } => write!(f, "signal {}", signal),
            FailureCode::Abnormal { signal: None } => f.write_str("abnormal termination"),
        }
    }
}

/// Result of a single stage, consumed by the workflow to pick the next state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageResult {
    /// The stage did what it was asked
    Success,

    /// A probe found the runtime or package absent
    MissingDependency,

    /// The host declined to install the package
    InstallDeclined,

    /// The subprocess ran and failed
    Failed(FailureCode),

    /// The executable could not be started
    SpawnFailed,

    /// The stage was stopped by cancellation
    Canceled,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StageResult::Success)
    }
}

/// The single terminal outcome of a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// The runtime interpreter is not available
    RuntimeMissing,

    /// The package is missing and installing it was declined
    PackageMissingDeclined,

    /// The package install ran and failed
    InstallFailed(FailureCode),

    /// The script ran and failed
    ExecuteFailed(FailureCode),

    /// The script ran and exited 0
    Succeeded,

    /// An executable could not be started during the given stage
    SpawnFailed(Stage),

    /// The workflow was canceled
    Canceled,
}

impl WorkflowOutcome {
    /// Whether the outcome should be reported as an error
    ///
    /// A declined install is informational, not a failure.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            WorkflowOutcome::Succeeded | WorkflowOutcome::PackageMissingDeclined
        )
    }

    /// Process exit code for the command-line host
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkflowOutcome::Succeeded | WorkflowOutcome::PackageMissingDeclined => 0,
            WorkflowOutcome::ExecuteFailed(FailureCode::Code(code)) => *code,
            WorkflowOutcome::ExecuteFailed(FailureCode::Abnormal { signal: Some(signal) }) => {
                128 + signal
            }
            WorkflowOutcome::ExecuteFailed(FailureCode::Abnormal { signal: None }) => 1,
            WorkflowOutcome::InstallFailed(_) => 1,
            WorkflowOutcome::RuntimeMissing | WorkflowOutcome::SpawnFailed(_) => 127,
            WorkflowOutcome::Canceled => 130,
        }
    }
}

impl fmt::Display for WorkflowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowOutcome::RuntimeMissing => f.write_str("runtime missing"),
            WorkflowOutcome::PackageMissingDeclined => {
                f.write_str("package missing, install declined")
            }
            WorkflowOutcome::InstallFailed(code) => write!(f, "install failed ({})", code),
            WorkflowOutcome::ExecuteFailed(code) => write!(f, "execution failed ({})", code),
            WorkflowOutcome::Succeeded => f.write_str("succeeded"),
            WorkflowOutcome::SpawnFailed(stage) => write!(f, "could not start {} process", stage),
            WorkflowOutcome::Canceled => f.write_str("canceled"),
        }
    }
}
