//! The run workflow: probe, maybe install, execute.
//!
//! The sequencing is an explicit state machine. [`WorkflowState::next`] is a
//! pure transition function; [`RunWorkflow::start`] drives it, running one
//! stage per state and reporting each through the observer.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::domain::{FailureCode, RunRequest, Stage, StageResult, WorkflowOutcome};
use crate::process::ProcessRunner;

use super::executor::Executor;
use super::installer::DependencyInstaller;
use super::observer::{ConsentProvider, WorkflowObserver};
use super::probe::EnvironmentProbe;
use super::toolchain::Toolchain;

/// Where a workflow is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// No request received yet
    Idle,

    ProbingRuntime,

    /// `revalidating` is set for the advisory probe after an install
    ProbingPackage { revalidating: bool },

    AwaitingConsent,

    Installing,

    Executing,

    /// Terminal
    Finished(WorkflowOutcome),
}

impl WorkflowState {
    /// Idle → ProbingRuntime when a request arrives
    pub fn on_request(self) -> Self {
        match self {
            WorkflowState::Idle => WorkflowState::ProbingRuntime,
            other => other,
        }
    }

    /// The stage run while in this state
    pub fn stage(&self) -> Option<Stage> {
        match self {
            WorkflowState::Idle | WorkflowState::Finished(_) => None,
            WorkflowState::ProbingRuntime => Some(Stage::ProbeRuntime),
            WorkflowState::ProbingPackage { .. } => Some(Stage::ProbePackage),
            WorkflowState::AwaitingConsent => Some(Stage::Consent),
            WorkflowState::Installing => Some(Stage::Install),
            WorkflowState::Executing => Some(Stage::Execute),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Finished(_))
    }

    /// State after this state's stage produced `result`
    pub fn next(self, result: StageResult) -> Self {
        use WorkflowState::*;

        if self.stage().is_none() {
            return self;
        }
        if result == StageResult::Canceled {
            return Finished(WorkflowOutcome::Canceled);
        }

        match self {
            ProbingRuntime => match result {
                StageResult::Success => ProbingPackage {
                    revalidating: false,
                },
                _ => Finished(WorkflowOutcome::RuntimeMissing),
            },

            ProbingPackage {
                revalidating: false,
            } => match result {
                StageResult::Success => Executing,
                _ => AwaitingConsent,
            },

            // Advisory only: the executor reports a package that is really missing
            ProbingPackage { revalidating: true } => Executing,

            AwaitingConsent => match result {
                StageResult::Success => Installing,
                _ => Finished(WorkflowOutcome::PackageMissingDeclined),
            },

            Installing => match result {
                StageResult::Success => ProbingPackage { revalidating: true },
                StageResult::SpawnFailed => Finished(WorkflowOutcome::SpawnFailed(Stage::Install)),
                StageResult::Failed(code) => Finished(WorkflowOutcome::InstallFailed(code)),
                _ => Finished(WorkflowOutcome::InstallFailed(FailureCode::Abnormal {
                    signal: None,
                })),
            },

            Executing => match result {
                StageResult::Success => Finished(WorkflowOutcome::Succeeded),
                StageResult::SpawnFailed => Finished(WorkflowOutcome::SpawnFailed(Stage::Execute)),
                StageResult::Failed(code) => Finished(WorkflowOutcome::ExecuteFailed(code)),
                _ => Finished(WorkflowOutcome::ExecuteFailed(FailureCode::Abnormal {
                    signal: None,
                })),
            },

            Idle | Finished(_) => self,
        }
    }
}

/// Runs one script, installing its package first if needed
///
/// Holds no state between runs; construct one per invocation or reuse it,
/// the result is the same. Cancellation is scoped to a single run.
pub struct RunWorkflow {
    runner: Arc<dyn ProcessRunner>,
    toolchain: Toolchain,
}

impl RunWorkflow {
    pub fn new(runner: Arc<dyn ProcessRunner>, toolchain: Toolchain) -> Self {
        Self { runner, toolchain }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Run `request` to a terminal outcome
    ///
    /// Every stage is bracketed by `on_stage_started`/`on_stage_finished`;
    /// `on_workflow_terminal` is called last, exactly once.
    pub async fn start(
        &self,
        request: &RunRequest,
        observer: &mut dyn WorkflowObserver,
        consent: &dyn ConsentProvider,
    ) -> WorkflowOutcome {
        self.start_cancellable(request, observer, consent, CancellationToken::new())
            .await
    }

    /// Like [`start`](Self::start), stopping early once `cancel` fires
    ///
    /// The token only affects this run.
    #[instrument(skip_all, fields(run_id = %request.id(), script = %request.path().display()))]
    pub async fn start_cancellable(
        &self,
        request: &RunRequest,
        observer: &mut dyn WorkflowObserver,
        consent: &dyn ConsentProvider,
        cancel: CancellationToken,
    ) -> WorkflowOutcome {
        let probe = EnvironmentProbe::new(self.runner.clone(), self.toolchain.clone(), cancel.clone());
        let installer =
            DependencyInstaller::new(self.runner.clone(), self.toolchain.clone(), cancel.clone());
        let executor = Executor::new(self.runner.clone(), self.toolchain.clone(), cancel.clone());
        let package = self.toolchain.package.as_str();

        info!("Starting workflow");
        let mut state = WorkflowState::Idle.on_request();

        let outcome = loop {
            let stage = match (state, state.stage()) {
                (WorkflowState::Finished(outcome), _) => break outcome,
                (_, Some(stage)) => stage,
                (_, None) => {
                    state = state.on_request();
                    continue;
                }
            };

            if cancel.is_cancelled() {
                state = WorkflowState::Finished(WorkflowOutcome::Canceled);
                continue;
            }

            observer.on_stage_started(stage);
            let result = match stage {
                Stage::ProbeRuntime => presence(probe.check_runtime(observer).await),
                Stage::ProbePackage => presence(probe.check_package(package, observer).await),
                Stage::Consent => {
                    tokio::select! {
                        granted = consent.request_install_consent(package) => {
                            if granted {
                                StageResult::Success
                            } else {
                                StageResult::InstallDeclined
                            }
                        }
                        _ = cancel.cancelled() => StageResult::Canceled,
                    }
                }
                Stage::Install => installer.install(package, observer).await,
                Stage::Execute => executor.execute(request.path(), observer).await,
            };
            // A probe interrupted by cancellation reads as "absent"
            let result = match (stage, result) {
                (Stage::ProbeRuntime | Stage::ProbePackage, StageResult::MissingDependency)
                    if cancel.is_cancelled() =>
                {
                    StageResult::Canceled
                }
                (_, result) => result,
            };
            observer.on_stage_finished(stage, &result);

            if state == (WorkflowState::ProbingPackage { revalidating: true })
                && result == StageResult::MissingDependency
            {
                warn!(package, "Package still not detected after install; running anyway");
            }

            state = state.next(result);
        };

        info!(%outcome, "Workflow finished");
        observer.on_workflow_terminal(&outcome);
        outcome
    }
}

fn presence(found: bool) -> StageResult {
    if found {
        StageResult::Success
    } else {
        StageResult::MissingDependency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use WorkflowState::*;

    #[test]
    fn test_request_starts_runtime_probe() {
        assert_eq!(Idle.on_request(), ProbingRuntime);
        assert_eq!(Executing.on_request(), Executing);
        assert_eq!(Idle.next(StageResult::Success), Idle);
    }

    #[test]
    fn test_runtime_probe_transitions() {
        assert_eq!(
            ProbingRuntime.next(StageResult::Success),
            ProbingPackage {
                revalidating: false
            }
        );
        assert_eq!(
            ProbingRuntime.next(StageResult::MissingDependency),
            Finished(WorkflowOutcome::RuntimeMissing)
        );
    }

    #[test]
    fn test_package_probe_transitions() {
        let probing = ProbingPackage {
            revalidating: false,
        };
        assert_eq!(probing.next(StageResult::Success), Executing);
        assert_eq!(probing.next(StageResult::MissingDependency), AwaitingConsent);
    }

    #[test]
    fn test_revalidation_is_advisory() {
        let revalidating = ProbingPackage { revalidating: true };
        assert_eq!(revalidating.next(StageResult::Success), Executing);
        assert_eq!(revalidating.next(StageResult::MissingDependency), Executing);
    }

    #[test]
    fn test_consent_transitions() {
        assert_eq!(AwaitingConsent.next(StageResult::Success), Installing);
        assert_eq!(
            AwaitingConsent.next(StageResult::InstallDeclined),
            Finished(WorkflowOutcome::PackageMissingDeclined)
        );
    }

    #[test]
    fn test_install_transitions() {
        assert_eq!(
            Installing.next(StageResult::Success),
            ProbingPackage { revalidating: true }
        );
        assert_eq!(
            Installing.next(StageResult::Failed(FailureCode::Code(1))),
            Finished(WorkflowOutcome::InstallFailed(FailureCode::Code(1)))
        );
        assert_eq!(
            Installing.next(StageResult::SpawnFailed),
            Finished(WorkflowOutcome::SpawnFailed(Stage::Install))
        );
    }

    #[test]
    fn test_execute_transitions() {
        assert_eq!(
            Executing.next(StageResult::Success),
            Finished(WorkflowOutcome::Succeeded)
        );
        assert_eq!(
            Executing.next(StageResult::Failed(FailureCode::Abnormal { signal: Some(9) })),
            Finished(WorkflowOutcome::ExecuteFailed(FailureCode::Abnormal {
                signal: Some(9)
            }))
        );
        assert_eq!(
            Executing.next(StageResult::SpawnFailed),
            Finished(WorkflowOutcome::SpawnFailed(Stage::Execute))
        );
    }

    #[test]
    fn test_cancel_from_any_stage() {
        for state in [
            ProbingRuntime,
            ProbingPackage {
                revalidating: false,
            },
            AwaitingConsent,
            Installing,
            Executing,
        ] {
            assert_eq!(
                state.next(StageResult::Canceled),
                Finished(WorkflowOutcome::Canceled)
            );
        }
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let done = Finished(WorkflowOutcome::Succeeded);
        assert!(done.is_terminal());
        assert_eq!(done.stage(), None);
        assert_eq!(done.next(StageResult::Canceled), done);
    }
}
