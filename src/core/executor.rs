//! Runs the script through its launcher.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::domain::{Stage, StageResult};
use crate::process::{ProcessRunner, ProcessStatus};

use super::observer::WorkflowObserver;
use super::relay::relay;
use super::toolchain::Toolchain;

pub struct Executor {
    runner: Arc<dyn ProcessRunner>,
    toolchain: Toolchain,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(runner: Arc<dyn ProcessRunner>, toolchain: Toolchain, cancel: CancellationToken) -> Self {
        Self {
            runner,
            toolchain,
            cancel,
        }
    }

    /// Launch `script` as the launcher's only argument, streaming its output
    #[instrument(skip_all, fields(script = %script.display()))]
    pub async fn execute(&self, script: &Path, observer: &mut dyn WorkflowObserver) -> StageResult {
        let invocation = self.toolchain.launch(script);

        let outcome = relay(
            self.runner.as_ref(),
            &invocation,
            Stage::Execute,
            observer,
            &self.cancel,
        )
        .await;

        let result = outcome.stage_result();
        match (&outcome.status, &result) {
            (_, StageResult::Success) => info!("Script finished"),
            (ProcessStatus::SpawnFailed(reason), _) => {
                error!(%reason, "Launcher could not be started")
            }
            (_, StageResult::Canceled) => warn!("Script canceled"),
            (status, _) => warn!(?status, "Script failed"),
        }
        result
    }
}
