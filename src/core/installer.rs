//! Installs the companion package through the package manager.
//!
//! Install logs are relayed verbatim. A failed install is reported once;
//! it is never retried, since a repeated install can leave partial state
//! the operator should see.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::domain::{Stage, StageResult};
use crate::process::{ProcessRunner, ProcessStatus};

use super::observer::WorkflowObserver;
use super::relay::relay;
use super::toolchain::Toolchain;

pub struct DependencyInstaller {
    runner: Arc<dyn ProcessRunner>,
    toolchain: Toolchain,
    cancel: CancellationToken,
}

impl DependencyInstaller {
    pub fn new(runner: Arc<dyn ProcessRunner>, toolchain: Toolchain, cancel: CancellationToken) -> Self {
        Self {
            runner,
            toolchain,
            cancel,
        }
    }

    /// Run the package manager's install subcommand for `name`
    #[instrument(skip_all, fields(package = name))]
    pub async fn install(&self, name: &str, observer: &mut dyn WorkflowObserver) -> StageResult {
        let invocation = self.toolchain.package_install(name);
        info!(command = %invocation, "Installing package");

        let outcome = relay(
            self.runner.as_ref(),
            &invocation,
            Stage::Install,
            observer,
            &self.cancel,
        )
        .await;

        let result = outcome.stage_result();
        match (&outcome.status, &result) {
            (_, StageResult::Success) => info!("Package installed"),
            (ProcessStatus::SpawnFailed(reason), _) => {
                error!(%reason, "Package manager could not be started")
            }
            (_, StageResult::Canceled) => warn!("Install canceled"),
            (status, _) => error!(?status, "Package install failed"),
        }
        result
    }
}
