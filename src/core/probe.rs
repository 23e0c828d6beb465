//! Checks for the runtime interpreter and the companion package.
//!
//! A missing executable is an expected condition here: it simply means
//! "not available", never an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::domain::Stage;
use crate::process::{ProcessOutcome, ProcessRunner};

use super::observer::WorkflowObserver;
use super::relay::relay;
use super::toolchain::Toolchain;

/// Answers "is the runtime there?" and "is the package installed?"
pub struct EnvironmentProbe {
    runner: Arc<dyn ProcessRunner>,
    toolchain: Toolchain,
    cancel: CancellationToken,
}

impl EnvironmentProbe {
    pub fn new(runner: Arc<dyn ProcessRunner>, toolchain: Toolchain, cancel: CancellationToken) -> Self {
        Self {
            runner,
            toolchain,
            cancel,
        }
    }

    /// True iff the runtime's version query starts and exits 0
    #[instrument(skip_all, fields(runtime = %self.toolchain.runtime))]
    pub async fn check_runtime(&self, observer: &mut dyn WorkflowObserver) -> bool {
        let invocation = self.toolchain.runtime_version();
        let outcome = relay(
            self.runner.as_ref(),
            &invocation,
            Stage::ProbeRuntime,
            observer,
            &self.cancel,
        )
        .await;

        let present = outcome.success();
        if present {
            info!(version = %reported_text(&outcome), "Runtime found");
        } else {
            debug!(status = ?outcome.status, "Runtime not available");
        }
        present
    }

    /// True iff the package manager's info query for `name` exits 0
    #[instrument(skip_all, fields(package = name))]
    pub async fn check_package(&self, name: &str, observer: &mut dyn WorkflowObserver) -> bool {
        let invocation = self.toolchain.package_info(name);
        let outcome = relay(
            self.runner.as_ref(),
            &invocation,
            Stage::ProbePackage,
            observer,
            &self.cancel,
        )
        .await;

        let present = outcome.success();
        debug!(present, status = ?outcome.status, "Package probe finished");
        present
    }
}

/// First non-empty line of the process's output
///
/// Older interpreters print their version on stderr.
fn reported_text(outcome: &ProcessOutcome) -> String {
    [&outcome.stdout, &outcome.stderr]
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(bytes))
        .find_map(|text| {
            text.lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(String::from)
        })
        .unwrap_or_default()
}
