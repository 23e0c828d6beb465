//! Runs one invocation and forwards its output to an observer.

use tokio_util::sync::CancellationToken;

use crate::domain::Stage;
use crate::process::{ProcessEvent, ProcessInvocation, ProcessOutcome, ProcessRunner, ProcessStatus};

use super::observer::WorkflowObserver;

/// Start `invocation`, pass every chunk to `observer` as output of `stage`,
/// and return the final outcome
pub(crate) async fn relay(
    runner: &dyn ProcessRunner,
    invocation: &ProcessInvocation,
    stage: Stage,
    observer: &mut dyn WorkflowObserver,
    cancel: &CancellationToken,
) -> ProcessOutcome {
    let mut events = runner.start(invocation, cancel.clone());

    while let Some(event) = events.next().await {
        match event {
            ProcessEvent::Output { stream, bytes } => observer.on_output(stage, stream, &bytes),
            ProcessEvent::Finished(outcome) => return outcome,
        }
    }

    // `ProcessEvents` always yields a terminal event before ending
    ProcessOutcome {
        status: ProcessStatus::Terminated { signal: None },
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}
