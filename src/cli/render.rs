//! Observers that render a workflow for a terminal or as JSON lines.

use std::io::Write;

use tracing::debug;
use uuid::Uuid;

use crate::core::{Toolchain, WorkflowObserver};
use crate::domain::{
    EventRecord, FailureCode, OutputStream, Stage, StageResult, WorkflowEvent, WorkflowOutcome,
};

/// Relays script output verbatim and prints short status lines on stderr
///
/// Probe output is not shown; it only matters for diagnosis and is logged at
/// debug level instead.
pub struct TerminalObserver<O: Write + Send, E: Write + Send> {
    script_name: String,
    toolchain: Toolchain,
    stdout: O,
    stderr: E,
}

impl TerminalObserver<std::io::Stdout, std::io::Stderr> {
    /// Observer writing to the process's own stdout and stderr
    pub fn stdio(script_name: impl Into<String>, toolchain: Toolchain) -> Self {
        Self::new(script_name, toolchain, std::io::stdout(), std::io::stderr())
    }
}

impl<O: Write + Send, E: Write + Send> TerminalObserver<O, E> {
    pub fn new(script_name: impl Into<String>, toolchain: Toolchain, stdout: O, stderr: E) -> Self {
        Self {
            script_name: script_name.into(),
            toolchain,
            stdout,
            stderr,
        }
    }

    pub fn into_writers(self) -> (O, E) {
        (self.stdout, self.stderr)
    }

    fn status(&mut self, message: &str) {
        let _ = writeln!(self.stderr, "{}", message);
        let _ = self.stderr.flush();
    }
}

impl<O: Write + Send, E: Write + Send> WorkflowObserver for TerminalObserver<O, E> {
    fn on_stage_started(&mut self, stage: Stage) {
        match stage {
            Stage::Install => {
                self.status("Installing RenzMC package...");
            }
            Stage::Execute => {
                let message = format!("Running {}...", self.script_name);
                self.status(&message);
            }
            Stage::ProbeRuntime | Stage::ProbePackage | Stage::Consent => {}
        }
    }

    fn on_output(&mut self, stage: Stage, stream: OutputStream, bytes: &[u8]) {
        if matches!(stage, Stage::ProbeRuntime | Stage::ProbePackage) {
            debug!(%stage, output = %String::from_utf8_lossy(bytes).trim_end(), "Probe output");
            return;
        }

        let written = match stream {
            OutputStream::Stdout => self
                .stdout
                .write_all(bytes)
                .and_then(|_| self.stdout.flush()),
            OutputStream::Stderr => self
                .stderr
                .write_all(bytes)
                .and_then(|_| self.stderr.flush()),
        };
        if let Err(e) = written {
            debug!(error = %e, "Failed to relay output");
        }
    }

    fn on_stage_finished(&mut self, stage: Stage, result: &StageResult) {
        match (stage, result) {
            (Stage::Install, StageResult::Success) => {
                self.status("\nRenzMC package installed successfully!");
            }
            (Stage::Install, StageResult::Failed(code)) => {
                self.status(&format!(
                    "\nFailed to install RenzMC package with code {}.",
                    failure_text(code)
                ));
            }
            (Stage::Execute, StageResult::Success) => {
                self.status("\nExecution completed successfully.");
            }
            (Stage::Execute, StageResult::Failed(code)) => {
                self.status(&format!("\nExecution failed with code {}.", failure_text(code)));
            }
            _ => {}
        }
    }

    fn on_workflow_terminal(&mut self, outcome: &WorkflowOutcome) {
        match outcome {
            WorkflowOutcome::RuntimeMissing => {
                let probe = self.toolchain.runtime_version().to_string();
                self.status(&format!(
                    "[Python is not installed (`{}` failed). Please install Python to run RenzMC files.]",
                    probe
                ));
                self.status("[Download Python from https://www.python.org/downloads/]");
            }
            WorkflowOutcome::PackageMissingDeclined => {
                let hint = self.toolchain.install_hint();
                self.status(&format!(
                    "[You can install {} later with: {}]",
                    self.toolchain.package, hint
                ));
            }
            WorkflowOutcome::InstallFailed(_) => {
                self.status("[Failed to install the package. Check the output above for details.]");
            }
            WorkflowOutcome::ExecuteFailed(_) => {
                self.status("[Script execution failed. Check the output above for details.]");
            }
            WorkflowOutcome::SpawnFailed(stage) => {
                let program = match stage {
                    Stage::Install => self.toolchain.package_manager.program().to_string(),
                    _ => self.toolchain.launcher.program().to_string(),
                };
                self.status(&format!(
                    "[Could not start `{}` for the {} step. Is it on your PATH?]",
                    program, stage
                ));
            }
            WorkflowOutcome::Canceled => self.status("[Canceled]"),
            WorkflowOutcome::Succeeded => {}
        }
    }
}

fn failure_text(code: &FailureCode) -> String {
    match code {
        FailureCode::Code(code) => code.to_string(),
        other => format!("({})", other),
    }
}

/// Writes every event as one JSON object per line
pub struct JsonLinesObserver<W: Write + Send> {
    run_id: Uuid,
    writer: W,
}

impl<W: Write + Send> JsonLinesObserver<W> {
    pub fn new(run_id: Uuid, writer: W) -> Self {
        Self { run_id, writer }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn emit(&mut self, event: WorkflowEvent) {
        let record = EventRecord::new(self.run_id, event);
        let written = serde_json::to_writer(&mut self.writer, &record)
            .map_err(std::io::Error::from)
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush());
        if let Err(e) = written {
            debug!(error = %e, "Failed to write transcript record");
        }
    }
}

impl<W: Write + Send> WorkflowObserver for JsonLinesObserver<W> {
    fn on_stage_started(&mut self, stage: Stage) {
        self.emit(WorkflowEvent::StageStarted { stage });
    }

    fn on_output(&mut self, stage: Stage, stream: OutputStream, bytes: &[u8]) {
        self.emit(WorkflowEvent::OutputChunk {
            stage,
            stream,
            bytes: bytes.to_vec(),
        });
    }

    fn on_stage_finished(&mut self, stage: Stage, result: &StageResult) {
        self.emit(WorkflowEvent::StageFinished {
            stage,
            result: *result,
        });
    }

    fn on_workflow_terminal(&mut self, outcome: &WorkflowOutcome) {
        self.emit(WorkflowEvent::WorkflowTerminal { outcome: *outcome });
    }
}
