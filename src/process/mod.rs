//! Subprocess layer.
//!
//! A [`ProcessRunner`] launches one external executable per call and hands
//! back a [`ProcessEvents`] stream: output chunks as they arrive, then
//! exactly one [`ProcessEvent::Finished`].

pub mod system;

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{FailureCode, OutputStream, StageResult};

// Re-export the tokio-backed runner
pub use system::SystemProcessRunner;

/// An executable and its arguments, launched once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    program: String,
    args: Vec<String>,
    shell: bool,
}

impl ProcessInvocation {
    /// Invoke `program` directly, without a shell
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            shell: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Resolve the program through the platform shell instead of exec-ing it
    pub fn with_shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn uses_shell(&self) -> bool {
        self.shell
    }

    /// The command line as a shell would read it, every word quoted as needed
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| quote_word(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[cfg(not(windows))]
fn quote_word(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(windows)]
fn quote_word(word: &str) -> String {
    if !word.is_empty() && !word.contains([' ', '\t', '"', '&', '|', '<', '>', '^']) {
        word.to_string()
    } else {
        format!("\"{}\"", word.replace('"', "\"\""))
    }
}

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Exited normally with this code
    Exited(i32),

    /// Ended without an exit code, usually killed by a signal
    Terminated { signal: Option<i32> },

    /// Never started (e.g. executable not on the search path)
    SpawnFailed(String),

    /// Stopped because the caller canceled it
    Canceled,
}

impl From<std::process::ExitStatus> for ProcessStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => ProcessStatus::Exited(code),
            None => ProcessStatus::Terminated {
                signal: signal_of(&status),
            },
        }
    }
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Everything a finished process produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status: ProcessStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    /// Outcome for a process that could not be started
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self {
            status: ProcessStatus::SpawnFailed(reason.into()),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    /// Exit code, absent when the process did not exit normally
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Started and exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    /// Reduce the outcome to a stage result
    pub fn stage_result(&self) -> StageResult {
        match &self.status {
            ProcessStatus::Exited(0) => StageResult::Success,
            ProcessStatus::Exited(code) => StageResult::Failed(FailureCode::Code(*code)),
            ProcessStatus::Terminated { signal } => {
                StageResult::Failed(FailureCode::Abnormal { signal: *signal })
            }
            ProcessStatus::SpawnFailed(_) => StageResult::SpawnFailed,
            ProcessStatus::Canceled => StageResult::Canceled,
        }
    }
}

/// One item of a process's event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Bytes read from one of the child's pipes
    Output { stream: OutputStream, bytes: Vec<u8> },

    /// The process is gone; always the last event
    Finished(ProcessOutcome),
}

/// Receiving end of a running process
///
/// Backed by an unbounded channel so the tasks draining the child's pipes
/// never wait on the consumer.
#[derive(Debug)]
pub struct ProcessEvents {
    receiver: mpsc::UnboundedReceiver<ProcessEvent>,
    finished: bool,
}

impl ProcessEvents {
    /// Create a stream and the sender that feeds it
    pub fn channel() -> (mpsc::UnboundedSender<ProcessEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            sender,
            Self {
                receiver,
                finished: false,
            },
        )
    }

    /// A stream holding only a terminal event
    pub fn finished(outcome: ProcessOutcome) -> Self {
        let (sender, events) = Self::channel();
        // The receiver is alive, so this cannot fail
        let _ = sender.send(ProcessEvent::Finished(outcome));
        events
    }

    /// Next event, or `None` once the terminal event has been returned
    ///
    /// If the producer goes away without reporting, a terminal event with an
    /// abnormal status is synthesized so callers always see one.
    pub async fn next(&mut self) -> Option<ProcessEvent> {
        if self.finished {
            return None;
        }

        match self.receiver.recv().await {
            Some(event) => {
                if matches!(event, ProcessEvent::Finished(_)) {
                    self.finished = true;
                }
                Some(event)
            }
            None => {
                self.finished = true;
                Some(ProcessEvent::Finished(ProcessOutcome {
                    status: ProcessStatus::Terminated { signal: None },
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                }))
            }
        }
    }

    /// Drain the stream, discarding chunks, and return the outcome
    pub async fn outcome(mut self) -> ProcessOutcome {
        while let Some(event) = self.next().await {
            if let ProcessEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        // `next` yields a terminal event before returning `None`
        ProcessOutcome {
            status: ProcessStatus::Terminated { signal: None },
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Launches subprocesses
pub trait ProcessRunner: Send + Sync {
    /// Start `invocation` and return its event stream
    ///
    /// Never fails: a launch failure is reported as a terminal
    /// [`ProcessStatus::SpawnFailed`] event. Canceling `cancel` stops the
    /// process and ends the stream with [`ProcessStatus::Canceled`].
    fn start(&self, invocation: &ProcessInvocation, cancel: CancellationToken) -> ProcessEvents;
}
