//! Process runner backed by `tokio::process`.
//!
//! Each child gets its own process group on Unix so cancellation can take
//! down anything it spawned (e.g. pip's build backends) along with it.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::OutputStream;

use super::{ProcessEvent, ProcessEvents, ProcessInvocation, ProcessOutcome, ProcessRunner, ProcessStatus};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Runner that launches real OS processes
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    /// How long a canceled process gets between SIGTERM and SIGKILL
    termination_grace: Duration,
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessRunner {
    /// Create a runner with the default 2 second termination grace
    pub fn new() -> Self {
        Self {
            termination_grace: Duration::from_millis(2000),
        }
    }

    /// Set how long a canceled process may take to exit before it is killed
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    pub fn termination_grace(&self) -> Duration {
        self.termination_grace
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn start(&self, invocation: &ProcessInvocation, cancel: CancellationToken) -> ProcessEvents {
        let mut command = build_command(invocation);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!(command = %invocation, shell = invocation.uses_shell(), "Spawning process");

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(program = invocation.program(), error = %e, "Failed to spawn process");
                return ProcessEvents::finished(ProcessOutcome::spawn_failed(format!(
                    "{}: {}",
                    invocation.program(),
                    e
                )));
            }
        };

        let (sender, events) = ProcessEvents::channel();
        tokio::spawn(supervise(
            child,
            sender,
            cancel,
            self.termination_grace,
            invocation.to_string(),
        ));
        events
    }
}

/// Build the `tokio::process::Command` for an invocation
fn build_command(invocation: &ProcessInvocation) -> Command {
    if invocation.uses_shell() {
        let line = invocation.command_line();
        #[cfg(windows)]
        let mut command = {
            let mut command = Command::new("cmd");
            command.arg("/C");
            command
        };
        #[cfg(not(windows))]
        let mut command = {
            let mut command = Command::new("sh");
            command.arg("-c");
            command
        };
        command.arg(line);
        command
    } else {
        let mut command = Command::new(invocation.program());
        command.args(invocation.arguments());
        command
    }
}

/// Wait for the child (or cancellation), then report the outcome once both
/// pipes are drained
async fn supervise(
    mut child: Child,
    sender: UnboundedSender<ProcessEvent>,
    cancel: CancellationToken,
    grace: Duration,
    label: String,
) {
    let pid = child.id();
    let stop = CancellationToken::new();
    let stdout = child.stdout.take().map(|pipe| {
        tokio::spawn(pump(pipe, OutputStream::Stdout, sender.clone(), stop.clone()))
    });
    let stderr = child.stderr.take().map(|pipe| {
        tokio::spawn(pump(pipe, OutputStream::Stderr, sender.clone(), stop.clone()))
    });
    let drain = async move { (join_pump(stdout).await, join_pump(stderr).await) };
    tokio::pin!(drain);

    let mut status = tokio::select! {
        result = child.wait() => match result {
            Ok(status) => ProcessStatus::from(status),
            Err(e) => {
                warn!(command = %label, error = %e, "Failed to wait for process");
                ProcessStatus::Terminated { signal: None }
            }
        },
        _ = cancel.cancelled() => {
            debug!(command = %label, "Canceling process");
            terminate(&mut child, grace).await;
            ProcessStatus::Canceled
        }
    };

    let (stdout, stderr) = if status == ProcessStatus::Canceled {
        // A detached grandchild may still hold a pipe open
        drain_within(drain.as_mut(), &stop, grace).await
    } else {
        // The child is gone but its pipes stay open while anything it left
        // behind still holds them
        tokio::select! {
            biased;
            output = &mut drain => output,
            _ = cancel.cancelled() => {
                debug!(command = %label, "Canceling processes left holding the pipes");
                status = ProcessStatus::Canceled;
                signal_leftovers(pid, false);
                let output = drain_within(drain.as_mut(), &stop, grace).await;
                signal_leftovers(pid, true);
                output
            }
        }
    };

    debug!(command = %label, ?status, "Process finished");

    let _ = sender.send(ProcessEvent::Finished(ProcessOutcome {
        status,
        stdout,
        stderr,
    }));
}

/// Forward a pipe's bytes as they arrive, returning everything read
///
/// Stops early, keeping what was read, once `stop` fires.
async fn pump<R>(
    mut pipe: R,
    stream: OutputStream,
    sender: UnboundedSender<ProcessEvent>,
    stop: CancellationToken,
) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut buffer = vec![0u8; READ_CHUNK_BYTES];

    loop {
        let read = tokio::select! {
            read = pipe.read(&mut buffer) => read,
            _ = stop.cancelled() => break,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                collected.extend_from_slice(&buffer[..n]);
                // Keep draining even if nobody is listening any more
                let _ = sender.send(ProcessEvent::Output {
                    stream,
                    bytes: buffer[..n].to_vec(),
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(?stream, error = %e, "Pipe read failed");
                break;
            }
        }
    }

    collected
}

async fn join_pump(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Finish draining, stopping the pumps if the pipes are still open after `grace`
async fn drain_within<F>(
    mut drain: Pin<&mut F>,
    stop: &CancellationToken,
    grace: Duration,
) -> (Vec<u8>, Vec<u8>)
where
    F: Future<Output = (Vec<u8>, Vec<u8>)>,
{
    tokio::select! {
        output = drain.as_mut() => output,
        _ = tokio::time::sleep(grace) => {
            stop.cancel();
            drain.await
        }
    }
}

/// Signal whatever is left of an exited child's process group
fn signal_leftovers(pid: Option<u32>, force: bool) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            signal_group(pid, if force { libc::SIGKILL } else { libc::SIGTERM });
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, force);
}

/// Stop a child and everything in its process group
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            signal_group(pid, libc::SIGTERM);
            if tokio::time::timeout(grace, child.wait()).await.is_err() {
                debug!(pid, "Process ignored SIGTERM");
            }
            signal_group(pid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.kill().await;
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; the child was spawned
    // with process_group(0), so its pid is also its group id.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc != 0 {
        debug!(pid, signal, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}
