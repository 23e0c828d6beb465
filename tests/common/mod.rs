//! Shared helpers for workflow tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use rmc_run::core::{ConsentProvider, RecordingObserver, WorkflowObserver};
use rmc_run::domain::{OutputStream, Stage, StageResult, WorkflowEvent, WorkflowOutcome};
use rmc_run::process::{
    ProcessEvent, ProcessEvents, ProcessInvocation, ProcessOutcome, ProcessRunner, ProcessStatus,
};

/// What a scripted process does
#[derive(Debug, Clone)]
pub enum Reply {
    /// Write the chunks, then exit with the code
    Exit {
        output: Vec<(OutputStream, Vec<u8>)>,
        code: i32,
    },
    /// The executable does not exist
    NotFound,
    /// Write the chunks, then run until canceled
    Hang { output: Vec<(OutputStream, Vec<u8>)> },
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Exit {
            output: Vec::new(),
            code: 0,
        }
    }

    pub fn exit(code: i32) -> Self {
        Reply::Exit {
            output: Vec::new(),
            code,
        }
    }

    pub fn stdout(text: &str, code: i32) -> Self {
        Reply::Exit {
            output: vec![(OutputStream::Stdout, text.as_bytes().to_vec())],
            code,
        }
    }

    pub fn hang(text: &str) -> Self {
        Reply::Hang {
            output: vec![(OutputStream::Stdout, text.as_bytes().to_vec())],
        }
    }
}

/// In-memory runner answering by command-line prefix
///
/// Each prefix holds a queue of replies; the last reply repeats. Unknown
/// commands behave like a missing executable.
#[derive(Default)]
pub struct ScriptedRunner {
    replies: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<ProcessInvocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `reply` for commands starting with `prefix`
    pub fn on(self, prefix: &str, reply: Reply) -> Self {
        {
            let mut replies = self.replies.lock().unwrap();
            match replies.iter_mut().find(|(known, _)| known == prefix) {
                Some((_, queue)) => queue.push_back(reply),
                None => replies.push((prefix.to_string(), VecDeque::from([reply]))),
            }
        }
        self
    }

    /// Replace whatever is queued for `prefix` with `reply`
    pub fn set(self, prefix: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .retain(|(known, _)| known != prefix);
        self.on(prefix, reply)
    }

    /// A healthy environment: python and renzmc present, script prints `hello`
    pub fn healthy() -> Self {
        Self::new()
            .on("python --version", Reply::stdout("Python 3.12.1\n", 0))
            .on("pip show renzmc", Reply::stdout("Name: renzmc\n", 0))
            .on("renzmc", Reply::stdout("hello", 0))
    }

    pub fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of launches whose command line starts with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.command_line().starts_with(prefix))
            .count()
    }

    fn reply_for(&self, invocation: &ProcessInvocation) -> Reply {
        let line = invocation.command_line();
        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .iter_mut()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, queue)| queue);

        match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Reply::NotFound,
        }
    }
}

impl ProcessRunner for ScriptedRunner {
    fn start(&self, invocation: &ProcessInvocation, cancel: CancellationToken) -> ProcessEvents {
        self.calls.lock().unwrap().push(invocation.clone());

        let (sender, events) = ProcessEvents::channel();
        match self.reply_for(invocation) {
            Reply::NotFound => {
                return ProcessEvents::finished(ProcessOutcome::spawn_failed(format!(
                    "{}: not found",
                    invocation.program()
                )))
            }
            Reply::Exit { output, code } => {
                let mut outcome = ProcessOutcome {
                    status: ProcessStatus::Exited(code),
                    stdout: Vec::new(),
                    stderr: Vec::new(),
                };
                for (stream, bytes) in output {
                    match stream {
                        OutputStream::Stdout => outcome.stdout.extend_from_slice(&bytes),
                        OutputStream::Stderr => outcome.stderr.extend_from_slice(&bytes),
                    }
                    sender.send(ProcessEvent::Output { stream, bytes }).unwrap();
                }
                sender.send(ProcessEvent::Finished(outcome)).unwrap();
            }
            Reply::Hang { output } => {
                let mut stdout = Vec::new();
                for (stream, bytes) in output {
                    stdout.extend_from_slice(&bytes);
                    sender.send(ProcessEvent::Output { stream, bytes }).unwrap();
                }
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = sender.send(ProcessEvent::Finished(ProcessOutcome {
                        status: ProcessStatus::Canceled,
                        stdout,
                        stderr: Vec::new(),
                    }));
                });
            }
        }
        events
    }
}

/// Consent provider that records how often it was asked
pub struct CountingConsent {
    answer: bool,
    asked: Mutex<Vec<String>>,
}

impl CountingConsent {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsentProvider for CountingConsent {
    async fn request_install_consent(&self, package: &str) -> bool {
        self.asked.lock().unwrap().push(package.to_string());
        self.answer
    }
}

/// Consent provider that cancels the workflow and never answers
pub struct CancelingConsent {
    pub cancel: CancellationToken,
}

#[async_trait]
impl ConsentProvider for CancelingConsent {
    async fn request_install_consent(&self, _package: &str) -> bool {
        self.cancel.cancel();
        std::future::pending::<bool>().await
    }
}

/// Records events and cancels once `stage` produces output
pub struct CancelOnOutput {
    pub recorder: RecordingObserver,
    pub stage: Stage,
    pub cancel: CancellationToken,
}

impl WorkflowObserver for CancelOnOutput {
    fn on_stage_started(&mut self, stage: Stage) {
        self.recorder.on_stage_started(stage);
    }

    fn on_output(&mut self, stage: Stage, stream: OutputStream, bytes: &[u8]) {
        self.recorder.on_output(stage, stream, bytes);
        if stage == self.stage {
            self.cancel.cancel();
        }
    }

    fn on_stage_finished(&mut self, stage: Stage, result: &StageResult) {
        self.recorder.on_stage_finished(stage, result);
    }

    fn on_workflow_terminal(&mut self, outcome: &WorkflowOutcome) {
        self.recorder.on_workflow_terminal(outcome);
    }
}

/// Check the transcript ordering rules:
/// - every stage's events sit between its start and its finish
/// - stages never overlap
/// - exactly one terminal event, and it is last
pub fn assert_well_ordered(events: &[WorkflowEvent]) {
    let mut open: Option<Stage> = None;

    for (index, event) in events.iter().enumerate() {
        let is_last = index + 1 == events.len();
        match event {
            WorkflowEvent::StageStarted { stage } => {
                assert!(open.is_none(), "stage {} started while {:?} open", stage, open);
                open = Some(*stage);
            }
            WorkflowEvent::OutputChunk { stage, .. } => {
                assert_eq!(open, Some(*stage), "output outside its stage at {}", index);
            }
            WorkflowEvent::StageFinished { stage, .. } => {
                assert_eq!(open, Some(*stage), "finish without start at {}", index);
                open = None;
            }
            WorkflowEvent::WorkflowTerminal { .. } => {
                assert!(is_last, "terminal event is not last");
                assert!(open.is_none(), "terminal event inside a stage");
            }
        }
    }

    assert!(
        matches!(events.last(), Some(WorkflowEvent::WorkflowTerminal { .. })),
        "transcript has no terminal event"
    );
}
