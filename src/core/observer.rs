//! Seams between the workflow and its host: progress observation and
//! install consent.

use async_trait::async_trait;

use crate::domain::{OutputStream, Stage, StageResult, WorkflowEvent, WorkflowOutcome};

/// Receives workflow progress as it happens
///
/// Calls arrive in order from the task driving the workflow. Every method
/// has an empty default so hosts implement only what they render.
pub trait WorkflowObserver: Send {
    fn on_stage_started(&mut self, _stage: Stage) {}

    /// Raw subprocess bytes, forwarded unmodified
    fn on_output(&mut self, _stage: Stage, _stream: OutputStream, _bytes: &[u8]) {}

    fn on_stage_finished(&mut self, _stage: Stage, _result: &StageResult) {}

    /// Called exactly once, after everything else
    fn on_workflow_terminal(&mut self, _outcome: &WorkflowOutcome) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl WorkflowObserver for NullObserver {}

/// Observer that keeps every event in order
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Vec<WorkflowEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<WorkflowEvent> {
        self.events
    }

    /// Stages in the order they started
    pub fn stages_started(&self) -> Vec<Stage> {
        self.events
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::StageStarted { stage } => Some(*stage),
                _ => None,
            })
            .collect()
    }

    /// All bytes one stage wrote to one stream
    pub fn output(&self, wanted_stage: Stage, wanted_stream: OutputStream) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::OutputChunk {
                    stage,
                    stream,
                    bytes,
                } if *stage == wanted_stage && *stream == wanted_stream => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// The terminal outcome, if the workflow has finished
    pub fn outcome(&self) -> Option<WorkflowOutcome> {
        self.events.iter().rev().find_map(|event| match event {
            WorkflowEvent::WorkflowTerminal { outcome } => Some(*outcome),
            _ => None,
        })
    }
}

impl WorkflowObserver for RecordingObserver {
    fn on_stage_started(&mut self, stage: Stage) {
        self.events.push(WorkflowEvent::StageStarted { stage });
    }

    fn on_output(&mut self, stage: Stage, stream: OutputStream, bytes: &[u8]) {
        self.events.push(WorkflowEvent::OutputChunk {
            stage,
            stream,
            bytes: bytes.to_vec(),
        });
    }

    fn on_stage_finished(&mut self, stage: Stage, result: &StageResult) {
        self.events.push(WorkflowEvent::StageFinished {
            stage,
            result: *result,
        });
    }

    fn on_workflow_terminal(&mut self, outcome: &WorkflowOutcome) {
        self.events
            .push(WorkflowEvent::WorkflowTerminal { outcome: *outcome });
    }
}

/// Decides whether a missing package may be installed
#[async_trait]
pub trait ConsentProvider: Send + Sync {
    /// `false` ends the workflow quietly; it is not an error
    async fn request_install_consent(&self, package: &str) -> bool;
}

/// Installs without asking
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConsent;

#[async_trait]
impl ConsentProvider for AlwaysConsent {
    async fn request_install_consent(&self, _package: &str) -> bool {
        true
    }
}

/// Never installs
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverConsent;

#[async_trait]
impl ConsentProvider for NeverConsent {
    async fn request_install_consent(&self, _package: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_keeps_order() {
        let mut observer = RecordingObserver::new();
        observer.on_stage_started(Stage::Execute);
        observer.on_output(Stage::Execute, OutputStream::Stdout, b"hel");
        observer.on_output(Stage::Execute, OutputStream::Stderr, b"warn");
        observer.on_output(Stage::Execute, OutputStream::Stdout, b"lo");
        observer.on_stage_finished(Stage::Execute, &StageResult::Success);
        observer.on_workflow_terminal(&WorkflowOutcome::Succeeded);

        assert_eq!(observer.events().len(), 6);
        assert_eq!(observer.stages_started(), vec![Stage::Execute]);
        assert_eq!(observer.output(Stage::Execute, OutputStream::Stdout), b"hello");
        assert_eq!(observer.output(Stage::Execute, OutputStream::Stderr), b"warn");
        assert_eq!(observer.outcome(), Some(WorkflowOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_fixed_consent_providers() {
        assert!(AlwaysConsent.request_install_consent("renzmc").await);
        assert!(!NeverConsent.request_install_consent("renzmc").await);
    }
}
