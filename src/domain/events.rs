//! Events emitted while a workflow runs.
//!
//! The host renders these as a live transcript. Within one stage, output
//! chunks from the same stream keep their arrival order; stdout and stderr
//! may interleave arbitrarily.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::outcome::{StageResult, WorkflowOutcome};

/// A step of the workflow that is reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Version query of the runtime interpreter
    ProbeRuntime,

    /// Package-info query for the companion package
    ProbePackage,

    /// Waiting for the host to allow an install
    Consent,

    /// Package manager install
    Install,

    /// The script itself, via the launcher
    Execute,
}

impl Stage {
    /// Stable lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ProbeRuntime => "probe_runtime",
            Stage::ProbePackage => "probe_package",
            Stage::Consent => "consent",
            Stage::Install => "install",
            Stage::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pipe a chunk of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single notification in the workflow transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A stage has begun
    StageStarted { stage: Stage },

    /// Raw bytes produced by the stage's subprocess
    OutputChunk {
        stage: Stage,
        stream: OutputStream,
        #[serde(rename = "text", serialize_with = "serialize_lossy")]
        bytes: Vec<u8>,
    },

    /// A stage has ended with the given result
    StageFinished { stage: Stage, result: StageResult },

    /// The workflow reached its terminal outcome (always the last event)
    WorkflowTerminal { outcome: WorkflowOutcome },
}

fn serialize_lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// A timestamped event, as written to the JSON transcript
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// The run this event belongs to
    pub run_id: Uuid,

    /// When the event was observed
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl EventRecord {
    /// Stamp an event with the current time
    pub fn new(run_id: Uuid, event: WorkflowEvent) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            event,
        }
    }
}
