//! Progress events emitted by the Generation Orchestrator. Events for a
//! single job are totally ordered: `started` < (`progress`)* <
//! (`completed`|`failed`|`cancelled`).

use serde::{Deserialize, Serialize};

use crate::error::ErrorDiagnostic;
use crate::model::OutputDescriptor;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GenerationEvent {
    Started {
        job_id: String,
    },
    Progress {
        job_id: String,
        step: String,
        fraction: f32,
    },
    Completed {
        job_id: String,
        output: OutputDescriptor,
    },
    Failed {
        job_id: String,
        error: ErrorDiagnostic,
    },
    Cancelled {
        job_id: String,
    },
}

impl GenerationEvent {
    pub fn job_id(&self) -> &str {
        match self {
            GenerationEvent::Started { job_id }
            | GenerationEvent::Progress { job_id, .. }
            | GenerationEvent::Completed { job_id, .. }
            | GenerationEvent::Failed { job_id, .. }
            | GenerationEvent::Cancelled { job_id } => job_id,
        }
    }
}

/// Per-job broadcast channel. A fresh one is created per job so that
/// subscribers of one job never observe another job's events, matching the
/// "no cross-job ordering guarantee, key by jobId" rule.
pub fn channel(capacity: usize) -> (tokio::sync::broadcast::Sender<GenerationEvent>, tokio::sync::broadcast::Receiver<GenerationEvent>) {
    tokio::sync::broadcast::channel(capacity)
}
