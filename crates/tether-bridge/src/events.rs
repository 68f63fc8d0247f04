//! Host-pushed notification events
//!
//! The host notifies the page of indexing completion and exploration
//! progress. These arrive as a typed event stream instead of ad-hoc
//! callback invocations, so a waiter owns its own subscription rather
//! than patching shared handlers.

use crate::types::ExplorationRound;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

/// Events pushed by the IDE host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// Project indexing finished successfully
    IndexingComplete,

    /// Project indexing failed
    IndexingError { message: String },

    /// Progress on an exploration session
    ExplorationProgress {
        session_id: String,
        #[serde(flatten)]
        event: ProgressEvent,
    },
}

/// Progress events within one exploration session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A tool ran on the host
    ToolExecution { name: String },

    /// An exploration round finished
    RoundComplete { round: ExplorationRound },

    /// The session finished; the summary is the exploration output
    Complete { summary: Option<String> },
}

impl HostEvent {
    /// The session this event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            HostEvent::ExplorationProgress { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// A stream of host events backed by a broadcast subscription.
///
/// Lagged receivers yield `Err`; callers typically skip those entries.
pub type HostEventStream = BroadcastStream<HostEvent>;
