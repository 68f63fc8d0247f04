//! Pipeline progress events
//!
//! The pipeline emits typed events on a broadcast channel and lets the
//! embedder decide how to surface them.

use serde::{Deserialize, Serialize};

/// Events emitted by the interception pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterceptEvent {
    /// A chat-completion request was picked up
    RequestIntercepted { url: String },

    /// The project snapshot was refreshed
    ProjectInfoRefreshed { project_name: String },

    /// An exploration cycle was requested for a query
    ExplorationRequested { query: String },

    /// The host is building its index first
    IndexingStarted { message: String },

    /// An exploration session is running
    ExplorationStarted { session_id: String },

    /// A host-side tool ran during exploration
    ExplorationToolExecution { session_id: String, name: String },

    /// Exploration finished with a summary
    ExplorationComplete { session_id: String, chars: usize },

    /// Exploration (or indexing) hit its wait limit
    ExplorationTimedOut,

    /// The outgoing payload was mutated
    PayloadEnriched {
        system_prompt: bool,
        exploration_context: bool,
        info_block: bool,
    },

    /// A completed-conversation signal arrived; transient state was reset
    ConversationCompleted,

    /// Code fragments were extracted and forwarded to the IDE
    CodeExtracted { fragments: usize },

    /// A pipeline step degraded
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_tagged() {
        let event = InterceptEvent::PayloadEnriched {
            system_prompt: true,
            exploration_context: false,
            info_block: true,
        };
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "payload_enriched");
        assert_eq!(encoded["system_prompt"], true);
        assert_eq!(encoded["info_block"], true);
    }
}
