//! Wire types for the IDE host bridge
//!
//! Every request is `{action, data}`; every reply is `{success, ...,
//! error?}`. Replies are decoded once into the typed shapes below rather
//! than being shape-sniffed at each call site.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions understood by the IDE host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetProjectInfo,
    StartExploration,
    GetExplorationStatus,
    GetExplorationContext,
    ProjectIndexStatus,
    IndexProject,
    GetToolServers,
    ShowCodeDiffAndReplace,
    CodeCompleted,
    ContentUpdated,
    NotifyChatResponse,
    GetButtonStates,
    SetProjectIndexEnabled,
    GetFileDiff,
    OpenFileDiffInIde,
    FilesSelectedForCommit,
    FilesSelectedForCommitAndPush,
}

impl Action {
    /// The wire name of this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetProjectInfo => "getProjectInfo",
            Action::StartExploration => "startExploration",
            Action::GetExplorationStatus => "getExplorationStatus",
            Action::GetExplorationContext => "getExplorationContext",
            Action::ProjectIndexStatus => "projectIndexStatus",
            Action::IndexProject => "indexProject",
            Action::GetToolServers => "getToolServers",
            Action::ShowCodeDiffAndReplace => "showCodeDiffAndReplace",
            Action::CodeCompleted => "codeCompleted",
            Action::ContentUpdated => "contentUpdated",
            Action::NotifyChatResponse => "notifyChatResponse",
            Action::GetButtonStates => "getButtonStates",
            Action::SetProjectIndexEnabled => "setProjectIndexEnabled",
            Action::GetFileDiff => "getFileDiff",
            Action::OpenFileDiffInIde => "openFileDiffInIDE",
            Action::FilesSelectedForCommit => "filesSelectedForCommit",
            Action::FilesSelectedForCommitAndPush => "filesSelectedForCommitAndPush",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request envelope sent to the host
#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest {
    pub action: &'static str,
    pub data: Value,
}

impl BridgeRequest {
    pub fn new(action: Action, data: Value) -> Self {
        Self {
            action: action.as_str(),
            data,
        }
    }
}

/// The raw reply envelope from the host
#[derive(Debug, Clone, Deserialize)]
pub struct RawReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl RawReply {
    /// Decode a reply `Value` into `T` after checking the success flag.
    ///
    /// `success: false` becomes [`Error::Host`]; field mismatches become
    /// [`Error::UnexpectedReply`].
    pub fn decode<T: serde::de::DeserializeOwned>(action: Action, reply: Value) -> Result<T> {
        let envelope: RawReply = serde_json::from_value(reply.clone())?;
        if !envelope.success {
            return Err(Error::host(
                action.as_str(),
                envelope.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        serde_json::from_value(reply).map_err(|e| Error::UnexpectedReply {
            action: action.as_str().into(),
            detail: e.to_string(),
        })
    }

    /// Check the success flag of a reply that carries no payload fields.
    pub fn check(action: Action, reply: Value) -> Result<()> {
        let envelope: RawReply = serde_json::from_value(reply)?;
        if envelope.success {
            Ok(())
        } else {
            Err(Error::host(
                action.as_str(),
                envelope.error.unwrap_or_else(|| "unknown error".into()),
            ))
        }
    }
}

/// Project/file context snapshot owned by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectInfoSnapshot {
    pub project_name: String,
    pub project_file_path: String,
    pub current_open_file: String,
    pub code_context: String,
}

/// Outcome of `startExploration`.
///
/// The host replies in one of three shapes; this enum is the single
/// tagged decoding of all of them.
#[derive(Debug, Clone, PartialEq)]
pub enum StartExploration {
    /// A session was created and progress events will follow
    Started { session_id: String },
    /// The project must be indexed first; wait for an indexing signal
    IndexingRequired { message: String },
    /// The host declined to explore
    Failed { message: String },
}

impl StartExploration {
    /// Classify a raw `startExploration` reply.
    pub fn from_reply(reply: Value) -> Result<Self> {
        let envelope: RawReply = serde_json::from_value(reply.clone())?;
        if let Some(session_id) = reply.get("sessionId").and_then(Value::as_str) {
            if envelope.success {
                return Ok(StartExploration::Started {
                    session_id: session_id.to_string(),
                });
            }
        }
        if reply.get("indexing").and_then(Value::as_bool) == Some(true) {
            let message = reply
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Building code index")
                .to_string();
            return Ok(StartExploration::IndexingRequired { message });
        }
        Ok(StartExploration::Failed {
            message: envelope
                .error
                .unwrap_or_else(|| "exploration not started".into()),
        })
    }
}

/// One round of an exploration session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorationRound {
    pub name: String,
    pub tool_executions: Vec<Value>,
}

/// Snapshot of an exploration session's progress
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorationStatus {
    pub completed: bool,
    pub query: String,
    pub rounds: Vec<ExplorationRound>,
    pub tool_executions: Vec<Value>,
    pub result: Option<ExplorationResult>,
}

/// Final result of an exploration session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplorationResult {
    pub summary: Option<String>,
}

/// Exploration context previously stored for a conversation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContext {
    pub context: String,
    #[serde(default)]
    pub query: Option<String>,
    /// Host-side creation time (RFC 3339)
    #[serde(default)]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// A code fragment pushed to the IDE (`codeCompleted` /
/// `showCodeDiffAndReplace`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSubmission {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Editor location the fragment should replace, when one was armed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_target: Option<String>,
}

/// Result of a `projectIndexStatus` query
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexStatus {
    pub is_indexed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(Action::GetProjectInfo.as_str(), "getProjectInfo");
        assert_eq!(Action::OpenFileDiffInIde.as_str(), "openFileDiffInIDE");
        assert_eq!(
            Action::FilesSelectedForCommitAndPush.as_str(),
            "filesSelectedForCommitAndPush"
        );
    }

    #[test]
    fn test_request_envelope_shape() {
        let req = BridgeRequest::new(Action::GetProjectInfo, json!({"x": 1}));
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded["action"], "getProjectInfo");
        assert_eq!(encoded["data"]["x"], 1);
    }

    #[test]
    fn test_decode_project_info() {
        let reply = json!({
            "success": true,
            "projectName": "demo",
            "projectFilePath": "/work/demo",
            "currentOpenFile": "src/main.rs",
            "codeContext": "fn main() {}"
        });
        let info: ProjectInfoSnapshot =
            RawReply::decode(Action::GetProjectInfo, reply).unwrap();
        assert_eq!(info.project_name, "demo");
        assert_eq!(info.current_open_file, "src/main.rs");
    }

    #[test]
    fn test_decode_failure_is_host_error() {
        let reply = json!({"success": false, "error": "no project open"});
        let err = RawReply::decode::<ProjectInfoSnapshot>(Action::GetProjectInfo, reply)
            .unwrap_err();
        assert!(err.is_host_rejection());
        assert!(err.to_string().contains("no project open"));
    }

    #[test]
    fn test_decode_failure_without_message() {
        let reply = json!({"success": false});
        let err = RawReply::check(Action::ContentUpdated, reply).unwrap_err();
        assert!(err.to_string().contains("unknown error"));
    }

    #[test]
    fn test_start_exploration_started() {
        let reply = json!({"success": true, "sessionId": "abc-123"});
        assert_eq!(
            StartExploration::from_reply(reply).unwrap(),
            StartExploration::Started {
                session_id: "abc-123".into()
            }
        );
    }

    #[test]
    fn test_start_exploration_indexing() {
        let reply = json!({
            "success": false,
            "indexing": true,
            "message": "Building index"
        });
        assert_eq!(
            StartExploration::from_reply(reply).unwrap(),
            StartExploration::IndexingRequired {
                message: "Building index".into()
            }
        );
    }

    #[test]
    fn test_start_exploration_indexing_with_success_flag() {
        // Some host versions flag the indexing reply as a success.
        let reply = json!({
            "success": true,
            "indexing": true,
            "message": "Building index"
        });
        assert_eq!(
            StartExploration::from_reply(reply).unwrap(),
            StartExploration::IndexingRequired {
                message: "Building index".into()
            }
        );
    }

    #[test]
    fn test_start_exploration_indexing_default_message() {
        let reply = json!({"success": false, "indexing": true});
        match StartExploration::from_reply(reply).unwrap() {
            StartExploration::IndexingRequired { message } => {
                assert!(!message.is_empty());
            }
            other => panic!("expected IndexingRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_start_exploration_failed() {
        let reply = json!({"success": false, "error": "agent unavailable"});
        assert_eq!(
            StartExploration::from_reply(reply).unwrap(),
            StartExploration::Failed {
                message: "agent unavailable".into()
            }
        );
    }

    #[test]
    fn test_exploration_status_defaults() {
        let reply = json!({"success": true, "completed": false, "query": "auth flow"});
        let status: ExplorationStatus =
            RawReply::decode(Action::GetExplorationStatus, reply).unwrap();
        assert!(!status.completed);
        assert_eq!(status.query, "auth flow");
        assert!(status.rounds.is_empty());
        assert!(status.result.is_none());
    }

    #[test]
    fn test_stored_context_timestamp_parses() {
        let reply = json!({
            "success": true,
            "context": "summary text",
            "query": "how does login work",
            "timestamp": "2025-03-01T10:00:00Z"
        });
        let ctx: StoredContext =
            RawReply::decode(Action::GetExplorationContext, reply).unwrap();
        assert_eq!(ctx.context, "summary text");
        assert!(ctx.timestamp.is_some());
    }
}
