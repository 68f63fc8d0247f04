//! Conversation identity and new-conversation detection

use std::sync::LazyLock;

use regex::Regex;

use crate::payload::ChatPayload;

/// Matches the `/c/<id>` path segment of the hosted chat page URL.
static URL_CONVERSATION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/c/([^/?#]+)").unwrap());

/// Extract a conversation id from a page URL path (`.../c/<id>`).
pub fn conversation_id_from_url(url: &str) -> Option<&str> {
    URL_CONVERSATION_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Tracks which conversation is active and whether exploration has run
/// for it.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    current_conversation_id: Option<String>,
    has_performed_exploration: bool,
    last_user_message_count: usize,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an outgoing payload and decide whether it starts a new
    /// conversation. Rules in order, first match wins:
    ///
    /// 1. exactly one user message;
    /// 2. an extractable conversation id differs from the stored one;
    /// 3. the user-message count shrank (conversation reset);
    /// 4. otherwise continuing.
    ///
    /// Bookkeeping happens regardless of the outcome: a newly seen id is
    /// stored, the message count is recorded, and a new conversation
    /// clears the exploration flag (exploration runs at most once per
    /// conversation).
    pub fn observe(&mut self, payload: &ChatPayload, page_url: Option<&str>) -> bool {
        let user_count = payload.user_message_count();
        let extracted = payload
            .conversation_id()
            .or_else(|| page_url.and_then(conversation_id_from_url))
            .map(str::to_string);

        let is_new = if user_count == 1 {
            true
        } else if let Some(id) = extracted.as_deref() {
            if self.current_conversation_id.as_deref() != Some(id) {
                true
            } else {
                user_count < self.last_user_message_count
            }
        } else {
            user_count < self.last_user_message_count
        };

        if extracted.is_some() && extracted != self.current_conversation_id {
            self.current_conversation_id = extracted;
        }
        self.last_user_message_count = user_count;
        if is_new {
            self.has_performed_exploration = false;
        }

        is_new
    }

    /// Reset per-conversation state; triggered by the completed signal.
    pub fn reset(&mut self) {
        self.has_performed_exploration = false;
        self.last_user_message_count = 0;
    }

    /// Record that exploration ran for the current conversation.
    pub fn mark_explored(&mut self) {
        self.has_performed_exploration = true;
    }

    pub fn has_performed_exploration(&self) -> bool {
        self.has_performed_exploration
    }

    pub fn current_conversation_id(&self) -> Option<&str> {
        self.current_conversation_id.as_deref()
    }

    pub fn last_user_message_count(&self) -> usize {
        self.last_user_message_count
    }
}
