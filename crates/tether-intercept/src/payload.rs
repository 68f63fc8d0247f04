//! Chat-completion payload model and mutation
//!
//! The wire protocol is owned by the hosted chat app, not by us, so the
//! payload types keep every field they do not understand in flattened
//! maps. Mutation never drops or reorders entries it did not touch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// One entry of the payload's `messages` array.
///
/// `content` is either a plain string or an array of content parts;
/// both forms appear on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Create a system message with plain string content
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Value::String(text.into()),
            extra: Map::new(),
        }
    }

    /// Create a user message with plain string content
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Value::String(text.into()),
            extra: Map::new(),
        }
    }

    /// The message text, when content is a plain string or contains a
    /// text part.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Value::String(s) => Some(s),
            Value::Array(parts) => parts.iter().find_map(|p| {
                (p.get("type").and_then(Value::as_str) == Some("text"))
                    .then(|| p.get("text").and_then(Value::as_str))
                    .flatten()
            }),
            _ => None,
        }
    }

    /// Prepend text to the message content. Returns false when the
    /// content shape is not one we can safely modify.
    pub fn prepend_text(&mut self, prefix: &str) -> bool {
        match &mut self.content {
            Value::String(s) => {
                *s = format!("{}{}", prefix, s);
                true
            }
            Value::Array(parts) => {
                for part in parts.iter_mut() {
                    if part.get("type").and_then(Value::as_str) == Some("text") {
                        if let Some(Value::String(text)) = part.get_mut("text") {
                            *text = format!("{}{}", prefix, text);
                            return true;
                        }
                    }
                }
                false
            }
            _ => false,
        }
    }
}

/// The payload's `metadata` object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A parsed chat-completion request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatPayload {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PayloadMetadata>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatPayload {
    /// Parse a payload from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Serialize back to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Number of user-role messages
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == "user").count()
    }

    /// The conversation id, from the payload itself: top-level
    /// `conversation_id`, then `metadata.conversation_id`, then `chat_id`.
    pub fn conversation_id(&self) -> Option<&str> {
        if let Some(id) = self.extra.get("conversation_id").and_then(Value::as_str) {
            return Some(id);
        }
        if let Some(id) = self
            .metadata
            .as_ref()
            .and_then(|m| m.conversation_id.as_deref())
        {
            return Some(id);
        }
        self.extra.get("chat_id").and_then(Value::as_str)
    }

    /// The usage category / custom tool of this request, if any
    pub fn usage_category(&self) -> Option<&str> {
        self.usage
            .as_deref()
            .or_else(|| self.extra.get("custom_tool").and_then(Value::as_str))
    }

    /// The most recent user-role message
    pub fn last_user_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| m.role == "user")
    }

    /// Text of the most recent user-role message
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .and_then(|m| m.text())
    }

    /// Stamp the usage tag
    pub fn stamp_usage(&mut self, tag: &str) {
        self.usage = Some(tag.to_string());
    }

    /// Override the target model name
    pub fn override_model(&mut self, model: &str) {
        self.model = Some(model.to_string());
    }

    /// Inject a system message, replacing the content of an existing
    /// system message or inserting one at the front.
    pub fn set_system_prompt(&mut self, prompt: &str) {
        if let Some(existing) = self.messages.iter_mut().find(|m| m.role == "system") {
            existing.content = Value::String(prompt.to_string());
        } else {
            self.messages.insert(0, ChatMessage::system(prompt));
        }
    }
}

/// The request body in whatever representation the page used.
///
/// Mutation parses to JSON when possible and re-serializes into the
/// same representation; bodies that do not parse pass through untouched.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl RequestBody {
    /// Try to view the body as parsed JSON
    pub fn parse_json(&self) -> Option<Value> {
        match self {
            RequestBody::Json(v) => Some(v.clone()),
            RequestBody::Text(s) => serde_json::from_str(s).ok(),
            RequestBody::Bytes(b) => serde_json::from_slice(b).ok(),
        }
    }

    /// Re-serialize a mutated value into this body's representation
    pub fn reserialize(&self, value: &Value) -> RequestBody {
        match self {
            RequestBody::Json(_) => RequestBody::Json(value.clone()),
            RequestBody::Text(_) => RequestBody::Text(value.to_string()),
            RequestBody::Bytes(_) => RequestBody::Bytes(value.to_string().into_bytes()),
        }
    }

    /// The body as bytes, for forwarding upstream
    pub fn as_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Json(v) => v.to_string().into_bytes(),
            RequestBody::Text(s) => s.clone().into_bytes(),
            RequestBody::Bytes(b) => b.clone(),
        }
    }
}
