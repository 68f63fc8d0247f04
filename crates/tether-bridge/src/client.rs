//! Bridge trait and the HTTP implementation
//!
//! The host exposes a single call primitive; everything else is layered
//! on top of it. [`Bridge`] is the seam mocked in tests, [`HttpBridge`]
//! is the production implementation talking to the host's local RPC
//! endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    events::HostEvent,
    types::{
        Action, BridgeRequest, CodeSubmission, ExplorationStatus, IndexStatus,
        ProjectInfoSnapshot, RawReply, StartExploration, StoredContext,
    },
};

/// Prefix marking a chunked frame. Frames are
/// `__CHUNK__<id>|<index>|<total>|<data>` and are reassembled by the host.
pub const CHUNK_PREFIX: &str = "__CHUNK__";

/// Default maximum serialized request size before chunking kicks in.
/// The embedded browser's message pipe rejects larger single messages.
pub const DEFAULT_CHUNK_LIMIT: usize = 512 * 1024;

const EVENT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// The host-call primitive plus the notification stream.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Send `{action, data}` to the host and return the raw reply.
    ///
    /// Rejection means "host unavailable"; callers degrade (skip
    /// enrichment) rather than failing the user's request.
    async fn call(&self, action: Action, data: Value) -> Result<Value>;

    /// Subscribe to host-pushed notifications.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
}

/// Typed operations over any [`Bridge`].
#[async_trait]
pub trait BridgeExt: Bridge {
    /// Fetch the current project/file snapshot.
    async fn project_info(&self) -> Result<ProjectInfoSnapshot> {
        let reply = self.call(Action::GetProjectInfo, json!({})).await?;
        RawReply::decode(Action::GetProjectInfo, reply)
    }

    /// Start an exploration session for a query.
    async fn start_exploration(
        &self,
        query: &str,
        conversation_id: Option<&str>,
    ) -> Result<StartExploration> {
        let reply = self
            .call(
                Action::StartExploration,
                json!({ "query": query, "conversationId": conversation_id }),
            )
            .await?;
        StartExploration::from_reply(reply)
    }

    /// Fetch the progress snapshot of a session.
    async fn exploration_status(&self, session_id: &str) -> Result<ExplorationStatus> {
        let reply = self
            .call(Action::GetExplorationStatus, json!({ "sessionId": session_id }))
            .await?;
        RawReply::decode(Action::GetExplorationStatus, reply)
    }

    /// Fetch exploration context previously stored for a conversation.
    ///
    /// A host rejection means "nothing stored" and maps to `Ok(None)`;
    /// only transport failures surface as errors.
    async fn exploration_context(
        &self,
        conversation_id: &str,
    ) -> Result<Option<StoredContext>> {
        let reply = self
            .call(
                Action::GetExplorationContext,
                json!({ "conversationId": conversation_id }),
            )
            .await?;
        match RawReply::decode::<StoredContext>(Action::GetExplorationContext, reply) {
            Ok(ctx) => Ok(Some(ctx)),
            Err(e) if e.is_host_rejection() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Query whether the project index exists.
    async fn index_status(&self) -> Result<IndexStatus> {
        let reply = self.call(Action::ProjectIndexStatus, json!({})).await?;
        RawReply::decode(Action::ProjectIndexStatus, reply)
    }

    /// Ask the host to (re)build the project index.
    async fn index_project(&self) -> Result<()> {
        let reply = self.call(Action::IndexProject, json!({})).await?;
        RawReply::check(Action::IndexProject, reply)
    }

    /// Toggle host-side project indexing.
    async fn set_project_index_enabled(&self, enabled: bool) -> Result<()> {
        let reply = self
            .call(Action::SetProjectIndexEnabled, json!({ "enabled": enabled }))
            .await?;
        RawReply::check(Action::SetProjectIndexEnabled, reply)
    }

    /// Report a page navigation / content change.
    async fn content_updated(&self, url: &str) -> Result<()> {
        let reply = self
            .call(Action::ContentUpdated, json!({ "url": url }))
            .await?;
        RawReply::check(Action::ContentUpdated, reply)
    }

    /// Forward an extracted code fragment to the IDE.
    async fn code_completed(&self, submission: &CodeSubmission) -> Result<()> {
        let reply = self
            .call(Action::CodeCompleted, serde_json::to_value(submission)?)
            .await?;
        RawReply::check(Action::CodeCompleted, reply)
    }

    /// Open the diff-and-replace flow in the IDE for a fragment.
    async fn show_code_diff_and_replace(&self, submission: &CodeSubmission) -> Result<()> {
        let reply = self
            .call(
                Action::ShowCodeDiffAndReplace,
                serde_json::to_value(submission)?,
            )
            .await?;
        RawReply::check(Action::ShowCodeDiffAndReplace, reply)
    }

    /// Forward the latest assistant message to the IDE.
    async fn notify_chat_response(&self, response: &str) -> Result<()> {
        let reply = self
            .call(Action::NotifyChatResponse, json!({ "response": response }))
            .await?;
        RawReply::check(Action::NotifyChatResponse, reply)
    }
}

impl<B: Bridge + ?Sized> BridgeExt for B {}

/// HTTP implementation of [`Bridge`].
///
/// Calls POST to `{base}/rpc`; notifications arrive over SSE from
/// `{base}/events` and fan out through a broadcast channel.
pub struct HttpBridge {
    base_url: String,
    client: reqwest::Client,
    events_tx: broadcast::Sender<HostEvent>,
    chunk_limit: usize,
}

impl HttpBridge {
    /// Create a bridge client for a host RPC endpoint.
    pub fn new(base_url: impl Into<String>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            events_tx,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
        }
    }

    /// Override the chunking threshold.
    pub fn with_chunk_limit(mut self, limit: usize) -> Self {
        self.chunk_limit = limit.max(1);
        self
    }

    /// The host RPC base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Spawn the SSE listener feeding the notification channel.
    ///
    /// Reconnects with a fixed delay until cancelled.
    pub fn spawn_event_listener(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let url = format!("{}/events", self.base_url);
        let client = self.client.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }

                let mut source = match EventSource::new(client.get(&url)) {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::warn!("cannot open host event stream: {}", e);
                        return;
                    }
                };

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            source.close();
                            return;
                        }
                        event = source.next() => match event {
                            Some(Ok(Event::Open)) => {
                                tracing::debug!("host event stream connected");
                            }
                            Some(Ok(Event::Message(msg))) => {
                                match serde_json::from_str::<HostEvent>(&msg.data) {
                                    Ok(host_event) => {
                                        let _ = tx.send(host_event);
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            "ignoring malformed host event: {}",
                                            e
                                        );
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                tracing::debug!("host event stream error: {}", e);
                                source.close();
                                break;
                            }
                            None => break,
                        }
                    }
                }

                tokio::time::sleep(EVENT_RECONNECT_DELAY).await;
            }
        })
    }

    async fn post_single(&self, encoded: String) -> Result<Value> {
        let url = format!("{}/rpc", self.base_url);
        let reply = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(encoded)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(reply)
    }

    async fn post_chunked(&self, encoded: &str) -> Result<Value> {
        let url = format!("{}/rpc", self.base_url);
        let chunks = split_chunks(encoded, self.chunk_limit);
        let total = chunks.len();
        let id = uuid::Uuid::new_v4();

        for (index, part) in chunks.iter().enumerate() {
            let frame = format!("{}{}|{}|{}|{}", CHUNK_PREFIX, id, index, total, part);
            let reply = self
                .client
                .post(&url)
                .header("content-type", "text/plain")
                .body(frame)
                .send()
                .await?
                .error_for_status()?
                .json::<Value>()
                .await?;

            if index + 1 == total {
                return Ok(reply);
            }

            // Intermediate frames get a plain ack.
            let ack: RawReply = serde_json::from_value(reply)?;
            if !ack.success {
                return Err(Error::ChunkRejected {
                    index,
                    total,
                    message: ack.error.unwrap_or_else(|| "chunk rejected".into()),
                });
            }
        }

        unreachable!("split_chunks returns at least one chunk")
    }
}

#[async_trait]
impl Bridge for HttpBridge {
    async fn call(&self, action: Action, data: Value) -> Result<Value> {
        let request = BridgeRequest::new(action, data);
        let encoded = serde_json::to_string(&request)?;
        tracing::debug!(action = %action, bytes = encoded.len(), "bridge call");

        if encoded.len() <= self.chunk_limit {
            self.post_single(encoded).await
        } else {
            self.post_chunked(&encoded).await
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events_tx.subscribe()
    }
}

/// Split a payload into chunks of at most `limit` bytes, never cutting
/// through a UTF-8 code point.
fn split_chunks(payload: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = payload;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        // A limit smaller than one code point still has to make progress.
        if cut == 0 {
            cut = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}
