//! Request interception and enrichment
//!
//! Wraps the page's network-fetch primitive. Matching chat-completion
//! requests are enriched with project context before they leave;
//! completed-conversation responses are mined for code on the way back.
//! Every step is best-effort: a failure anywhere falls back to the
//! original, unmodified request or response.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tether_bridge::{Bridge, BridgeExt, CodeSubmission};

use crate::{
    config::{Enrichment, InterceptConfig},
    error::Result,
    events::InterceptEvent,
    exploration::{ExplorationOrchestrator, Phase},
    extract::CodeExtractor,
    payload::{ChatPayload, RequestBody},
    project,
    session::SessionContext,
};

/// An outgoing request in whatever shape the page produced it
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl UpstreamRequest {
    /// A POST request, the shape every chat-completion call takes
    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            headers: Vec::new(),
            body,
        }
    }
}

/// The resolved upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// Final URL (after redirects); drives completed-conversation detection
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// The real network-fetch function the interceptor delegates to
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn forward(&self, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// `reqwest`-backed upstream
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpUpstream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let mut builder = match request.method.as_str() {
            "GET" => self.client.get(&request.url),
            _ => self.client.post(&request.url),
        };

        let mut has_content_type = false;
        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            builder = builder.header(name, value);
        }
        if !has_content_type {
            builder = builder.header("content-type", "application/json");
        }

        let response = builder.body(request.body.as_bytes()).send().await?;
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(UpstreamResponse { url, status, body })
    }
}

/// The interception pipeline.
///
/// One instance per page session; independent requests may interleave,
/// per-request steps run strictly in order.
pub struct Interceptor {
    config: InterceptConfig,
    bridge: Arc<dyn Bridge>,
    upstream: Arc<dyn Upstream>,
    session: Arc<SessionContext>,
    orchestrator: ExplorationOrchestrator,
    extractor: CodeExtractor,
    event_tx: broadcast::Sender<InterceptEvent>,
    cancel: Mutex<CancellationToken>,
}

impl Interceptor {
    pub fn new(
        config: InterceptConfig,
        bridge: Arc<dyn Bridge>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let orchestrator =
            ExplorationOrchestrator::new(config.exploration.clone(), event_tx.clone());
        let extractor = CodeExtractor::new(config.extraction_fallback_delay);
        Self {
            config,
            bridge,
            upstream,
            session: Arc::new(SessionContext::new()),
            orchestrator,
            extractor,
            event_tx,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Subscribe to pipeline progress events
    pub fn subscribe(&self) -> broadcast::Receiver<InterceptEvent> {
        self.event_tx.subscribe()
    }

    /// The per-page session state
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Phase of the exploration attempt currently in flight
    pub fn exploration_phase(&self) -> Phase {
        self.orchestrator.phase()
    }

    /// Abort a running exploration: cancel the wait and reset local
    /// state. The host-side session keeps running.
    pub fn abort_exploration(&self) {
        self.cancel.lock().cancel();
        self.orchestrator.abort();
    }

    /// Intercept one request end to end: enrich, forward, post-process.
    pub async fn intercept(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let request = if self.config.matches_completion(&request.url) {
            self.enrich(request).await
        } else {
            request
        };

        let response = self.upstream.forward(request).await?;

        if self.config.matches_completed(&response.url) {
            self.handle_completed(&response).await;
        }

        Ok(response)
    }

    /// Enrich a chat-completion request. Infallible: any failure returns
    /// the original request for pass-through.
    pub async fn enrich(&self, request: UpstreamRequest) -> UpstreamRequest {
        let _ = self.event_tx.send(InterceptEvent::RequestIntercepted {
            url: request.url.clone(),
        });

        match self.try_enrich(request.clone()).await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!("enrichment failed, forwarding original request: {}", e);
                let _ = self.event_tx.send(InterceptEvent::Error {
                    message: e.to_string(),
                });
                request
            }
        }
    }

    async fn try_enrich(&self, mut request: UpstreamRequest) -> Result<UpstreamRequest> {
        let Some(parsed) = request.body.parse_json() else {
            tracing::debug!("non-JSON body, passing through");
            return Ok(request);
        };
        let mut payload = match ChatPayload::from_value(parsed) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("unrecognized payload shape, passing through: {}", e);
                return Ok(request);
            }
        };

        // Excluded usage categories (e.g. commit-message generation) are
        // someone else's request dressed in the chat endpoint; leave them
        // alone entirely.
        if let Some(category) = payload.usage_category() {
            if self.config.is_excluded_usage(category) {
                tracing::debug!("usage category '{}' excluded, passing through", category);
                return Ok(request);
            }
        }

        let agent = self.config.mode.is_agent();
        if agent {
            self.gather_context(&payload).await;
        }

        // Mutation. Order: usage tag, model override, system prompt with
        // one-time exploration context, project info block.
        if let Some(tag) = self.session.usage_tag().or_else(|| self.config.usage_tag.clone()) {
            payload.stamp_usage(&tag);
        }
        if let Some(model) = self
            .session
            .selected_model()
            .or_else(|| self.config.model_override.clone())
        {
            payload.override_model(&model);
        }

        let pending = self.session.take_pending_context();
        let exploration_context = pending.is_some();
        let system_prompt = match (self.config.system_prompt.clone(), pending) {
            (Some(prompt), Some(ctx)) => Some(format!("{}\n\n{}", prompt, ctx)),
            (Some(prompt), None) => Some(prompt),
            (None, Some(ctx)) => Some(ctx),
            (None, None) => None,
        };
        let system_injected = if let Some(prompt) = &system_prompt {
            payload.set_system_prompt(prompt);
            true
        } else {
            false
        };

        let mut info_block = false;
        if agent {
            if let Some(snapshot) = self.session.project().snapshot() {
                if let Some(message) = payload.last_user_message_mut() {
                    info_block = message.prepend_text(&project::info_block(&snapshot));
                }
            }
        }

        let _ = self.event_tx.send(InterceptEvent::PayloadEnriched {
            system_prompt: system_injected,
            exploration_context,
            info_block,
        });

        let value = payload.to_value()?;
        request.body = request.body.reserialize(&value);
        Ok(request)
    }

    /// Track the conversation, run exploration when due, refresh the
    /// project snapshot. Strictly ordered within one request.
    async fn gather_context(&self, payload: &ChatPayload) {
        let page_url = self.session.page_url();
        let (is_new, already_explored, conversation_id) = {
            let mut tracker = self.session.tracker();
            let is_new = tracker.observe(payload, page_url.as_deref());
            (
                is_new,
                tracker.has_performed_exploration(),
                tracker.current_conversation_id().map(str::to_string),
            )
        };

        if is_new
            && !already_explored
            && self.config.enrichment() == Enrichment::ContextInjection
        {
            let query = payload.last_user_text().unwrap_or_default().to_string();
            let cancel = {
                let mut guard = self.cancel.lock();
                *guard = CancellationToken::new();
                guard.clone()
            };
            let context = self
                .orchestrator
                .obtain_context(
                    self.bridge.as_ref(),
                    &query,
                    conversation_id.as_deref(),
                    cancel,
                )
                .await;
            self.session.set_pending_context(context);
            self.session.tracker().mark_explored();
        }

        match self.session.project().refresh(self.bridge.as_ref()).await {
            Ok(snapshot) => {
                let _ = self.event_tx.send(InterceptEvent::ProjectInfoRefreshed {
                    project_name: snapshot.project_name,
                });
            }
            Err(e) => {
                tracing::warn!("project info refresh failed, keeping stale snapshot: {}", e);
            }
        }
    }

    /// Post-process a completed-conversation response: extract code,
    /// notify the IDE, reset per-conversation transient state.
    async fn handle_completed(&self, response: &UpstreamResponse) {
        let parsed: Option<Value> = serde_json::from_str(&response.body).ok();
        let assistant_text = parsed
            .as_ref()
            .and_then(latest_assistant_text)
            .map(str::to_string);

        let scan_text = assistant_text
            .clone()
            .unwrap_or_else(|| response.body.clone());
        let fragments = self.extractor.extract(&scan_text).await;

        if !fragments.is_empty() {
            // The replacement target is one-shot: the first fragment gets
            // it, the slot clears.
            let mut replace_target = self.session.take_replace_target();
            for fragment in &fragments {
                let submission = CodeSubmission {
                    code: fragment.text.clone(),
                    language: fragment.language.clone(),
                    replace_target: replace_target.take(),
                };
                if let Err(e) = self.bridge.code_completed(&submission).await {
                    tracing::warn!("failed to forward extracted code: {}", e);
                }
            }
            let _ = self.event_tx.send(InterceptEvent::CodeExtracted {
                fragments: fragments.len(),
            });
        }

        if let Some(text) = assistant_text {
            if let Err(e) = self.bridge.notify_chat_response(&text).await {
                tracing::warn!("failed to notify chat response: {}", e);
            }
        }

        self.session.reset_transient();
        let _ = self.event_tx.send(InterceptEvent::ConversationCompleted);
    }
}

/// The most recent assistant message's text in a response body
fn latest_assistant_text(value: &Value) -> Option<&str> {
    value
        .get("messages")?
        .as_array()?
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
}
