//! Exploration orchestration
//!
//! Drives one host-side codebase exploration per new conversation:
//! request it, sit out an indexing pass when the host demands one, then
//! collect progress events until the summary arrives. Every exit path
//! resolves with a context string; the caller's request is never blocked
//! past the configured limits and never fails because exploration did.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use tether_bridge::{
    Bridge, BridgeExt, ExplorationRound, HostEvent, ProgressEvent, StartExploration,
};

use crate::events::InterceptEvent;

/// Marker header prefixed to every exploration context string.
pub const CONTEXT_MARKER: &str = "[CODEBASE EXPLORATION CONTEXT]";

/// Wait limits for an exploration attempt
#[derive(Debug, Clone)]
pub struct ExplorationConfig {
    /// Overall limit for an exploration session to produce its summary
    pub exploration_timeout: Duration,
    /// Limit for a host-side indexing pass to finish
    pub indexing_timeout: Duration,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            exploration_timeout: Duration::from_secs(180),
            indexing_timeout: Duration::from_secs(300),
        }
    }
}

/// Phase of the current exploration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Requesting,
    Indexing,
    Exploring,
    Complete,
}

/// A running exploration session
#[derive(Debug, Clone, Default)]
pub struct ExplorationSession {
    pub session_id: String,
    pub rounds: Vec<ExplorationRound>,
    pub summary: Option<String>,
}

impl ExplorationSession {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }
}

enum IndexingOutcome {
    Complete,
    Error(String),
    TimedOut,
    Cancelled,
}

pub struct ExplorationOrchestrator {
    config: ExplorationConfig,
    phase: Mutex<Phase>,
    /// At most one session is current; starting a new one replaces it.
    current: Mutex<Option<ExplorationSession>>,
    event_tx: broadcast::Sender<InterceptEvent>,
}

impl ExplorationOrchestrator {
    pub fn new(config: ExplorationConfig, event_tx: broadcast::Sender<InterceptEvent>) -> Self {
        Self {
            config,
            phase: Mutex::new(Phase::Idle),
            current: Mutex::new(None),
            event_tx,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// The current session's progress snapshot, if one is running.
    pub fn current_session(&self) -> Option<ExplorationSession> {
        self.current.lock().clone()
    }

    /// Quietly drop the current attempt. The host keeps running; only
    /// local state resets.
    pub fn abort(&self) {
        *self.phase.lock() = Phase::Idle;
        *self.current.lock() = None;
    }

    /// Obtain exploration context for a query. Always resolves with a
    /// string: the formatted summary, a stored context for the
    /// conversation, or a placeholder describing why none is available.
    pub async fn obtain_context(
        &self,
        bridge: &dyn Bridge,
        query: &str,
        conversation_id: Option<&str>,
        cancel: CancellationToken,
    ) -> String {
        // Context stored for this conversation beats a fresh session.
        if let Some(id) = conversation_id {
            match bridge.exploration_context(id).await {
                Ok(Some(stored)) => {
                    tracing::debug!("using stored exploration context for {}", id);
                    return format_context(query, &stored.context);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("stored context lookup failed: {}", e);
                }
            }
        }

        self.set_phase(Phase::Requesting);
        self.emit(InterceptEvent::ExplorationRequested {
            query: query.to_string(),
        });

        // Subscribe before asking so no signal can slip past.
        let mut events = bridge.subscribe();
        let context = self
            .run(bridge, &mut events, query, conversation_id, &cancel)
            .await;

        self.set_phase(Phase::Idle);
        *self.current.lock() = None;
        context
    }

    async fn run(
        &self,
        bridge: &dyn Bridge,
        events: &mut broadcast::Receiver<HostEvent>,
        query: &str,
        conversation_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> String {
        let started = match bridge.start_exploration(query, conversation_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("startExploration failed: {}", e);
                return unavailable_context(&e.to_string());
            }
        };

        let session_id = match started {
            StartExploration::Started { session_id } => session_id,
            StartExploration::Failed { message } => {
                tracing::warn!("host declined exploration: {}", message);
                return unavailable_context(&message);
            }
            StartExploration::IndexingRequired { message } => {
                self.set_phase(Phase::Indexing);
                self.emit(InterceptEvent::IndexingStarted { message });

                match self.wait_for_indexing(events, cancel).await {
                    IndexingOutcome::Complete => {
                        // Index exists now; ask again.
                        match bridge.start_exploration(query, conversation_id).await {
                            Ok(StartExploration::Started { session_id }) => session_id,
                            Ok(StartExploration::IndexingRequired { .. }) => {
                                return unavailable_context("index still building");
                            }
                            Ok(StartExploration::Failed { message }) => {
                                return unavailable_context(&message);
                            }
                            Err(e) => return unavailable_context(&e.to_string()),
                        }
                    }
                    IndexingOutcome::Error(message) => {
                        return unavailable_context(&format!("indexing failed: {}", message));
                    }
                    IndexingOutcome::TimedOut => {
                        self.emit(InterceptEvent::ExplorationTimedOut);
                        return timeout_context(self.config.indexing_timeout);
                    }
                    IndexingOutcome::Cancelled => return String::new(),
                }
            }
        };

        self.set_phase(Phase::Exploring);
        self.emit(InterceptEvent::ExplorationStarted {
            session_id: session_id.clone(),
        });
        *self.current.lock() = Some(ExplorationSession::new(session_id.clone()));

        self.collect(bridge, events, query, &session_id, cancel).await
    }

    async fn wait_for_indexing(
        &self,
        events: &mut broadcast::Receiver<HostEvent>,
        cancel: &CancellationToken,
    ) -> IndexingOutcome {
        let deadline = tokio::time::sleep(self.config.indexing_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return IndexingOutcome::Cancelled,
                _ = &mut deadline => return IndexingOutcome::TimedOut,
                event = events.recv() => match event {
                    Ok(HostEvent::IndexingComplete) => return IndexingOutcome::Complete,
                    Ok(HostEvent::IndexingError { message }) => {
                        return IndexingOutcome::Error(message);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("host event stream lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return IndexingOutcome::Error("notification channel closed".into());
                    }
                }
            }
        }
    }

    async fn collect(
        &self,
        bridge: &dyn Bridge,
        events: &mut broadcast::Receiver<HostEvent>,
        query: &str,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> String {
        let deadline = tokio::time::sleep(self.config.exploration_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return String::new(),
                _ = &mut deadline => {
                    self.emit(InterceptEvent::ExplorationTimedOut);
                    return timeout_context(self.config.exploration_timeout);
                }
                event = events.recv() => match event {
                    Ok(HostEvent::ExplorationProgress { session_id: sid, event })
                        if sid == session_id =>
                    {
                        match event {
                            ProgressEvent::ToolExecution { name } => {
                                self.emit(InterceptEvent::ExplorationToolExecution {
                                    session_id: sid,
                                    name,
                                });
                            }
                            ProgressEvent::RoundComplete { round } => {
                                if let Some(session) = self.current.lock().as_mut() {
                                    session.rounds.push(round);
                                }
                            }
                            ProgressEvent::Complete { summary } => {
                                return self.finish(query, session_id, summary);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("host event stream lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Last chance: one status probe before giving up.
                        return self.probe_status(bridge, query, session_id).await;
                    }
                }
            }
        }
    }

    fn finish(&self, query: &str, session_id: &str, summary: Option<String>) -> String {
        self.set_phase(Phase::Complete);
        match summary {
            Some(summary) if !summary.is_empty() => {
                if let Some(session) = self.current.lock().as_mut() {
                    session.summary = Some(summary.clone());
                }
                self.emit(InterceptEvent::ExplorationComplete {
                    session_id: session_id.to_string(),
                    chars: summary.len(),
                });
                format_context(query, &summary)
            }
            _ => unavailable_context("exploration produced no summary"),
        }
    }

    async fn probe_status(
        &self,
        bridge: &dyn Bridge,
        query: &str,
        session_id: &str,
    ) -> String {
        match bridge.exploration_status(session_id).await {
            Ok(status) if status.completed => {
                let summary = status.result.and_then(|r| r.summary);
                self.finish(query, session_id, summary)
            }
            Ok(_) => unavailable_context("notification channel closed mid-exploration"),
            Err(e) => unavailable_context(&e.to_string()),
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn emit(&self, event: InterceptEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Format a completed exploration summary for injection.
pub fn format_context(query: &str, summary: &str) -> String {
    format!("{}\nQuery: {}\n\n{}", CONTEXT_MARKER, query, summary)
}

fn timeout_context(limit: Duration) -> String {
    format!(
        "{}\nExploration timed out after {}s; continuing without codebase context.",
        CONTEXT_MARKER,
        limit.as_secs()
    )
}

fn unavailable_context(reason: &str) -> String {
    format!("{}\nExploration unavailable: {}", CONTEXT_MARKER, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex as StdMutex;
    use tether_bridge::Action;

    /// Scripted bridge with a controllable notification channel.
    struct ScriptedBridge {
        replies: StdMutex<Vec<Value>>,
        events_tx: broadcast::Sender<HostEvent>,
    }

    impl ScriptedBridge {
        fn new(replies: Vec<Value>) -> Self {
            let (events_tx, _) = broadcast::channel(32);
            Self {
                replies: StdMutex::new(replies),
                events_tx,
            }
        }

        fn push_event(&self, event: HostEvent) {
            let _ = self.events_tx.send(event);
        }
    }

    #[async_trait]
    impl Bridge for ScriptedBridge {
        async fn call(
            &self,
            _action: Action,
            _data: Value,
        ) -> tether_bridge::Result<Value> {
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(json!({"success": false, "error": "script exhausted"}))
            } else {
                Ok(replies.remove(0))
            }
        }

        fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
            self.events_tx.subscribe()
        }
    }

    fn orchestrator(config: ExplorationConfig) -> ExplorationOrchestrator {
        let (tx, _) = broadcast::channel(64);
        ExplorationOrchestrator::new(config, tx)
    }

    fn fast_config() -> ExplorationConfig {
        ExplorationConfig {
            exploration_timeout: Duration::from_millis(200),
            indexing_timeout: Duration::from_millis(200),
        }
    }

    fn progress(session_id: &str, event: ProgressEvent) -> HostEvent {
        HostEvent::ExplorationProgress {
            session_id: session_id.to_string(),
            event,
        }
    }

    #[tokio::test]
    async fn test_stored_context_short_circuits() {
        let bridge = ScriptedBridge::new(vec![json!({
            "success": true,
            "context": "previous findings"
        })]);
        let orch = orchestrator(fast_config());

        let ctx = orch
            .obtain_context(&bridge, "how does auth work", Some("conv-1"), CancellationToken::new())
            .await;

        assert!(ctx.starts_with(CONTEXT_MARKER));
        assert!(ctx.contains("previous findings"));
        // No startExploration call happened.
        assert_eq!(bridge.replies.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_exploration_completes_with_summary() {
        let bridge = ScriptedBridge::new(vec![
            // getExplorationContext: nothing stored
            json!({"success": false, "error": "No context found"}),
            // startExploration
            json!({"success": true, "sessionId": "s-1"}),
        ]);
        let orch = orchestrator(fast_config());

        let events = bridge.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = events.send(progress(
                "s-1",
                ProgressEvent::RoundComplete {
                    round: ExplorationRound {
                        name: "round 1".into(),
                        tool_executions: vec![],
                    },
                },
            ));
            let _ = events.send(progress(
                "s-1",
                ProgressEvent::Complete {
                    summary: Some("auth lives in src/auth.rs".into()),
                },
            ));
        });

        let ctx = orch
            .obtain_context(&bridge, "find auth", Some("conv-1"), CancellationToken::new())
            .await;

        assert!(ctx.starts_with(CONTEXT_MARKER));
        assert!(ctx.contains("Query: find auth"));
        assert!(ctx.contains("auth lives in src/auth.rs"));
        assert_eq!(orch.phase(), Phase::Idle);
        assert!(orch.current_session().is_none());
    }

    #[tokio::test]
    async fn test_events_for_other_sessions_ignored() {
        let bridge = ScriptedBridge::new(vec![json!({"success": true, "sessionId": "s-2"})]);
        let orch = orchestrator(fast_config());

        let events = bridge.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            // A stale completion from a prior session must not finish us.
            let _ = events.send(progress(
                "s-old",
                ProgressEvent::Complete {
                    summary: Some("stale".into()),
                },
            ));
            let _ = events.send(progress(
                "s-2",
                ProgressEvent::Complete {
                    summary: Some("fresh".into()),
                },
            ));
        });

        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("fresh"));
        assert!(!ctx.contains("stale"));
    }

    #[tokio::test]
    async fn test_timeout_resolves_with_timed_out_placeholder() {
        let bridge = ScriptedBridge::new(vec![json!({"success": true, "sessionId": "s-3"})]);
        let orch = orchestrator(fast_config());

        // No completion event ever arrives.
        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("timed out"));
        assert!(ctx.starts_with(CONTEXT_MARKER));
    }

    #[tokio::test]
    async fn test_indexing_waits_for_completion_signal() {
        let bridge = ScriptedBridge::new(vec![
            // startExploration: host wants an index first
            json!({"success": false, "indexing": true, "message": "Building index"}),
            // retry after IndexingComplete
            json!({"success": true, "sessionId": "s-4"}),
        ]);
        let orch = orchestrator(ExplorationConfig {
            exploration_timeout: Duration::from_millis(500),
            indexing_timeout: Duration::from_millis(500),
        });

        let events = bridge.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = events.send(HostEvent::IndexingComplete);
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = events.send(progress(
                "s-4",
                ProgressEvent::Complete {
                    summary: Some("indexed and explored".into()),
                },
            ));
        });

        let started = tokio::time::Instant::now();
        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;

        // The context only resolves after the indexing signal fired.
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(ctx.contains("indexed and explored"));
    }

    #[tokio::test]
    async fn test_indexing_phase_observable_while_waiting() {
        let bridge = ScriptedBridge::new(vec![json!({
            "success": true, "indexing": true, "message": "Building index"
        })]);
        let orch = std::sync::Arc::new(orchestrator(ExplorationConfig {
            exploration_timeout: Duration::from_millis(500),
            indexing_timeout: Duration::from_millis(500),
        }));

        let events = bridge.events_tx.clone();
        let observer = orch.clone();
        let observed = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let phase = observer.phase();
            let _ = events.send(HostEvent::IndexingError {
                message: "stop".into(),
            });
            phase
        });

        let _ = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert_eq!(observed.await.unwrap(), Phase::Indexing);
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_indexing_error_resolves_with_annotation() {
        let bridge = ScriptedBridge::new(vec![json!({
            "success": false, "indexing": true, "message": "Building index"
        })]);
        let orch = orchestrator(fast_config());

        let events = bridge.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = events.send(HostEvent::IndexingError {
                message: "disk full".into(),
            });
        });

        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("Exploration unavailable"));
        assert!(ctx.contains("disk full"));
    }

    #[tokio::test]
    async fn test_indexing_timeout_contains_timed_out() {
        let bridge = ScriptedBridge::new(vec![json!({
            "success": false, "indexing": true, "message": "Building index"
        })]);
        let orch = orchestrator(fast_config());

        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("timed out"));
    }

    #[tokio::test]
    async fn test_host_failure_resolves_not_rejects() {
        let bridge = ScriptedBridge::new(vec![json!({
            "success": false, "error": "agent unavailable"
        })]);
        let orch = orchestrator(fast_config());

        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("Exploration unavailable"));
        assert!(ctx.contains("agent unavailable"));
    }

    #[tokio::test]
    async fn test_cancel_resolves_empty() {
        let bridge = ScriptedBridge::new(vec![json!({"success": true, "sessionId": "s-5"})]);
        let orch = orchestrator(ExplorationConfig {
            exploration_timeout: Duration::from_secs(60),
            indexing_timeout: Duration::from_secs(60),
        });

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            child.cancel();
        });

        let ctx = orch.obtain_context(&bridge, "q", None, cancel).await;
        assert!(ctx.is_empty());
        assert_eq!(orch.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_rounds_accumulate_on_current_session() {
        let bridge = ScriptedBridge::new(vec![json!({"success": true, "sessionId": "s-6"})]);
        let orch = std::sync::Arc::new(orchestrator(ExplorationConfig {
            exploration_timeout: Duration::from_millis(500),
            indexing_timeout: Duration::from_millis(500),
        }));

        let events = bridge.events_tx.clone();
        let observer = orch.clone();
        let rounds_seen = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = events.send(progress(
                "s-6",
                ProgressEvent::RoundComplete {
                    round: ExplorationRound {
                        name: "scan".into(),
                        tool_executions: vec![],
                    },
                },
            ));
            tokio::time::sleep(Duration::from_millis(30)).await;
            let rounds = observer
                .current_session()
                .map(|s| s.rounds.len())
                .unwrap_or(0);
            let _ = events.send(progress(
                "s-6",
                ProgressEvent::Complete {
                    summary: Some("done".into()),
                },
            ));
            rounds
        });

        let ctx = orch
            .obtain_context(&bridge, "q", None, CancellationToken::new())
            .await;
        assert!(ctx.contains("done"));
        assert_eq!(rounds_seen.await.unwrap(), 1);
    }
}
