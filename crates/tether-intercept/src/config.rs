//! Pipeline configuration
//!
//! Operating mode, mode prompt, usage tag, model override, and feature
//! toggles, plus the endpoint patterns and timeouts the pipeline runs
//! with. All of it is externally set by the embedder.

use std::time::Duration;

use crate::exploration::ExplorationConfig;

/// Operating mode of the hosted chat page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No system prompt, no enrichment
    #[default]
    Neutral,
    /// Mode prompt injected, no codebase context
    Project,
    /// Mode prompt plus project info and exploration context
    Agent,
}

impl Mode {
    /// Parse the page's mode string ("Agent Mode", "agent", ...).
    /// Unknown strings fall back to Neutral.
    pub fn parse(s: &str) -> Self {
        let name = s.trim().to_lowercase();
        let name = name.strip_suffix(" mode").unwrap_or(&name);
        match name {
            "agent" => Mode::Agent,
            "project" => Mode::Project,
            _ => Mode::Neutral,
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Mode::Agent)
    }
}

/// Which enrichment source is in effect.
///
/// Context injection and the project index are mutually exclusive; this
/// is computed in exactly one place so the two toggles cannot disagree
/// at different call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    /// Exploration context is injected into outgoing requests
    ContextInjection,
    /// The host-side project index answers retrieval instead
    ProjectIndex,
    /// Neither toggle is set
    None,
}

/// Configuration for the interception pipeline
#[derive(Debug, Clone)]
pub struct InterceptConfig {
    /// Operating mode
    pub mode: Mode,
    /// Mode prompt injected as the system message (None in Neutral mode)
    pub system_prompt: Option<String>,
    /// Default usage tag stamped onto outgoing payloads
    pub usage_tag: Option<String>,
    /// Default model-name override
    pub model_override: Option<String>,
    /// Whether exploration context injection is enabled
    pub context_injection: bool,
    /// Whether the host-side project index is enabled
    pub project_index: bool,
    /// Usage categories that bypass enrichment entirely
    pub excluded_usage: Vec<String>,
    /// URL fragments identifying chat-completion requests
    pub completion_endpoints: Vec<String>,
    /// URL fragments identifying the completed-conversation signal
    pub completed_endpoints: Vec<String>,
    /// Exploration/indexing wait limits
    pub exploration: ExplorationConfig,
    /// Delay before the fallback code parser runs
    pub extraction_fallback_delay: Duration,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Neutral,
            system_prompt: None,
            usage_tag: None,
            model_override: None,
            context_injection: true,
            project_index: false,
            excluded_usage: vec!["commit_message".to_string()],
            completion_endpoints: vec![
                "/api/chat/completions".to_string(),
                "/v1/chat/completions".to_string(),
            ],
            completed_endpoints: vec!["/api/chat/completed".to_string()],
            exploration: ExplorationConfig::default(),
            extraction_fallback_delay: Duration::from_millis(500),
        }
    }
}

impl InterceptConfig {
    /// The effective enrichment source. Context injection wins when both
    /// toggles are set.
    pub fn enrichment(&self) -> Enrichment {
        if self.context_injection {
            Enrichment::ContextInjection
        } else if self.project_index {
            Enrichment::ProjectIndex
        } else {
            Enrichment::None
        }
    }

    /// Does this URL carry a chat-completion request?
    pub fn matches_completion(&self, url: &str) -> bool {
        self.completion_endpoints.iter().any(|p| url.contains(p))
    }

    /// Does this URL signal a completed conversation turn?
    pub fn matches_completed(&self, url: &str) -> bool {
        self.completed_endpoints.iter().any(|p| url.contains(p))
    }

    /// Does this usage category bypass enrichment?
    pub fn is_excluded_usage(&self, tag: &str) -> bool {
        self.excluded_usage.iter().any(|t| t == tag)
    }
}
