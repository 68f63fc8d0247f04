//! tether-intercept: Chat request interception and context enrichment
//!
//! This crate provides the pipeline that sits between the hosted chat
//! page and its backend: conversation tracking, exploration
//! orchestration, project-info caching, payload mutation, and response
//! post-processing.

pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod exploration;
pub mod extract;
pub mod interceptor;
pub mod payload;
pub mod project;
pub mod session;

pub use config::{Enrichment, InterceptConfig, Mode};
pub use conversation::ConversationTracker;
pub use error::{Error, Result};
pub use events::InterceptEvent;
pub use exploration::{ExplorationConfig, ExplorationOrchestrator, Phase};
pub use extract::{CodeBlockParser, CodeExtractor, CodeFragment};
pub use interceptor::{
    HttpUpstream, Interceptor, Upstream, UpstreamRequest, UpstreamResponse,
};
pub use payload::{ChatMessage, ChatPayload, RequestBody};
pub use project::ProjectInfoCache;
pub use session::SessionContext;
