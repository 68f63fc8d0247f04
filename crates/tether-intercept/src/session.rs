//! Per-page session state
//!
//! One `SessionContext` is created per page load and owns all shared
//! pipeline state: the conversation tracker, the cached project
//! snapshot, the one-shot pending exploration context, and the
//! transient per-conversation flags.

use parking_lot::{Mutex, MutexGuard};

use crate::conversation::ConversationTracker;
use crate::project::ProjectInfoCache;

#[derive(Default)]
pub struct SessionContext {
    tracker: Mutex<ConversationTracker>,
    project: ProjectInfoCache,
    /// Exploration output awaiting one-time injection
    pending_context: Mutex<Option<String>>,
    /// Transient model selection, reset on conversation completion
    selected_model: Mutex<Option<String>>,
    /// Transient usage tag, reset on conversation completion
    usage_tag: Mutex<Option<String>>,
    /// One-shot editor location for the next extracted fragment
    replace_target: Mutex<Option<String>>,
    /// Last reported page URL (conversation id source of last resort)
    page_url: Mutex<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the conversation tracker. Do not hold across await points.
    pub fn tracker(&self) -> MutexGuard<'_, ConversationTracker> {
        self.tracker.lock()
    }

    pub fn project(&self) -> &ProjectInfoCache {
        &self.project
    }

    /// Park exploration output for one-time injection. An empty string
    /// is a non-result (cancelled attempt) and parks nothing. A new
    /// value replaces any unconsumed prior one.
    pub fn set_pending_context(&self, context: String) {
        if context.is_empty() {
            return;
        }
        *self.pending_context.lock() = Some(context);
    }

    /// Consume the pending exploration context. Exactly-once: the slot
    /// is cleared.
    pub fn take_pending_context(&self) -> Option<String> {
        self.pending_context.lock().take()
    }

    pub fn set_selected_model(&self, model: Option<String>) {
        *self.selected_model.lock() = model;
    }

    pub fn selected_model(&self) -> Option<String> {
        self.selected_model.lock().clone()
    }

    pub fn set_usage_tag(&self, tag: Option<String>) {
        *self.usage_tag.lock() = tag;
    }

    pub fn usage_tag(&self) -> Option<String> {
        self.usage_tag.lock().clone()
    }

    /// Arm the replacement target for the next extracted fragment.
    pub fn set_replace_target(&self, target: String) {
        *self.replace_target.lock() = Some(target);
    }

    /// Consume the replacement target. Cleared after use so later
    /// extractions cannot hit the wrong editor location.
    pub fn take_replace_target(&self) -> Option<String> {
        self.replace_target.lock().take()
    }

    pub fn set_page_url(&self, url: String) {
        *self.page_url.lock() = Some(url);
    }

    pub fn page_url(&self) -> Option<String> {
        self.page_url.lock().clone()
    }

    /// Reset per-conversation transient state on the completed signal:
    /// selected model, usage tag, and the tracker's per-turn fields.
    pub fn reset_transient(&self) {
        *self.selected_model.lock() = None;
        *self.usage_tag.lock() = None;
        self.tracker.lock().reset();
    }
}
