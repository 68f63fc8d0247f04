//! Project info cache with stale-but-available semantics

use parking_lot::Mutex;
use tether_bridge::{Bridge, BridgeExt, ProjectInfoSnapshot};

use crate::error::Result;

/// Caches the last-fetched project snapshot.
///
/// `refresh` replaces the snapshot wholesale on success; on failure the
/// previous snapshot stays available to readers.
#[derive(Default)]
pub struct ProjectInfoCache {
    inner: Mutex<Option<ProjectInfoSnapshot>>,
}

impl ProjectInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a fresh snapshot from the host and cache it.
    pub async fn refresh(&self, bridge: &dyn Bridge) -> Result<ProjectInfoSnapshot> {
        let snapshot = bridge.project_info().await?;
        *self.inner.lock() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// The current snapshot, possibly stale.
    pub fn snapshot(&self) -> Option<ProjectInfoSnapshot> {
        self.inner.lock().clone()
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

/// Render a snapshot as the `<info>` block prepended to the latest user
/// message in agent mode.
pub fn info_block(snapshot: &ProjectInfoSnapshot) -> String {
    let mut block = String::from("<info>\n");
    block.push_str(&format!("project_name: {}\n", snapshot.project_name));
    block.push_str(&format!(
        "project_file_path: {}\n",
        snapshot.project_file_path
    ));
    block.push_str(&format!(
        "current_open_file: {}\n",
        snapshot.current_open_file
    ));
    if !snapshot.code_context.is_empty() {
        block.push_str("code_context:\n");
        block.push_str(&snapshot.code_context);
        if !snapshot.code_context.ends_with('\n') {
            block.push('\n');
        }
    }
    block.push_str("</info>\n\n");
    block
}
