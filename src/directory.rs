//! Fuzzy node lookup and display-name resolution.
//!
//! A thin read-side wrapper over the store. Display names are cached in
//! memory because the pipeline resolves the same handful of senders for
//! every packet; the bridge clears the cache during its periodic cleanup
//! pass so renames propagate within minutes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::db::{Database, NodeRow};

#[derive(Clone)]
pub struct NodeDirectory {
    db: Database,
    cache: Arc<Mutex<HashMap<String, String>>>,
}

impl NodeDirectory {
    pub fn new(db: Database) -> Self {
        NodeDirectory {
            db,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve a human-entered name to a node. Exact long/short-name matches
    /// win; otherwise the best substring match, ranked exact long name >
    /// long-name prefix > exact short name > short-name prefix > any other
    /// substring hit, most recently heard first.
    pub async fn resolve(&self, name: &str) -> Option<NodeRow> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.db.find_node_by_name(trimmed).await
    }

    /// Best display name for a node id: long name, else short name, else the
    /// raw id. Never fails; unknown ids come back verbatim.
    pub async fn display_name(&self, node_id: &str) -> String {
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(node_id) {
                return hit.clone();
            }
        }

        let name = self.db.node_display_name(node_id).await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(node_id.to_string(), name.clone());
        }
        name
    }

    /// Drop every cached name. Called by the bridge's cleanup pass.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            if !cache.is_empty() {
                debug!("Cleared {} cached display names", cache.len());
                cache.clear();
            }
        }
    }

    /// Number of cached names, for diagnostics.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }
}
