//! Return-Path Backup Store
//!
//! Second destination source for the callback page. The primary source is
//! the opaque `state` token round-tripped through the provider; this backup
//! lives in the host's tab-scoped key-value store and survives providers
//! that drop or mangle `state` on the way back. It is deleted once the
//! callback consumes it, whether the flow succeeds or fails.

use std::sync::Arc;
use tracing::{debug, warn};

use bridge_traits::storage::KeyValueStore;

use crate::return_path::ReturnPath;

/// Storage key for the backed-up return path, namespaced under `auth:`.
const RETURN_PATH_KEY: &str = "auth:return_path";

/// Best-effort persistence for the pending return path.
///
/// Every operation swallows storage failures: a broken store downgrades the
/// flow to default destinations, it never breaks sign-in. A stored value
/// that no longer validates as a [`ReturnPath`] is treated as absent and
/// cleared.
#[derive(Clone)]
pub struct ReturnPathBackup {
    store: Arc<dyn KeyValueStore>,
}

impl ReturnPathBackup {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persist the return path for the upcoming redirect round trip.
    pub async fn save(&self, path: &ReturnPath) {
        match self.store.set(RETURN_PATH_KEY, path.as_str()).await {
            Ok(()) => debug!(return_to = %path, "Backed up return path"),
            Err(e) => {
                warn!(error = %e, "Failed to back up return path, continuing without it");
            }
        }
    }

    /// Read the backed-up return path, if a valid one is present.
    pub async fn load(&self) -> Option<ReturnPath> {
        let value = match self.store.get(RETURN_PATH_KEY).await {
            Ok(value) => value?,
            Err(e) => {
                warn!(error = %e, "Failed to read backed-up return path");
                return None;
            }
        };

        match ReturnPath::parse(&value) {
            Some(path) => Some(path),
            None => {
                warn!(stored = %value, "Backed-up value is not an app path, clearing it");
                self.clear().await;
                None
            }
        }
    }

    /// Delete the backed-up return path. Succeeds when nothing is stored.
    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(RETURN_PATH_KEY).await {
            warn!(error = %e, "Failed to clear backed-up return path");
        }
    }
}
