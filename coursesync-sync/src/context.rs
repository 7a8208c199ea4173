//! Per-run state threaded through every reconcile step.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use coursesync_renderer::{ChunkRenderer, Renderer};

use crate::assets::ActiveSet;
use crate::error::SyncError;
use crate::identity::{IdentityRecord, IdentityStore};
use crate::remote::RemoteApi;
use crate::report::SyncReport;

/// Owns the identity map, the active asset set and the report for one run.
pub struct SyncContext<'a> {
    pub remote: &'a dyn RemoteApi,
    pub renderer: &'a dyn Renderer,
    pub chunks: ChunkRenderer,
    pub root: PathBuf,
    pub store: IdentityStore,
    pub active: ActiveSet,
    /// Paths whose remote object is being created right now.
    pub in_flight: BTreeSet<String>,
    pub report: SyncReport,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        root: &Path,
        remote: &'a dyn RemoteApi,
        renderer: &'a dyn Renderer,
    ) -> Result<Self, SyncError> {
        Ok(SyncContext {
            remote,
            renderer,
            chunks: ChunkRenderer::new()?,
            root: root.to_path_buf(),
            store: IdentityStore::load_at(root),
            active: ActiveSet::default(),
            in_flight: BTreeSet::new(),
            report: SyncReport::default(),
        })
    }

    /// Write `record` for `key`. Item ids and the locator of a record for the
    /// same remote object are kept when the new record does not carry them.
    pub fn record(&mut self, key: &str, mut record: IdentityRecord) {
        if let Some(prev) = self.store.get(key) {
            if prev.remote_id == record.remote_id {
                if record.item_ids.is_empty() {
                    record.item_ids = prev.item_ids.clone();
                }
                if record.url.is_none() {
                    record.url = prev.url.clone();
                }
            }
        }
        self.store.put(key, record);
    }

    /// Persist the identity map; failures are logged, not fatal.
    pub fn save_store(&self) {
        if let Err(e) = self.store.save() {
            tracing::warn!(error = %e, "could not save identity map");
        }
    }
}
