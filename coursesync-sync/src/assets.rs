//! Uploaded assets and the per-run active set.
//!
//! Images go to `synced-images`, downloadable files to `synced-files`. Both
//! folders are owned by the sync: anything in them that no synced content
//! references at the end of a run is pruned.

use std::collections::BTreeSet;
use std::path::Path;

use coursesync_core::{discovery, RemoteId, RemoteKind};

use crate::change::file_mtime;
use crate::context::SyncContext;
use crate::error::{io_err, SyncError};
use crate::identity::IdentityRecord;

pub const FOLDER_IMAGES: &str = "synced-images";
pub const FOLDER_FILES: &str = "synced-files";

/// Namespaces the pruner may delete from.
pub const RESERVED_NAMESPACES: [&str; 2] = [FOLDER_IMAGES, FOLDER_FILES];

/// Everything this run touched. Created empty, filled by every scan and
/// upload, consumed once by the pruner.
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    assets: BTreeSet<RemoteId>,
    targets: BTreeSet<String>,
}

impl ActiveSet {
    pub fn mark_asset(&mut self, id: RemoteId) {
        self.assets.insert(id);
    }

    /// Record a content path resolved as a cross-link target.
    pub fn mark_target(&mut self, key: impl Into<String>) {
        self.targets.insert(key.into());
    }

    pub fn is_active(&self, id: &RemoteId) -> bool {
        self.assets.contains(id)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }
}

/// An asset that is present remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    /// Identity key of the local file.
    pub key: String,
    pub id: RemoteId,
    pub url: String,
}

/// Make sure the local file at `path` is uploaded into `namespace`.
///
/// An unchanged file with a recorded URL costs no remote call. Either way the
/// asset is marked active.
pub fn ensure_uploaded(
    ctx: &mut SyncContext<'_>,
    path: &Path,
    namespace: &str,
) -> Result<AssetRef, SyncError> {
    let key = discovery::rel_key(&ctx.root, path);
    let mtime = file_mtime(path);

    if let Some(rec) = ctx.store.get(&key) {
        if let (Some(url), true) = (&rec.url, rec.mtime.is_some() && rec.mtime == mtime) {
            let asset = AssetRef {
                key: key.clone(),
                id: rec.remote_id.clone(),
                url: url.clone(),
            };
            ctx.active.mark_asset(asset.id.clone());
            return Ok(asset);
        }
    }

    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.clone());

    tracing::info!(asset = %key, namespace, "uploading");
    let info = ctx.remote.upload_asset(namespace, &name, &bytes)?;
    ctx.report.uploads += 1;
    ctx.active.mark_asset(info.id.clone());

    let mut record = IdentityRecord::new(info.id.clone(), RemoteKind::File);
    record.mtime = mtime;
    record.url = Some(info.url.clone());
    ctx.store.put(key.clone(), record);

    Ok(AssetRef {
        key,
        id: info.id,
        url: info.url,
    })
}

/// Keep the assets a file referenced at its last completed scan alive, for
/// files that failed before their scan finished.
pub fn protect_recorded_assets(ctx: &mut SyncContext<'_>, key: &str) {
    let Some(rec) = ctx.store.get(key) else {
        return;
    };
    let ids: Vec<RemoteId> = rec
        .assets
        .iter()
        .filter_map(|a| ctx.store.get(a).map(|r| r.remote_id.clone()))
        .collect();
    for id in ids {
        ctx.active.mark_asset(id);
    }
}
