//! Error types for coursesync-sync.

use std::path::PathBuf;

use thiserror::Error;

use coursesync_core::{ContentKind, CoreError};
use coursesync_detector::DetectError;
use coursesync_renderer::RenderError;

use crate::remote::RemoteError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the rendering engine.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Content classification failed (bad frontmatter, unreadable quiz).
    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// The remote API refused or failed a call.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One or more referenced assets could not be uploaded.
    #[error("{count} asset upload(s) failed: {detail}")]
    Uploads { count: usize, detail: String },

    /// Calendar events and similar kinds never live in a module.
    #[error("{0} content cannot be placed in a module")]
    NotAttachable(ContentKind),

    /// JSON serialization error (identity map).
    #[error("identity map JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
