//! Error types for coursesync-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while turning Markdown into HTML.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error (batch documents).
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Filesystem error on a scratch file.
    #[error("render io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// The `quarto` executable could not be started.
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    /// `quarto render` exited unsuccessfully.
    #[error("quarto render failed for {path} ({status}): {stderr}")]
    Failed {
        path: PathBuf,
        status: String,
        stderr: String,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}
