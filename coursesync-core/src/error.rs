//! Error types for coursesync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from content discovery and configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error in frontmatter or a config file.
    #[error("failed to parse YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The content root does not exist or is not a directory.
    #[error("content directory not found: {path}")]
    ContentRootNotFound { path: PathBuf },

    /// No course id was given on the command line or in `course_id.txt`.
    #[error("course id not specified; pass --course-id or create {path}")]
    MissingCourseId { path: PathBuf },

    /// An API credential could not be found in the environment or config file.
    #[error("missing credential {name}; set it in the environment or in {path}")]
    MissingCredential { name: &'static str, path: PathBuf },

    /// `dirs::config_dir()` returned `None`.
    #[error("cannot determine config directory; set $HOME or equivalent")]
    ConfigDirNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
