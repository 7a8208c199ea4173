//! Run summary returned by [`crate::pipeline::run`].

use serde::Serialize;

use crate::prune::PruneReport;

/// A file that failed; the run continued past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// A remote object that needs manual attention (a published quiz whose
/// snapshot could not be regenerated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attention {
    pub path: String,
    pub locator: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    /// Files whose mtime matched their record.
    pub unchanged: usize,
    pub stubs: usize,
    pub uploads: usize,
    /// Objects found by exact-title search instead of a recorded id.
    pub title_fallbacks: usize,
    pub failures: Vec<FileFailure>,
    pub attention: Vec<Attention>,
    pub prune: Option<PruneReport>,
}

impl SyncReport {
    pub fn fail(&mut self, path: impl Into<String>, error: impl std::fmt::Display) {
        let path = path.into();
        let error = error.to_string();
        tracing::error!(path = %path, error = %error, "sync failed");
        self.failures.push(FileFailure { path, error });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self
                .prune
                .as_ref()
                .map_or(true, |p| p.failures.is_empty())
    }
}
