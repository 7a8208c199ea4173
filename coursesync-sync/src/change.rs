//! Freshness of a local file against its identity record.
//!
//! Precedence:
//! 1. `New` (no record)
//! 2. `Placeholder` (record points at a stub)
//! 3. `Modified` (mtime differs from the recorded marker, or no marker)
//! 4. `Current`
//!
//! Pure: no remote calls. Link and asset scanning run regardless.

use std::path::Path;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::identity::IdentityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    New,
    Placeholder,
    Modified,
    Current,
}

impl Freshness {
    pub fn needs_sync(self) -> bool {
        self != Freshness::Current
    }
}

/// Classify a file whose current mtime is `mtime`.
pub fn freshness(mtime: Option<f64>, record: Option<&IdentityRecord>) -> Freshness {
    let Some(record) = record else {
        return Freshness::New;
    };
    if record.placeholder {
        return Freshness::Placeholder;
    }
    match (record.mtime, mtime) {
        (Some(recorded), Some(current)) if recorded == current => Freshness::Current,
        _ => Freshness::Modified,
    }
}

/// Whether `path` has to be re-rendered and reconciled.
pub fn needs_sync(path: &Path, record: Option<&IdentityRecord>) -> bool {
    freshness(file_mtime(path), record).needs_sync()
}

/// Modification time as fractional seconds since the epoch.
pub fn file_mtime(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since.as_secs_f64())
}
