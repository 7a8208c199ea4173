//! Identity map: which remote object each local path was synced to.
//!
//! Persists a JSON object at `<content_root>/.canvas_sync_map.json`, keyed by
//! path relative to the content root with forward slashes. Writes use the
//! atomic `.tmp` + rename pattern.
//!
//! Older maps stored `{"id": 123, "mtime": ...}` or a bare id; both load as
//! records without a marker, so they are always considered stale.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use coursesync_core::{RemoteId, RemoteKind};

use crate::error::{io_err, SyncError};

pub const MAP_FILE: &str = ".canvas_sync_map.json";

/// One successfully synced local path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(alias = "id", deserialize_with = "id_from_any")]
    pub remote_id: RemoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_kind: Option<RemoteKind>,
    /// File mtime (seconds since the epoch) at the last successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<f64>,
    /// Remote locator used when other files link here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Points at a stub created for a forward link.
    #[serde(default, skip_serializing_if = "is_false")]
    pub placeholder: bool,
    /// Question name → remote item id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub item_ids: BTreeMap<String, RemoteId>,
    /// Asset keys referenced at the last completed scan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,
}

impl IdentityRecord {
    pub fn new(remote_id: RemoteId, remote_kind: RemoteKind) -> Self {
        IdentityRecord {
            remote_id,
            remote_kind: Some(remote_kind),
            mtime: None,
            url: None,
            placeholder: false,
            item_ids: BTreeMap::new(),
            assets: Vec::new(),
        }
    }

    fn legacy(remote_id: RemoteId) -> Self {
        IdentityRecord {
            remote_kind: None,
            ..IdentityRecord::new(remote_id, RemoteKind::Page)
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn id_from_any<'de, D>(deserializer: D) -> Result<RemoteId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(RemoteId(s)),
        Value::Number(n) => Ok(RemoteId(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordCompat {
    Structured(IdentityRecord),
    BareString(String),
    BareNumber(serde_json::Number),
}

/// In-memory identity map bound to its file.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
    records: BTreeMap<String, IdentityRecord>,
}

impl IdentityStore {
    /// `<content_root>/.canvas_sync_map.json`
    pub fn path_at(content_root: &Path) -> PathBuf {
        content_root.join(MAP_FILE)
    }

    /// Empty store that will save to `<content_root>`.
    pub fn empty_at(content_root: &Path) -> Self {
        IdentityStore {
            path: Self::path_at(content_root),
            records: BTreeMap::new(),
        }
    }

    /// Load the map for `content_root`.
    ///
    /// Never fails: a missing file is empty, a malformed file is logged and
    /// treated as empty, and individual unreadable entries are skipped.
    pub fn load_at(content_root: &Path) -> Self {
        let mut store = Self::empty_at(content_root);
        let path = store.path.clone();
        if !path.exists() {
            return store;
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read identity map, starting empty");
                return store;
            }
        };
        let raw: BTreeMap<String, Value> = match serde_json::from_str(&contents) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed identity map, starting empty");
                return store;
            }
        };

        for (key, value) in raw {
            match serde_json::from_value::<RecordCompat>(value) {
                Ok(RecordCompat::Structured(record)) => {
                    store.records.insert(key, record);
                }
                Ok(RecordCompat::BareString(id)) => {
                    store.records.insert(key, IdentityRecord::legacy(RemoteId(id)));
                }
                Ok(RecordCompat::BareNumber(n)) => {
                    store
                        .records
                        .insert(key, IdentityRecord::legacy(RemoteId(n.to_string())));
                }
                Err(e) => tracing::warn!(key, error = %e, "skipping unreadable identity entry"),
            }
        }
        store
    }

    /// Save atomically: write `<path>.tmp`, then rename over `<path>`.
    pub fn save(&self) -> Result<(), SyncError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&IdentityRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut IdentityRecord> {
        self.records.get_mut(key)
    }

    /// Insert or replace the record for `key`.
    ///
    /// Any other path claiming the same `(remote_kind, remote_id)` is evicted;
    /// the evicted keys are returned.
    pub fn put(&mut self, key: impl Into<String>, record: IdentityRecord) -> Vec<String> {
        let key = key.into();
        let evicted: Vec<String> = self
            .records
            .iter()
            .filter(|(k, r)| {
                **k != key && r.remote_id == record.remote_id && r.remote_kind == record.remote_kind
            })
            .map(|(k, _)| k.clone())
            .collect();
        for k in &evicted {
            tracing::warn!(evicted = %k, now = %key, id = %record.remote_id, "remote id re-claimed by another path");
            self.records.remove(k);
        }
        self.records.insert(key, record);
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<IdentityRecord> {
        self.records.remove(key)
    }

    /// The path currently claiming `(kind, id)`, if any.
    pub fn claimant(&self, kind: RemoteKind, id: &RemoteId) -> Option<&str> {
        self.records
            .iter()
            .find(|(_, r)| r.remote_kind == Some(kind) && &r.remote_id == id)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &IdentityRecord)> {
        self.records.iter()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &IdentityRecord) -> bool) {
        self.records.retain(|k, r| keep(k, r));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, kind: RemoteKind) -> IdentityRecord {
        IdentityRecord::new(RemoteId::from(id), kind)
    }

    #[test]
    fn empty_store_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        let store = IdentityStore::load_at(tmp.path());
        assert!(store.is_empty());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut store = IdentityStore::load_at(tmp.path());
        let mut rec = record("42", RemoteKind::Page);
        rec.mtime = Some(1_700_000_000.25);
        rec.url = Some("https://lms/pages/intro".into());
        rec.item_ids.insert("Q1".into(), RemoteId::from("9"));
        store.put("01_Mod/01_Intro.qmd", rec.clone());
        store.save().unwrap();

        let loaded = IdentityStore::load_at(tmp.path());
        assert_eq!(loaded.get("01_Mod/01_Intro.qmd"), Some(&rec));
    }

    #[test]
    fn tmp_file_cleaned_up_after_save() {
        let tmp = TempDir::new().unwrap();
        let store = IdentityStore::load_at(tmp.path());
        store.save().unwrap();
        let tmp_path = IdentityStore::path_at(tmp.path()).with_extension("json.tmp");
        assert!(!tmp_path.exists(), "tmp file should be removed after atomic rename");
    }

    #[test]
    fn legacy_entries_load_without_marker() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            IdentityStore::path_at(tmp.path()),
            r#"{"a.qmd": 17, "b.qmd": "18", "c.qmd": {"id": 19, "mtime": 5.0}}"#,
        )
        .unwrap();

        let store = IdentityStore::load_at(tmp.path());
        assert_eq!(store.get("a.qmd").unwrap().remote_id, RemoteId::from("17"));
        assert!(store.get("a.qmd").unwrap().mtime.is_none());
        assert_eq!(store.get("b.qmd").unwrap().remote_id, RemoteId::from("18"));
        let c = store.get("c.qmd").unwrap();
        assert_eq!(c.remote_id, RemoteId::from("19"));
        assert_eq!(c.mtime, Some(5.0));
        assert!(c.remote_kind.is_none());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(IdentityStore::path_at(tmp.path()), "{not json").unwrap();
        assert!(IdentityStore::load_at(tmp.path()).is_empty());
    }

    #[test]
    fn put_evicts_duplicate_claims() {
        let tmp = TempDir::new().unwrap();
        let mut store = IdentityStore::empty_at(tmp.path());
        store.put("old.qmd", record("7", RemoteKind::Page));
        store.put("other.qmd", record("7", RemoteKind::Assignment));

        let evicted = store.put("new.qmd", record("7", RemoteKind::Page));
        assert_eq!(evicted, vec!["old.qmd".to_string()]);
        assert!(store.get("old.qmd").is_none());
        assert!(store.get("other.qmd").is_some(), "different kind keeps its claim");
        assert_eq!(store.claimant(RemoteKind::Page, &RemoteId::from("7")), Some("new.qmd"));
    }
}
