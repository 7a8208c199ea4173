//! `coursesync map`: inspect and edit the identity map.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Subcommand;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use coursesync_sync::{IdentityRecord, IdentityStore};

#[derive(Subcommand, Debug)]
pub enum MapCommand {
    /// List every recorded path and its remote object.
    List {
        /// Content root directory.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop the record for one path; the next sync resolves it by title.
    Forget {
        /// Path relative to the content root, e.g. `01_Intro/02_Page.qmd`.
        rel_path: String,

        /// Content root directory.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Drop records whose local file or directory no longer exists.
    PruneMissing {
        /// Content root directory.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

pub fn run(command: MapCommand) -> Result<()> {
    match command {
        MapCommand::List { path, json } => list(&resolve(&path)?, json),
        MapCommand::Forget { rel_path, root } => forget(&resolve(&root)?, &rel_path),
        MapCommand::PruneMissing { path } => prune_missing(&resolve(&path)?),
    }
}

fn resolve(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot resolve path '{}'", path.display()))
}

/// Local part of an identity key (calendar keys carry a `#title@date` suffix).
fn local_part(key: &str) -> &str {
    key.split_once('#').map_or(key, |(path, _)| path)
}

/// Keys of records whose local path is gone.
pub fn missing_keys(root: &Path, store: &IdentityStore) -> Vec<String> {
    store
        .iter()
        .filter(|(key, _)| !root.join(local_part(key)).exists())
        .map(|(key, _)| key.clone())
        .collect()
}

#[derive(Serialize)]
struct MapEntryJson<'a> {
    path: &'a str,
    #[serde(flatten)]
    record: &'a IdentityRecord,
}

#[derive(Tabled)]
struct MapTableRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "remote id")]
    remote_id: String,
    #[tabled(rename = "synced")]
    synced: String,
}

fn synced_label(record: &IdentityRecord) -> String {
    if record.placeholder {
        return "stub".to_string();
    }
    record
        .mtime
        .and_then(|secs| DateTime::from_timestamp(secs.trunc() as i64, 0))
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "pending".to_string())
}

fn list(root: &Path, json: bool) -> Result<()> {
    let store = IdentityStore::load_at(root);
    if json {
        let entries: Vec<MapEntryJson<'_>> = store
            .iter()
            .map(|(path, record)| MapEntryJson { path, record })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("failed to serialize map JSON")?
        );
        return Ok(());
    }

    if store.is_empty() {
        println!("No records in {}.", IdentityStore::path_at(root).display());
        return Ok(());
    }
    let rows: Vec<MapTableRow> = store
        .iter()
        .map(|(path, record)| MapTableRow {
            path: path.clone(),
            kind: record
                .remote_kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "?".into()),
            remote_id: record.remote_id.to_string(),
            synced: synced_label(record),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn forget(root: &Path, rel_path: &str) -> Result<()> {
    let key = rel_path.replace('\\', "/");
    let key = key.trim_start_matches("./");
    let mut store = IdentityStore::load_at(root);
    let Some(record) = store.remove(key) else {
        anyhow::bail!("no record for '{key}'");
    };
    store.save().context("failed to save identity map")?;
    println!("✓ Forgot '{key}' (was {})", record.remote_id);
    Ok(())
}

fn prune_missing(root: &Path) -> Result<()> {
    let mut store = IdentityStore::load_at(root);
    let missing = missing_keys(root, &store);
    if missing.is_empty() {
        println!("✓ Nothing to prune");
        return Ok(());
    }
    store.retain(|key, _| !missing.iter().any(|m| m == key));
    store.save().context("failed to save identity map")?;
    println!("✓ Dropped {} records", missing.len());
    for key in &missing {
        println!("  −  {key}");
    }
    Ok(())
}
