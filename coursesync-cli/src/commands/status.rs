//! `coursesync status`: what the next sync would touch, without any network.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use coursesync_core::discovery::{self, TreeEntry};
use coursesync_sync::change::{file_mtime, freshness};
use coursesync_sync::{Freshness, IdentityStore};

use super::map::missing_keys;

/// Arguments for `coursesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Content root directory.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;
        let report = build_report(&root)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum FileState {
    New,
    Stub,
    Modified,
    Current,
    Error,
}

impl From<Freshness> for FileState {
    fn from(f: Freshness) -> Self {
        match f {
            Freshness::New => FileState::New,
            Freshness::Placeholder => FileState::Stub,
            Freshness::Modified => FileState::Modified,
            Freshness::Current => FileState::Current,
        }
    }
}

impl FileState {
    fn pending(self) -> bool {
        matches!(self, FileState::New | FileState::Stub | FileState::Modified)
    }
}

#[derive(Debug, Clone, Serialize)]
struct FileStatus {
    path: String,
    kind: Option<String>,
    state: FileState,
    remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Summary {
    files: usize,
    pending: usize,
    errors: usize,
    missing: usize,
}

#[derive(Debug, Clone, Serialize)]
struct StatusReport {
    summary: Summary,
    files: Vec<FileStatus>,
    /// Map entries whose local path no longer exists.
    missing: Vec<String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "remote id")]
    remote_id: String,
}

fn build_report(root: &Path) -> Result<StatusReport> {
    let store = IdentityStore::load_at(root);
    let mut files = Vec::new();

    for entry in discovery::scan(root).context("failed to scan content root")? {
        let (paths, in_module) = match entry {
            TreeEntry::Module { files, .. } => (files, true),
            TreeEntry::RootFile(path) => (vec![path], false),
        };
        for path in paths {
            let key = discovery::rel_key(root, &path);
            let status = match coursesync_detector::classify(root, &path, in_module) {
                Ok(Some(d)) => {
                    let record = store.get(&d.rel_path);
                    FileStatus {
                        path: d.rel_path.clone(),
                        kind: Some(d.kind.to_string()),
                        state: freshness(file_mtime(&d.path), record).into(),
                        remote_id: record.map(|r| r.remote_id.to_string()),
                        error: None,
                    }
                }
                Ok(None) => continue,
                Err(e) => FileStatus {
                    path: key,
                    kind: None,
                    state: FileState::Error,
                    remote_id: None,
                    error: Some(e.to_string()),
                },
            };
            files.push(status);
        }
    }

    let missing = missing_keys(root, &store);
    let pending = files
        .iter()
        .filter(|f| f.state.pending())
        .count();
    let errors = files
        .iter()
        .filter(|f| f.state == FileState::Error)
        .count();

    Ok(StatusReport {
        summary: Summary {
            files: files.len(),
            pending,
            errors,
            missing: missing.len(),
        },
        files,
        missing,
    })
}

fn state_label(state: FileState) -> String {
    match state {
        FileState::New => "NEW".green().bold().to_string(),
        FileState::Stub => "STUB".cyan().bold().to_string(),
        FileState::Modified => "MODIFIED".yellow().bold().to_string(),
        FileState::Current => "current".bright_black().to_string(),
        FileState::Error => "ERROR".red().bold().to_string(),
    }
}

fn print_table(report: &StatusReport) {
    let s = &report.summary;
    println!(
        "coursesync v{} | {} files | {} to sync | {} errors",
        env!("CARGO_PKG_VERSION"),
        s.files,
        s.pending,
        s.errors,
    );
    if report.files.is_empty() {
        println!("No content found.");
    } else {
        let rows: Vec<StatusTableRow> = report
            .files
            .iter()
            .map(|f| StatusTableRow {
                path: f.path.clone(),
                kind: f.kind.clone().unwrap_or_else(|| "?".into()),
                state: match &f.error {
                    Some(e) => format!("{} {e}", state_label(f.state)),
                    None => state_label(f.state),
                },
                remote_id: f.remote_id.clone().unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    if s.missing > 0 {
        println!(
            "{} map entries point at paths that no longer exist; run 'coursesync map prune-missing'.",
            s.missing
        );
    }
    if s.pending > 0 {
        println!("Run 'coursesync sync' to publish pending changes.");
    }
}
