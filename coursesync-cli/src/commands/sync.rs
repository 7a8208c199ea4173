//! `coursesync sync`: reconcile a content root with its course.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use coursesync_core::config::{self, CourseContext};
use coursesync_renderer::{PassthroughRenderer, QuartoRenderer, Renderer};
use coursesync_sync::{CanvasClient, SyncOptions, SyncReport};

/// Arguments for `coursesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Content root directory.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Course id; overrides `course_id.txt` in the content root.
    #[arg(long)]
    pub course_id: Option<String>,

    /// Also sync `schedule.yaml` into the course calendar.
    #[arg(long)]
    pub sync_calendar: bool,

    /// Keep unreferenced uploads instead of deleting them.
    #[arg(long)]
    pub no_prune: bool,

    /// Send Markdown as-is instead of rendering it with Quarto.
    #[arg(long)]
    pub no_render: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;
        let credentials = config::credentials().context("Canvas credentials are not configured")?;
        let course_id = config::course_id_at(&root, self.course_id.as_deref())
            .context("no course id; pass --course-id or run `coursesync init`")?;

        let client = CanvasClient::new(&CourseContext {
            credentials,
            course_id: course_id.clone(),
        });
        let renderer: Box<dyn Renderer> = if self.no_render {
            Box::new(PassthroughRenderer)
        } else {
            Box::new(QuartoRenderer::new())
        };
        let options = SyncOptions {
            sync_calendar: self.sync_calendar,
            prune: !self.no_prune,
            ..SyncOptions::default()
        };

        let report = coursesync_sync::run(&root, &client, renderer.as_ref(), options)
            .with_context(|| format!("sync failed for course {course_id}"))?;
        print_report(&course_id, &report);

        if !report.is_clean() {
            anyhow::bail!(
                "{} file(s) failed to sync",
                report.failures.len()
                    + report.prune.as_ref().map_or(0, |p| p.failures.len())
            );
        }
        Ok(())
    }
}

fn print_report(course_id: &str, report: &SyncReport) {
    let mark = if report.is_clean() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{mark} course {course_id}: {} created, {} updated, {} unchanged",
        report.created, report.updated, report.unchanged
    );
    if report.stubs + report.uploads + report.title_fallbacks > 0 {
        println!(
            "  {} stubs, {} uploads, {} matched by title",
            report.stubs, report.uploads, report.title_fallbacks
        );
    }

    for f in &report.failures {
        println!("  {} {}: {}", "✗".red(), f.path, f.error);
    }
    for a in &report.attention {
        println!("  {} {} ({}): {}", "!".yellow().bold(), a.path, a.locator, a.reason);
    }

    if let Some(prune) = &report.prune {
        for d in &prune.deleted {
            println!("  {}  {}/{}", "−".bright_black(), d.namespace, d.name);
        }
        for f in &prune.failures {
            let what = if f.asset.is_empty() { "listing" } else { f.asset.as_str() };
            println!("  {} {}/{}: {}", "✗".red(), f.namespace, what, f.error);
        }
    }
}
