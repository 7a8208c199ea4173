//! One sync run over a content root.
//!
//! Calendar events (opt-in) go first, then modules and files in tree order.
//! Every file is classified and link-scanned; only new, placeholder or
//! modified files are rendered and reconciled. Each file's failure is
//! recorded and the run moves on. Pruning runs once the loop completes.

use std::path::Path;

use coursesync_core::discovery::{self, ModuleDir, TreeEntry};
use coursesync_core::retry::RetryPolicy;
use coursesync_core::{Body, ContentDescriptor, ContentKind, RemoteKind};
use coursesync_detector::calendar;
use coursesync_renderer::Renderer;

use crate::assets::{ensure_uploaded, protect_recorded_assets, FOLDER_FILES, RESERVED_NAMESPACES};
use crate::change::{file_mtime, freshness, Freshness};
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::links::rewrite_links;
use crate::modules::{attach, ensure_module, ensure_subheader, ModuleRef};
use crate::payload;
use crate::prune::prune;
use crate::quiz;
use crate::reconcile::{record_object, upsert};
use crate::remote::{RemoteApi, RemoteObject};
use crate::report::SyncReport;
use crate::resolver::Lookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub sync_calendar: bool,
    pub prune: bool,
    pub prune_policy: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            sync_calendar: false,
            prune: true,
            prune_policy: RetryPolicy::REMOTE_DELETE,
        }
    }
}

/// Module resolved on first use, so untouched modules cost no remote calls.
struct ModuleSlot<'m> {
    dir: &'m ModuleDir,
    resolved: Option<ModuleRef>,
}

impl<'m> ModuleSlot<'m> {
    fn get(&mut self, ctx: &mut SyncContext<'_>) -> Result<ModuleRef, SyncError> {
        if let Some(m) = &self.resolved {
            return Ok(m.clone());
        }
        let m = ensure_module(ctx, self.dir)?;
        self.resolved = Some(m.clone());
        Ok(m)
    }
}

pub fn run(
    root: &Path,
    remote: &dyn RemoteApi,
    renderer: &dyn Renderer,
    options: SyncOptions,
) -> Result<SyncReport, SyncError> {
    let mut ctx = SyncContext::new(root, remote, renderer)?;
    tracing::info!(root = %root.display(), records = ctx.store.len(), "starting sync");

    if options.sync_calendar {
        sync_calendar(&mut ctx);
    }

    for entry in discovery::scan(root)? {
        match entry {
            TreeEntry::Module { module, files } => {
                let mut slot = ModuleSlot {
                    dir: &module,
                    resolved: None,
                };
                for file in &files {
                    process_file(&mut ctx, file, Some(&mut slot));
                }
            }
            TreeEntry::RootFile(file) => process_file(&mut ctx, &file, None),
        }
    }
    ctx.save_store();

    if options.prune {
        let report = prune(remote, &RESERVED_NAMESPACES, &ctx.active, options.prune_policy);
        let deleted: Vec<String> = report.deleted.iter().map(|a| a.id.clone()).collect();
        if !deleted.is_empty() {
            ctx.store.retain(|_, r| {
                !(r.remote_kind == Some(RemoteKind::File) && deleted.contains(&r.remote_id.0))
            });
            ctx.save_store();
        }
        ctx.report.prune = Some(report);
    }

    let report = ctx.report;
    tracing::info!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        failures = report.failures.len(),
        "sync finished"
    );
    Ok(report)
}

fn process_file(ctx: &mut SyncContext<'_>, path: &Path, module: Option<&mut ModuleSlot<'_>>) {
    let key = discovery::rel_key(&ctx.root, path);
    let descriptor = match coursesync_detector::classify(&ctx.root, path, module.is_some()) {
        Ok(Some(d)) => d,
        Ok(None) => {
            tracing::debug!(path = %key, "not content, skipping");
            return;
        }
        Err(e) => {
            ctx.report.fail(&key, &e);
            protect_recorded_assets(ctx, &key);
            return;
        }
    };

    ctx.in_flight.insert(key.clone());
    let result = sync_descriptor(ctx, &descriptor, module);
    ctx.in_flight.remove(&key);

    match result {
        Ok(()) => ctx.save_store(),
        Err(e) => {
            ctx.report.fail(&key, &e);
            protect_recorded_assets(ctx, &key);
            if let Some(rec) = ctx.store.get_mut(&key) {
                rec.mtime = None;
            }
        }
    }
}

fn sync_descriptor(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    module: Option<&mut ModuleSlot<'_>>,
) -> Result<(), SyncError> {
    let mtime = file_mtime(&d.path);
    let state = freshness(mtime, ctx.store.get(&d.rel_path));

    match (&d.body, d.kind) {
        (_, ContentKind::SoloFile) => sync_solo_file(ctx, d, state, module),
        (_, ContentKind::Subheader) => {
            if !state.needs_sync() {
                ctx.report.unchanged += 1;
                return Ok(());
            }
            let Some(slot) = module else {
                return Ok(());
            };
            let m = slot.get(ctx)?;
            ensure_subheader(ctx, &m, d)?;
            finish(ctx, d, mtime, Vec::new());
            Ok(())
        }
        (Body::Markdown(source), _) => {
            let scanned = rewrite_links(ctx, source, &d.path);
            check_uploads(ctx, d, &scanned.assets, &scanned.failed)?;
            if !state.needs_sync() {
                return unchanged(ctx, d, scanned.assets);
            }
            let work_dir = d.path.parent().unwrap_or(ctx.root.as_path());
            let stem = d
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let html = ctx.renderer.render(&scanned.body, work_dir, &stem)?;
            let object = reconcile_document(ctx, d, &html)?;
            place(ctx, d, &object, module)?;
            finish(ctx, d, mtime, scanned.assets);
            Ok(())
        }
        (Body::Questions(questions), ContentKind::Quiz | ContentKind::NewQuiz) => {
            let scanned = quiz::scan_links(ctx, d, questions);
            check_uploads(ctx, d, &scanned.assets, &scanned.failed)?;
            if !state.needs_sync() {
                return unchanged(ctx, d, scanned.assets);
            }
            let recorded = ctx.store.get(&d.rel_path).cloned();
            let recorded_id = recorded.as_ref().map(|r| r.remote_id.clone());
            let object = if d.kind == ContentKind::Quiz {
                let object = quiz::sync_classic(ctx, d, &scanned, recorded_id.as_ref())?;
                record_object(ctx, &d.rel_path, RemoteKind::Quiz, &object);
                object
            } else {
                let previous = recorded.map(|r| r.item_ids).unwrap_or_default();
                let (object, items) =
                    quiz::sync_new(ctx, d, &scanned, recorded_id.as_ref(), &previous)?;
                record_object(ctx, &d.rel_path, RemoteKind::NewQuiz, &object);
                if let Some(rec) = ctx.store.get_mut(&d.rel_path) {
                    rec.item_ids = items;
                }
                object
            };
            place(ctx, d, &object, module)?;
            finish(ctx, d, mtime, scanned.assets);
            Ok(())
        }
        (_, kind) => {
            tracing::warn!(path = %d.rel_path, %kind, "no sync path for this content");
            Ok(())
        }
    }
}

/// A referenced asset that failed to upload fails its file, so the file's
/// marker is not stamped and the next run retries it. The assets the scan
/// still references join the record and stay protected from pruning.
fn check_uploads(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    assets: &[String],
    failed: &[String],
) -> Result<(), SyncError> {
    if failed.is_empty() {
        return Ok(());
    }
    if let Some(rec) = ctx.store.get_mut(&d.rel_path) {
        rec.assets.extend(assets.iter().cloned());
        rec.assets.sort();
        rec.assets.dedup();
    }
    Err(SyncError::Uploads {
        count: failed.len(),
        detail: failed.join("; "),
    })
}

fn unchanged(ctx: &mut SyncContext<'_>, d: &ContentDescriptor, assets: Vec<String>) -> Result<(), SyncError> {
    tracing::debug!(path = %d.rel_path, "unchanged");
    ctx.report.unchanged += 1;
    if let Some(rec) = ctx.store.get_mut(&d.rel_path) {
        rec.assets = assets;
    }
    Ok(())
}

/// Create or update a page or assignment from rendered HTML, and record it.
fn reconcile_document(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    html: &str,
) -> Result<RemoteObject, SyncError> {
    let recorded = ctx.store.get(&d.rel_path).map(|r| r.remote_id.clone());
    let kind = d.kind.remote_kind();
    let (create, update) = match d.kind {
        ContentKind::Assignment => (
            payload::assignment(d, html, true),
            payload::assignment(d, html, false),
        ),
        _ => (payload::page(d, html), payload::page(d, html)),
    };
    let lookup = Lookup::new(kind, &d.title, recorded.as_ref());
    let up = upsert(ctx, &lookup, &create, &update)?;
    record_object(ctx, &d.rel_path, kind, &up.object);
    Ok(up.object)
}

fn place(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    object: &RemoteObject,
    module: Option<&mut ModuleSlot<'_>>,
) -> Result<(), SyncError> {
    if let Some(slot) = module {
        let m = slot.get(ctx)?;
        attach(ctx, &m, d, object)?;
    }
    Ok(())
}

/// Every step for the file succeeded: stamp the marker.
fn finish(ctx: &mut SyncContext<'_>, d: &ContentDescriptor, mtime: Option<f64>, assets: Vec<String>) {
    if let Some(rec) = ctx.store.get_mut(&d.rel_path) {
        rec.mtime = mtime;
        rec.placeholder = false;
        rec.assets = assets;
    }
    tracing::info!(path = %d.rel_path, kind = %d.kind, "synced");
}

fn sync_solo_file(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    state: Freshness,
    module: Option<&mut ModuleSlot<'_>>,
) -> Result<(), SyncError> {
    if !state.needs_sync() {
        if let Some(rec) = ctx.store.get(&d.rel_path) {
            let id = rec.remote_id.clone();
            ctx.active.mark_asset(id);
        }
        ctx.report.unchanged += 1;
        return Ok(());
    }

    let asset = ensure_uploaded(ctx, &d.path, FOLDER_FILES)?;
    if let Some(rec) = ctx.store.get_mut(&d.rel_path) {
        rec.mtime = None;
    }
    let object = RemoteObject {
        id: asset.id.clone(),
        title: d.title.clone(),
        url: Some(asset.url.clone()),
        fields: Default::default(),
    };
    place(ctx, d, &object, module)?;
    finish(ctx, d, file_mtime(&d.path), Vec::new());
    Ok(())
}

fn sync_calendar(ctx: &mut SyncContext<'_>) {
    let events = match calendar::expand_schedule(&ctx.root) {
        Ok(e) => e,
        Err(e) => {
            ctx.report.fail(calendar::SCHEDULE_FILE, &e);
            return;
        }
    };
    tracing::info!(events = events.len(), "syncing calendar");

    for d in &events {
        if let Err(e) = sync_event(ctx, d) {
            ctx.report.fail(&d.rel_path, &e);
        }
    }
    ctx.save_store();
}

fn sync_event(ctx: &mut SyncContext<'_>, d: &ContentDescriptor) -> Result<(), SyncError> {
    let Body::Event(ev) = &d.body else {
        return Ok(());
    };
    let mtime = file_mtime(&d.path);
    if !freshness(mtime, ctx.store.get(&d.rel_path)).needs_sync() {
        ctx.report.unchanged += 1;
        return Ok(());
    }

    let recorded = ctx.store.get(&d.rel_path).map(|r| r.remote_id.clone());
    let date = ev.start_at.get(..10).unwrap_or(&ev.start_at);
    let lookup = Lookup::new(RemoteKind::CalendarEvent, &d.title, recorded.as_ref())
        .matching("start_at", date);
    let fields = payload::event(d, ev);
    let up = upsert(ctx, &lookup, &fields, &fields)?;
    record_object(ctx, &d.rel_path, RemoteKind::CalendarEvent, &up.object);
    finish(ctx, d, mtime, Vec::new());
    Ok(())
}
