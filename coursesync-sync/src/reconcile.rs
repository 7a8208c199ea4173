//! Create-or-update of one remote object, and link-target stubs.

use coursesync_core::{ContentDescriptor, RemoteKind};

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::identity::IdentityRecord;
use crate::payload;
use crate::remote::{Fields, RemoteObject};
use crate::resolver::{resolve, Lookup, Resolution};

#[derive(Debug, Clone)]
pub struct Upserted {
    pub object: RemoteObject,
    pub created: bool,
}

/// Resolve `lookup`; update the match with `update`, or create from `create`.
pub fn upsert(
    ctx: &mut SyncContext<'_>,
    lookup: &Lookup<'_>,
    create: &Fields,
    update: &Fields,
) -> Result<Upserted, SyncError> {
    let resolution = resolve(ctx.remote, lookup)?;
    let existing = match resolution {
        Resolution::ById(obj) => Some(obj),
        Resolution::ByTitle(obj) => {
            ctx.report.title_fallbacks += 1;
            Some(obj)
        }
        Resolution::NotFound => None,
    };

    match existing {
        Some(obj) => {
            tracing::info!(kind = %lookup.kind, id = %obj.id, title = lookup.title, "updating");
            let object = ctx
                .remote
                .update_object(lookup.kind, lookup.parent, &obj.id, update)?;
            ctx.report.updated += 1;
            Ok(Upserted {
                object: with_url_of(object, &obj),
                created: false,
            })
        }
        None => {
            tracing::info!(kind = %lookup.kind, title = lookup.title, "creating");
            let object = ctx.remote.create_object(lookup.kind, lookup.parent, create)?;
            ctx.report.created += 1;
            Ok(Upserted {
                object,
                created: true,
            })
        }
    }
}

/// Some endpoints return sparse update responses; keep the locator we had.
fn with_url_of(mut updated: RemoteObject, before: &RemoteObject) -> RemoteObject {
    if updated.url.is_none() {
        updated.url = before.url.clone();
    }
    for (k, v) in &before.fields {
        updated.fields.entry(k.clone()).or_insert_with(|| v.clone());
    }
    updated
}

/// Record `object` as the remote counterpart of `key`, without a marker.
/// The marker is set once every step for the file has succeeded.
pub fn record_object(ctx: &mut SyncContext<'_>, key: &str, kind: RemoteKind, object: &RemoteObject) {
    let mut record = IdentityRecord::new(object.id.clone(), kind);
    record.url = object.url.clone();
    ctx.record(key, record);
}

/// Obtain a remote object for a link target that has no record yet.
///
/// An existing object with the same exact title is adopted; otherwise a
/// minimal unpublished stub is created. Either way the record is marked as a
/// placeholder so the target's own sync updates it in place.
pub fn ensure_stub(ctx: &mut SyncContext<'_>, target: &ContentDescriptor) -> Result<IdentityRecord, SyncError> {
    let kind = target.kind.remote_kind();
    let lookup = Lookup::new(kind, &target.title, None);
    let object = match resolve(ctx.remote, &lookup)? {
        Resolution::ById(obj) | Resolution::ByTitle(obj) => {
            ctx.report.title_fallbacks += 1;
            obj
        }
        Resolution::NotFound => {
            tracing::info!(target = %target.rel_path, %kind, "creating placeholder for forward link");
            let obj = ctx
                .remote
                .create_object(kind, None, &payload::stub(target.kind, &target.title))?;
            ctx.report.stubs += 1;
            obj
        }
    };

    let mut record = IdentityRecord::new(object.id.clone(), kind);
    record.url = object.url.clone();
    record.placeholder = true;
    ctx.record(&target.rel_path, record.clone());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, FakeRemote};
    use coursesync_core::{Body, CanvasMeta, ContentKind, RemoteId};
    use coursesync_renderer::PassthroughRenderer;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn target(title: &str) -> ContentDescriptor {
        ContentDescriptor {
            kind: ContentKind::Page,
            rel_path: "02_Next.qmd".into(),
            path: PathBuf::from("/c/02_Next.qmd"),
            order: Some(2),
            title: title.into(),
            settings: CanvasMeta::default(),
            body: Body::None,
        }
    }

    #[test]
    fn upsert_creates_then_updates_by_id() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();

        let mut fields = Fields::new();
        fields.insert("title".into(), "Intro".into());
        let first = upsert(&mut ctx, &Lookup::new(RemoteKind::Page, "Intro", None), &fields, &fields).unwrap();
        assert!(first.created);

        let id: RemoteId = first.object.id.clone();
        let second = upsert(
            &mut ctx,
            &Lookup::new(RemoteKind::Page, "Intro", Some(&id)),
            &fields,
            &fields,
        )
        .unwrap();
        assert!(!second.created);
        assert_eq!(second.object.id, id);
        assert_eq!(ctx.report.created, 1);
        assert_eq!(ctx.report.updated, 1);
        assert_eq!(ctx.report.title_fallbacks, 0);
    }

    #[test]
    fn stub_is_recorded_as_placeholder() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();

        let rec = ensure_stub(&mut ctx, &target("Next")).unwrap();
        assert!(rec.placeholder);
        assert!(rec.mtime.is_none());
        assert_eq!(ctx.store.get("02_Next.qmd"), Some(&rec));
        assert_eq!(ctx.report.stubs, 1);

        let obj = remote.object(RemoteKind::Page, &rec.remote_id).unwrap();
        assert_eq!(obj.bool_field("published"), Some(false));
        assert_eq!(remote.count(CallKind::Create), 1);
    }

    #[test]
    fn stub_adopts_existing_title_match() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let existing = remote.insert(RemoteKind::Page, None, "Next", Fields::new());
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();

        let rec = ensure_stub(&mut ctx, &target("Next")).unwrap();
        assert_eq!(rec.remote_id, existing);
        assert_eq!(remote.count(CallKind::Create), 0);
    }
}
