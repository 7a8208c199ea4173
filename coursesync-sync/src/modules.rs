//! Modules and module items.
//!
//! A module is looked up like any other object, keyed by its directory.
//! Items are matched by what they point at, so renaming a file never creates
//! a second item:
//!
//! | item type  | matched on                        |
//! |------------|-----------------------------------|
//! | Page       | `page_url` == page `url`          |
//! | Assignment | `content_id` == object id         |
//! | Quiz       | `content_id` == object id         |
//! | File       | `content_id` == object id         |
//! | SubHeader  | recorded item id, then title      |

use serde_json::Value;

use coursesync_core::discovery::ModuleDir;
use coursesync_core::{ContentDescriptor, ContentKind, RemoteId, RemoteKind};

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::identity::IdentityRecord;
use crate::payload;
use crate::remote::{id_string, Fields, RemoteObject};
use crate::resolver::{resolve, Lookup, Resolution};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRef {
    pub id: RemoteId,
    pub name: String,
}

/// Find or create the module for `dir`; renames it when the name changed.
pub fn ensure_module(ctx: &mut SyncContext<'_>, dir: &ModuleDir) -> Result<ModuleRef, SyncError> {
    let recorded = ctx.store.get(&dir.rel_path).map(|r| r.remote_id.clone());
    let lookup = Lookup::new(RemoteKind::Module, &dir.name, recorded.as_ref());

    let id = match resolve(ctx.remote, &lookup)? {
        Resolution::ById(obj) | Resolution::ByTitle(obj) => {
            if obj.title != dir.name {
                tracing::info!(module = %dir.name, id = %obj.id, "renaming module");
                ctx.remote
                    .update_object(RemoteKind::Module, None, &obj.id, &payload::module(&dir.name))?;
                ctx.report.updated += 1;
            }
            obj.id
        }
        Resolution::NotFound => {
            tracing::info!(module = %dir.name, "creating module");
            let obj = ctx
                .remote
                .create_object(RemoteKind::Module, None, &payload::module(&dir.name))?;
            ctx.report.created += 1;
            obj.id
        }
    };

    if recorded.as_ref() != Some(&id) {
        ctx.record(&dir.rel_path, IdentityRecord::new(id.clone(), RemoteKind::Module));
    }
    Ok(ModuleRef {
        id,
        name: dir.name.clone(),
    })
}

fn item_type(obj: &RemoteObject) -> Option<&str> {
    obj.str_field("type")
}

fn item_indent(obj: &RemoteObject) -> u8 {
    obj.fields
        .get("indent")
        .and_then(Value::as_u64)
        .map_or(0, |n| n.min(5) as u8)
}

/// Fields of `item` that differ from what the file asks for.
fn item_diff(item: &RemoteObject, title: &str, indent: u8, published: bool) -> Fields {
    let mut f = Fields::new();
    if item.title != title {
        f.insert("title".into(), title.into());
    }
    if item_indent(item) != indent {
        f.insert("indent".into(), indent.into());
    }
    if item.bool_field("published") != Some(published) {
        f.insert("published".into(), published.into());
    }
    f
}

/// Attach `object` (the synced counterpart of `d`) to `module`, or bring its
/// existing item in line. Returns the module item.
pub fn attach(
    ctx: &mut SyncContext<'_>,
    module: &ModuleRef,
    d: &ContentDescriptor,
    object: &RemoteObject,
) -> Result<RemoteObject, SyncError> {
    let Some(kind) = d.kind.module_item_type() else {
        return Err(SyncError::NotAttachable(d.kind));
    };
    let items = ctx.remote.list_module_items(&module.id)?;
    let page_url = object.str_field("url").map(str::to_string);

    let existing = items.into_iter().find(|item| {
        item_type(item) == Some(kind)
            && match d.kind {
                ContentKind::Page => {
                    page_url.is_some() && item.str_field("page_url") == page_url.as_deref()
                }
                _ => content_id(item).as_deref() == Some(object.id.0.as_str()),
            }
    });

    place_item(ctx, module, d, kind, existing, |f| match d.kind {
        ContentKind::Page => {
            if let Some(url) = &page_url {
                f.insert("page_url".into(), url.as_str().into());
            }
        }
        _ => {
            f.insert("content_id".into(), object.id.0.as_str().into());
        }
    })
}

/// Text header inside a module. Its item id is recorded under the file key.
pub fn ensure_subheader(
    ctx: &mut SyncContext<'_>,
    module: &ModuleRef,
    d: &ContentDescriptor,
) -> Result<RemoteObject, SyncError> {
    let recorded = ctx.store.get(&d.rel_path).map(|r| r.remote_id.clone());
    let items = ctx.remote.list_module_items(&module.id)?;
    let subheaders = || items.iter().filter(|i| item_type(i) == Some("SubHeader"));

    let existing = recorded
        .as_ref()
        .and_then(|id| subheaders().find(|i| &i.id == id))
        .or_else(|| subheaders().find(|i| i.title == d.title))
        .cloned();

    let item = place_item(ctx, module, d, "SubHeader", existing, |_| {})?;
    ctx.record(&d.rel_path, IdentityRecord::new(item.id.clone(), RemoteKind::ModuleItem));
    Ok(item)
}

fn place_item(
    ctx: &mut SyncContext<'_>,
    module: &ModuleRef,
    d: &ContentDescriptor,
    kind: &str,
    existing: Option<RemoteObject>,
    target: impl FnOnce(&mut Fields),
) -> Result<RemoteObject, SyncError> {
    let indent = d.indent();
    let published = d.published();

    if let Some(item) = existing {
        let diff = item_diff(&item, &d.title, indent, published);
        if diff.is_empty() {
            return Ok(item);
        }
        tracing::debug!(module = %module.name, item = %item.id, changed = diff.len(), "updating module item");
        let updated = ctx.remote.update_module_item(&module.id, &item.id, &diff)?;
        return Ok(updated);
    }

    let mut fields = Fields::new();
    fields.insert("type".into(), kind.into());
    fields.insert("title".into(), d.title.as_str().into());
    fields.insert("indent".into(), indent.into());
    target(&mut fields);
    tracing::info!(module = %module.name, title = %d.title, kind, "adding module item");
    let item = ctx.remote.attach_module_item(&module.id, &fields)?;

    // Creation ignores the published flag.
    let mut visibility = Fields::new();
    visibility.insert("published".into(), published.into());
    let item = ctx.remote.update_module_item(&module.id, &item.id, &visibility)?;
    Ok(item)
}

/// The id of the object a module item points at.
pub fn content_id(item: &RemoteObject) -> Option<String> {
    item.fields.get("content_id").and_then(id_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, FakeRemote};
    use coursesync_core::{Body, CanvasMeta};
    use coursesync_renderer::PassthroughRenderer;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn dir(name: &str) -> ModuleDir {
        ModuleDir {
            name: name.into(),
            rel_path: format!("01_{name}"),
            path: PathBuf::from(format!("/c/01_{name}")),
            order: Some(1),
        }
    }

    fn descriptor(kind: ContentKind, title: &str) -> ContentDescriptor {
        ContentDescriptor {
            kind,
            rel_path: "01_Basics/01_Item".into(),
            path: PathBuf::from("/c/01_Basics/01_Item"),
            order: Some(1),
            title: title.into(),
            settings: CanvasMeta::default(),
            body: Body::None,
        }
    }

    #[test]
    fn module_created_once_then_left_alone() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();

        let first = ensure_module(&mut ctx, &dir("Basics")).unwrap();
        remote.reset_calls();
        let second = ensure_module(&mut ctx, &dir("Basics")).unwrap();

        assert_eq!(first, second);
        assert_eq!(remote.count(CallKind::Create), 0);
        assert_eq!(remote.count(CallKind::Update), 0);
    }

    #[test]
    fn page_attached_with_separate_visibility_edit() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let module = ensure_module(&mut ctx, &dir("Basics")).unwrap();
        let page_id = remote.insert(RemoteKind::Page, None, "Intro", Fields::new());
        let page = remote.object(RemoteKind::Page, &page_id).unwrap();
        remote.reset_calls();

        let item = attach(&mut ctx, &module, &descriptor(ContentKind::Page, "Intro"), &page).unwrap();
        assert_eq!(item.str_field("page_url"), Some("intro"));
        assert_eq!(remote.count_kind(CallKind::Create, RemoteKind::ModuleItem), 1);
        assert_eq!(remote.count_kind(CallKind::Update, RemoteKind::ModuleItem), 1);

        remote.reset_calls();
        attach(&mut ctx, &module, &descriptor(ContentKind::Page, "Intro"), &page).unwrap();
        assert_eq!(remote.count(CallKind::Create), 0);
        assert_eq!(remote.count(CallKind::Update), 0, "unchanged item is not edited");
    }

    #[test]
    fn renamed_assignment_reuses_item() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let module = ensure_module(&mut ctx, &dir("Basics")).unwrap();
        let hw = remote.insert(RemoteKind::Assignment, None, "HW", Fields::new());
        let obj = remote.object(RemoteKind::Assignment, &hw).unwrap();

        let first = attach(&mut ctx, &module, &descriptor(ContentKind::Assignment, "HW"), &obj).unwrap();
        let second = attach(&mut ctx, &module, &descriptor(ContentKind::Assignment, "HW 1"), &obj).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "HW 1");
        assert_eq!(content_id(&second).as_deref(), Some(hw.0.as_str()));
    }

    #[test]
    fn subheader_is_recorded_and_published_by_default() {
        let tmp = TempDir::new().unwrap();
        let remote = FakeRemote::new();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let module = ensure_module(&mut ctx, &dir("Basics")).unwrap();

        let d = descriptor(ContentKind::Subheader, "Week 1");
        let item = ensure_subheader(&mut ctx, &module, &d).unwrap();
        assert_eq!(item.bool_field("published"), Some(true));
        assert_eq!(ctx.store.get(&d.rel_path).unwrap().remote_id, item.id);
        assert_eq!(ctx.store.get(&d.rel_path).unwrap().remote_kind, Some(RemoteKind::ModuleItem));
    }
}
