//! Rewrite local references in Markdown to remote locators.
//!
//! `![alt](img.png)` uploads into `synced-images`; `[text](notes.pdf)` into
//! `synced-files`; `[text](02_Next.qmd)` becomes a link to the synced object,
//! creating an unpublished stub when the target has not been synced yet.
//! External schemes and in-page anchors are left alone, as is anything that
//! fails to resolve.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use coursesync_core::discovery;

use crate::assets::{ensure_uploaded, FOLDER_FILES, FOLDER_IMAGES};
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::reconcile::ensure_stub;

static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

const EXTERNAL: [&str; 4] = ["http:", "https:", "data:", "mailto:"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewritten {
    pub body: String,
    /// Identity keys of every asset the body references.
    pub assets: Vec<String>,
    /// Uploads that failed, as `key: error`.
    pub failed: Vec<String>,
}

fn is_external(target: &str) -> bool {
    target.starts_with('#') || EXTERNAL.iter().any(|s| target.starts_with(s))
}

fn is_content(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("qmd") | Some("json")
    )
}

/// Rewrite the references in `body`, a file located at `current`.
pub fn rewrite_links(ctx: &mut SyncContext<'_>, body: &str, current: &Path) -> Rewritten {
    let dir = current.parent().unwrap_or(ctx.root.as_path()).to_path_buf();
    let mut assets = Vec::new();
    let mut failed = Vec::new();

    let body = LINK
        .replace_all(body, |caps: &Captures<'_>| {
            let whole = caps[0].to_string();
            let image = !caps[1].is_empty();
            let text = &caps[2];
            let raw = &caps[3];
            if is_external(raw) {
                return whole;
            }

            let (target, fragment) = match raw.split_once('#') {
                Some((t, f)) => (t, Some(f)),
                None => (raw, None),
            };
            let path = discovery::normalize(&dir.join(target));
            if !path.is_file() {
                tracing::warn!(file = %current.display(), target = raw, "link target not found, leaving as is");
                return whole;
            }

            let resolved = if image {
                upload(ctx, &path, FOLDER_IMAGES, &mut assets, &mut failed)
            } else if is_content(&path) {
                cross_link(ctx, &path)
            } else {
                upload(ctx, &path, FOLDER_FILES, &mut assets, &mut failed)
            };

            match resolved {
                Ok(Some(url)) => {
                    let url = match fragment {
                        Some(f) => format!("{url}#{f}"),
                        None => url,
                    };
                    format!("{}[{}]({})", &caps[1], text, url)
                }
                Ok(None) => whole,
                Err(e) => {
                    tracing::warn!(file = %current.display(), target = raw, error = %e, "could not resolve link, leaving as is");
                    whole
                }
            }
        })
        .into_owned();

    assets.sort();
    assets.dedup();
    Rewritten {
        body,
        assets,
        failed,
    }
}

/// Upload one referenced asset.
///
/// A failed upload of an asset synced before falls back to the previous copy:
/// its id stays active and its recorded URL is used. Either way the failure
/// is collected in `failed`.
fn upload(
    ctx: &mut SyncContext<'_>,
    path: &Path,
    namespace: &str,
    assets: &mut Vec<String>,
    failed: &mut Vec<String>,
) -> Result<Option<String>, SyncError> {
    let err = match ensure_uploaded(ctx, path, namespace) {
        Ok(asset) => {
            assets.push(asset.key);
            return Ok(Some(asset.url));
        }
        Err(e) => e,
    };

    let key = discovery::rel_key(&ctx.root, path);
    failed.push(format!("{key}: {err}"));
    let Some(rec) = ctx.store.get(&key) else {
        return Err(err);
    };
    let (id, url) = (rec.remote_id.clone(), rec.url.clone());
    tracing::warn!(asset = %key, error = %err, "upload failed, keeping the previous copy");
    ctx.active.mark_asset(id);
    assets.push(key);
    Ok(url)
}

/// Locator of the synced object for the content file at `path`.
///
/// `Ok(None)` when the target cannot be linked to or is itself being
/// created right now.
fn cross_link(ctx: &mut SyncContext<'_>, path: &Path) -> Result<Option<String>, SyncError> {
    let key = discovery::rel_key(&ctx.root, path);
    if ctx.in_flight.contains(&key) {
        tracing::debug!(target = %key, "link target is being synced, leaving as is");
        return Ok(None);
    }

    if let Some(rec) = ctx.store.get(&key) {
        ctx.active.mark_target(key.clone());
        if let Some(url) = &rec.url {
            return Ok(Some(url.clone()));
        }
        let (id, kind) = (rec.remote_id.clone(), rec.remote_kind);
        let Some(kind) = kind else {
            return Ok(None);
        };
        let url = ctx
            .remote
            .get_object(kind, None, &id)?
            .and_then(|obj| obj.url);
        if let (Some(url), Some(rec)) = (&url, ctx.store.get_mut(&key)) {
            rec.url = Some(url.clone());
        }
        return Ok(url);
    }

    let Some(target) = coursesync_detector::link_target(&ctx.root, path)? else {
        return Ok(None);
    };
    ctx.in_flight.insert(key.clone());
    let stub = ensure_stub(ctx, &target);
    ctx.in_flight.remove(&key);
    ctx.active.mark_target(key);
    Ok(stub?.url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityRecord;
    use crate::testing::{CallKind, FakeRemote};
    use coursesync_core::{RemoteId, RemoteKind};
    use coursesync_renderer::PassthroughRenderer;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FakeRemote) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("fig.png"), b"png").unwrap();
        fs::write(tmp.path().join("notes.pdf"), b"pdf").unwrap();
        fs::write(tmp.path().join("02_Next.qmd"), "---\ntitle: Next\n---\nbody\n").unwrap();
        (tmp, FakeRemote::new())
    }

    #[test]
    fn external_and_anchor_links_untouched() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let body = "[a](https://x.org) [b](#sec) ![c](data:image/png;base64,AA) [d](mailto:a@b)";
        let out = rewrite_links(&mut ctx, body, &tmp.path().join("01_Intro.qmd"));
        assert_eq!(out.body, body);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn images_and_files_go_to_their_folders() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let out = rewrite_links(
            &mut ctx,
            "![fig](fig.png) and [notes](notes.pdf#page=2)",
            &tmp.path().join("01_Intro.qmd"),
        );

        let img = &remote.assets(FOLDER_IMAGES)[0];
        let pdf = &remote.assets(FOLDER_FILES)[0];
        assert_eq!(
            out.body,
            format!("![fig]({}) and [notes]({}#page=2)", img.url, pdf.url)
        );
        assert_eq!(out.assets, vec!["fig.png".to_string(), "notes.pdf".to_string()]);
    }

    #[test]
    fn forward_link_creates_one_stub() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let current = tmp.path().join("01_Intro.qmd");

        let first = rewrite_links(&mut ctx, "[next](02_Next.qmd)", &current);
        let second = rewrite_links(&mut ctx, "[next](02_Next.qmd)", &current);

        assert_eq!(first.body, "[next](https://lms.test/pages/next)");
        assert_eq!(first.body, second.body);
        assert_eq!(remote.count(CallKind::Create), 1);
        assert!(ctx.store.get("02_Next.qmd").unwrap().placeholder);
        assert!(ctx.active.targets().contains("02_Next.qmd"));
    }

    #[test]
    fn in_flight_target_is_left_alone() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        ctx.in_flight.insert("02_Next.qmd".into());

        let out = rewrite_links(&mut ctx, "[next](02_Next.qmd)", &tmp.path().join("01_Intro.qmd"));
        assert_eq!(out.body, "[next](02_Next.qmd)");
        assert_eq!(remote.count(CallKind::Create), 0);
    }

    #[test]
    fn record_without_locator_is_fetched_once() {
        let (tmp, remote) = setup();
        let id = remote.insert(RemoteKind::Page, None, "Next", Default::default());
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        ctx.store.put("02_Next.qmd", IdentityRecord::new(id.clone(), RemoteKind::Page));

        let current = tmp.path().join("01_Intro.qmd");
        rewrite_links(&mut ctx, "[n](02_Next.qmd)", &current);
        rewrite_links(&mut ctx, "[n](02_Next.qmd)", &current);
        assert_eq!(remote.count(CallKind::Get), 1);
        assert_eq!(ctx.store.get("02_Next.qmd").unwrap().remote_id, RemoteId::from("100"));
    }

    #[test]
    fn failed_upload_keeps_previous_copy() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let mut rec = IdentityRecord::new(RemoteId::from("7"), RemoteKind::File);
        rec.url = Some("https://lms.test/files/7/preview".into());
        ctx.store.put("fig.png", rec);
        remote.fail_uploads(true);

        let out = rewrite_links(
            &mut ctx,
            "![fig](fig.png) [notes](notes.pdf)",
            &tmp.path().join("01_Intro.qmd"),
        );
        assert_eq!(
            out.body,
            "![fig](https://lms.test/files/7/preview) [notes](notes.pdf)"
        );
        assert_eq!(out.assets, vec!["fig.png".to_string()]);
        assert_eq!(out.failed.len(), 2);
        assert!(ctx.active.is_active(&RemoteId::from("7")));
    }

    #[test]
    fn missing_target_is_left_alone() {
        let (tmp, remote) = setup();
        let renderer = PassthroughRenderer;
        let mut ctx = SyncContext::new(tmp.path(), &remote, &renderer).unwrap();
        let out = rewrite_links(&mut ctx, "[x](gone.qmd)", &tmp.path().join("01_Intro.qmd"));
        assert_eq!(out.body, "[x](gone.qmd)");
        assert!(out.assets.is_empty());
    }
}
