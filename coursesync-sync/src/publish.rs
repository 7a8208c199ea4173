//! Publish cycle around classic quiz edits.
//!
//! Question edits on a published quiz only reach students once the quiz is
//! re-published, so the quiz is taken to draft, edited, and published again.
//! When the remote refuses to unpublish (students have submitted) the edits
//! are applied in place and the quiz is flagged for manual regeneration.

use coursesync_core::{RemoteId, RemoteKind};

use crate::remote::{Fields, RemoteApi, RemoteError};
use crate::report::Attention;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Draft,
    PublishedClean,
    /// Published, edited in place; the student-facing snapshot is outdated.
    PublishedStaleSnapshot,
}

impl PublishState {
    pub fn from_published(published: bool) -> Self {
        if published {
            PublishState::PublishedClean
        } else {
            PublishState::Draft
        }
    }
}

fn set_published(
    remote: &dyn RemoteApi,
    kind: RemoteKind,
    id: &RemoteId,
    published: bool,
) -> Result<(), RemoteError> {
    let mut f = Fields::new();
    f.insert("published".into(), published.into());
    remote.update_object(kind, None, id, &f).map(|_| ())
}

/// Move to a state where edits can be applied.
pub fn open_for_edit(
    remote: &dyn RemoteApi,
    kind: RemoteKind,
    id: &RemoteId,
    state: PublishState,
) -> Result<PublishState, RemoteError> {
    if state != PublishState::PublishedClean {
        return Ok(state);
    }
    match set_published(remote, kind, id, false) {
        Ok(()) => Ok(PublishState::Draft),
        Err(RemoteError::CapabilityBlocked(reason)) => {
            tracing::warn!(%kind, %id, %reason, "cannot unpublish, editing in place");
            Ok(PublishState::PublishedStaleSnapshot)
        }
        Err(e) => Err(e),
    }
}

/// Settle on the desired visibility after edits.
///
/// Returns the final state plus an attention entry when the snapshot could
/// not be regenerated.
pub fn close_after_edit(
    remote: &dyn RemoteApi,
    kind: RemoteKind,
    id: &RemoteId,
    state: PublishState,
    desired: bool,
    rel_path: &str,
    locator: &str,
) -> Result<(PublishState, Option<Attention>), RemoteError> {
    match (state, desired) {
        (PublishState::Draft, true) => {
            set_published(remote, kind, id, true)?;
            Ok((PublishState::PublishedClean, None))
        }
        (PublishState::PublishedClean, false) => {
            set_published(remote, kind, id, false)?;
            Ok((PublishState::Draft, None))
        }
        (PublishState::PublishedStaleSnapshot, _) => Ok((
            state,
            Some(Attention {
                path: rel_path.to_string(),
                locator: locator.to_string(),
                reason: "published quiz edited in place; regenerate the student snapshot".into(),
            }),
        )),
        (state, _) => Ok((state, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, FakeRemote};

    fn published_quiz(remote: &FakeRemote) -> RemoteId {
        let mut f = Fields::new();
        f.insert("published".into(), true.into());
        remote.insert(RemoteKind::Quiz, None, "Quiz", f)
    }

    #[test]
    fn clean_cycle_unpublishes_then_republishes() {
        let remote = FakeRemote::new();
        let id = published_quiz(&remote);

        let state = open_for_edit(&remote, RemoteKind::Quiz, &id, PublishState::PublishedClean).unwrap();
        assert_eq!(state, PublishState::Draft);
        let (state, attention) =
            close_after_edit(&remote, RemoteKind::Quiz, &id, state, true, "q.json", "u").unwrap();
        assert_eq!(state, PublishState::PublishedClean);
        assert!(attention.is_none());
        assert_eq!(remote.count(CallKind::Update), 2);
    }

    #[test]
    fn blocked_unpublish_is_flagged() {
        let remote = FakeRemote::new();
        let id = published_quiz(&remote);
        remote.block_unpublish(RemoteKind::Quiz, &id);

        let state = open_for_edit(&remote, RemoteKind::Quiz, &id, PublishState::PublishedClean).unwrap();
        assert_eq!(state, PublishState::PublishedStaleSnapshot);
        let (state, attention) =
            close_after_edit(&remote, RemoteKind::Quiz, &id, state, true, "q.json", "https://lms.test/q").unwrap();
        assert_eq!(state, PublishState::PublishedStaleSnapshot);
        assert_eq!(attention.unwrap().locator, "https://lms.test/q");
    }

    #[test]
    fn draft_stays_draft_when_not_desired() {
        let remote = FakeRemote::new();
        let id = remote.insert(RemoteKind::Quiz, None, "Quiz", Fields::new());
        let state = open_for_edit(&remote, RemoteKind::Quiz, &id, PublishState::Draft).unwrap();
        let (state, _) = close_after_edit(&remote, RemoteKind::Quiz, &id, state, false, "q", "u").unwrap();
        assert_eq!(state, PublishState::Draft);
        assert_eq!(remote.count(CallKind::Update), 0);
    }
}
