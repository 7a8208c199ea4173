//! Find the remote object a local file corresponds to.
//!
//! A recorded id is authoritative. Without one, or when the recorded object
//! is gone, the object is searched by exact title; the first listed exact
//! match wins.

use coursesync_core::{RemoteId, RemoteKind};

use crate::remote::{RemoteApi, RemoteError, RemoteObject};

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    ById(RemoteObject),
    ByTitle(RemoteObject),
    NotFound,
}

impl Resolution {
    pub fn object(&self) -> Option<&RemoteObject> {
        match self {
            Resolution::ById(o) | Resolution::ByTitle(o) => Some(o),
            Resolution::NotFound => None,
        }
    }

    pub fn into_object(self) -> Option<RemoteObject> {
        match self {
            Resolution::ById(o) | Resolution::ByTitle(o) => Some(o),
            Resolution::NotFound => None,
        }
    }
}

/// What to look for.
#[derive(Debug, Clone)]
pub struct Lookup<'a> {
    pub kind: RemoteKind,
    pub parent: Option<&'a RemoteId>,
    pub title: &'a str,
    pub recorded: Option<&'a RemoteId>,
    /// Extra condition for title matches: `(field, prefix)`. Calendar events
    /// share titles across dates, so they also match on `start_at`.
    pub also_match: Option<(&'a str, &'a str)>,
}

impl<'a> Lookup<'a> {
    pub fn new(kind: RemoteKind, title: &'a str, recorded: Option<&'a RemoteId>) -> Self {
        Lookup {
            kind,
            parent: None,
            title,
            recorded,
            also_match: None,
        }
    }

    pub fn under(mut self, parent: &'a RemoteId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn matching(mut self, field: &'a str, prefix: &'a str) -> Self {
        self.also_match = Some((field, prefix));
        self
    }
}

pub fn resolve(remote: &dyn RemoteApi, lookup: &Lookup<'_>) -> Result<Resolution, RemoteError> {
    if let Some(id) = lookup.recorded {
        match remote.get_object(lookup.kind, lookup.parent, id)? {
            Some(obj) => return Ok(Resolution::ById(obj)),
            None => tracing::warn!(
                kind = %lookup.kind,
                id = %id,
                title = lookup.title,
                "recorded object no longer exists, searching by title"
            ),
        }
    }

    let candidates = remote.list_objects(lookup.kind, lookup.parent, Some(lookup.title))?;
    let mut matches: Vec<RemoteObject> = candidates
        .into_iter()
        .filter(|o| o.title == lookup.title)
        .filter(|o| match lookup.also_match {
            Some((field, prefix)) => o.str_field(field).is_some_and(|v| v.starts_with(prefix)),
            None => true,
        })
        .collect();

    if matches.is_empty() {
        return Ok(Resolution::NotFound);
    }
    if matches.len() > 1 {
        tracing::warn!(
            kind = %lookup.kind,
            title = lookup.title,
            candidates = matches.len(),
            "several remote objects share this title, using the first"
        );
    }
    let found = matches.swap_remove(0);
    tracing::warn!(kind = %lookup.kind, title = lookup.title, id = %found.id, "matched by title");
    Ok(Resolution::ByTitle(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallKind, FakeRemote};

    #[test]
    fn recorded_id_is_authoritative() {
        let remote = FakeRemote::new();
        let id = remote.insert(RemoteKind::Page, None, "Renamed", Default::default());
        let res = resolve(&remote, &Lookup::new(RemoteKind::Page, "Old title", Some(&id))).unwrap();
        assert!(matches!(res, Resolution::ById(ref o) if o.id == id));
        assert_eq!(remote.count(CallKind::List), 0);
    }

    #[test]
    fn stale_id_falls_back_to_exact_title() {
        let remote = FakeRemote::new();
        remote.insert(RemoteKind::Page, None, "intro", Default::default());
        let want = remote.insert(RemoteKind::Page, None, "Intro", Default::default());
        let gone = RemoteId::from("9999");

        let res = resolve(&remote, &Lookup::new(RemoteKind::Page, "Intro", Some(&gone))).unwrap();
        assert_eq!(res.object().map(|o| &o.id), Some(&want));
        assert!(matches!(res, Resolution::ByTitle(_)));
    }

    #[test]
    fn first_listed_wins_ties() {
        let remote = FakeRemote::new();
        let first = remote.insert(RemoteKind::Assignment, None, "HW", Default::default());
        remote.insert(RemoteKind::Assignment, None, "HW", Default::default());

        let res = resolve(&remote, &Lookup::new(RemoteKind::Assignment, "HW", None)).unwrap();
        assert_eq!(res.into_object().unwrap().id, first);
    }

    #[test]
    fn prefix_filter_narrows_title_matches() {
        let remote = FakeRemote::new();
        let mut f = crate::remote::Fields::new();
        f.insert("start_at".into(), "2025-01-06T12:00:00".into());
        remote.insert(RemoteKind::CalendarEvent, None, "Lecture", f);
        let mut g = crate::remote::Fields::new();
        g.insert("start_at".into(), "2025-01-08T12:00:00".into());
        let want = remote.insert(RemoteKind::CalendarEvent, None, "Lecture", g);

        let lookup = Lookup::new(RemoteKind::CalendarEvent, "Lecture", None)
            .matching("start_at", "2025-01-08");
        let res = resolve(&remote, &lookup).unwrap();
        assert_eq!(res.into_object().unwrap().id, want);
    }

    #[test]
    fn nothing_found() {
        let remote = FakeRemote::new();
        let res = resolve(&remote, &Lookup::new(RemoteKind::Quiz, "Quiz 1", None)).unwrap();
        assert_eq!(res, Resolution::NotFound);
    }
}
