//! In-memory [`RemoteApi`] that records every call.
//!
//! Ids are sequential from 100 and objects list in insertion order, so tests
//! can assert on exact ids and tie-breaks.

use std::cell::RefCell;
use std::collections::BTreeSet;

use serde_json::Value;

use coursesync_core::{RemoteId, RemoteKind};

use crate::remote::{AssetInfo, Fields, RemoteApi, RemoteError, RemoteObject};

const BASE_URL: &str = "https://lms.test";
const FIRST_ID: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    List,
    Get,
    Create,
    Update,
    Delete,
    Upload,
    ListAssets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: CallKind,
    pub kind: Option<RemoteKind>,
    pub id: Option<RemoteId>,
}

#[derive(Debug, Clone)]
struct Stored {
    kind: RemoteKind,
    parent: Option<RemoteId>,
    id: RemoteId,
    fields: Fields,
}

#[derive(Debug, Clone)]
struct StoredAsset {
    namespace: String,
    info: AssetInfo,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    objects: Vec<Stored>,
    assets: Vec<StoredAsset>,
    calls: Vec<Call>,
    blocked: BTreeSet<(RemoteKind, RemoteId)>,
    failing_deletes: u32,
    failing_uploads: bool,
    failing_updates: BTreeSet<RemoteKind>,
}

#[derive(Debug)]
pub struct FakeRemote {
    state: RefCell<State>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn slug(title: &str) -> String {
    let mut out = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn title_of(kind: RemoteKind, fields: &Fields) -> String {
    let value = match kind {
        RemoteKind::NewQuizItem => fields.get("entry").and_then(|e| e.get("title")),
        _ => fields.get(kind.title_field()),
    };
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

impl Stored {
    fn to_object(&self) -> RemoteObject {
        RemoteObject {
            id: self.id.clone(),
            title: title_of(self.kind, &self.fields),
            url: self.fields.get("html_url").and_then(Value::as_str).map(String::from),
            fields: self.fields.clone(),
        }
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            state: RefCell::new(State {
                next_id: FIRST_ID,
                objects: Vec::new(),
                assets: Vec::new(),
                calls: Vec::new(),
                blocked: BTreeSet::new(),
                failing_deletes: 0,
                failing_uploads: false,
                failing_updates: BTreeSet::new(),
            }),
        }
    }

    fn log(&self, op: CallKind, kind: Option<RemoteKind>, id: Option<&RemoteId>) {
        self.state.borrow_mut().calls.push(Call {
            op,
            kind,
            id: id.cloned(),
        });
    }

    fn allocate(state: &mut State) -> RemoteId {
        let id = RemoteId::from(state.next_id);
        state.next_id += 1;
        id
    }

    fn store(&self, kind: RemoteKind, parent: Option<&RemoteId>, mut fields: Fields) -> RemoteObject {
        let mut state = self.state.borrow_mut();
        let id = Self::allocate(&mut state);
        let title = title_of(kind, &fields);
        let path = match kind {
            RemoteKind::Page => {
                let slug = slug(&title);
                fields.insert("url".into(), slug.as_str().into());
                format!("pages/{slug}")
            }
            other => format!("{other}/{id}"),
        };
        fields.insert("id".into(), id.0.as_str().into());
        fields.insert("html_url".into(), format!("{BASE_URL}/{path}").into());
        let stored = Stored {
            kind,
            parent: parent.cloned(),
            id,
            fields,
        };
        let obj = stored.to_object();
        state.objects.push(stored);
        obj
    }

    /// Seed an object without recording a call.
    pub fn insert(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        title: &str,
        mut fields: Fields,
    ) -> RemoteId {
        if kind == RemoteKind::NewQuizItem {
            let entry = fields
                .entry("entry".to_string())
                .or_insert_with(|| Value::Object(Fields::new()));
            if let Value::Object(entry) = entry {
                entry.entry("title".to_string()).or_insert_with(|| title.into());
            }
        } else {
            fields
                .entry(kind.title_field().to_string())
                .or_insert_with(|| title.into());
        }
        self.store(kind, parent, fields).id
    }

    /// Seed a file in `namespace` without recording a call.
    pub fn seed_asset(&self, namespace: &str, name: &str) -> RemoteId {
        let mut state = self.state.borrow_mut();
        let id = Self::allocate(&mut state);
        state.assets.push(StoredAsset {
            namespace: namespace.to_string(),
            info: AssetInfo {
                id: id.clone(),
                name: name.to_string(),
                url: format!("{BASE_URL}/files/{id}/preview"),
            },
        });
        id
    }

    pub fn object(&self, kind: RemoteKind, id: &RemoteId) -> Option<RemoteObject> {
        self.state
            .borrow()
            .objects
            .iter()
            .find(|o| o.kind == kind && &o.id == id)
            .map(Stored::to_object)
    }

    pub fn objects(&self, kind: RemoteKind) -> Vec<RemoteObject> {
        self.state
            .borrow()
            .objects
            .iter()
            .filter(|o| o.kind == kind)
            .map(Stored::to_object)
            .collect()
    }

    /// Delete an object behind the sync's back.
    pub fn remove(&self, kind: RemoteKind, id: &RemoteId) {
        self.state
            .borrow_mut()
            .objects
            .retain(|o| !(o.kind == kind && &o.id == id));
    }

    pub fn assets(&self, namespace: &str) -> Vec<AssetInfo> {
        self.state
            .borrow()
            .assets
            .iter()
            .filter(|a| a.namespace == namespace)
            .map(|a| a.info.clone())
            .collect()
    }

    /// Refuse `published: false` on this object.
    pub fn block_unpublish(&self, kind: RemoteKind, id: &RemoteId) {
        self.state.borrow_mut().blocked.insert((kind, id.clone()));
    }

    /// Make the next `n` deletions fail transiently.
    pub fn fail_next_deletes(&self, n: u32) {
        self.state.borrow_mut().failing_deletes = n;
    }

    /// Make every upload fail transiently until switched off.
    pub fn fail_uploads(&self, on: bool) {
        self.state.borrow_mut().failing_uploads = on;
    }

    /// Make every update of `kind` fail transiently.
    pub fn fail_updates(&self, kind: RemoteKind) {
        self.state.borrow_mut().failing_updates.insert(kind);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count(&self, op: CallKind) -> usize {
        self.state.borrow().calls.iter().filter(|c| c.op == op).count()
    }

    pub fn count_kind(&self, op: CallKind, kind: RemoteKind) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.op == op && c.kind == Some(kind))
            .count()
    }
}

impl RemoteApi for FakeRemote {
    fn list_objects(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        search: Option<&str>,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        self.log(CallKind::List, Some(kind), None);
        let needle = search.map(str::to_lowercase);
        Ok(self
            .state
            .borrow()
            .objects
            .iter()
            .filter(|o| o.kind == kind && o.parent.as_ref() == parent)
            .map(Stored::to_object)
            .filter(|o| {
                needle
                    .as_deref()
                    .map_or(true, |n| o.title.to_lowercase().contains(n))
            })
            .collect())
    }

    fn get_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<Option<RemoteObject>, RemoteError> {
        self.log(CallKind::Get, Some(kind), Some(id));
        Ok(self
            .state
            .borrow()
            .objects
            .iter()
            .find(|o| o.kind == kind && &o.id == id && (parent.is_none() || o.parent.as_ref() == parent))
            .map(Stored::to_object))
    }

    fn create_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        self.log(CallKind::Create, Some(kind), None);
        Ok(self.store(kind, parent, fields.clone()))
    }

    fn update_object(
        &self,
        kind: RemoteKind,
        _parent: Option<&RemoteId>,
        id: &RemoteId,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        self.log(CallKind::Update, Some(kind), Some(id));
        let mut state = self.state.borrow_mut();
        if state.failing_updates.contains(&kind) {
            return Err(RemoteError::Transient("503 service unavailable".into()));
        }
        let unpublishing = fields.get("published") == Some(&Value::Bool(false));
        if unpublishing && state.blocked.contains(&(kind, id.clone())) {
            return Err(RemoteError::CapabilityBlocked(
                "cannot unpublish: students have submitted".into(),
            ));
        }
        let stored = state
            .objects
            .iter_mut()
            .find(|o| o.kind == kind && &o.id == id)
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: format!("{kind} {id} not found"),
            })?;
        for (k, v) in fields {
            stored.fields.insert(k.clone(), v.clone());
        }
        Ok(stored.to_object())
    }

    fn delete_object(
        &self,
        kind: RemoteKind,
        _parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<(), RemoteError> {
        self.log(CallKind::Delete, Some(kind), Some(id));
        let mut state = self.state.borrow_mut();
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(RemoteError::Transient("503 service unavailable".into()));
        }
        let before = state.objects.len() + state.assets.len();
        if kind == RemoteKind::File {
            state.assets.retain(|a| &a.info.id != id);
        } else {
            state.objects.retain(|o| !(o.kind == kind && &o.id == id));
        }
        if before == state.objects.len() + state.assets.len() {
            return Err(RemoteError::Rejected {
                status: 404,
                message: format!("{kind} {id} not found"),
            });
        }
        Ok(())
    }

    fn upload_asset(
        &self,
        namespace: &str,
        name: &str,
        _bytes: &[u8],
    ) -> Result<AssetInfo, RemoteError> {
        self.log(CallKind::Upload, Some(RemoteKind::File), None);
        let mut state = self.state.borrow_mut();
        if state.failing_uploads {
            return Err(RemoteError::Transient("503 service unavailable".into()));
        }
        if let Some(existing) = state
            .assets
            .iter()
            .find(|a| a.namespace == namespace && a.info.name == name)
        {
            return Ok(existing.info.clone());
        }
        let id = Self::allocate(&mut state);
        let info = AssetInfo {
            id: id.clone(),
            name: name.to_string(),
            url: format!("{BASE_URL}/files/{id}/preview"),
        };
        state.assets.push(StoredAsset {
            namespace: namespace.to_string(),
            info: info.clone(),
        });
        Ok(info)
    }

    fn list_assets(&self, namespace: &str) -> Result<Vec<AssetInfo>, RemoteError> {
        self.log(CallKind::ListAssets, Some(RemoteKind::File), None);
        Ok(self.assets(namespace))
    }
}
