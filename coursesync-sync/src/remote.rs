//! The remote LMS as seen by the sync core.
//!
//! [`RemoteApi`] is deliberately narrow: generic object CRUD keyed by
//! [`RemoteKind`] plus namespaced asset storage. Child collections (quiz
//! questions, new-quiz items, module items) pass their owner as `parent`.

use serde_json::{Map, Value};
use thiserror::Error;

use coursesync_core::{RemoteId, RemoteKind};

/// Request/response attribute map.
pub type Fields = Map<String, Value>;

/// A transient handle on one remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: RemoteId,
    pub title: String,
    /// Browser locator, used when rewriting links.
    pub url: Option<String>,
    /// Everything the remote returned.
    pub fields: Fields,
}

impl RemoteObject {
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// An id-like field (number or string) rendered as a string.
    pub fn id_field(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(id_string)
    }
}

/// An uploaded file in a namespace folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub id: RemoteId,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network failure, throttling or a server-side error; safe to retry.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote refuses the operation in the object's current state
    /// (for example unpublishing a quiz with submissions).
    #[error("operation blocked by remote: {0}")]
    CapabilityBlocked(String),

    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response did not have the expected shape.
    #[error("unexpected remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

pub trait RemoteApi {
    fn list_objects(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        search: Option<&str>,
    ) -> Result<Vec<RemoteObject>, RemoteError>;

    /// `Ok(None)` when the object does not exist.
    fn get_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<Option<RemoteObject>, RemoteError>;

    fn create_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError>;

    fn update_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError>;

    fn delete_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<(), RemoteError>;

    /// Upload `bytes` as `name` into `namespace`, replacing a same-named file.
    fn upload_asset(&self, namespace: &str, name: &str, bytes: &[u8])
        -> Result<AssetInfo, RemoteError>;

    /// Files in `namespace`; a namespace that does not exist yet is empty.
    fn list_assets(&self, namespace: &str) -> Result<Vec<AssetInfo>, RemoteError>;

    fn list_module_items(&self, module: &RemoteId) -> Result<Vec<RemoteObject>, RemoteError> {
        self.list_objects(RemoteKind::ModuleItem, Some(module), None)
    }

    fn attach_module_item(
        &self,
        module: &RemoteId,
        item: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        self.create_object(RemoteKind::ModuleItem, Some(module), item)
    }

    fn update_module_item(
        &self,
        module: &RemoteId,
        item: &RemoteId,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        self.update_object(RemoteKind::ModuleItem, Some(module), item, fields)
    }
}

/// Render a JSON id (number or string) as a string.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
