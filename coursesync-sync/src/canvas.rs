//! Canvas REST implementation of [`RemoteApi`].
//!
//! Blocking `ureq` with bearer auth. Collections are paged with
//! `per_page=100`, following `Link: <...>; rel="next"`. Request bodies are
//! wrapped in the envelope key each endpoint expects; responses are flat.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use coursesync_core::config::CourseContext;
use coursesync_core::{RemoteId, RemoteKind};

use crate::remote::{id_string, AssetInfo, Fields, RemoteApi, RemoteError, RemoteObject};

const PER_PAGE: &str = "100";
const MIN_SEARCH_LEN: usize = 3;
const TIMEOUT: Duration = Duration::from_secs(120);

pub struct CanvasClient {
    agent: ureq::Agent,
    /// Does not follow redirects; the upload confirmation needs the location.
    upload_agent: ureq::Agent,
    api_url: String,
    token: String,
    course_id: String,
    folders: RefCell<HashMap<String, RemoteId>>,
}

impl CanvasClient {
    pub fn new(ctx: &CourseContext) -> Self {
        CanvasClient {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            upload_agent: ureq::AgentBuilder::new().timeout(TIMEOUT).redirects(0).build(),
            api_url: ctx.credentials.api_url.trim_end_matches('/').to_string(),
            token: ctx.credentials.token.clone(),
            course_id: ctx.course_id.clone(),
            folders: RefCell::new(HashMap::new()),
        }
    }

    fn course(&self) -> String {
        format!("{}/api/v1/courses/{}", self.api_url, self.course_id)
    }

    fn new_quizzes(&self) -> String {
        format!("{}/api/quiz/v1/courses/{}/quizzes", self.api_url, self.course_id)
    }

    fn context_code(&self) -> String {
        format!("course_{}", self.course_id)
    }

    fn require_parent<'p>(kind: RemoteKind, parent: Option<&'p RemoteId>) -> Result<&'p RemoteId, RemoteError> {
        parent.ok_or_else(|| RemoteError::Decode(format!("{kind} needs a parent id")))
    }

    /// Collection URL for `kind`.
    fn collection(&self, kind: RemoteKind, parent: Option<&RemoteId>) -> Result<String, RemoteError> {
        Ok(match kind {
            RemoteKind::Page => format!("{}/pages", self.course()),
            RemoteKind::Assignment => format!("{}/assignments", self.course()),
            RemoteKind::Quiz => format!("{}/quizzes", self.course()),
            RemoteKind::QuizQuestion => {
                let quiz = Self::require_parent(kind, parent)?;
                format!("{}/quizzes/{quiz}/questions", self.course())
            }
            RemoteKind::NewQuiz => self.new_quizzes(),
            RemoteKind::NewQuizItem => {
                let quiz = Self::require_parent(kind, parent)?;
                format!("{}/{quiz}/items", self.new_quizzes())
            }
            RemoteKind::Module => format!("{}/modules", self.course()),
            RemoteKind::ModuleItem => {
                let module = Self::require_parent(kind, parent)?;
                format!("{}/modules/{module}/items", self.course())
            }
            RemoteKind::CalendarEvent => format!("{}/api/v1/calendar_events", self.api_url),
            RemoteKind::File => format!("{}/api/v1/files", self.api_url),
        })
    }

    fn object_url(&self, kind: RemoteKind, parent: Option<&RemoteId>, id: &RemoteId) -> Result<String, RemoteError> {
        Ok(format!("{}/{id}", self.collection(kind, parent)?))
    }

    fn envelope(kind: RemoteKind) -> Option<&'static str> {
        match kind {
            RemoteKind::Page => Some("wiki_page"),
            RemoteKind::Assignment => Some("assignment"),
            RemoteKind::Quiz | RemoteKind::NewQuiz => Some("quiz"),
            RemoteKind::QuizQuestion => Some("question"),
            RemoteKind::NewQuizItem => Some("item"),
            RemoteKind::Module => Some("module"),
            RemoteKind::ModuleItem => Some("module_item"),
            RemoteKind::CalendarEvent => Some("calendar_event"),
            RemoteKind::File => None,
        }
    }

    fn supports_search(kind: RemoteKind) -> bool {
        matches!(
            kind,
            RemoteKind::Page | RemoteKind::Assignment | RemoteKind::Quiz | RemoteKind::Module
        )
    }

    fn authed(&self, agent: &ureq::Agent, method: &str, url: &str) -> ureq::Request {
        agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
    }

    fn call_json(&self, method: &str, url: &str, body: Option<Value>) -> Result<Value, RemoteError> {
        tracing::debug!(method, url, "canvas request");
        let req = self.authed(&self.agent, method, url);
        let resp = match body {
            Some(b) => req.send_json(b),
            None => req.call(),
        }
        .map_err(map_error)?;
        read_json(resp)
    }

    /// GET every page of a collection.
    fn get_all(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<Value>, RemoteError> {
        let mut out = Vec::new();
        let mut req = self.authed(&self.agent, "GET", url).query("per_page", PER_PAGE);
        for (k, v) in query {
            req = req.query(k, v);
        }

        loop {
            let resp = req.call().map_err(map_error)?;
            let next = resp.header("Link").and_then(next_link);
            match read_json(resp)? {
                Value::Array(items) => out.extend(items),
                other => {
                    return Err(RemoteError::Decode(format!(
                        "expected a list from {url}, got {}",
                        type_name(&other)
                    )))
                }
            }
            match next {
                Some(next) => req = self.authed(&self.agent, "GET", &next),
                None => return Ok(out),
            }
        }
    }

    fn html_url(&self, kind: RemoteKind, id: &RemoteId, fields: &Fields) -> Option<String> {
        if let Some(url) = fields.get("html_url").and_then(Value::as_str) {
            return Some(url.to_string());
        }
        let segment = match kind {
            RemoteKind::Page => {
                let slug = fields.get("url").and_then(Value::as_str)?;
                return Some(format!("{}/courses/{}/pages/{slug}", self.api_url, self.course_id));
            }
            RemoteKind::Assignment | RemoteKind::NewQuiz => "assignments",
            RemoteKind::Quiz => "quizzes",
            RemoteKind::Module => "modules",
            RemoteKind::File => "files",
            _ => return None,
        };
        Some(format!(
            "{}/courses/{}/{segment}/{id}",
            self.api_url, self.course_id
        ))
    }

    fn to_object(&self, kind: RemoteKind, value: Value) -> Result<RemoteObject, RemoteError> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(RemoteError::Decode(format!(
                    "expected a {kind} object, got {}",
                    type_name(&other)
                )))
            }
        };
        let id_key = if kind == RemoteKind::Page { "page_id" } else { "id" };
        let id = fields
            .get(id_key)
            .or_else(|| fields.get("id"))
            .and_then(id_string)
            .map(RemoteId)
            .ok_or_else(|| RemoteError::Decode(format!("{kind} response without id")))?;
        let title = match kind {
            RemoteKind::NewQuizItem => fields.get("entry").and_then(|e| e.get("title")),
            _ => fields.get(kind.title_field()),
        }
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
        let url = self.html_url(kind, &id, &fields);
        Ok(RemoteObject {
            id,
            title,
            url,
            fields,
        })
    }

    fn wrap(kind: RemoteKind, fields: &Fields) -> Value {
        let body = Value::Object(fields.clone());
        match Self::envelope(kind) {
            Some(key) => {
                let mut wrapped = Fields::new();
                wrapped.insert(key.to_string(), body);
                Value::Object(wrapped)
            }
            None => body,
        }
    }

    // -- files -------------------------------------------------------------

    fn find_folder(&self, namespace: &str) -> Result<Option<RemoteId>, RemoteError> {
        let key = namespace.to_lowercase();
        if let Some(id) = self.folders.borrow().get(&key) {
            return Ok(Some(id.clone()));
        }
        let folders = self.get_all(&format!("{}/folders", self.course()), &[])?;
        let found = folders.iter().find_map(|f| {
            let name = f.get("name").and_then(Value::as_str)?;
            if name.to_lowercase() == key {
                f.get("id").and_then(id_string).map(RemoteId)
            } else {
                None
            }
        });
        if let Some(id) = &found {
            self.folders.borrow_mut().insert(key, id.clone());
        }
        Ok(found)
    }

    fn ensure_folder(&self, namespace: &str) -> Result<RemoteId, RemoteError> {
        if let Some(id) = self.find_folder(namespace)? {
            return Ok(id);
        }
        tracing::info!(folder = namespace, "creating folder");
        let created = self.call_json(
            "POST",
            &format!("{}/folders", self.course()),
            Some(json!({ "name": namespace, "parent_folder_path": "/" })),
        )?;
        let id = created
            .get("id")
            .and_then(id_string)
            .map(RemoteId)
            .ok_or_else(|| RemoteError::Decode("folder response without id".into()))?;
        self.folders
            .borrow_mut()
            .insert(namespace.to_lowercase(), id.clone());
        Ok(id)
    }

    fn asset_info(&self, value: &Value) -> Result<AssetInfo, RemoteError> {
        let id = value
            .get("id")
            .and_then(id_string)
            .map(RemoteId)
            .ok_or_else(|| RemoteError::Decode("file response without id".into()))?;
        let name = value
            .get("display_name")
            .or_else(|| value.get("filename"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let url = format!(
            "{}/courses/{}/files/{id}/preview",
            self.api_url, self.course_id
        );
        Ok(AssetInfo { id, name, url })
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn read_json(resp: ureq::Response) -> Result<Value, RemoteError> {
    let text = resp
        .into_string()
        .map_err(|e| RemoteError::Transient(format!("reading response: {e}")))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
}

/// URL of the `rel="next"` entry of a `Link` header.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| url.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Classify an HTTP failure.
pub fn classify_status(status: u16, message: String) -> RemoteError {
    match status {
        429 | 500..=599 => RemoteError::Transient(format!("{status}: {message}")),
        400 | 403 | 422 if message.to_lowercase().contains("unpublish") => {
            RemoteError::CapabilityBlocked(message)
        }
        _ => RemoteError::Rejected { status, message },
    }
}

fn map_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, resp) => {
            let message = resp.into_string().unwrap_or_default();
            classify_status(status, message)
        }
        ureq::Error::Transport(t) => RemoteError::Transient(t.to_string()),
    }
}

/// Percent-escape the characters that would end a quoted header parameter,
/// the way browsers encode form-data filenames.
fn header_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn multipart(params: &Fields, name: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let name = header_quoted(name);
    let digest = Sha256::digest(bytes);
    let boundary = format!("coursesync-{}", hex::encode(&digest[..12]));
    let mut body = Vec::with_capacity(bytes.len() + 512);
    for (k, v) in params {
        let value = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
                header_quoted(k)
            )
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

impl RemoteApi for CanvasClient {
    fn list_objects(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        search: Option<&str>,
    ) -> Result<Vec<RemoteObject>, RemoteError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(term) = search {
            if Self::supports_search(kind) && term.chars().count() >= MIN_SEARCH_LEN {
                query.push(("search_term", term.to_string()));
            }
        }
        if kind == RemoteKind::CalendarEvent {
            query.push(("context_codes[]", self.context_code()));
            query.push(("type", "event".to_string()));
            query.push(("all_events", "true".to_string()));
        }
        self.get_all(&self.collection(kind, parent)?, &query)?
            .into_iter()
            .map(|v| self.to_object(kind, v))
            .collect()
    }

    fn get_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<Option<RemoteObject>, RemoteError> {
        let url = self.object_url(kind, parent, id)?;
        match self.authed(&self.agent, "GET", &url).call() {
            Ok(resp) => Ok(Some(self.to_object(kind, read_json(resp)?)?)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(map_error(e)),
        }
    }

    fn create_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        let mut fields = fields.clone();
        if kind == RemoteKind::CalendarEvent {
            fields.insert("context_code".into(), self.context_code().into());
        }
        let url = self.collection(kind, parent)?;
        let value = self.call_json("POST", &url, Some(Self::wrap(kind, &fields)))?;
        self.to_object(kind, value)
    }

    fn update_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
        fields: &Fields,
    ) -> Result<RemoteObject, RemoteError> {
        let method = match kind {
            RemoteKind::NewQuiz | RemoteKind::NewQuizItem => "PATCH",
            _ => "PUT",
        };
        let url = self.object_url(kind, parent, id)?;
        let value = self.call_json(method, &url, Some(Self::wrap(kind, fields)))?;
        self.to_object(kind, value)
    }

    fn delete_object(
        &self,
        kind: RemoteKind,
        parent: Option<&RemoteId>,
        id: &RemoteId,
    ) -> Result<(), RemoteError> {
        let url = self.object_url(kind, parent, id)?;
        self.call_json("DELETE", &url, None).map(|_| ())
    }

    fn upload_asset(&self, namespace: &str, name: &str, bytes: &[u8]) -> Result<AssetInfo, RemoteError> {
        let folder = self.ensure_folder(namespace)?;

        let slot = self.call_json(
            "POST",
            &format!("{}/files", self.course()),
            Some(json!({
                "name": name,
                "size": bytes.len(),
                "parent_folder_id": folder.0,
                "on_duplicate": "overwrite",
            })),
        )?;
        let upload_url = slot
            .get("upload_url")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Decode("upload slot without upload_url".into()))?;
        let params = slot
            .get("upload_params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let (content_type, body) = multipart(&params, name, bytes);
        let resp = self
            .upload_agent
            .post(upload_url)
            .set("Content-Type", &content_type)
            .send_bytes(&body)
            .map_err(map_error)?;

        let file = if (300..400).contains(&resp.status()) {
            let location = resp
                .header("Location")
                .ok_or_else(|| RemoteError::Decode("upload redirect without location".into()))?
                .to_string();
            self.call_json("GET", &location, None)?
        } else {
            read_json(resp)?
        };
        self.asset_info(&file)
    }

    fn list_assets(&self, namespace: &str) -> Result<Vec<AssetInfo>, RemoteError> {
        let Some(folder) = self.find_folder(namespace)? else {
            return Ok(Vec::new());
        };
        self.get_all(&format!("{}/api/v1/folders/{folder}/files", self.api_url), &[])?
            .iter()
            .map(|v| self.asset_info(v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_is_found_among_relations() {
        let header = r#"<https://c/api/v1/x?page=1>; rel="current", <https://c/api/v1/x?page=2>; rel="next", <https://c/api/v1/x?page=5>; rel="last""#;
        assert_eq!(next_link(header).as_deref(), Some("https://c/api/v1/x?page=2"));
        assert_eq!(next_link(r#"<https://c/x>; rel="last""#), None);
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(503, "down".into()).is_transient());
        assert!(classify_status(429, "slow down".into()).is_transient());
        assert!(matches!(
            classify_status(400, "Can't unpublish if there are student submissions".into()),
            RemoteError::CapabilityBlocked(_)
        ));
        assert!(matches!(
            classify_status(400, "bad".into()),
            RemoteError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn multipart_carries_params_then_file() {
        let mut params = Fields::new();
        params.insert("key".into(), "abc".into());
        let (ct, body) = multipart(&params, "a.png", b"PNG");
        let text = String::from_utf8_lossy(&body);
        assert!(ct.starts_with("multipart/form-data; boundary="));
        let key_at = text.find("name=\"key\"").unwrap();
        let file_at = text.find("filename=\"a.png\"").unwrap();
        assert!(key_at < file_at);
        assert!(text.contains("\r\n\r\nPNG\r\n"));
    }

    #[test]
    fn multipart_filename_cannot_break_the_header() {
        let (_, body) = multipart(&Fields::new(), "a\"b\r\nX-Other: 1.png", b"PNG");
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("filename=\"a%22b%0D%0AX-Other: 1.png\"\r\n"));
        assert!(!text.contains("\r\nX-Other"));
    }
}
