//! Domain types shared by discovery, classification, and sync.
//!
//! All path fields use `PathBuf`; relative identity keys are `String`s with
//! forward slashes so the persisted map is portable across platforms.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for RemoteId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of object on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    Page,
    Assignment,
    Quiz,
    QuizQuestion,
    NewQuiz,
    NewQuizItem,
    Module,
    ModuleItem,
    CalendarEvent,
    File,
}

impl RemoteKind {
    /// Field that carries the display title in create/update payloads.
    pub fn title_field(self) -> &'static str {
        match self {
            RemoteKind::Assignment | RemoteKind::Module => "name",
            RemoteKind::QuizQuestion => "question_name",
            RemoteKind::File => "display_name",
            _ => "title",
        }
    }
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RemoteKind::Page => "page",
            RemoteKind::Assignment => "assignment",
            RemoteKind::Quiz => "quiz",
            RemoteKind::QuizQuestion => "quiz_question",
            RemoteKind::NewQuiz => "new_quiz",
            RemoteKind::NewQuizItem => "new_quiz_item",
            RemoteKind::Module => "module",
            RemoteKind::ModuleItem => "module_item",
            RemoteKind::CalendarEvent => "calendar_event",
            RemoteKind::File => "file",
        };
        f.write_str(s)
    }
}

/// Closed set of local content kinds. Classification picks exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Page,
    Assignment,
    /// Classic quiz defined by a JSON question list.
    Quiz,
    /// Assignment-backed quiz engine.
    NewQuiz,
    Subheader,
    /// A downloadable file attached directly to a module.
    SoloFile,
    /// One occurrence expanded from a calendar series.
    CalendarEvent,
}

impl ContentKind {
    pub fn remote_kind(self) -> RemoteKind {
        match self {
            ContentKind::Page => RemoteKind::Page,
            ContentKind::Assignment => RemoteKind::Assignment,
            ContentKind::Quiz => RemoteKind::Quiz,
            ContentKind::NewQuiz => RemoteKind::NewQuiz,
            ContentKind::Subheader => RemoteKind::ModuleItem,
            ContentKind::SoloFile => RemoteKind::File,
            ContentKind::CalendarEvent => RemoteKind::CalendarEvent,
        }
    }

    /// Module item `type` used when attaching this kind to a module.
    pub fn module_item_type(self) -> Option<&'static str> {
        match self {
            ContentKind::Page => Some("Page"),
            ContentKind::Assignment | ContentKind::NewQuiz => Some("Assignment"),
            ContentKind::Quiz => Some("Quiz"),
            ContentKind::Subheader => Some("SubHeader"),
            ContentKind::SoloFile => Some("File"),
            ContentKind::CalendarEvent => None,
        }
    }

    /// Whether a cross-link may point at this kind.
    pub fn is_linkable(self) -> bool {
        matches!(
            self,
            ContentKind::Page | ContentKind::Assignment | ContentKind::Quiz | ContentKind::NewQuiz
        )
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Page => "page",
            ContentKind::Assignment => "assignment",
            ContentKind::Quiz => "quiz",
            ContentKind::NewQuiz => "new_quiz",
            ContentKind::Subheader => "subheader",
            ContentKind::SoloFile => "file",
            ContentKind::CalendarEvent => "calendar_event",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tri-state field update
// ---------------------------------------------------------------------------

/// Update intent for an optional, nullable remote attribute.
///
/// `Unchanged` is produced when the key is absent, `Clear` when it is present
/// but `null` or an empty string, `Set` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }
}

impl<'de> Deserialize<'de> for FieldUpdate<String> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw {
            None => FieldUpdate::Clear,
            Some(s) if s.trim().is_empty() => FieldUpdate::Clear,
            Some(s) => FieldUpdate::Set(s),
        })
    }
}

// ---------------------------------------------------------------------------
// Frontmatter settings
// ---------------------------------------------------------------------------

/// The `canvas:` block of a content file's metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CanvasMeta {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub published: Option<bool>,
    pub indent: Option<i64>,
    pub points: Option<f64>,
    pub due_at: FieldUpdate<String>,
    pub unlock_at: FieldUpdate<String>,
    pub lock_at: FieldUpdate<String>,
    pub submission_types: Option<Vec<String>>,
    pub allowed_extensions: Option<Vec<String>>,
    pub quiz_engine: Option<String>,
    pub quiz_type: Option<String>,
    pub instructions: Option<String>,
    pub omit_from_final_grade: Option<bool>,
    pub shuffle_answers: Option<bool>,
    pub shuffle_questions: Option<bool>,
    /// Time limit in minutes (classic) or seconds (new quizzes).
    pub time_limit: Option<u32>,
    /// `-1` means unlimited.
    pub allowed_attempts: Option<i64>,
}

/// Top-level YAML frontmatter of a `.qmd` / `.md` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub canvas: CanvasMeta,
}

// ---------------------------------------------------------------------------
// Quiz questions
// ---------------------------------------------------------------------------

/// A quiz question in the classic question JSON shape.
///
/// Unknown keys are kept in `extra` and passed through to the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub question_name: String,
    #[serde(default = "default_question_type")]
    pub question_type: String,
    #[serde(default = "default_points")]
    pub points_possible: f64,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incorrect_comments: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_html: Option<String>,
    #[serde(default, alias = "weight")]
    pub answer_weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_comments: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Answer {
    pub fn is_correct(&self) -> bool {
        self.answer_weight >= 100.0
    }
}

fn default_question_type() -> String {
    "multiple_choice_question".to_string()
}

fn default_points() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Content descriptor
// ---------------------------------------------------------------------------

/// Timing and place of one calendar occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub start_at: String,
    pub end_at: String,
    pub location: String,
    pub description: String,
}

/// The body a descriptor carries, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Full Markdown source, frontmatter included, handed to the renderer.
    Markdown(String),
    Questions(Vec<Question>),
    Event(EventSpec),
    /// The file itself is the payload (solo files).
    Binary,
    None,
}

/// Everything derived from one local content file. Rebuilt on every scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDescriptor {
    pub kind: ContentKind,
    /// Identity key: path relative to the content root, forward slashes.
    pub rel_path: String,
    /// Absolute path on disk (for calendar events, the schedule file).
    pub path: PathBuf,
    /// Numeric `NN_` prefix, if any.
    pub order: Option<u32>,
    pub title: String,
    pub settings: CanvasMeta,
    pub body: Body,
}

impl ContentDescriptor {
    pub fn published(&self) -> bool {
        self.settings
            .published
            .unwrap_or(self.kind == ContentKind::Subheader)
    }

    /// Module indentation clamped to the remote's 0–5 range.
    pub fn indent(&self) -> u8 {
        self.settings.indent.unwrap_or(0).clamp(0, 5) as u8
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default)]
        due_at: FieldUpdate<String>,
    }

    #[test]
    fn field_update_absent_is_unchanged() {
        let h: Holder = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(h.due_at, FieldUpdate::Unchanged);
    }

    #[test]
    fn field_update_empty_string_is_clear() {
        let h: Holder = serde_yaml::from_str("due_at: \"\"").expect("parse");
        assert_eq!(h.due_at, FieldUpdate::Clear);
    }

    #[test]
    fn field_update_null_is_clear() {
        let h: Holder = serde_yaml::from_str("due_at: ~").expect("parse");
        assert_eq!(h.due_at, FieldUpdate::Clear);
    }

    #[test]
    fn field_update_value_is_set() {
        let h: Holder = serde_yaml::from_str("due_at: 2025-03-01T23:59:00Z").expect("parse");
        assert_eq!(h.due_at, FieldUpdate::Set("2025-03-01T23:59:00Z".to_string()));
    }

    #[test]
    fn canvas_meta_defaults_leave_schedule_unchanged() {
        let fm: FrontMatter =
            serde_yaml::from_str("title: Intro\ncanvas:\n  type: page\n").expect("parse");
        assert_eq!(fm.title.as_deref(), Some("Intro"));
        assert_eq!(fm.canvas.kind.as_deref(), Some("page"));
        assert!(fm.canvas.due_at.is_unchanged());
        assert!(fm.canvas.lock_at.is_unchanged());
    }

    #[test]
    fn answer_weight_alias_accepted() {
        let a: Answer = serde_json::from_str(r#"{"answer_text":"4","weight":100}"#).expect("parse");
        assert!(a.is_correct());
    }

    #[test]
    fn question_keeps_unknown_fields() {
        let q: Question = serde_json::from_str(
            r#"{"question_name":"Q1","question_text":"2+2?","neutral_comments":"hi"}"#,
        )
        .expect("parse");
        assert_eq!(q.question_type, "multiple_choice_question");
        assert_eq!(q.points_possible, 1.0);
        assert_eq!(q.extra.get("neutral_comments"), Some(&Value::from("hi")));
    }

    #[test]
    fn indent_is_clamped() {
        let mut settings = CanvasMeta::default();
        settings.indent = Some(9);
        let d = ContentDescriptor {
            kind: ContentKind::Page,
            rel_path: "01_Mod/01_Page.qmd".into(),
            path: PathBuf::from("/c/01_Mod/01_Page.qmd"),
            order: Some(1),
            title: "Page".into(),
            settings,
            body: Body::None,
        };
        assert_eq!(d.indent(), 5);
        assert!(!d.published());
    }

    #[test]
    fn subheaders_default_to_published() {
        let d = ContentDescriptor {
            kind: ContentKind::Subheader,
            rel_path: "01_Mod/02_Week.md".into(),
            path: PathBuf::from("/c/01_Mod/02_Week.md"),
            order: Some(2),
            title: "Week".into(),
            settings: CanvasMeta::default(),
            body: Body::None,
        };
        assert!(d.published());
    }

    #[test]
    fn descriptors_compare_by_settings() {
        let fm: FrontMatter =
            serde_yaml::from_str("canvas:\n  type: page\n  due_at: \"\"\n").expect("parse");
        let d = ContentDescriptor {
            kind: ContentKind::Page,
            rel_path: "01_Page.qmd".into(),
            path: PathBuf::from("/c/01_Page.qmd"),
            order: Some(1),
            title: "Page".into(),
            settings: fm.canvas,
            body: Body::None,
        };
        assert_eq!(d, d.clone());

        let mut other = d.clone();
        other.settings.due_at = FieldUpdate::Unchanged;
        assert_ne!(d, other);
    }

    #[test]
    fn remote_kind_display_and_title_field() {
        assert_eq!(RemoteKind::NewQuiz.to_string(), "new_quiz");
        assert_eq!(RemoteKind::Assignment.title_field(), "name");
        assert_eq!(RemoteKind::Page.title_field(), "title");
    }
}
