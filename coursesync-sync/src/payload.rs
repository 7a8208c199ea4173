//! Create/update attribute maps, one builder per content kind.
//!
//! Only fields the file specifies are sent. Nullable scheduling fields follow
//! [`FieldUpdate`]: absent leaves the remote value alone, empty clears it.

use serde_json::{json, Value};

use coursesync_core::{CanvasMeta, ContentDescriptor, ContentKind, EventSpec, FieldUpdate, Question};

use crate::remote::Fields;

pub const STUB_BODY: &str = "<i>Placeholder for future sync.</i>";

const SCHEDULE_FIELDS: [&str; 3] = ["due_at", "unlock_at", "lock_at"];

fn put_schedule(fields: &mut Fields, settings: &CanvasMeta) {
    let updates = [&settings.due_at, &settings.unlock_at, &settings.lock_at];
    for (name, update) in SCHEDULE_FIELDS.iter().zip(updates) {
        match update {
            FieldUpdate::Unchanged => {}
            FieldUpdate::Clear => {
                fields.insert((*name).to_string(), Value::Null);
            }
            FieldUpdate::Set(v) => {
                fields.insert((*name).to_string(), Value::from(v.as_str()));
            }
        }
    }
}

fn put_opt<T: Into<Value>>(fields: &mut Fields, key: &str, value: Option<T>) {
    if let Some(v) = value {
        fields.insert(key.to_string(), v.into());
    }
}

pub fn page(d: &ContentDescriptor, html: &str) -> Fields {
    let mut f = Fields::new();
    f.insert("title".into(), d.title.as_str().into());
    f.insert("body".into(), html.into());
    f.insert("published".into(), d.published().into());
    f
}

/// `creating` adds the default submission type for new assignments.
pub fn assignment(d: &ContentDescriptor, html: &str, creating: bool) -> Fields {
    let s = &d.settings;
    let mut f = Fields::new();
    f.insert("name".into(), d.title.as_str().into());
    f.insert("description".into(), html.into());
    f.insert("published".into(), d.published().into());
    put_opt(&mut f, "points_possible", s.points);
    match &s.submission_types {
        Some(types) => {
            f.insert("submission_types".into(), json!(types));
        }
        None if creating => {
            f.insert("submission_types".into(), json!(["online_upload"]));
        }
        None => {}
    }
    if let Some(ext) = &s.allowed_extensions {
        f.insert("allowed_extensions".into(), json!(ext));
    }
    put_schedule(&mut f, s);
    f
}

/// Classic quiz settings. Visibility is left to the publish cycle.
pub fn classic_quiz(d: &ContentDescriptor, instructions_html: Option<&str>) -> Fields {
    let s = &d.settings;
    let mut f = Fields::new();
    f.insert("title".into(), d.title.as_str().into());
    f.insert(
        "quiz_type".into(),
        s.quiz_type.as_deref().unwrap_or("practice_quiz").into(),
    );
    put_opt(&mut f, "description", instructions_html);
    put_opt(&mut f, "time_limit", s.time_limit);
    put_opt(&mut f, "allowed_attempts", s.allowed_attempts);
    put_opt(&mut f, "shuffle_answers", s.shuffle_answers);
    put_opt(&mut f, "points_possible", s.points);
    put_schedule(&mut f, s);
    f
}

pub fn new_quiz(d: &ContentDescriptor, instructions_html: Option<&str>) -> Fields {
    let s = &d.settings;
    let mut f = Fields::new();
    f.insert("title".into(), d.title.as_str().into());
    f.insert("published".into(), d.published().into());
    put_opt(&mut f, "points_possible", s.points);
    put_opt(&mut f, "instructions", instructions_html);
    put_opt(&mut f, "omit_from_final_grade", s.omit_from_final_grade);
    put_schedule(&mut f, s);

    let mut quiz_settings = Fields::new();
    put_opt(&mut quiz_settings, "shuffle_answers", s.shuffle_answers);
    put_opt(&mut quiz_settings, "shuffle_questions", s.shuffle_questions);
    if let Some(limit) = s.time_limit {
        quiz_settings.insert("has_time_limit".into(), true.into());
        quiz_settings.insert("session_time_limit_in_seconds".into(), limit.into());
    }
    if let Some(attempts) = s.allowed_attempts {
        quiz_settings.insert(
            "multiple_attempts".into(),
            Value::Object(attempt_settings(attempts)),
        );
    }
    if !quiz_settings.is_empty() {
        f.insert("quiz_settings".into(), Value::Object(quiz_settings));
    }
    f
}

/// `1` is a single attempt, a positive number caps attempts, anything else
/// (conventionally `-1`) is unlimited.
pub fn attempt_settings(attempts: i64) -> Fields {
    let mut m = Fields::new();
    let multiple = attempts != 1;
    m.insert("multiple_attempts_enabled".into(), multiple.into());
    if multiple {
        m.insert("attempt_limit".into(), (attempts > 0).into());
        if attempts > 0 {
            m.insert("max_attempts".into(), attempts.into());
        }
    }
    m
}

/// The course context code is added by the client.
pub fn event(d: &ContentDescriptor, ev: &EventSpec) -> Fields {
    let mut f = Fields::new();
    f.insert("title".into(), d.title.as_str().into());
    f.insert("start_at".into(), ev.start_at.as_str().into());
    f.insert("end_at".into(), ev.end_at.as_str().into());
    f.insert("location_name".into(), ev.location.as_str().into());
    f.insert("description".into(), ev.description.as_str().into());
    f
}

/// Minimal unpublished object for a link target that has not been synced.
pub fn stub(kind: ContentKind, title: &str) -> Fields {
    let mut f = Fields::new();
    match kind {
        ContentKind::Page => {
            f.insert("title".into(), title.into());
            f.insert("body".into(), STUB_BODY.into());
        }
        ContentKind::Assignment => {
            f.insert("name".into(), title.into());
            f.insert("description".into(), STUB_BODY.into());
        }
        ContentKind::Quiz => {
            f.insert("title".into(), title.into());
            f.insert("quiz_type".into(), "assignment".into());
        }
        _ => {
            f.insert("title".into(), title.into());
        }
    }
    f.insert("published".into(), false.into());
    f
}

pub fn module(name: &str) -> Fields {
    let mut f = Fields::new();
    f.insert("name".into(), name.into());
    f
}

/// Classic quiz question, with `text` already rendered and pass-through keys
/// kept.
pub fn classic_question(q: &Question, text: &str) -> Fields {
    let mut f = q.extra.clone();
    f.insert("question_name".into(), q.question_name.as_str().into());
    f.insert("question_type".into(), q.question_type.as_str().into());
    f.insert("points_possible".into(), q.points_possible.into());
    f.insert("question_text".into(), text.into());
    put_opt(&mut f, "correct_comments", q.correct_comments.as_deref());
    put_opt(&mut f, "incorrect_comments", q.incorrect_comments.as_deref());
    let answers: Vec<Value> = q
        .answers
        .iter()
        .map(|a| serde_json::to_value(a).unwrap_or(Value::Null))
        .filter(|v| !v.is_null())
        .collect();
    f.insert("answers".into(), Value::Array(answers));
    f
}
