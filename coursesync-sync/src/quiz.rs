//! Question-level sync for both quiz engines.
//!
//! Question texts, rich answers and feedback are link-rewritten and rendered
//! in a single batch per quiz. Classic questions are matched by name against
//! the remote list; new-quiz items are tracked by name in the identity record.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use coursesync_core::{ContentDescriptor, Question, RemoteId, RemoteKind};
use coursesync_renderer::Chunk;

use crate::context::SyncContext;
use crate::error::SyncError;
use crate::links::rewrite_links;
use crate::payload;
use crate::publish::{close_after_edit, open_for_edit, PublishState};
use crate::reconcile::upsert;
use crate::remote::{Fields, RemoteError, RemoteObject};
use crate::resolver::Lookup;

/// Questions with every local reference rewritten.
#[derive(Debug, Clone)]
pub struct ScannedQuestions {
    pub questions: Vec<Question>,
    pub instructions: Option<String>,
    pub assets: Vec<String>,
    /// Uploads that failed while rewriting, as `key: error`.
    pub failed: Vec<String>,
}

fn rewrite_into(ctx: &mut SyncContext<'_>, text: &str, path: &Path, acc: &mut ScannedQuestions) -> String {
    let out = rewrite_links(ctx, text, path);
    acc.assets.extend(out.assets);
    acc.failed.extend(out.failed);
    out.body
}

/// Rewrite links in every text field of a quiz.
pub fn scan_links(ctx: &mut SyncContext<'_>, d: &ContentDescriptor, questions: &[Question]) -> ScannedQuestions {
    let mut acc = ScannedQuestions {
        questions: Vec::with_capacity(questions.len()),
        instructions: None,
        assets: Vec::new(),
        failed: Vec::new(),
    };
    if let Some(text) = d.settings.instructions.as_deref() {
        let rewritten = rewrite_into(ctx, text, &d.path, &mut acc);
        acc.instructions = Some(rewritten);
    }

    for q in questions {
        let mut q = q.clone();
        q.question_text = rewrite_into(ctx, &q.question_text, &d.path, &mut acc);
        for a in &mut q.answers {
            if let Some(html) = a.answer_html.take() {
                a.answer_html = Some(rewrite_into(ctx, &html, &d.path, &mut acc));
            }
        }
        for comment in [&mut q.correct_comments, &mut q.incorrect_comments] {
            if let Some(text) = comment.take() {
                *comment = Some(rewrite_into(ctx, &text, &d.path, &mut acc));
            }
        }
        acc.questions.push(q);
    }

    acc.assets.sort();
    acc.assets.dedup();
    acc
}

fn chunk_keys(i: usize) -> (String, String, String) {
    (
        format!("q{i}_text"),
        format!("q{i}_correct_comments"),
        format!("q{i}_incorrect_comments"),
    )
}

fn answer_key(i: usize, j: usize) -> String {
    format!("q{i}_a{j}")
}

const INSTRUCTIONS_KEY: &str = "instructions";

/// Render every Markdown fragment of the quiz in one batch.
fn render(
    ctx: &SyncContext<'_>,
    d: &ContentDescriptor,
    scanned: &ScannedQuestions,
    with_comments: bool,
) -> Result<BTreeMap<String, String>, SyncError> {
    let mut chunks = Vec::new();
    if let Some(text) = &scanned.instructions {
        chunks.push(Chunk::new(INSTRUCTIONS_KEY, text.as_str()));
    }
    for (i, q) in scanned.questions.iter().enumerate() {
        let (text, correct, incorrect) = chunk_keys(i);
        chunks.push(Chunk::new(text, q.question_text.as_str()));
        for (j, a) in q.answers.iter().enumerate() {
            if let Some(html) = &a.answer_html {
                chunks.push(Chunk::new(answer_key(i, j), html.as_str()));
            }
        }
        if with_comments {
            if let Some(c) = &q.correct_comments {
                chunks.push(Chunk::new(correct, c.as_str()));
            }
            if let Some(c) = &q.incorrect_comments {
                chunks.push(Chunk::new(incorrect, c.as_str()));
            }
        }
    }

    let work_dir = d.path.parent().unwrap_or(ctx.root.as_path());
    let stem = stem(&d.path);
    Ok(ctx.chunks.render(ctx.renderer, &chunks, work_dir, &stem)?)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "quiz".to_string())
}

/// Replace the Markdown sources with their rendered HTML.
fn apply_rendered(scanned: &ScannedQuestions, rendered: &BTreeMap<String, String>) -> Vec<Question> {
    scanned
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let (text, correct, incorrect) = chunk_keys(i);
            let mut q = q.clone();
            if let Some(html) = rendered.get(&text) {
                q.question_text = html.clone();
            }
            for (j, a) in q.answers.iter_mut().enumerate() {
                if let Some(html) = rendered.get(&answer_key(i, j)) {
                    a.answer_html = Some(html.clone());
                }
            }
            if let Some(html) = rendered.get(&correct) {
                q.correct_comments = Some(html.clone());
            }
            if let Some(html) = rendered.get(&incorrect) {
                q.incorrect_comments = Some(html.clone());
            }
            q
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Classic quizzes
// ---------------------------------------------------------------------------

fn answer_signature(answers: &[Value]) -> Vec<(String, i64)> {
    answers
        .iter()
        .map(|a| {
            let text = ["answer_html", "html", "answer_text", "text"]
                .iter()
                .find_map(|k| a.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
                .unwrap_or_default()
                .to_string();
            let weight = ["answer_weight", "weight"]
                .iter()
                .find_map(|k| a.get(*k).and_then(Value::as_f64))
                .unwrap_or(0.0);
            (text, weight.round() as i64)
        })
        .collect()
}

/// Whether the remote question differs from the payload in any field that
/// students see.
fn question_changed(remote: &RemoteObject, payload: &Fields) -> bool {
    let text = |f: &Fields, k: &str| f.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
    let points = |f: &Fields| f.get("points_possible").and_then(Value::as_f64).unwrap_or(0.0);
    let answers = |f: &Fields| {
        f.get("answers")
            .and_then(Value::as_array)
            .map(|a| answer_signature(a))
            .unwrap_or_default()
    };

    text(&remote.fields, "question_text") != text(payload, "question_text")
        || text(&remote.fields, "question_type") != text(payload, "question_type")
        || (points(&remote.fields) - points(payload)).abs() > f64::EPSILON
        || answers(&remote.fields) != answers(payload)
}

enum Edit {
    Create(Fields),
    Update(RemoteId, Fields),
    Delete(RemoteId, String),
}

/// Sync a classic quiz and its questions. Returns the quiz object.
pub fn sync_classic(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    scanned: &ScannedQuestions,
    recorded: Option<&RemoteId>,
) -> Result<RemoteObject, SyncError> {
    let rendered = render(ctx, d, scanned, false)?;
    let questions = apply_rendered(scanned, &rendered);
    let instructions = rendered.get(INSTRUCTIONS_KEY).map(String::as_str);

    let update = payload::classic_quiz(d, instructions);
    let mut create = update.clone();
    create.insert("published".into(), false.into());
    let lookup = Lookup::new(RemoteKind::Quiz, &d.title, recorded);
    let up = upsert(ctx, &lookup, &create, &update)?;
    let quiz = up.object;

    let state = if up.created {
        PublishState::Draft
    } else {
        PublishState::from_published(quiz.bool_field("published").unwrap_or(false))
    };

    let existing = ctx
        .remote
        .list_objects(RemoteKind::QuizQuestion, Some(&quiz.id), None)?;
    let mut used = BTreeSet::new();
    let mut edits = Vec::new();
    for q in &questions {
        let fields = payload::classic_question(q, &q.question_text);
        let found = existing
            .iter()
            .find(|r| r.title == q.question_name && !used.contains(&r.id));
        match found {
            Some(r) => {
                used.insert(r.id.clone());
                if question_changed(r, &fields) {
                    edits.push(Edit::Update(r.id.clone(), fields));
                }
            }
            None => edits.push(Edit::Create(fields)),
        }
    }
    for r in existing.iter().filter(|r| !used.contains(&r.id)) {
        edits.push(Edit::Delete(r.id.clone(), r.title.clone()));
    }

    let mut state = state;
    let mut applied = Ok(());
    if !edits.is_empty() {
        tracing::info!(quiz = %d.title, edits = edits.len(), "applying question changes");
        state = open_for_edit(ctx.remote, RemoteKind::Quiz, &quiz.id, state)?;
        applied = apply_edits(ctx, d, &quiz.id, edits);
    }

    // The visibility is restored even when an edit failed.
    let locator = quiz.url.clone().unwrap_or_else(|| quiz.id.to_string());
    let closed = close_after_edit(
        ctx.remote,
        RemoteKind::Quiz,
        &quiz.id,
        state,
        d.published(),
        &d.rel_path,
        &locator,
    );
    applied?;
    let (_, attention) = closed?;
    if let Some(a) = attention {
        tracing::warn!(quiz = %d.title, locator = %a.locator, "quiz needs manual republish");
        ctx.report.attention.push(a);
    }
    Ok(quiz)
}

fn apply_edits(
    ctx: &SyncContext<'_>,
    d: &ContentDescriptor,
    quiz: &RemoteId,
    edits: Vec<Edit>,
) -> Result<(), RemoteError> {
    for edit in edits {
        match edit {
            Edit::Create(f) => {
                ctx.remote
                    .create_object(RemoteKind::QuizQuestion, Some(quiz), &f)?;
            }
            Edit::Update(id, f) => {
                ctx.remote
                    .update_object(RemoteKind::QuizQuestion, Some(quiz), &id, &f)?;
            }
            Edit::Delete(id, name) => {
                tracing::info!(quiz = %d.title, question = %name, "removing question");
                ctx.remote
                    .delete_object(RemoteKind::QuizQuestion, Some(quiz), &id)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// New quizzes
// ---------------------------------------------------------------------------

/// Stable choice id: the same answer in the same question keeps its id
/// across runs, so submissions stay attached.
pub fn choice_id(rel_path: &str, question: &str, index: usize) -> String {
    let digest = Sha256::digest(format!("{rel_path}\u{0}{question}\u{0}{index}").as_bytes());
    let h = hex::encode(&digest[..16]);
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}

fn true_false_value(q: &Question) -> bool {
    q.answers
        .iter()
        .find(|a| a.is_correct())
        .and_then(|a| a.answer_text.as_deref())
        .map(|t| {
            let t = t.trim().to_lowercase();
            t.contains("true") || t == "t"
        })
        .unwrap_or(false)
}

/// New-quiz item payload for question `q` at zero-based `index`.
pub fn new_quiz_item(rel_path: &str, q: &Question, index: usize) -> Fields {
    let (slug, scoring) = match q.question_type.as_str() {
        "true_false_question" => ("true-false", "Equivalence"),
        "multiple_answers_question" => ("multi-answer", "AllOrNothing"),
        _ => ("choice", "Equivalence"),
    };

    let mut interaction = Fields::new();
    let mut feedback = Fields::new();
    let mut answer_feedback = Fields::new();
    let scoring_value = if slug == "true-false" {
        interaction.insert("true_choice".into(), "True".into());
        interaction.insert("false_choice".into(), "False".into());
        Value::Bool(true_false_value(q))
    } else {
        let mut choices = Vec::new();
        let mut correct = Vec::new();
        for (j, a) in q.answers.iter().enumerate() {
            let id = choice_id(rel_path, &q.question_name, j);
            let body = a
                .answer_html
                .clone()
                .or_else(|| a.answer_text.clone())
                .unwrap_or_else(|| j.to_string());
            choices.push(json!({ "id": id, "position": j + 1, "item_body": body }));
            if a.is_correct() {
                correct.push(Value::from(id.as_str()));
            }
            if let Some(c) = &a.answer_comments {
                answer_feedback.insert(id, c.as_str().into());
            }
        }
        interaction.insert("choices".into(), Value::Array(choices));
        if slug == "multi-answer" {
            Value::Array(correct)
        } else {
            correct.into_iter().next().unwrap_or(Value::Null)
        }
    };

    if let Some(c) = &q.correct_comments {
        feedback.insert("correct".into(), c.as_str().into());
    }
    if let Some(c) = &q.incorrect_comments {
        feedback.insert("incorrect".into(), c.as_str().into());
    }

    let mut entry = Fields::new();
    entry.insert("title".into(), q.question_name.as_str().into());
    entry.insert("item_body".into(), q.question_text.as_str().into());
    entry.insert("interaction_type_slug".into(), slug.into());
    entry.insert("scoring_algorithm".into(), scoring.into());
    entry.insert("calculator_type".into(), "none".into());
    entry.insert("interaction_data".into(), Value::Object(interaction));
    entry.insert("scoring_data".into(), json!({ "value": scoring_value }));
    entry.insert("feedback".into(), Value::Object(feedback));
    if !answer_feedback.is_empty() {
        entry.insert("answer_feedback".into(), Value::Object(answer_feedback));
    }

    let mut item = Fields::new();
    item.insert("entry_type".into(), "Item".into());
    item.insert("position".into(), (index + 1).into());
    item.insert("points_possible".into(), q.points_possible.into());
    item.insert("properties".into(), json!({}));
    item.insert("entry".into(), Value::Object(entry));
    item
}

/// Sync a new quiz and its items.
///
/// `recorded_items` maps question names to item ids from the last sync of the
/// same quiz. Items the record does not know about are matched by title
/// against the quiz's remote items before anything is created. Returns the
/// quiz object and the new name → id map.
pub fn sync_new(
    ctx: &mut SyncContext<'_>,
    d: &ContentDescriptor,
    scanned: &ScannedQuestions,
    recorded: Option<&RemoteId>,
    recorded_items: &BTreeMap<String, RemoteId>,
) -> Result<(RemoteObject, BTreeMap<String, RemoteId>), SyncError> {
    let rendered = render(ctx, d, scanned, true)?;
    let questions = apply_rendered(scanned, &rendered);
    let instructions = rendered.get(INSTRUCTIONS_KEY).map(String::as_str);

    let fields = payload::new_quiz(d, instructions);
    let lookup = Lookup::new(RemoteKind::NewQuiz, &d.title, recorded);
    let up = upsert(ctx, &lookup, &fields, &fields)?;
    let quiz = up.object;

    let mut previous = if recorded == Some(&quiz.id) {
        recorded_items.clone()
    } else {
        BTreeMap::new()
    };
    let unknown = questions.iter().any(|q| !previous.contains_key(&q.question_name));
    if unknown && !up.created {
        let remote_items = ctx
            .remote
            .list_objects(RemoteKind::NewQuizItem, Some(&quiz.id), None)?;
        for item in remote_items {
            if !previous.values().any(|id| id == &item.id) {
                previous.entry(item.title).or_insert(item.id);
            }
        }
    }

    let mut items = BTreeMap::new();
    for (i, q) in questions.iter().enumerate() {
        let item = new_quiz_item(&d.rel_path, q, i);
        let id = match previous.get(&q.question_name) {
            Some(id) => match ctx
                .remote
                .update_object(RemoteKind::NewQuizItem, Some(&quiz.id), id, &item)
            {
                Ok(_) => id.clone(),
                Err(RemoteError::Rejected { status, message }) => {
                    tracing::warn!(question = %q.question_name, status, %message, "item update rejected, re-creating");
                    ctx.remote
                        .create_object(RemoteKind::NewQuizItem, Some(&quiz.id), &item)?
                        .id
                }
                Err(e) => return Err(e.into()),
            },
            None => {
                ctx.remote
                    .create_object(RemoteKind::NewQuizItem, Some(&quiz.id), &item)?
                    .id
            }
        };
        items.insert(q.question_name.clone(), id);
    }

    for (name, id) in previous.iter().filter(|(n, _)| !items.contains_key(*n)) {
        tracing::info!(quiz = %d.title, question = %name, "removing item");
        if let Err(e) = ctx
            .remote
            .delete_object(RemoteKind::NewQuizItem, Some(&quiz.id), id)
        {
            tracing::warn!(question = %name, error = %e, "could not remove stale item");
        }
    }

    Ok((quiz, items))
}
