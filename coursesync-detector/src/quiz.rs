//! Quiz question sources.
//!
//! JSON quizzes are either `{"canvas": {...}, "questions": [...]}` or a bare
//! question list. QMD quizzes carry one fenced div per question:
//!
//! ```text
//! :::: {.question name="Ohm" points=2}
//! What is the unit of resistance?
//!
//! - [x] Ohm
//!   - Correct, named after Georg Ohm.
//! - [ ] Volt
//!
//! ::: correct-comment
//! Well done.
//! :::
//! ::::
//! ```
//!
//! Answers may instead be rich `::: {.answer correct=true comment="..."}` divs,
//! whose body is kept as Markdown in `answer_html` until rendered.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use coursesync_core::{frontmatter, Answer, CanvasMeta, FrontMatter, Question};

use crate::{name_questions, DetectError};

static QUESTION_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^::::+\s*\{\.question(.*?)\}\s*$").expect("valid regex"));
static ANSWER_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:::+\s*\{\.answer(.*?)\}\s*$").expect("valid regex"));
static COMMENT_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^:::+\s+(correct-comment|incorrect-comment)\s*$").expect("valid regex")
});
static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(:::+)\s*(.*)$").expect("valid regex"));
static CHECK_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-\s*\[([ xX])\]\s*(.*)$").expect("valid regex"));
static SUB_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-\s+(.*)$").expect("valid regex"));
static ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|(\S+))"#).expect("valid regex"));

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Read quiz settings and questions from a parsed JSON quiz file.
pub fn parse_json_quiz(
    data: &Value,
    path: &Path,
) -> Result<(CanvasMeta, Vec<Question>), DetectError> {
    let parse_err = |e: serde_json::Error| DetectError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let (canvas, questions) = match data {
        Value::Array(_) => (CanvasMeta::default(), data.clone()),
        Value::Object(obj) => {
            let canvas = match obj.get("canvas") {
                Some(c) => serde_json::from_value(c.clone()).map_err(parse_err)?,
                None => CanvasMeta::default(),
            };
            let questions = obj
                .get("questions")
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            (canvas, questions)
        }
        _ => {
            return Err(DetectError::ParseError {
                path: path.to_path_buf(),
                message: "expected a question list or an object with `questions`".into(),
            })
        }
    };

    let mut questions: Vec<Question> = serde_json::from_value(questions).map_err(parse_err)?;
    name_questions(&mut questions);
    Ok((canvas, questions))
}

// ---------------------------------------------------------------------------
// QMD
// ---------------------------------------------------------------------------

/// Parse a QMD quiz: settings from the frontmatter `canvas:` block, questions
/// from `:::: {.question}` divs in the body.
pub fn parse_qmd_quiz(text: &str, path: &Path) -> Result<(CanvasMeta, Vec<Question>), DetectError> {
    let fm: FrontMatter = frontmatter::parse(text, path)?;
    let (_, body) = frontmatter::split(text);

    let mut questions: Vec<Question> = question_blocks(body)
        .into_iter()
        .map(|(attrs, lines)| parse_question(&attrs, &lines))
        .collect();
    name_questions(&mut questions);
    tracing::debug!(path = %path.display(), count = questions.len(), "parsed qmd quiz");
    Ok((fm.canvas, questions))
}

/// `(attribute string, dedented inner lines)` for each top-level question div.
fn question_blocks(body: &str) -> Vec<(String, Vec<String>)> {
    let lines: Vec<&str> = body.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(caps) = QUESTION_OPEN.captures(lines[i].trim()) else {
            i += 1;
            continue;
        };
        let attrs = caps[1].trim().to_string();
        let mut inner = Vec::new();
        let mut depth = 1;
        i += 1;

        // Only four-colon fences nest questions; `:::` divs belong to the body.
        while i < lines.len() {
            let trimmed = lines[i].trim();
            if let Some(f) = FENCE.captures(trimmed) {
                if f[1].len() >= 4 {
                    if f[2].is_empty() {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    } else if f[2].starts_with('{') || f[2].starts_with('#') {
                        depth += 1;
                    }
                }
            }
            inner.push(lines[i].to_string());
            i += 1;
        }

        blocks.push((attrs, dedent(&inner)));
        i += 1;
    }
    blocks
}

fn parse_question(attrs_str: &str, lines: &[String]) -> Question {
    let attrs = parse_attributes(attrs_str);
    let mut question = Question {
        question_name: attrs.get("name").cloned().unwrap_or_default(),
        question_type: attrs
            .get("type")
            .cloned()
            .unwrap_or_else(|| "multiple_choice_question".to_string()),
        points_possible: attrs
            .get("points")
            .and_then(|p| p.parse().ok())
            .unwrap_or(1.0),
        question_text: String::new(),
        answers: Vec::new(),
        correct_comments: None,
        incorrect_comments: None,
        extra: Map::new(),
    };

    let mut text_lines: Vec<&str> = Vec::new();
    let mut answers_started = false;
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if let Some(caps) = COMMENT_OPEN.captures(trimmed) {
            let (inner, next) = take_div(lines, i + 1);
            let comment = dedent(&inner).join("\n").trim().to_string();
            let slot = if &caps[1] == "correct-comment" {
                &mut question.correct_comments
            } else {
                &mut question.incorrect_comments
            };
            if slot.is_none() && !comment.is_empty() {
                *slot = Some(comment);
            }
            i = next;
            continue;
        }

        if let Some(caps) = ANSWER_OPEN.captures(trimmed) {
            answers_started = true;
            let attr_src = caps[1].to_string();
            let (inner, next) = take_div(lines, i + 1);
            question.answers.push(div_answer(&attr_src, &inner));
            i = next;
            continue;
        }

        if let Some(caps) = CHECK_ITEM.captures(trimmed) {
            answers_started = true;
            question.answers.push(Answer {
                answer_text: Some(caps[2].trim().to_string()),
                answer_html: None,
                answer_weight: if caps[1].eq_ignore_ascii_case("x") { 100.0 } else { 0.0 },
                answer_comments: None,
                extra: Map::new(),
            });
            i += 1;
            continue;
        }

        if answers_started {
            // An indented `- text` under a checklist item is that answer's comment.
            let indented = lines[i].starts_with(' ') || lines[i].starts_with('\t');
            if let (true, Some(caps), Some(last)) =
                (indented, SUB_ITEM.captures(trimmed), question.answers.last_mut())
            {
                if last.answer_text.is_some() {
                    last.answer_comments = Some(caps[1].trim().to_string());
                }
            }
        } else {
            text_lines.push(&lines[i]);
        }
        i += 1;
    }

    question.question_text = trim_blank_lines(&text_lines);
    question
}

fn div_answer(attrs_str: &str, inner: &[String]) -> Answer {
    let attrs = parse_attributes(attrs_str);
    let correct = attrs
        .get("correct")
        .is_some_and(|v| matches!(v.as_str(), "true" | "True" | "1"))
        || attrs_str.contains(".correct");
    Answer {
        answer_text: None,
        answer_html: Some(dedent(inner).join("\n").trim().to_string()),
        answer_weight: if correct { 100.0 } else { 0.0 },
        answer_comments: attrs.get("comment").filter(|c| !c.is_empty()).cloned(),
        extra: Map::new(),
    }
}

/// Collect the lines of a `:::` div starting at `start` (just past its
/// opening fence). Returns the inner lines and the index after the closer.
fn take_div(lines: &[String], start: usize) -> (Vec<String>, usize) {
    let mut inner = Vec::new();
    let mut depth = 1;
    let mut i = start;
    while i < lines.len() {
        let trimmed = lines[i].trim();
        if let Some(f) = FENCE.captures(trimmed) {
            if f[2].is_empty() {
                depth -= 1;
                if depth == 0 {
                    return (inner, i + 1);
                }
            } else {
                depth += 1;
            }
        }
        inner.push(lines[i].clone());
        i += 1;
    }
    (inner, i)
}

/// `name="Spänning" points=2 type=essay_question` → key/value pairs.
fn parse_attributes(src: &str) -> HashMap<String, String> {
    ATTR.captures_iter(src)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_string(), value.to_string())
        })
        .collect()
}

/// Strip the common leading whitespace of non-blank lines.
fn dedent<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    let indent = lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(AsRef::as_ref)
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                l[indent..].to_string()
            }
        })
        .collect()
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}
