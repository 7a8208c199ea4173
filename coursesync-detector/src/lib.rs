//! Content classification for `coursesync-detector`.
//!
//! `classify(root, path, in_module)` inspects one discovered file and returns
//! its [`ContentDescriptor`], or `None` when the file is not sync content.
//! Classifiers are tried in a fixed order and the first match wins; the
//! resulting [`ContentKind`] is a closed enum so downstream dispatch is
//! exhaustive.

pub mod calendar;
pub mod quiz;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use coursesync_core::{
    discovery::{self, TEMP_PREFIX},
    frontmatter, Body, CanvasMeta, ContentDescriptor, ContentKind, CoreError, FrontMatter,
    Question,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Errors from content classification.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to parse {path}: {message}")]
    ParseError { path: PathBuf, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classify the file at `path` (inside content root `root`).
///
/// `in_module` is false for files directly under the root; subheaders and solo
/// files only make sense inside a module and are skipped there. Text sources
/// (`.qmd`, `.md`, `.json`) that are not content are never uploaded as files.
pub fn classify(
    root: &Path,
    path: &Path,
    in_module: bool,
) -> Result<Option<ContentDescriptor>, DetectError> {
    let name = file_name(path);
    if name.starts_with(TEMP_PREFIX) {
        return Ok(None);
    }

    match extension(path).as_str() {
        "qmd" => classify_qmd(root, path),
        "md" if in_module => classify_subheader(root, path),
        "md" => Ok(None),
        "json" => classify_json(root, path),
        _ if in_module => Ok(Some(solo_file(root, path))),
        _ => Ok(None),
    }
}

/// Minimal descriptor for a cross-link target that may not be synced yet.
///
/// Unlike [`classify`], a `.qmd` without a `canvas.type` is treated as a page
/// so that plain documents can still be linked to. Returns `None` for targets
/// that cannot own a URL (subheaders, files, non-content extensions).
pub fn link_target(root: &Path, path: &Path) -> Result<Option<ContentDescriptor>, DetectError> {
    let ext = extension(path);
    if ext != "qmd" && ext != "json" {
        return Ok(None);
    }

    let found = classify(root, path, true)?;
    let descriptor = match found {
        Some(d) if d.kind.is_linkable() => d,
        Some(_) => return Ok(None),
        None if ext == "qmd" => {
            let text = read(path)?;
            let fm: FrontMatter = frontmatter::parse(&text, path)?;
            descriptor(root, path, ContentKind::Page, fm.title, fm.canvas, Body::None)
        }
        None => return Ok(None),
    };

    Ok(Some(ContentDescriptor {
        body: Body::None,
        ..descriptor
    }))
}

/// Display title from a file stem: strips the `NN_` prefix.
pub fn title_from_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    discovery::split_prefix(&stem).1.to_string()
}

// ---------------------------------------------------------------------------
// Classifiers
// ---------------------------------------------------------------------------

fn classify_qmd(root: &Path, path: &Path) -> Result<Option<ContentDescriptor>, DetectError> {
    let text = read(path)?;
    let fm: FrontMatter = frontmatter::parse(&text, path)?;

    let kind = match fm.canvas.kind.as_deref() {
        Some("page") => ContentKind::Page,
        Some("assignment") => ContentKind::Assignment,
        Some("new_quiz") => ContentKind::NewQuiz,
        _ => return Ok(None),
    };

    if kind == ContentKind::NewQuiz {
        let (canvas, questions) = quiz::parse_qmd_quiz(&text, path)?;
        let title = canvas.title.clone().or(fm.title);
        return Ok(Some(descriptor(
            root,
            path,
            kind,
            title,
            canvas,
            Body::Questions(questions),
        )));
    }

    Ok(Some(descriptor(
        root,
        path,
        kind,
        fm.title,
        fm.canvas,
        Body::Markdown(text),
    )))
}

fn classify_subheader(root: &Path, path: &Path) -> Result<Option<ContentDescriptor>, DetectError> {
    let text = read(path)?;
    let fm: FrontMatter = frontmatter::parse(&text, path)?;
    if fm.canvas.kind.as_deref() != Some("subheader") {
        return Ok(None);
    }
    Ok(Some(descriptor(
        root,
        path,
        ContentKind::Subheader,
        fm.title,
        fm.canvas,
        Body::None,
    )))
}

fn classify_json(root: &Path, path: &Path) -> Result<Option<ContentDescriptor>, DetectError> {
    let text = read(path)?;
    let data: Value = serde_json::from_str(&text).map_err(|e| DetectError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let engine = data
        .get("canvas")
        .and_then(|c| c.get("quiz_engine"))
        .and_then(Value::as_str);
    let kind = if engine == Some("new") {
        ContentKind::NewQuiz
    } else if path.to_string_lossy().contains("Quiz") {
        ContentKind::Quiz
    } else {
        tracing::debug!(path = %path.display(), "json file is not a quiz, skipping");
        return Ok(None);
    };

    let (canvas, questions) = quiz::parse_json_quiz(&data, path)?;
    let title = canvas.title.clone().or_else(|| Some(quiz_title_from_stem(path)));
    Ok(Some(descriptor(
        root,
        path,
        kind,
        title,
        canvas,
        Body::Questions(questions),
    )))
}

fn solo_file(root: &Path, path: &Path) -> ContentDescriptor {
    let name = file_name(path);
    let title = discovery::split_prefix(&name).1.to_string();
    descriptor(
        root,
        path,
        ContentKind::SoloFile,
        Some(title),
        CanvasMeta::default(),
        Body::Binary,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn descriptor(
    root: &Path,
    path: &Path,
    kind: ContentKind,
    title: Option<String>,
    settings: CanvasMeta,
    body: Body,
) -> ContentDescriptor {
    let name = file_name(path);
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| title_from_stem(path));
    ContentDescriptor {
        kind,
        rel_path: discovery::rel_key(root, path),
        path: path.to_path_buf(),
        order: discovery::split_prefix(&name).0,
        title,
        settings,
        body,
    }
}

/// Quiz files conventionally use underscores for spaces: `03_Week_1_Quiz`.
fn quiz_title_from_stem(path: &Path) -> String {
    title_from_stem(path).replace('_', " ")
}

fn read(path: &Path) -> Result<String, DetectError> {
    std::fs::read_to_string(path).map_err(|e| io_err(path, e))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Fill in generated names for questions that omit one.
pub(crate) fn name_questions(questions: &mut [Question]) {
    for (i, q) in questions.iter_mut().enumerate() {
        if q.question_name.trim().is_empty() {
            q.question_name = format!("Question {}", i + 1);
        }
    }
}
