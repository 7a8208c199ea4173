//! # coursesync-renderer
//!
//! Turns Markdown content sources into the HTML fragments stored remotely.
//!
//! - [`QuartoRenderer`] runs `quarto render --to html` and keeps the main
//!   document content.
//! - [`PassthroughRenderer`] returns the Markdown body unchanged; used when
//!   Quarto is unavailable and in tests.
//! - [`ChunkRenderer`] batches many small fragments into one render.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use coursesync_renderer::{QuartoRenderer, Renderer};
//!
//! fn render_intro(source: &str) {
//!     let renderer = QuartoRenderer::new();
//!     if let Ok(html) = renderer.render(source, Path::new("course/01_Basics"), "01_Intro") {
//!         println!("{} bytes", html.len());
//!     }
//! }
//! ```

use std::path::Path;

use coursesync_core::frontmatter;

pub mod batch;
pub mod error;
pub mod extract;
pub mod quarto;

pub use batch::{Chunk, ChunkRenderer};
pub use error::RenderError;
pub use quarto::QuartoRenderer;

/// Markdown → HTML fragment.
///
/// `work_dir` is the directory of the source file so relative resources
/// resolve; `stem` names any scratch files the renderer needs.
pub trait Renderer {
    fn render(&self, source: &str, work_dir: &Path, stem: &str) -> Result<String, RenderError>;
}

/// Returns the source body (frontmatter removed) as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(&self, source: &str, _work_dir: &Path, _stem: &str) -> Result<String, RenderError> {
        let (_, body) = frontmatter::split(source);
        Ok(body.trim().to_string())
    }
}

impl<R: Renderer + ?Sized> Renderer for &R {
    fn render(&self, source: &str, work_dir: &Path, stem: &str) -> Result<String, RenderError> {
        (**self).render(source, work_dir, stem)
    }
}
