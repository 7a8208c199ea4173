//! Batched rendering of many small Markdown pieces in one pass.
//!
//! Quiz questions carry dozens of short fragments (question text, answers,
//! comments). They are wrapped into one document, one `#qchunk-<key>` div
//! each, rendered once, and split back apart. A fragment whose marker is
//! missing from the output keeps its Markdown source.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::RenderError;
use crate::extract::div_inner;
use crate::Renderer;

const TEMPLATE_NAME: &str = "chunks.qmd.tera";
const TEMPLATE: &str = include_str!("templates/chunks.qmd.tera");

/// One fragment to render. `key` must be unique within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub key: String,
    pub source: String,
}

impl Chunk {
    pub fn new(key: impl Into<String>, source: impl Into<String>) -> Self {
        Chunk {
            key: key.into(),
            source: source.into(),
        }
    }
}

#[derive(Serialize)]
struct ChunkView<'a> {
    attrs: String,
    source: &'a str,
}

/// Builds and splits batch documents.
pub struct ChunkRenderer {
    tera: Tera,
}

impl ChunkRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(ChunkRenderer { tera })
    }

    /// The combined Markdown document for `chunks`.
    pub fn document(&self, chunks: &[Chunk]) -> Result<String, RenderError> {
        let views: Vec<ChunkView<'_>> = chunks
            .iter()
            .map(|c| ChunkView {
                attrs: format!("{{#{}}}", marker_id(&c.key)),
                source: &c.source,
            })
            .collect();
        let mut ctx = Context::new();
        ctx.insert("chunks", &views);
        Ok(self.tera.render(TEMPLATE_NAME, &ctx)?)
    }

    /// Render all `chunks` through `renderer` and map each key to its HTML.
    ///
    /// A failed render is logged and every chunk falls back to its source.
    pub fn render(
        &self,
        renderer: &dyn Renderer,
        chunks: &[Chunk],
        work_dir: &Path,
        stem: &str,
    ) -> Result<BTreeMap<String, String>, RenderError> {
        if chunks.is_empty() {
            return Ok(BTreeMap::new());
        }

        let doc = self.document(chunks)?;
        let html = match renderer.render(&doc, work_dir, stem) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(error = %e, "batch render failed, keeping markdown sources");
                String::new()
            }
        };

        let mut out = BTreeMap::new();
        let mut missing = 0usize;
        for chunk in chunks {
            let rendered = match div_inner(&html, &marker_id(&chunk.key)) {
                Some(h) => h,
                None => {
                    missing += 1;
                    chunk.source.clone()
                }
            };
            out.insert(chunk.key.clone(), rendered);
        }
        if missing > 0 {
            tracing::debug!(missing, total = chunks.len(), "chunks without rendered marker");
        }
        Ok(out)
    }
}

fn marker_id(key: &str) -> String {
    format!("qchunk-{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PassthroughRenderer;
    use tempfile::TempDir;

    struct FakeQuarto;

    impl Renderer for FakeQuarto {
        fn render(&self, source: &str, _: &Path, _: &str) -> Result<String, RenderError> {
            // Turn each `::: {#id}` block into `<div id="id">…</div>`.
            let mut html = String::new();
            for line in source.lines() {
                if let Some(id) = line.strip_prefix("::: {#").and_then(|l| l.strip_suffix('}')) {
                    html.push_str(&format!("<div id=\"{id}\" class=\"section\">"));
                } else if line == ":::" {
                    html.push_str("</div>");
                } else if !line.is_empty() && !line.starts_with("---") && !line.contains(':') {
                    html.push_str(&format!("<p>{line}</p>"));
                }
            }
            Ok(html)
        }
    }

    #[test]
    fn document_wraps_each_chunk() {
        let r = ChunkRenderer::new().unwrap();
        let doc = r
            .document(&[Chunk::new("q0_text", "What is $x$?"), Chunk::new("q0_a0", "**42**")])
            .unwrap();
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("::: {#qchunk-q0_text}\nWhat is $x$?\n:::"));
        assert!(doc.contains("::: {#qchunk-q0_a0}\n**42**\n:::"));
    }

    #[test]
    fn splits_rendered_chunks() {
        let tmp = TempDir::new().unwrap();
        let r = ChunkRenderer::new().unwrap();
        let out = r
            .render(
                &FakeQuarto,
                &[Chunk::new("a", "alpha"), Chunk::new("b", "beta")],
                tmp.path(),
                "quiz",
            )
            .unwrap();
        assert_eq!(out["a"], "<p>alpha</p>");
        assert_eq!(out["b"], "<p>beta</p>");
    }

    #[test]
    fn missing_markers_fall_back_to_source() {
        let tmp = TempDir::new().unwrap();
        let r = ChunkRenderer::new().unwrap();
        let out = r
            .render(&PassthroughRenderer, &[Chunk::new("a", "*alpha*")], tmp.path(), "quiz")
            .unwrap();
        assert_eq!(out["a"], "*alpha*");
    }
}
