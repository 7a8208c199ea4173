//! [`QuartoRenderer`]: shells out to `quarto render`.
//!
//! The source is written next to the original file as `_temp_<stem>.qmd` so
//! relative includes and images resolve. Quarto writes `_temp_<stem>.html`
//! plus a `_temp_<stem>_files/` support directory; all three are removed
//! afterwards, retrying while another process still holds them.

use std::path::{Path, PathBuf};
use std::process::Command;

use coursesync_core::discovery::TEMP_PREFIX;
use coursesync_core::retry::{retry, RetryPolicy};

use crate::error::{io_err, RenderError};
use crate::extract::extract_main;
use crate::Renderer;

/// Renders Markdown through the Quarto CLI.
#[derive(Debug, Clone)]
pub struct QuartoRenderer {
    program: String,
    cleanup: RetryPolicy,
}

impl Default for QuartoRenderer {
    fn default() -> Self {
        QuartoRenderer {
            program: "quarto".to_string(),
            cleanup: RetryPolicy::LOCKED_FILE,
        }
    }
}

impl QuartoRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable (a wrapper script, a pinned install).
    pub fn with_program(program: impl Into<String>) -> Self {
        QuartoRenderer {
            program: program.into(),
            ..Self::default()
        }
    }
}

impl Renderer for QuartoRenderer {
    fn render(&self, source: &str, work_dir: &Path, stem: &str) -> Result<String, RenderError> {
        let scratch = Scratch::new(work_dir, stem, self.cleanup);
        std::fs::write(&scratch.qmd, source).map_err(|e| io_err(&scratch.qmd, e))?;

        tracing::debug!(path = %scratch.qmd.display(), "quarto render");
        let output = Command::new(&self.program)
            .arg("render")
            .arg(&scratch.qmd)
            .args(["--to", "html"])
            .current_dir(work_dir)
            .output()
            .map_err(|source| RenderError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                path: scratch.qmd.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let html = std::fs::read_to_string(&scratch.html).map_err(|e| io_err(&scratch.html, e))?;
        Ok(extract_main(&html))
    }
}

/// Scratch paths for one render; removed on drop.
struct Scratch {
    qmd: PathBuf,
    html: PathBuf,
    support: PathBuf,
    policy: RetryPolicy,
}

impl Scratch {
    fn new(work_dir: &Path, stem: &str, policy: RetryPolicy) -> Self {
        let base = format!("{TEMP_PREFIX}{stem}");
        Scratch {
            qmd: work_dir.join(format!("{base}.qmd")),
            html: work_dir.join(format!("{base}.html")),
            support: work_dir.join(format!("{base}_files")),
            policy,
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for file in [&self.qmd, &self.html] {
            remove_with_retry(file, self.policy, |p| std::fs::remove_file(p));
        }
        remove_with_retry(&self.support, self.policy, |p| std::fs::remove_dir_all(p));
    }
}

/// Remove `path` if it exists, retrying on failure. Gives up with a warning.
pub fn remove_with_retry(
    path: &Path,
    policy: RetryPolicy,
    remove: impl Fn(&Path) -> std::io::Result<()>,
) {
    if !path.exists() {
        return;
    }
    let result = retry(
        policy,
        |e: &std::io::Error| e.kind() != std::io::ErrorKind::NotFound,
        || remove(path),
    );
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove scratch file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scratch_files_are_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        {
            let scratch = Scratch::new(tmp.path(), "01_Intro", RetryPolicy::immediate(1));
            std::fs::write(&scratch.qmd, "x").unwrap();
            std::fs::write(&scratch.html, "y").unwrap();
            std::fs::create_dir_all(scratch.support.join("libs")).unwrap();
            assert!(tmp.path().join("_temp_01_Intro.qmd").exists());
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let tmp = TempDir::new().unwrap();
        let renderer = QuartoRenderer {
            program: "coursesync-no-such-quarto".into(),
            cleanup: RetryPolicy::immediate(1),
        };
        let err = renderer.render("# hi", tmp.path(), "x").unwrap_err();
        assert!(matches!(err, RenderError::Launch { .. }));
        assert!(!tmp.path().join("_temp_x.qmd").exists());
    }
}
