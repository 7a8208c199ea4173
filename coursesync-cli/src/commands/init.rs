//! `coursesync init [PATH] --course-id <ID>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use coursesync_core::config;

/// Record the Canvas course id for a content root.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Content root directory.
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Numeric id of the Canvas course, as seen in the course URL.
    #[arg(long)]
    pub course_id: String,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;
        if !root.is_dir() {
            anyhow::bail!("'{}' is not a directory", root.display());
        }

        let written = config::write_course_id_at(&root, &self.course_id)
            .with_context(|| format!("failed to write course id into '{}'", root.display()))?;
        println!("✓ Course {} recorded", self.course_id.trim());
        println!("  Saved to: {}", written.display());

        if config::credentials().is_err() {
            let hint = dirs::config_dir()
                .map(|dir| config::config_path_at(&dir).display().to_string())
                .unwrap_or_else(|| "coursesync/config.yaml".to_string());
            println!(
                "  No credentials yet: set {} and {}, or add api_url / api_token to {hint}",
                config::ENV_API_URL,
                config::ENV_API_TOKEN,
            );
        }
        Ok(())
    }
}
