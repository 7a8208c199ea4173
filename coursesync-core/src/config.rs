//! Course and credential configuration.
//!
//! Credentials resolve from `CANVAS_API_URL` / `CANVAS_API_TOKEN`, falling back
//! to `<config_dir>/coursesync/config.yaml`:
//!
//! ```yaml
//! api_url: https://canvas.example.edu
//! api_token: "1234~abcd"
//! ```
//!
//! As in the rest of the workspace, each lookup has an `_at` form taking an
//! explicit directory; tests only call the `_at` forms.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{io_err, CoreError};

pub const ENV_API_URL: &str = "CANVAS_API_URL";
pub const ENV_API_TOKEN: &str = "CANVAS_API_TOKEN";
pub const COURSE_ID_FILE: &str = "course_id.txt";

/// API endpoint and token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_url: String,
    pub token: String,
}

/// Everything the sync core needs to talk to one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseContext {
    pub credentials: Credentials,
    pub course_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api_url: Option<String>,
    api_token: Option<String>,
}

/// `<config_dir>/coursesync/config.yaml`: pure, no I/O.
pub fn config_path_at(config_dir: &Path) -> PathBuf {
    config_dir.join("coursesync").join("config.yaml")
}

/// Resolve credentials from explicit environment values and the config file
/// under `config_dir`. Environment values win.
pub fn credentials_at(
    env_url: Option<String>,
    env_token: Option<String>,
    config_dir: &Path,
) -> Result<Credentials, CoreError> {
    let path = config_path_at(config_dir);
    let file = if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str::<ConfigFile>(&contents).map_err(|source| CoreError::Yaml {
            path: path.clone(),
            source,
        })?
    } else {
        ConfigFile::default()
    };

    let api_url = non_empty(env_url)
        .or_else(|| non_empty(file.api_url))
        .ok_or_else(|| CoreError::MissingCredential {
            name: ENV_API_URL,
            path: path.clone(),
        })?;
    let token = non_empty(env_token)
        .or_else(|| non_empty(file.api_token))
        .ok_or_else(|| CoreError::MissingCredential {
            name: ENV_API_TOKEN,
            path: path.clone(),
        })?;

    Ok(Credentials {
        api_url: api_url.trim_end_matches('/').to_string(),
        token,
    })
}

/// `credentials_at` using the process environment and `dirs::config_dir()`.
pub fn credentials() -> Result<Credentials, CoreError> {
    let config_dir = dirs::config_dir().ok_or(CoreError::ConfigDirNotFound)?;
    credentials_at(
        std::env::var(ENV_API_URL).ok(),
        std::env::var(ENV_API_TOKEN).ok(),
        &config_dir,
    )
}

/// Resolve the course id: explicit argument first, then `course_id.txt` in
/// `content_root`.
pub fn course_id_at(content_root: &Path, arg: Option<&str>) -> Result<String, CoreError> {
    if let Some(id) = arg.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(id.to_string());
    }

    let path = content_root.join(COURSE_ID_FILE);
    if path.exists() {
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let id = contents.trim();
        if !id.is_empty() {
            tracing::info!(course_id = id, "found course id in {}", path.display());
            return Ok(id.to_string());
        }
    }
    Err(CoreError::MissingCourseId { path })
}

/// Write `course_id.txt` into `content_root`.
pub fn write_course_id_at(content_root: &Path, course_id: &str) -> Result<PathBuf, CoreError> {
    let path = content_root.join(COURSE_ID_FILE);
    std::fs::write(&path, format!("{}\n", course_id.trim())).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) {
        let path = config_path_at(dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn env_wins_over_config_file() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), "api_url: https://file.example\napi_token: filetoken\n");
        let creds = credentials_at(
            Some("https://env.example/".into()),
            None,
            tmp.path(),
        )
        .expect("credentials");
        assert_eq!(creds.api_url, "https://env.example");
        assert_eq!(creds.token, "filetoken");
    }

    #[test]
    fn missing_token_names_variable() {
        let tmp = TempDir::new().unwrap();
        let err = credentials_at(Some("https://x".into()), Some("  ".into()), tmp.path())
            .unwrap_err();
        assert!(err.to_string().contains(ENV_API_TOKEN));
    }

    #[test]
    fn course_id_argument_wins() {
        let tmp = TempDir::new().unwrap();
        write_course_id_at(tmp.path(), "111").unwrap();
        assert_eq!(course_id_at(tmp.path(), Some("222")).unwrap(), "222");
    }

    #[test]
    fn course_id_read_from_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(COURSE_ID_FILE), "  4711 \n").unwrap();
        assert_eq!(course_id_at(tmp.path(), None).unwrap(), "4711");
    }

    #[test]
    fn course_id_missing_errors() {
        let tmp = TempDir::new().unwrap();
        let err = course_id_at(tmp.path(), None).unwrap_err();
        assert!(matches!(err, CoreError::MissingCourseId { .. }));
    }
}
