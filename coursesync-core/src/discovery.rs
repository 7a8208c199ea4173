//! Content tree discovery.
//!
//! # Layout
//!
//! ```text
//! <content_root>/
//!   course_id.txt
//!   schedule.yaml            (calendar, opt-in)
//!   01_Welcome.qmd           (root item, no module)
//!   02_Basics/               (module "Basics")
//!     01_Intro.qmd
//!     02_Week_1.md           (subheader)
//!     03_Quiz.json
//!     04_Slides.pdf          (solo file)
//! ```
//!
//! Only names starting with exactly two digits and an underscore take part.
//! Entries are visited in byte order of their file names.

use std::path::{Component, Path, PathBuf};

use crate::error::{io_err, CoreError};

/// Prefix for scratch files produced while rendering; never synced.
pub const TEMP_PREFIX: &str = "_temp_";

/// A module directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDir {
    /// Display name with the ordering prefix removed.
    pub name: String,
    /// Identity key (directory path relative to the content root).
    pub rel_path: String,
    pub path: PathBuf,
    pub order: Option<u32>,
}

/// One top-level entry of the content tree, in visiting order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEntry {
    Module { module: ModuleDir, files: Vec<PathBuf> },
    RootFile(PathBuf),
}

/// Whether `name` starts with exactly two ASCII digits followed by `_`.
pub fn is_prefixed(name: &str) -> bool {
    let b = name.as_bytes();
    b.len() >= 3 && b[0].is_ascii_digit() && b[1].is_ascii_digit() && b[2] == b'_'
}

/// Split a leading numeric `NN_` prefix from `name`.
///
/// `"01_Introduction"` → `(Some(1), "Introduction")`; names without a numeric
/// prefix are returned unchanged.
pub fn split_prefix(name: &str) -> (Option<u32>, &str) {
    match name.split_once('_') {
        Some((digits, rest))
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            (digits.parse().ok(), rest)
        }
        _ => (None, name),
    }
}

/// Identity key for `path` relative to `root`, using forward slashes.
pub fn rel_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

/// Lexically normalise `path`, resolving `.` and `..` without touching disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Walk `root` and return the ordered content tree.
pub fn scan(root: &Path) -> Result<Vec<TreeEntry>, CoreError> {
    if !root.is_dir() {
        return Err(CoreError::ContentRootNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut entries = Vec::new();
    for path in sorted_children(root)? {
        let Some(name) = file_name(&path) else {
            continue;
        };
        if !is_prefixed(&name) {
            continue;
        }

        if path.is_dir() {
            let (order, display) = split_prefix(&name);
            let module = ModuleDir {
                name: display.to_string(),
                rel_path: rel_key(root, &path),
                path: path.clone(),
                order,
            };
            let files = sorted_children(&path)?
                .into_iter()
                .filter(|p| p.is_file())
                .filter(|p| file_name(p).is_some_and(|n| is_prefixed(&n)))
                .collect();
            entries.push(TreeEntry::Module { module, files });
        } else if path.is_file() {
            entries.push(TreeEntry::RootFile(path));
        }
    }
    Ok(entries)
}

fn sorted_children(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| file_name(p).is_some_and(|n| !n.starts_with(TEMP_PREFIX)))
        .collect();
    children.sort();
    Ok(children)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("01_Intro", true)]
    #[case("99_x", true)]
    #[case("1_Intro", false)]
    #[case("Intro", false)]
    #[case("001_Intro", false)]
    #[case("01-Intro", false)]
    fn prefix_detection(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_prefixed(name), expected);
    }

    #[test]
    fn split_prefix_strips_digits() {
        assert_eq!(split_prefix("01_Introduction"), (Some(1), "Introduction"));
        assert_eq!(split_prefix("12_Week_3"), (Some(12), "Week_3"));
        assert_eq!(split_prefix("Intro_Text"), (None, "Intro_Text"));
    }

    #[test]
    fn rel_key_uses_forward_slashes() {
        let root = Path::new("/course");
        let path = Path::new("/course/01_Mod/02_Page.qmd");
        assert_eq!(rel_key(root, path), "01_Mod/02_Page.qmd");
    }

    #[test]
    fn normalize_resolves_parent_components() {
        let p = normalize(Path::new("/course/01_Mod/../02_Mod/./a.qmd"));
        assert_eq!(p, PathBuf::from("/course/02_Mod/a.qmd"));
    }

    #[test]
    fn scan_orders_modules_and_root_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("02_Basics")).unwrap();
        fs::write(root.join("02_Basics/02_B.qmd"), "b").unwrap();
        fs::write(root.join("02_Basics/01_A.qmd"), "a").unwrap();
        fs::write(root.join("02_Basics/notes.txt"), "skip").unwrap();
        fs::write(root.join("02_Basics/_temp_01_A.qmd"), "skip").unwrap();
        fs::write(root.join("01_Welcome.qmd"), "w").unwrap();
        fs::write(root.join("course_id.txt"), "42").unwrap();
        fs::create_dir_all(root.join("assets")).unwrap();

        let tree = scan(root).expect("scan");
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0], TreeEntry::RootFile(root.join("01_Welcome.qmd")));
        match &tree[1] {
            TreeEntry::Module { module, files } => {
                assert_eq!(module.name, "Basics");
                assert_eq!(module.rel_path, "02_Basics");
                assert_eq!(module.order, Some(2));
                assert_eq!(
                    files,
                    &vec![root.join("02_Basics/01_A.qmd"), root.join("02_Basics/02_B.qmd")]
                );
            }
            other => panic!("expected module, got {other:?}"),
        }
    }

    #[test]
    fn scan_missing_root_errors() {
        let tmp = TempDir::new().unwrap();
        let err = scan(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, CoreError::ContentRootNotFound { .. }));
    }
}
