//! YAML frontmatter splitting and parsing for `.qmd` / `.md` sources.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::CoreError;

const FENCE: &str = "---";

/// Split `text` into `(yaml, body)`.
///
/// The frontmatter must start on the first line with `---` and end at the next
/// line that is exactly `---`. Without a closing fence the whole text is body.
pub fn split(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return (None, text);
    };
    let Some(rest) = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse the frontmatter of `text` into `T`, defaulting when absent.
///
/// `path` is only used for error context.
pub fn parse<T>(text: &str, path: &Path) -> Result<T, CoreError>
where
    T: DeserializeOwned + Default,
{
    match split(text) {
        (Some(yaml), _) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).map_err(|source| CoreError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrontMatter;

    #[test]
    fn splits_frontmatter_and_body() {
        let text = "---\ntitle: Intro\n---\n# Hello\n";
        let (yaml, body) = split(text);
        assert_eq!(yaml, Some("title: Intro\n"));
        assert_eq!(body, "# Hello\n");
    }

    #[test]
    fn no_frontmatter_returns_whole_text() {
        let text = "# Just a body\n---\n";
        assert_eq!(split(text), (None, text));
    }

    #[test]
    fn unterminated_frontmatter_is_body() {
        let text = "---\ntitle: x\n";
        assert_eq!(split(text), (None, text));
    }

    #[test]
    fn handles_crlf() {
        let text = "---\r\ntitle: Intro\r\n---\r\nbody";
        let (yaml, body) = split(text);
        assert_eq!(yaml, Some("title: Intro\r\n"));
        assert_eq!(body, "body");
    }

    #[test]
    fn parse_defaults_when_absent() {
        let fm: FrontMatter = parse("plain", Path::new("x.qmd")).expect("parse");
        assert!(fm.title.is_none());
        assert!(fm.canvas.kind.is_none());
    }

    #[test]
    fn parse_error_carries_path() {
        let err = parse::<FrontMatter>("---\ntitle: [unclosed\n---\n", Path::new("bad.qmd"))
            .unwrap_err();
        assert!(err.to_string().contains("bad.qmd"));
    }
}
