//! Pull the document body out of a standalone Quarto HTML page.

use once_cell::sync::Lazy;
use regex::Regex;

static MAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<main[^>]*id="quarto-document-content"[^>]*>(.*?)</main>"#)
        .expect("valid regex")
});
static TITLE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<header[^>]*id="title-block-header"[^>]*>.*?</header>"#)
        .expect("valid regex")
});
static DIV_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?)div\b[^>]*>").expect("valid regex"));

/// Main content of a rendered page with the title header removed.
///
/// Falls back to the whole document when no main block is present.
pub fn extract_main(html: &str) -> String {
    let body = match MAIN.captures(html) {
        Some(caps) => caps[1].to_string(),
        None => {
            tracing::warn!("no main content block in rendered html, using full document");
            html.to_string()
        }
    };
    TITLE_BLOCK.replace_all(&body, "").trim().to_string()
}

/// Inner HTML of the `<div id="{id}">`, honouring nested divs.
pub fn div_inner(html: &str, id: &str) -> Option<String> {
    let open = Regex::new(&format!(r#"<div\s[^>]*id="{}"[^>]*>"#, regex::escape(id))).ok()?;
    let start = open.find(html)?;
    let rest = &html[start.end()..];

    let mut depth = 1usize;
    for tag in DIV_TAG.captures_iter(rest) {
        let m = tag.get(0)?;
        if tag[1].is_empty() {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some(rest[..m.start()].trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_main_and_strips_title() {
        let html = r#"<html><body>
<header id="title-block-header" class="quarto-title-block"><h1>Intro</h1></header>
<main class="content" id="quarto-document-content">
<header id="title-block-header"><h1 class="title">Intro</h1></header>
<p>Hello</p>
</main></body></html>"#;
        assert_eq!(extract_main(html), "<p>Hello</p>");
    }

    #[test]
    fn falls_back_to_whole_document() {
        assert_eq!(extract_main("  <p>bare</p>\n"), "<p>bare</p>");
    }

    #[test]
    fn div_inner_handles_nesting() {
        let html = r#"<div id="qchunk-a" class="x"><div class="cell"><p>1</p></div><p>2</p></div><div id="qchunk-b">3</div>"#;
        assert_eq!(
            div_inner(html, "qchunk-a").as_deref(),
            Some(r#"<div class="cell"><p>1</p></div><p>2</p>"#)
        );
        assert_eq!(div_inner(html, "qchunk-b").as_deref(), Some("3"));
        assert_eq!(div_inner(html, "qchunk-c"), None);
    }
}
