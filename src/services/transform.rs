//! Document content transformation.
//!
//! Two rewrites produce the Outline-ready body:
//!
//! 1. `<details>/<summary>` collapsible blocks become a `###` heading
//!    followed by the block body promoted into the document flow. Best
//!    effort: nested blocks convert only at the outermost level and
//!    summaries degrade to their text content. Malformed blocks pass
//!    through unchanged with a recorded warning; the transform never
//!    fails a document.
//! 2. Local attachment references (`files/<uuid>/<name>`) become stable
//!    `attachment://` placeholders, resolved to real URLs only after the
//!    uploads complete.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Result of transforming one document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Destination-ready text with attachment placeholders
    pub text: String,
    /// Ordered, de-duplicated attachment paths referenced by the body
    pub attachment_refs: Vec<String>,
    /// Warnings for content segments that could not be converted
    pub warnings: Vec<String>,
}

/// Apply all transformations to one document body.
///
/// Idempotent on content with no collapsible blocks and no attachment
/// references.
pub fn transform_content(content: &str) -> TransformOutcome {
    let (text, warnings) = convert_details_to_headings(content);
    let (text, attachment_refs) = mark_attachment_refs(&text);
    TransformOutcome {
        text,
        attachment_refs,
        warnings,
    }
}

const DETAILS_OPEN: &str = "<details";
const DETAILS_CLOSE: &str = "</details>";
const SUMMARY_CLOSE: &str = "</summary>";

/// Rewrite every `<details>` block to a heading plus body.
fn convert_details_to_headings(content: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(content.len());
    let mut warnings = Vec::new();
    let mut cursor = 0;

    while let Some(open_rel) = find_ci(&content[cursor..], DETAILS_OPEN) {
        let open = cursor + open_rel;
        out.push_str(&content[cursor..open]);

        let Some(close_rel) = find_ci(&content[open..], DETAILS_CLOSE) else {
            warnings.push("unterminated <details> block left unchanged".to_string());
            cursor = open;
            break;
        };
        let end = open + close_rel + DETAILS_CLOSE.len();
        let block = &content[open..end];

        match rewrite_details_block(block) {
            Some(rewritten) => out.push_str(&rewritten),
            None => {
                warnings.push("<details> block without summary left unchanged".to_string());
                out.push_str(block);
            }
        }
        cursor = end;
    }

    out.push_str(&content[cursor..]);
    (out, warnings)
}

/// Rewrite one complete `<details>...</details>` block.
///
/// The summary label is extracted through an HTML fragment parse so inline
/// markup inside `<summary>` degrades to its text; the body is taken as
/// the raw text between the summary close tag and the block end so
/// markdown inside the block survives untouched.
fn rewrite_details_block(block: &str) -> Option<String> {
    let fragment = Html::parse_fragment(block);
    let selector = Selector::parse("summary").ok()?;
    let summary = fragment.select(&selector).next()?;
    let title = summary.text().collect::<String>().trim().to_string();
    if title.is_empty() {
        return None;
    }

    let body_start = find_ci(block, SUMMARY_CLOSE)? + SUMMARY_CLOSE.len();
    let body_end = block.len() - DETAILS_CLOSE.len();
    if body_start > body_end {
        return None;
    }
    let body = block[body_start..body_end].trim();

    Some(format!("### {title}\n\n{body}"))
}

/// Case-insensitive substring search (ASCII tags only).
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

fn attachment_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(!?)\[([^\]]*)\]\((/{0,2}files/[^)]+)\)").expect("valid regex")
    })
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(!?)\[([^\]]*)\]\(attachment://([^)]+)\)").expect("valid regex")
    })
}

/// Replace every local attachment reference with a placeholder recording
/// the referenced path, and collect the ordered set of paths.
fn mark_attachment_refs(content: &str) -> (String, Vec<String>) {
    let mut refs: Vec<String> = Vec::new();
    let text = attachment_ref_regex()
        .replace_all(content, |caps: &regex::Captures| {
            let clean = caps[3].trim_start_matches('/').to_string();
            let replacement = format!("{}[{}](attachment://{})", &caps[1], &caps[2], clean);
            if !refs.contains(&clean) {
                refs.push(clean);
            }
            replacement
        })
        .into_owned();
    (text, refs)
}

/// Resolve placeholders to uploaded URLs.
///
/// Image references keep their alt text. Plain file links are rewritten to
/// `[<filename> <size>](url)`, the convention Outline uses to render a
/// download chip. Paths absent from `uploads` (failed uploads) keep their
/// placeholder so the missing reference stays visible.
pub fn resolve_attachment_urls(content: &str, uploads: &HashMap<String, (String, u64)>) -> String {
    placeholder_regex()
        .replace_all(content, |caps: &regex::Captures| {
            let path = &caps[3];
            let Some((url, size)) = uploads.get(path) else {
                return caps[0].to_string();
            };
            if &caps[1] == "!" {
                format!("![{}]({})", &caps[2], url)
            } else {
                let text = caps[2].trim();
                let filename = text.rsplit('/').next().unwrap_or(text);
                format!("[{filename} {size}]({url})")
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_content_is_unchanged() {
        let content = "# Title\n\nPlain paragraph with [a link](https://example.com).\n";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, content);
        assert!(outcome.attachment_refs.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn transform_is_idempotent_without_collapsibles() {
        let content = "Some text\n\n## Heading\n\nmore text";
        let once = transform_content(content);
        let twice = transform_content(&once.text);
        assert_eq!(once.text, twice.text);
        assert_eq!(once.text, content);
    }

    #[test]
    fn simple_details_becomes_heading() {
        let content = "before\n<details>\n<summary>FAQ</summary>\nThe answer.\n</details>\nafter";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, "before\n### FAQ\n\nThe answer.\nafter");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn summary_with_inline_markup_degrades_to_text() {
        let content = "<details><summary>A <b>bold</b> title</summary>body</details>";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, "### A bold title\n\nbody");
    }

    #[test]
    fn details_without_summary_passes_through_with_warning() {
        let content = "<details>\nno summary here\n</details>";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, content);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn unterminated_details_passes_through_with_warning() {
        let content = "<details><summary>Open</summary>never closed";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, content);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn uppercase_tags_are_converted() {
        let content = "<DETAILS><SUMMARY>Loud</SUMMARY>quiet</DETAILS>";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, "### Loud\n\nquiet");
    }

    #[test]
    fn multiple_blocks_convert_independently() {
        let content = "<details><summary>One</summary>a</details>\n\n\
                       <details><summary>Two</summary>b</details>";
        let outcome = transform_content(content);
        assert_eq!(outcome.text, "### One\n\na\n\n### Two\n\nb");
    }

    #[test]
    fn image_reference_becomes_placeholder() {
        let content = "see ![screenshot](/files/u1/shot.png) here";
        let outcome = transform_content(content);
        assert_eq!(
            outcome.text,
            "see ![screenshot](attachment://files/u1/shot.png) here"
        );
        assert_eq!(outcome.attachment_refs, vec!["files/u1/shot.png"]);
    }

    #[test]
    fn duplicate_references_are_collected_once() {
        let content = "![a](files/u1/x.png) and ![b](//files/u1/x.png)";
        let outcome = transform_content(content);
        assert_eq!(outcome.attachment_refs, vec!["files/u1/x.png"]);
    }

    #[test]
    fn resolve_replaces_image_placeholder() {
        let mut uploads = HashMap::new();
        uploads.insert(
            "files/u1/shot.png".to_string(),
            ("https://outline.example.com/api/attachments/abc".to_string(), 123),
        );
        let resolved = resolve_attachment_urls(
            "![screenshot](attachment://files/u1/shot.png)",
            &uploads,
        );
        assert_eq!(
            resolved,
            "![screenshot](https://outline.example.com/api/attachments/abc)"
        );
    }

    #[test]
    fn resolve_rewrites_file_link_with_size() {
        let mut uploads = HashMap::new();
        uploads.insert(
            "files/u1/report.pdf".to_string(),
            ("https://s3/report".to_string(), 2048),
        );
        let resolved = resolve_attachment_urls(
            "[files/u1/report.pdf](attachment://files/u1/report.pdf)",
            &uploads,
        );
        assert_eq!(resolved, "[report.pdf 2048](https://s3/report)");
    }

    #[test]
    fn unresolved_placeholder_stays_visible() {
        let uploads = HashMap::new();
        let text = "![lost](attachment://files/u1/gone.png)";
        assert_eq!(resolve_attachment_urls(text, &uploads), text);
    }
}
