//! Parsing of free-form review output into structured finding blocks.

use once_cell::sync::Lazy;
use regex::Regex;

/// Numbered markdown headings that open a finding block.
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^###\s+(\d+)\.\s+(.+)$").unwrap());

static PRIORITY_ROW_RE: Lazy<Regex> = Lazy::new(|| table_row_regex("Priority"));
static SUMMARY_ROW_RE: Lazy<Regex> = Lazy::new(|| table_row_regex("指摘の概要"));
static LOCATION_ROW_RE: Lazy<Regex> = Lazy::new(|| table_row_regex("該当箇所"));

fn table_row_regex(field: &str) -> Regex {
    Regex::new(&format!(
        r"(?m)^\|\s*\*\*{}\*\*\s*\|\s*(.*?)\s*\|\s*$",
        regex::escape(field)
    ))
    .unwrap()
}

/// Synthetic title given to output with no recognizable headings.
pub const FALLBACK_TITLE: &str = "レビュー結果";

/// One finding as parsed: heading title plus everything up to the next
/// heading.
#[derive(Debug, Clone)]
pub struct FindingBlock {
    pub title: String,
    pub body: String,
    /// Set when the whole content became one block because no heading
    /// matched.
    pub is_fallback: bool,
}

/// Split one pass's markdown into finding blocks. Content without any
/// matching heading becomes a single fallback block; blank bodies are
/// dropped.
pub fn parse_finding_blocks(content: &str) -> Vec<FindingBlock> {
    let headings: Vec<(usize, usize, String)> = HEADING_RE
        .captures_iter(content)
        .map(|caps| {
            let whole = caps.get(0).unwrap();
            (whole.start(), whole.end(), caps[2].trim().to_string())
        })
        .collect();

    if headings.is_empty() {
        let body = content.trim();
        if body.is_empty() {
            return Vec::new();
        }
        return vec![FindingBlock {
            title: FALLBACK_TITLE.to_string(),
            body: body.to_string(),
            is_fallback: true,
        }];
    }

    let mut blocks = Vec::with_capacity(headings.len());
    for (i, (_, header_end, title)) in headings.iter().enumerate() {
        let body_end = headings
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(content.len());
        let body = trim_block_body(&content[*header_end..body_end]);
        if body.is_empty() {
            continue;
        }
        blocks.push(FindingBlock {
            title: title.clone(),
            body,
            is_fallback: false,
        });
    }
    blocks
}

/// Trim a block body and drop a trailing horizontal-rule line; the rule is
/// a separator between findings, not part of the finding. Keeping it out
/// makes re-parsing merged output stable.
fn trim_block_body(raw: &str) -> String {
    let mut body = raw.trim();
    loop {
        if body == "---" {
            return String::new();
        }
        match body.strip_suffix("\n---") {
            Some(stripped) => body = stripped.trim_end(),
            None => return body.to_string(),
        }
    }
}

/// Extract one field value from a markdown table row in `body`; missing
/// fields become the empty string.
pub fn extract_table_field(body: &str, field: &str) -> String {
    let regex = match field {
        "Priority" => &*PRIORITY_ROW_RE,
        "指摘の概要" => &*SUMMARY_ROW_RE,
        "該当箇所" => &*LOCATION_ROW_RE,
        _ => return String::new(),
    };
    regex
        .captures(body)
        .map(|caps| caps[1].to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_numbered_blocks() {
        let content = "\
### 1. Null dereference

body one

### 2. Unchecked error

body two";
        let blocks = parse_finding_blocks(content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].title, "Null dereference");
        assert_eq!(blocks[0].body, "body one");
        assert_eq!(blocks[1].title, "Unchecked error");
        assert_eq!(blocks[1].body, "body two");
        assert!(!blocks[0].is_fallback);
    }

    #[test]
    fn test_blank_bodies_are_dropped() {
        let content = "### 1. Empty\n\n### 2. Real\n\ncontent";
        let blocks = parse_finding_blocks(content);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].title, "Real");
    }

    #[test]
    fn test_unstructured_content_becomes_fallback_block() {
        let blocks = parse_finding_blocks("The code looks fine overall.\n");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_fallback);
        assert_eq!(blocks[0].title, FALLBACK_TITLE);
        assert_eq!(blocks[0].body, "The code looks fine overall.");
    }

    #[test]
    fn test_empty_content_yields_no_blocks() {
        assert!(parse_finding_blocks("").is_empty());
        assert!(parse_finding_blocks("   \n  ").is_empty());
    }

    #[test]
    fn test_heading_must_be_numbered() {
        let blocks = parse_finding_blocks("### Unnumbered heading\n\nbody");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_fallback);
    }

    #[test]
    fn test_trailing_rule_is_not_part_of_the_body() {
        let content = "### 1. A\n\nbody a\n\n---\n\n### 2. B\n\nbody b";
        let blocks = parse_finding_blocks(content);
        assert_eq!(blocks[0].body, "body a");
        assert_eq!(blocks[1].body, "body b");
    }

    #[test]
    fn test_extract_table_field() {
        let body = "\
text before
| **Priority** | High |
| **指摘の概要** | Possible null dereference |
| **該当箇所** | src/x.go:10 |
text after";
        assert_eq!(extract_table_field(body, "Priority"), "High");
        assert_eq!(
            extract_table_field(body, "指摘の概要"),
            "Possible null dereference"
        );
        assert_eq!(extract_table_field(body, "該当箇所"), "src/x.go:10");
        assert_eq!(extract_table_field(body, "Severity"), "");
    }

    #[test]
    fn test_extract_table_field_missing_row() {
        assert_eq!(extract_table_field("no table here", "Priority"), "");
    }
}
