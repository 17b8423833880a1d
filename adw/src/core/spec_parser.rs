//! Extraction of a specification document from free-form agent output.
//!
//! Agent CLIs frame their output differently and the framing is not stable, so
//! extraction is an ordered list of independent recognizers. The first one that
//! yields a document wins. `None` means the output could not be parsed and the
//! caller must fall back to a deterministic template.

use std::sync::LazyLock;

use regex::Regex;

/// Minimum number of non-blank lines for a line-scanned capture to count as a document.
pub const MIN_DOCUMENT_LINES: usize = 3;

/// Recognizers in precedence order.
pub const RECOGNIZERS: [Recognizer; 3] = [
    Recognizer::TextParts,
    Recognizer::FencedBlock,
    Recognizer::LineScan,
];

/// Harness markup that never belongs to the document body.
const FRAMING_TOKENS: &[&str] = &[
    "TextPart(",
    "ThinkPart(",
    "ToolCall(",
    "ToolResult(",
    "StepBegin(",
    "StatusUpdate(",
    "ContentPart(",
];

/// Phrases that mean the agent has moved on to describing what it did.
const SUMMARY_PHRASES: &[&str] = &[
    "i've created",
    "i have created",
    "i've written",
    "i have written",
    "the spec has been",
    "the specification has been",
    "summary of changes",
    "let me know if",
];

static TEXT_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)TextPart\(\s*type='text',\s*text=(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")\s*\)"#,
    )
    .expect("text part regex")
});

static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:markdown|md)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").expect("fenced block regex")
});

static SPEC_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^# Spec\b").expect("spec heading regex"));

static START_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:# \S|\*\*(?:ADW ID|Run ID|Issue|Type):\*\*)").expect("start marker regex")
});

/// One strategy for locating the document in raw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognizer {
    /// Quoted `TextPart(type='text', text='...')` fragments with escaped content.
    TextParts,
    /// A fenced block labelled `markdown` or `md`.
    FencedBlock,
    /// Plain text scanned line by line from the first start marker.
    LineScan,
}

impl Recognizer {
    pub fn name(self) -> &'static str {
        match self {
            Recognizer::TextParts => "text_parts",
            Recognizer::FencedBlock => "fenced_block",
            Recognizer::LineScan => "line_scan",
        }
    }

    pub fn recognize(self, raw: &str) -> Option<String> {
        let found = match self {
            Recognizer::TextParts => recognize_text_parts(raw),
            Recognizer::FencedBlock => recognize_fenced_block(raw),
            Recognizer::LineScan => recognize_line_scan(raw),
        }?;
        let trimmed = found.trim_end();
        if trimmed.trim().is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// A document pulled out of agent output, tagged with the recognizer that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSpec {
    pub recognizer: Recognizer,
    pub document: String,
}

/// Try every recognizer in order and return the first non-empty document.
pub fn extract_spec(raw: &str) -> Option<ExtractedSpec> {
    RECOGNIZERS.iter().find_map(|recognizer| {
        recognizer.recognize(raw).map(|document| ExtractedSpec {
            recognizer: *recognizer,
            document,
        })
    })
}

fn recognize_text_parts(raw: &str) -> Option<String> {
    let mut text = String::new();
    let mut matched = false;
    for caps in TEXT_PART_RE.captures_iter(raw) {
        matched = true;
        if let Some(fragment) = caps.get(1).or_else(|| caps.get(2)) {
            text.push_str(&unescape(fragment.as_str()));
        }
    }
    if !matched {
        return None;
    }

    if let Some(heading) = SPEC_HEADING_RE.find(&text) {
        return Some(text[heading.start()..].to_string());
    }
    let start = first_marker_offset(&text)?;
    let document = &text[start..];
    let lines: Vec<&str> = document.lines().collect();
    enough_lines(&lines).then(|| document.to_string())
}

/// Byte offset of the first line that opens a document.
fn first_marker_offset(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_start_marker(line) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

fn recognize_fenced_block(raw: &str) -> Option<String> {
    FENCED_RE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str())
        .find(|body| body.lines().any(is_start_marker))
        .map(str::to_string)
}

fn recognize_line_scan(raw: &str) -> Option<String> {
    let mut captured: Vec<&str> = Vec::new();
    let mut capturing = false;

    for line in raw.lines() {
        if !capturing {
            if is_start_marker(line) {
                capturing = true;
                captured.push(line);
            }
            continue;
        }

        if is_framing_line(line) || is_summary_line(line) {
            if enough_lines(&captured) {
                break;
            }
            // Too short to be the document; keep looking for a later start.
            captured.clear();
            capturing = false;
            continue;
        }
        captured.push(line);
    }

    if enough_lines(&captured) {
        Some(captured.join("\n"))
    } else {
        None
    }
}

fn is_start_marker(line: &str) -> bool {
    START_MARKER_RE.is_match(line)
}

fn is_framing_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    FRAMING_TOKENS.iter().any(|token| trimmed.starts_with(token))
}

fn is_summary_line(line: &str) -> bool {
    let lowered = line.to_lowercase();
    SUMMARY_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

fn enough_lines(lines: &[&str]) -> bool {
    lines.iter().filter(|line| !line.trim().is_empty()).count() >= MIN_DOCUMENT_LINES
}

/// Resolve the backslash escapes a Python-style repr leaves in quoted text.
fn unescape(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_part_payload_starts_at_marker_with_escapes_resolved() {
        let raw = r#"StepBegin(n=1)
TextPart(type='text', text='Let me look at the repo first.\n\n# Spec 001: Dark mode\n\n**Issue:** #7\nIt\'s a \"toggle\".')
StatusUpdate(status='done')"#;
        let extracted = extract_spec(raw).expect("document");
        assert_eq!(extracted.recognizer, Recognizer::TextParts);
        assert_eq!(
            extracted.document,
            "# Spec 001: Dark mode\n\n**Issue:** #7\nIt's a \"toggle\"."
        );
    }

    #[test]
    fn text_part_without_spec_heading_starts_at_first_marker() {
        let raw = r"TextPart(type='text', text='Let me look at the repo first.\n\n# Dark mode toggle\n\n**Issue:** #7\nAdd a toggle.')";
        let extracted = extract_spec(raw).expect("document");
        assert_eq!(extracted.recognizer, Recognizer::TextParts);
        assert_eq!(
            extracted.document,
            "# Dark mode toggle\n\n**Issue:** #7\nAdd a toggle."
        );
    }

    #[test]
    fn text_part_fragments_are_concatenated_in_order() {
        let raw = "TextPart(type='text', text='# Spec 002: Export\\n\\n## Overview\\n')\n\
                   ThinkPart(type='think', think='hmm')\n\
                   TextPart( type='text', text='CSV export for reports.\\n' )";
        let doc = Recognizer::TextParts.recognize(raw).expect("document");
        assert_eq!(doc, "# Spec 002: Export\n\n## Overview\nCSV export for reports.");
    }

    #[test]
    fn text_part_double_quoted_variant() {
        let raw = r##"TextPart(type='text', text="# Spec 003: Don't panic\n\nBody line\nMore")"##;
        let doc = Recognizer::TextParts.recognize(raw).expect("document");
        assert!(doc.starts_with("# Spec 003: Don't panic"));
    }

    #[test]
    fn text_part_without_heading_needs_document_markers() {
        let chatter = "TextPart(type='text', text='Sure, working on it.')";
        assert_eq!(Recognizer::TextParts.recognize(chatter), None);

        let doc = "TextPart(type='text', text='# Dark mode\\n\\n**Issue:** #7\\nAdd a toggle.')";
        assert_eq!(
            Recognizer::TextParts.recognize(doc).as_deref(),
            Some("# Dark mode\n\n**Issue:** #7\nAdd a toggle.")
        );
    }

    #[test]
    fn fenced_markdown_block_with_marker() {
        let raw = "Here is the plan:\n\n```markdown\n# Spec 004: Search\n\n- [ ] index\n```\n\nDone.";
        let extracted = extract_spec(raw).expect("document");
        assert_eq!(extracted.recognizer, Recognizer::FencedBlock);
        assert_eq!(extracted.document, "# Spec 004: Search\n\n- [ ] index");
    }

    #[test]
    fn fenced_block_without_marker_is_ignored() {
        let raw = "```md\njust some notes\n```";
        assert_eq!(Recognizer::FencedBlock.recognize(raw), None);
    }

    #[test]
    fn line_scan_stops_at_framing_tokens() {
        let raw = "thinking...\n# Spec 005: Cache\n\n**Type:** chore\nAdd an LRU cache.\nToolCall(name='write')\n# Not part of it";
        let extracted = extract_spec(raw).expect("document");
        assert_eq!(extracted.recognizer, Recognizer::LineScan);
        assert_eq!(
            extracted.document,
            "# Spec 005: Cache\n\n**Type:** chore\nAdd an LRU cache."
        );
    }

    #[test]
    fn line_scan_stops_at_summary_phrases() {
        let raw = "# Spec 006: Audit log\n## Overview\nRecord every change.\n\nI've created the spec at specs/006.md";
        let doc = Recognizer::LineScan.recognize(raw).expect("document");
        assert!(doc.ends_with("Record every change."));
        assert!(!doc.contains("I've created"));
    }

    #[test]
    fn line_scan_rejects_bare_heading() {
        let raw = "# Title only\nLet me know if you need more.";
        assert_eq!(Recognizer::LineScan.recognize(raw), None);
    }

    #[test]
    fn no_marker_in_any_framing_yields_none() {
        let inputs = [
            "",
            "plain chatter without any headings",
            "TextPart(type='text', text='no heading here')",
            "```markdown\nno marker\n```",
            "## second-level only\nline\nline",
        ];
        for raw in inputs {
            assert_eq!(extract_spec(raw), None, "input: {raw:?}");
        }
    }

    #[test]
    fn text_parts_take_precedence_over_fenced_blocks() {
        let raw = "TextPart(type='text', text='# Spec 007: A\\n\\nfrom parts\\nx')\n```markdown\n# Spec 007: B\n```";
        let extracted = extract_spec(raw).expect("document");
        assert_eq!(extracted.recognizer, Recognizer::TextParts);
        assert!(extracted.document.contains("from parts"));
    }

    #[test]
    fn unescape_leaves_unknown_sequences() {
        assert_eq!(unescape(r"a\qb\\c"), r"a\qb\c");
    }
}
