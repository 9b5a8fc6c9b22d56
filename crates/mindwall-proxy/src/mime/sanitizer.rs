//! HTML-to-text sanitization
//!
//! Converts HTML payloads to clean plain text for analysis: script/style
//! blocks removed wholesale, block boundaries become newlines, remaining
//! tags stripped, character references decoded, whitespace normalized.

use regex::{Regex, RegexBuilder};

/// HTML sanitizer with compiled patterns.
pub struct HtmlSanitizer {
    script_style: Regex,
    block_elements: Regex,
    line_break: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl HtmlSanitizer {
    pub fn new() -> Self {
        let build = |p: &str, dotall: bool| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .dot_matches_new_line(dotall)
                .build()
                .expect("static sanitizer pattern")
        };
        Self {
            script_style: build(r"<(script|style)[^>]*>.*?</(script|style)>", true),
            block_elements: build(
                r"</?(?:div|p|h[1-6]|ul|ol|li|table|tr|td|th|blockquote|pre|hr|section|article|header|footer|nav)[^>]*>",
                false,
            ),
            line_break: build(r"<br\s*/?\s*>", false),
            tag: build(r"<[^>]+>", false),
            whitespace: build(r"\s+", false),
        }
    }

    /// Convert HTML or text content to trimmed plain text.
    pub fn sanitize(&self, content: &str) -> String {
        if content.is_empty() {
            return String::new();
        }

        let text = self.script_style.replace_all(content, "");
        let text = self.block_elements.replace_all(&text, "\n");
        let text = self.line_break.replace_all(&text, "\n");
        let text = self.tag.replace_all(&text, "");
        let text = html_escape::decode_html_entities(&text);

        // Collapse whitespace within lines and drop emptied lines.
        let mut lines: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let cleaned = self.whitespace.replace_all(line, " ");
            let cleaned = cleaned.trim();
            if !cleaned.is_empty() {
                lines.push(cleaned.to_string());
            }
        }
        lines.join("\n").trim().to_string()
    }
}

impl Default for HtmlSanitizer {
    fn default() -> Self {
        Self::new()
    }
}
