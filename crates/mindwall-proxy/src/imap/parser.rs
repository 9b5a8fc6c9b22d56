//! FETCH response line parsing
//!
//! Recognizes untagged FETCH responses announcing message-body literals and
//! pulls the UID out of the item list. A `{N}` counts as a literal length
//! prefix only when it is the final token of the line; the same characters
//! inside a quoted ENVELOPE string never end a line and are relayed as-is.

use regex::{Regex, RegexBuilder};

/// Parser for upstream response lines.
pub struct FetchLineParser {
    fetch: Regex,
    uid: Regex,
    body_descriptor: Regex,
}

impl FetchLineParser {
    pub fn new() -> Self {
        let build = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("static fetch pattern")
        };
        Self {
            fetch: build(r"^\*\s+\d+\s+FETCH\s+\("),
            uid: build(r"\bUID\s+(\d+)"),
            body_descriptor: build(
                r"(?:BODY\[(?:TEXT|HEADER|1(?:\.1)?)?\]|RFC822(?:\.TEXT)?)\s*\{\d+\+?\}\s*$",
            ),
        }
    }

    /// Whether the line starts an untagged FETCH response.
    pub fn is_fetch_response(&self, line: &str) -> bool {
        self.fetch.is_match(line.trim_start())
    }

    /// The octet count when the line ends in a literal prefix `{N}` (or the
    /// non-synchronizing `{N+}`), regardless of the preceding item.
    pub fn trailing_literal(&self, line: &str) -> Option<usize> {
        let trimmed = line.trim_end_matches(['\r', '\n']).trim_end();
        let inner = trimmed.strip_suffix('}')?;
        let open = inner.rfind('{')?;
        let digits = inner[open + 1..].strip_suffix('+').unwrap_or(&inner[open + 1..]);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Whether a trailing literal belongs to a message-body item
    /// (`BODY[...]` or `RFC822[.TEXT]`).
    pub fn is_body_literal(&self, line: &str) -> bool {
        self.is_fetch_response(line) && self.body_descriptor.is_match(line)
    }

    /// The `UID n` item of a FETCH line, when present.
    pub fn extract_uid(&self, line: &str) -> Option<String> {
        self.uid
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for FetchLineParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_detection() {
        let parser = FetchLineParser::new();
        assert!(parser.is_fetch_response("* 12 FETCH (UID 42 BODY[] {1024}\r\n"));
        assert!(parser.is_fetch_response("* 1 fetch (FLAGS (\\Seen))\r\n"));
        assert!(!parser.is_fetch_response("A001 OK FETCH completed\r\n"));
        assert!(!parser.is_fetch_response("* 3 EXISTS\r\n"));
    }

    #[test]
    fn test_trailing_literal() {
        let parser = FetchLineParser::new();
        assert_eq!(parser.trailing_literal("* 12 FETCH (BODY[] {1024}\r\n"), Some(1024));
        assert_eq!(parser.trailing_literal("* 12 FETCH (BODY[] {0}\r\n"), Some(0));
        assert_eq!(parser.trailing_literal("a LOGIN {12+}\r\n"), Some(12));
        assert_eq!(parser.trailing_literal("* 12 FETCH (FLAGS (\\Seen))\r\n"), None);
    }

    #[test]
    fn test_brace_inside_quoted_string_not_a_literal() {
        // The {99} sits inside ENVELOPE data, not at end of line.
        let parser = FetchLineParser::new();
        let line = "* 7 FETCH (ENVELOPE (\"subject with {99} braces\" \"x\") FLAGS (\\Seen))\r\n";
        assert_eq!(parser.trailing_literal(line), None);
        assert!(!parser.is_body_literal(line));
    }

    #[test]
    fn test_body_descriptor_variants() {
        let parser = FetchLineParser::new();
        for line in [
            "* 5 FETCH (UID 9 BODY[] {321}\r\n",
            "* 5 FETCH (BODY[TEXT] {321}\r\n",
            "* 5 FETCH (BODY[1] {321}\r\n",
            "* 5 FETCH (BODY[1.1] {321}\r\n",
            "* 5 FETCH (RFC822 {321}\r\n",
            "* 5 FETCH (RFC822.TEXT {321}\r\n",
        ] {
            assert!(parser.is_body_literal(line), "expected body literal: {}", line);
        }
        // A literal on a non-body item is relayed opaquely, not captured.
        assert!(!parser.is_body_literal("* 5 FETCH (ENVELOPE {44}\r\n"));
    }

    #[test]
    fn test_uid_extraction() {
        let parser = FetchLineParser::new();
        assert_eq!(
            parser.extract_uid("* 12 FETCH (UID 4217 BODY[] {10}\r\n"),
            Some("4217".to_string())
        );
        assert_eq!(parser.extract_uid("* 12 FETCH (BODY[] {10}\r\n"), None);
    }
}
