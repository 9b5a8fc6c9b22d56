//! MIME message extraction
//!
//! Turns a captured body octet-run into the plain-text representation and
//! metadata the analysis API expects. Prefers the first text/plain part,
//! falls back to sanitized text/html, and skips attachments. Messages that
//! do not parse as MIME are treated as raw text with best-effort header
//! scraping.

use crate::mime::sanitizer::HtmlSanitizer;
use chrono::{DateTime, TimeZone, Utc};
use mail_parser::MessageParser;
use regex::{Regex, RegexBuilder};

/// Placeholder for addresses the message did not carry.
const UNKNOWN_ADDRESS: &str = "unknown@unknown";

/// Extracted message content and metadata.
#[derive(Debug, Clone)]
pub struct ExtractedMessage {
    /// Sanitized plain-text body.
    pub text: String,
    pub sender_email: String,
    pub sender_display: String,
    pub recipient_email: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
}

/// Extracts analyzable text from captured message bytes.
pub struct MessageExtractor {
    parser: MessageParser,
    sanitizer: HtmlSanitizer,
    subject: Regex,
    from: Regex,
    to: Regex,
}

impl MessageExtractor {
    pub fn new() -> Self {
        let build = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .expect("static header pattern")
        };
        Self {
            parser: MessageParser::new(),
            sanitizer: HtmlSanitizer::new(),
            subject: build(r"^Subject:\s*(.+)"),
            from: build(r#"^From:\s*(?:"?([^"<]*)"?\s*)?<?([^>\s]+@[^>\s]+)>?"#),
            to: build(r#"^To:\s*(?:"?[^"<]*"?\s*)?<?([^>\s]+@[^>\s]+)>?"#),
        }
    }

    /// Extract text and metadata from a raw capture.
    pub fn extract(&self, raw: &[u8]) -> ExtractedMessage {
        match self.parser.parse(raw) {
            Some(message) => {
                let subject = message.subject().unwrap_or_default().to_string();

                let (sender_display, sender_email) = message
                    .from()
                    .and_then(|a| a.first())
                    .map(|addr| {
                        (
                            addr.name().unwrap_or_default().to_string(),
                            addr.address().unwrap_or(UNKNOWN_ADDRESS).to_string(),
                        )
                    })
                    .unwrap_or_else(|| (String::new(), UNKNOWN_ADDRESS.to_string()));

                let recipient_email = message
                    .to()
                    .and_then(|a| a.first())
                    .and_then(|addr| addr.address())
                    .unwrap_or(UNKNOWN_ADDRESS)
                    .to_string();

                let date = message
                    .date()
                    .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

                // First text part wins; otherwise sanitize the first HTML
                // part. Attachment parts are not body candidates.
                let text = match message.body_text(0) {
                    Some(plain) => self.sanitizer.sanitize(&plain),
                    None => message
                        .body_html(0)
                        .map(|html| self.sanitizer.sanitize(&html))
                        .unwrap_or_default(),
                };

                ExtractedMessage {
                    text,
                    sender_email,
                    sender_display,
                    recipient_email,
                    subject,
                    date,
                }
            }
            None => self.extract_unparsed(raw),
        }
    }

    /// Fallback for bytes that do not parse as a message: scrape headers
    /// with regexes and treat the whole run as text.
    fn extract_unparsed(&self, raw: &[u8]) -> ExtractedMessage {
        let text = String::from_utf8_lossy(raw);

        let subject = self
            .subject
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let (sender_display, sender_email) = self
            .from
            .captures(&text)
            .map(|c| {
                (
                    c.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                    c.get(2)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string()),
                )
            })
            .unwrap_or_else(|| (String::new(), UNKNOWN_ADDRESS.to_string()));

        let recipient_email = self
            .to
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

        ExtractedMessage {
            text: self.sanitizer.sanitize(&text),
            sender_email,
            sender_display,
            recipient_email,
            subject,
            date: None,
        }
    }
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message() {
        let raw = b"From: \"Alice Smith\" <alice@corp.com>\r\n\
                    To: bob@corp.com\r\n\
                    Subject: Quarterly numbers\r\n\
                    Date: Mon, 3 Jun 2024 14:05:00 +0000\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    Numbers attached. No rush.\r\n";
        let extracted = MessageExtractor::new().extract(raw);
        assert_eq!(extracted.sender_email, "alice@corp.com");
        assert_eq!(extracted.sender_display, "Alice Smith");
        assert_eq!(extracted.recipient_email, "bob@corp.com");
        assert_eq!(extracted.subject, "Quarterly numbers");
        assert_eq!(extracted.text, "Numbers attached. No rush.");
        assert!(extracted.date.is_some());
    }

    #[test]
    fn test_multipart_prefers_text_plain() {
        let raw = b"From: a@b.c\r\n\
                    To: d@e.f\r\n\
                    Subject: multi\r\n\
                    MIME-Version: 1.0\r\n\
                    Content-Type: multipart/alternative; boundary=\"xyz\"\r\n\
                    \r\n\
                    --xyz\r\n\
                    Content-Type: text/plain; charset=utf-8\r\n\
                    \r\n\
                    the plain part\r\n\
                    --xyz\r\n\
                    Content-Type: text/html; charset=utf-8\r\n\
                    \r\n\
                    <p>the html part</p>\r\n\
                    --xyz--\r\n";
        let extracted = MessageExtractor::new().extract(raw);
        assert_eq!(extracted.text, "the plain part");
    }

    #[test]
    fn test_html_only_is_sanitized() {
        let raw = b"From: a@b.c\r\n\
                    Subject: html\r\n\
                    Content-Type: text/html; charset=utf-8\r\n\
                    \r\n\
                    <div>hello</div><p>there &amp; everywhere</p>\r\n";
        let extracted = MessageExtractor::new().extract(raw);
        assert_eq!(extracted.text, "hello\nthere & everywhere");
    }

    #[test]
    fn test_missing_addresses_default() {
        let raw = b"Subject: bare\r\n\r\nbody only\r\n";
        let extracted = MessageExtractor::new().extract(raw);
        assert_eq!(extracted.sender_email, UNKNOWN_ADDRESS);
        assert_eq!(extracted.recipient_email, UNKNOWN_ADDRESS);
        assert_eq!(extracted.subject, "bare");
    }
}
