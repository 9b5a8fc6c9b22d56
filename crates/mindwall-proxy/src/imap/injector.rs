//! Risk-score subject annotation
//!
//! Pure rewriting of the Subject header with a severity-keyed badge. A
//! subject already carrying a badge is never stamped twice.

use mindwall_common::Severity;

/// Badge markers recognized as our own prior annotation.
const BADGE_MARKERS: [&str; 3] = ["[⚠ MW:", "[🔴 MW:", "[🚨 MW:"];

/// Injects risk badges into Subject header lines.
pub struct RiskScoreInjector;

impl RiskScoreInjector {
    /// Badge text for a severity. Low risk carries no badge.
    pub fn badge(severity: Severity) -> &'static str {
        match severity {
            Severity::Low => "",
            Severity::Medium => "[⚠ MW:MEDIUM]",
            Severity::High => "[🔴 MW:HIGH]",
            Severity::Critical => "[🚨 MW:CRITICAL]",
        }
    }

    /// Rewrite the first Subject header in a raw message, prepending the
    /// badge for `severity`. Returns None when there is nothing to do: no
    /// badge for the severity, no Subject line, or a badge already present.
    ///
    /// Only the Subject line changes; every other byte is preserved.
    pub fn annotate_message(raw: &[u8], severity: Severity) -> Option<Vec<u8>> {
        let badge = Self::badge(severity);
        if badge.is_empty() {
            return None;
        }

        let (value_start, _line_end) = find_subject_value(raw)?;
        let rest = &raw[value_start..];
        if BADGE_MARKERS
            .iter()
            .any(|marker| rest.starts_with(marker.as_bytes()))
        {
            return None;
        }

        let mut annotated = Vec::with_capacity(raw.len() + badge.len() + 1);
        annotated.extend_from_slice(&raw[..value_start]);
        annotated.extend_from_slice(badge.as_bytes());
        annotated.push(b' ');
        annotated.extend_from_slice(rest);
        Some(annotated)
    }

    /// X-MindWall verdict headers for insertion into a message.
    #[allow(dead_code)]
    pub fn format_header(score: f64, severity: Severity) -> String {
        format!(
            "X-MindWall-Score: {:.1}\r\nX-MindWall-Severity: {}\r\n",
            score, severity
        )
    }
}

/// Locate the first `Subject:` header at a line start. Returns the offset
/// of the subject value (after the colon and any spaces) and of the line end.
fn find_subject_value(raw: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    while line_start < raw.len() {
        let line_end = raw[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| line_start + p)
            .unwrap_or(raw.len());
        // An empty line ends the header block.
        let line = &raw[line_start..line_end];
        let trimmed = if line.ends_with(b"\r") {
            &line[..line.len() - 1]
        } else {
            line
        };
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() >= 8 && trimmed[..8].eq_ignore_ascii_case(b"subject:") {
            let mut value_start = line_start + 8;
            while value_start < line_end && raw[value_start] == b' ' {
                value_start += 1;
            }
            return Some((value_start, line_end));
        }
        line_start = line_end + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = b"From: alice@corp.com\r\nSubject: Quarterly review\r\nTo: bob@corp.com\r\n\r\nBody text here.\r\n";

    #[test]
    fn test_high_badge_prepended_once() {
        let annotated = RiskScoreInjector::annotate_message(MESSAGE, Severity::High).unwrap();
        let text = String::from_utf8_lossy(&annotated);
        assert!(text.contains("Subject: [🔴 MW:HIGH] Quarterly review\r\n"));
        // Everything else is untouched.
        assert!(text.starts_with("From: alice@corp.com\r\n"));
        assert!(text.ends_with("Body text here.\r\n"));
    }

    #[test]
    fn test_low_severity_no_badge() {
        assert!(RiskScoreInjector::annotate_message(MESSAGE, Severity::Low).is_none());
    }

    #[test]
    fn test_already_badged_not_double_stamped() {
        let once = RiskScoreInjector::annotate_message(MESSAGE, Severity::Critical).unwrap();
        assert!(RiskScoreInjector::annotate_message(&once, Severity::Critical).is_none());
    }

    #[test]
    fn test_subject_in_body_not_annotated() {
        let raw = b"From: a@b.c\r\n\r\nSubject: this is body text\r\n";
        assert!(RiskScoreInjector::annotate_message(raw, Severity::High).is_none());
    }

    #[test]
    fn test_no_subject_header() {
        let raw = b"From: a@b.c\r\nTo: d@e.f\r\n\r\nhello\r\n";
        assert!(RiskScoreInjector::annotate_message(raw, Severity::Medium).is_none());
    }

    #[test]
    fn test_format_header() {
        let header = RiskScoreInjector::format_header(72.4, Severity::High);
        assert_eq!(
            header,
            "X-MindWall-Score: 72.4\r\nX-MindWall-Severity: high\r\n"
        );
    }

    #[test]
    fn test_case_insensitive_subject() {
        let raw = b"SUBJECT: shouting header\r\n\r\n";
        let annotated = RiskScoreInjector::annotate_message(raw, Severity::Medium).unwrap();
        assert!(String::from_utf8_lossy(&annotated).contains("[⚠ MW:MEDIUM] shouting header"));
    }
}
