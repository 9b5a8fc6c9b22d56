//! Rule-based pre-filter
//!
//! Zero-inference fast path that detects common manipulation signals with
//! compiled regex families before the inference service is invoked. Each
//! family that fires contributes a signal token and a score boost.

use chrono::{DateTime, Timelike, Utc};
use regex::{Regex, RegexBuilder};

/// Result of the pre-filter evaluation.
#[derive(Debug, Clone, Default)]
pub struct PreFilterResult {
    pub triggered: bool,
    pub signals: Vec<String>,
    pub score_boost: f64,
}

/// Rule-based pre-filter engine.
///
/// The pattern catalog is compiled once at construction and is read-only
/// afterwards; share one instance per process.
pub struct PreFilter {
    urgency: Vec<Regex>,
    authority: Vec<Regex>,
    fear: Vec<Regex>,
    suspicious_request: Vec<Regex>,
    emotional: Vec<Regex>,
    spoofed_sender: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("static prefilter pattern")
        })
        .collect()
}

impl PreFilter {
    pub fn new() -> Self {
        Self {
            urgency: compile(&[
                r"\b(immediate(ly)?|urgent(ly)?|asap|right\s+away|time[\s\-]sensitive)\b",
                r"\b(act\s+now|don'?t\s+delay|expires?\s+(today|soon|in\s+\d+))\b",
                r"\b(within\s+\d+\s+(hour|minute|hr|min)s?|deadline\s+(is\s+)?(today|tomorrow|tonight))\b",
                r"\b(last\s+chance|final\s+(notice|warning|reminder))\b",
            ]),
            authority: compile(&[
                r"\b(ceo|cfo|cto|coo|president|director|board\s+member)\b",
                r"\b(on\s+behalf\s+of|authorized\s+by|per\s+(the\s+)?(ceo|director|management))\b",
                r"\b(executive\s+order|compliance\s+requirement|legal\s+obligation)\b",
                r"\b(law\s+enforcement|federal|government\s+agency|irs|fbi|sec)\b",
            ]),
            fear: compile(&[
                r"\b(account\s+(will\s+be\s+)?(suspend|terminat|delet|clos|lock|block))\b",
                r"\b(legal\s+action|lawsuit|prosecution|arrest|penalty|fine)\b",
                r"\b(failure\s+to\s+(comply|respond)|consequences|disciplinary)\b",
                r"\b(unauthorized\s+access|security\s+breach|compromised)\b",
            ]),
            suspicious_request: compile(&[
                r"\b(wire\s+transfer|bank\s+transfer|bitcoin|cryptocurrency|gift\s+card)\b",
                r"\b(password|credential|social\s+security|ssn|login\s+detail)\b",
                r"\b(click\s+(here|this\s+link|below)|verify\s+your\s+(account|identity))\b",
                r"\b(update\s+your\s+(payment|billing|bank)|confirm\s+your\s+(identity|details))\b",
                r"\b(do\s+not\s+(share|tell|mention|inform)|keep\s+this\s+(confidential|secret|between\s+us))\b",
            ]),
            emotional: compile(&[
                r"\b(please\s+help|desperate(ly)?|begging|I\s+need\s+you\s+to)\b",
                r"\b(disappointed\s+in\s+you|let\s+(me|us|the\s+team)\s+down)\b",
                r"\b(only\s+you\s+can|counting\s+on\s+you|trust(ing)?\s+you)\b",
            ]),
            spoofed_sender: compile(&[
                // paypal.com-verify.xyz style lookalikes
                r"[a-z0-9]+\.(com|org|net)-[a-z]+\.[a-z]{2,}",
                r"(support|admin|helpdesk|security|noreply)@[^.]+\.[a-z]{2,}",
                // c0mpany.com style digit substitution inside the domain
                r"@[a-z]+[01][a-z]+\.[a-z]{2,}",
            ]),
        }
    }

    /// Evaluate one message against the catalog. First match per family
    /// emits that family's signal token and boost.
    pub fn evaluate(
        &self,
        subject: &str,
        body: &str,
        sender_email: &str,
        received_at: Option<DateTime<Utc>>,
    ) -> PreFilterResult {
        let mut result = PreFilterResult::default();
        let combined = format!("{} {}", subject, body);

        if self.urgency.iter().any(|p| p.is_match(&combined)) {
            result.signals.push("urgency_language_detected".into());
            result.score_boost += 5.0;
        }

        if self.authority.iter().any(|p| p.is_match(&combined)) {
            result.signals.push("authority_reference_detected".into());
            result.score_boost += 8.0;
        }

        if self.fear.iter().any(|p| p.is_match(&combined)) {
            result.signals.push("fear_threat_language_detected".into());
            result.score_boost += 7.0;
        }

        let suspicious_count = self
            .suspicious_request
            .iter()
            .filter(|p| p.is_match(&combined))
            .count();
        if suspicious_count > 0 {
            result
                .signals
                .push(format!("suspicious_request_detected(count={})", suspicious_count));
            result.score_boost += (suspicious_count as f64 * 5.0).min(20.0);
        }

        if self.emotional.iter().any(|p| p.is_match(&combined)) {
            result.signals.push("emotional_manipulation_detected".into());
            result.score_boost += 4.0;
        }

        if self.spoofed_sender.iter().any(|p| p.is_match(sender_email)) {
            result.signals.push("spoofed_sender_pattern".into());
            result.score_boost += 10.0;
        }

        if let Some(ts) = received_at {
            let hour = ts.hour();
            if hour < 5 || hour > 23 {
                result.signals.push(format!("unusual_send_hour({})", hour));
                result.score_boost += 3.0;
            }
        }

        if subject.len() > 5 && subject == subject.to_uppercase() {
            result.signals.push("all_caps_subject".into());
            result.score_boost += 3.0;
        }

        let exclamations = combined.matches('!').count();
        if exclamations > 3 {
            result
                .signals
                .push(format!("excessive_exclamation_marks({})", exclamations));
            result.score_boost += 2.0;
        }

        result.triggered = !result.signals.is_empty();

        if result.triggered {
            tracing::info!(
                signals = ?result.signals,
                score_boost = result.score_boost,
                sender_email,
                "prefilter.triggered"
            );
        }

        result
    }
}

impl Default for PreFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_urgency_and_authority_detected() {
        let filter = PreFilter::new();
        let result = filter.evaluate(
            "URGENT REQUEST",
            "URGENT: The CEO needs you to wire $50,000 by 3:00 PM today.",
            "ceo@c0mpany.com",
            None,
        );
        assert!(result.triggered);
        assert!(result.signals.iter().any(|s| s == "urgency_language_detected"));
        assert!(result.signals.iter().any(|s| s == "authority_reference_detected"));
        assert!(result.signals.iter().any(|s| s == "all_caps_subject"));
        assert!(result.signals.iter().any(|s| s == "spoofed_sender_pattern"));
        // urgency 5 + authority 8 + spoofed 10 + all-caps 3
        assert_eq!(result.score_boost, 26.0);
    }

    #[test]
    fn test_benign_message_passes_clean() {
        let filter = PreFilter::new();
        let result = filter.evaluate(
            "Lunch on Thursday",
            "Shall we grab lunch at noon on Thursday? The usual place works for me.",
            "colleague@corp.com",
            None,
        );
        assert!(!result.triggered);
        assert!(result.signals.is_empty());
        assert_eq!(result.score_boost, 0.0);
    }

    #[test]
    fn test_spoofed_sender_shape() {
        let filter = PreFilter::new();
        let result = filter.evaluate("hi", "hello there", "billing@paypal.com-verify.xyz", None);
        assert!(result.signals.iter().any(|s| s == "spoofed_sender_pattern"));
    }

    #[test]
    fn test_unusual_send_hour() {
        let filter = PreFilter::new();
        let at_3am = Utc.with_ymd_and_hms(2024, 6, 1, 3, 12, 0).unwrap();
        let result = filter.evaluate("note", "quick note", "a@b.com", Some(at_3am));
        assert!(result.signals.iter().any(|s| s == "unusual_send_hour(3)"));

        let at_2pm = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let result = filter.evaluate("note", "quick note", "a@b.com", Some(at_2pm));
        assert!(!result.signals.iter().any(|s| s.starts_with("unusual_send_hour")));
    }

    #[test]
    fn test_suspicious_request_boost_caps_at_20() {
        let filter = PreFilter::new();
        let body = "wire transfer your password, click here to verify your account, \
                    update your billing, keep this between us";
        let result = filter.evaluate("", body, "a@b.com", None);
        let suspicious = result
            .signals
            .iter()
            .find(|s| s.starts_with("suspicious_request_detected"))
            .unwrap();
        assert_eq!(suspicious, "suspicious_request_detected(count=5)");
        // 5 families at 5.0 each would be 25; capped contribution is 20.
        assert!(result.score_boost <= 20.0 + 5.0 + 8.0 + 7.0 + 4.0 + 10.0 + 3.0 + 2.0);
    }

    #[test]
    fn test_excessive_exclamation_marks() {
        let filter = PreFilter::new();
        let result = filter.evaluate("Hello!!", "So excited!! Really!!", "a@b.com", None);
        assert!(result
            .signals
            .iter()
            .any(|s| s == "excessive_exclamation_marks(6)"));
    }
}
