//! Inference prompt construction

use mindwall_common::{Dimension, SenderBaseline};

/// Maximum body characters embedded in the prompt.
const PROMPT_BODY_LIMIT: usize = 4000;

/// Fixed system prompt instructing JSON-only output.
pub const SYSTEM_PROMPT: &str = "\
You are MindWall, a cybersecurity analysis engine specialized in detecting \
psychological manipulation tactics in business communications. You analyze \
emails and messages with clinical precision, identifying social engineering \
patterns used by attackers to manipulate recipients into unsafe actions.

You always respond with a valid JSON object and nothing else.";

/// Assemble the analysis prompt from the message, the sender baseline, and
/// the pre-filter signals.
#[allow(clippy::too_many_arguments)]
pub fn build_analysis_prompt(
    email_body: &str,
    sender_email: &str,
    sender_display_name: &str,
    subject: &str,
    received_hour: u32,
    baseline: Option<&SenderBaseline>,
    word_count_deviation_pct: Option<f64>,
    prefilter_signals: &[String],
) -> String {
    let mut prompt = String::with_capacity(email_body.len().min(PROMPT_BODY_LIMIT) + 2048);

    prompt.push_str("Analyze the following email for psychological manipulation tactics.\n");

    if !prefilter_signals.is_empty() {
        prompt.push_str(&format!(
            "\nFAST-FILTER PRE-SIGNALS DETECTED: {}\n",
            prefilter_signals.join(", ")
        ));
    }

    if let Some(baseline) = baseline {
        prompt.push_str(&format!(
            "\nSENDER BEHAVIORAL BASELINE (historical communication pattern):\n\
             - Average word count per email: {:.0}\n\
             - Average sentence length: {:.1} words\n\
             - Typical send hours (UTC): {:?}\n\
             - Formality score (0=casual, 1=formal): {:.2}\n\
             - This email's send hour: {}\n\
             - Word count deviation: {}\n",
            baseline.avg_word_count,
            baseline.avg_sentence_length,
            baseline.typical_hours,
            baseline.formality_score,
            received_hour,
            word_count_deviation_pct
                .map(|pct| format!("{:+.0}%", pct))
                .unwrap_or_else(|| "N/A".to_string()),
        ));
    }

    let body: String = email_body.chars().take(PROMPT_BODY_LIMIT).collect();
    prompt.push_str(&format!(
        "\nEMAIL METADATA:\n\
         - Sender: {} <{}>\n\
         - Subject: {}\n\
         - Received Hour (UTC): {}\n\
         \nEMAIL BODY:\n---\n{}\n---\n",
        sender_display_name, sender_email, subject, received_hour, body,
    ));

    prompt.push_str("\nScore each of the following 12 manipulation dimensions from 0 to 100:\n");
    for dim in Dimension::ALL {
        prompt.push_str(&format!("- {}: {}\n", dim.as_str(), dim.description()));
    }

    prompt.push_str(
        "\nRespond ONLY with this JSON structure:\n\
         {\n    \"dimension_scores\": {\n",
    );
    for (i, dim) in Dimension::ALL.iter().enumerate() {
        let comma = if i + 1 < Dimension::ALL.len() { "," } else { "" };
        prompt.push_str(&format!("        \"{}\": <0-100>{}\n", dim.as_str(), comma));
    }
    prompt.push_str(
        "    },\n\
         \x20   \"primary_tactic\": \"<name of highest-scoring dimension>\",\n\
         \x20   \"explanation\": \"<1-2 sentence plain English explanation of what manipulation is occurring, written to warn a non-technical employee>\",\n\
         \x20   \"recommended_action\": \"<proceed|verify|block>\",\n\
         \x20   \"confidence\": <0-100>\n\
         }\n",
    );

    prompt
}
