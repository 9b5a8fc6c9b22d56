//! Behavioral deviation scorer
//!
//! Compares the current message against the sender's established baseline
//! across four axes (word count, sentence length, timing, formality) and
//! produces a weighted deviation score in [0, 100]. Pure and stateless
//! apart from the compiled formality markers.

use crate::text_metrics::{body_metrics, FormalityScorer};
use chrono::{DateTime, Timelike, Utc};
use mindwall_common::SenderBaseline;

const WORD_COUNT_WEIGHT: f64 = 0.30;
const SENTENCE_LENGTH_WEIGHT: f64 = 0.15;
const TIMING_WEIGHT: f64 = 0.25;
const FORMALITY_WEIGHT: f64 = 0.30;

/// Baselines with fewer samples than this carry no deviation signal.
const MIN_SAMPLES: u64 = 3;

/// Per-axis and aggregate deviation of one message from the baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviationReport {
    pub deviation_score: f64,
    pub word_count_deviation: f64,
    pub sentence_length_deviation: f64,
    pub timing_deviation: f64,
    pub formality_deviation: f64,
    pub current_word_count: usize,
}

/// Scores how far a message strays from the sender's baseline.
pub struct DeviationScorer {
    formality: FormalityScorer,
}

impl DeviationScorer {
    pub fn new() -> Self {
        Self {
            formality: FormalityScorer::new(),
        }
    }

    /// Compute the deviation report. A missing baseline, or one with fewer
    /// than three samples, yields zero (insufficient history).
    pub fn score(
        &self,
        body: &str,
        received_at: Option<DateTime<Utc>>,
        baseline: Option<&SenderBaseline>,
    ) -> DeviationReport {
        let metrics = body_metrics(body);
        let baseline = match baseline {
            Some(b) if b.sample_count >= MIN_SAMPLES => b,
            _ => {
                return DeviationReport {
                    current_word_count: metrics.word_count,
                    ..DeviationReport::default()
                }
            }
        };

        let wc_score = if baseline.avg_word_count > 0.0 {
            let pct = (metrics.word_count as f64 - baseline.avg_word_count).abs()
                / baseline.avg_word_count;
            (pct * 100.0).min(100.0)
        } else {
            0.0
        };

        let sl_score = if baseline.avg_sentence_length > 0.0 {
            let pct = (metrics.avg_sentence_length - baseline.avg_sentence_length).abs()
                / baseline.avg_sentence_length;
            (pct * 100.0).min(100.0)
        } else {
            0.0
        };

        let timing_score = match received_at {
            Some(ts) if !baseline.typical_hours.is_empty() => {
                let send_hour = ts.hour() as i64;
                if baseline.typical_hours.contains(&(send_hour as u8)) {
                    0.0
                } else {
                    let min_distance = baseline
                        .typical_hours
                        .iter()
                        .map(|&h| {
                            let d = (send_hour - h as i64).abs();
                            d.min(24 - d)
                        })
                        .min()
                        .unwrap_or(0);
                    (min_distance as f64 / 6.0 * 100.0).min(100.0)
                }
            }
            _ => 0.0,
        };

        let current_formality = self.formality.score(body);
        let formality_score =
            ((current_formality - baseline.formality_score).abs() * 200.0).min(100.0);

        let aggregate = (wc_score * WORD_COUNT_WEIGHT
            + sl_score * SENTENCE_LENGTH_WEIGHT
            + timing_score * TIMING_WEIGHT
            + formality_score * FORMALITY_WEIGHT)
            .clamp(0.0, 100.0);

        tracing::debug!(
            aggregate,
            word_count_dev = wc_score,
            timing_dev = timing_score,
            formality_dev = formality_score,
            "deviation.scored"
        );

        DeviationReport {
            deviation_score: aggregate,
            word_count_deviation: wc_score,
            sentence_length_deviation: sl_score,
            timing_deviation: timing_score,
            formality_deviation: formality_score,
            current_word_count: metrics.word_count,
        }
    }
}

impl Default for DeviationScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mindwall_common::BaselineKey;

    fn baseline(samples: u64) -> SenderBaseline {
        SenderBaseline {
            key: BaselineKey::new("bob@corp.com", "alice@corp.com"),
            avg_word_count: 120.0,
            avg_sentence_length: 15.0,
            typical_hours: (9..=17).collect(),
            formality_score: 0.85,
            sample_count: samples,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_no_baseline_scores_zero() {
        let scorer = DeviationScorer::new();
        let report = scorer.score("anything at all", None, None);
        assert_eq!(report.deviation_score, 0.0);
    }

    #[test]
    fn test_thin_baseline_scores_zero() {
        let scorer = DeviationScorer::new();
        let report = scorer.score("anything at all", None, Some(&baseline(2)));
        assert_eq!(report.deviation_score, 0.0);
    }

    #[test]
    fn test_behavioral_swap_scores_high() {
        // Established formal sender suddenly writes an 8-word informal
        // message at 3 AM.
        let scorer = DeviationScorer::new();
        let at_3am = Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap();
        let report = scorer.score("yo gonna need that favor now lol thx", Some(at_3am), Some(&baseline(20)));

        assert!(report.word_count_deviation > 90.0);
        assert!(report.timing_deviation == 100.0);
        assert!(report.formality_deviation > 90.0);
        assert!(report.deviation_score >= 70.0);
    }

    #[test]
    fn test_typical_hour_has_no_timing_deviation() {
        let scorer = DeviationScorer::new();
        let at_2pm = Utc.with_ymd_and_hms(2024, 6, 1, 14, 0, 0).unwrap();
        let report = scorer.score("word ".repeat(120).trim(), Some(at_2pm), Some(&baseline(20)));
        assert_eq!(report.timing_deviation, 0.0);
    }

    #[test]
    fn test_circular_hour_distance() {
        // Typical hour 23; message at hour 1 is distance 2, not 22.
        let scorer = DeviationScorer::new();
        let mut b = baseline(10);
        b.typical_hours = vec![23];
        let at_1am = Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap();
        let report = scorer.score("word ".repeat(120).trim(), Some(at_1am), Some(&b));
        assert!((report.timing_deviation - (2.0 / 6.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_matching_message_scores_low() {
        let scorer = DeviationScorer::new();
        let at_10am = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        // ~120 words, 15-word sentences, formal register.
        let sentence = "Dear colleague kindly review the attached quarterly projections at your convenience please. ";
        let body = sentence.repeat(9);
        let report = scorer.score(&body, Some(at_10am), Some(&baseline(20)));
        assert!(report.deviation_score < 25.0);
    }
}
