//! Confidence model for extracted fields.
//!
//! Per-field scores are integers in 0..=100. A document's overall score is the
//! rounded mean of whichever per-field scores are present; the review gate and
//! the display band both read that single number.

use serde::Serialize;

/// Overall scores strictly below this go to human review. Fixed policy.
pub const REVIEW_THRESHOLD: u8 = 85;

/// Lower bound of the "High" display band. Display only, not a policy input.
pub const HIGH_BAND_FLOOR: u8 = 90;

/// Rounded (half-up) mean of the present scores, or `None` when no score is present.
pub fn overall_confidence<T>(scores: &[Option<T>]) -> Option<u8>
where
    T: Copy + Into<f64>,
{
    let present: Vec<f64> = scores.iter().flatten().map(|&s| s.into()).collect();
    if present.is_empty() {
        return None;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    // Scores are non-negative, so floor(x + 0.5) is round-half-up.
    Some((mean + 0.5).floor().clamp(0.0, 100.0) as u8)
}

pub fn needs_review(overall: Option<u8>) -> bool {
    matches!(overall, Some(score) if score < REVIEW_THRESHOLD)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn for_score(score: Option<u8>) -> Option<Self> {
        score.map(|s| match s {
            s if s >= HIGH_BAND_FLOOR => Self::High,
            s if s >= REVIEW_THRESHOLD => Self::Medium,
            _ => Self::Low,
        })
    }
}
