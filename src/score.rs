#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Derives the final score from itemized deductions and extra credit.
//!
//! The model's own arithmetic is never trusted: `final_score` is always
//! `clamp(max_points - Σ deductions + extra credit, 0, max_points)`.

use serde::Serialize;
use tracing::info;

use crate::schema::GradingResult;

/// Disagreement below this many points is treated as rounding.
pub const SCORE_TOLERANCE: f64 = 0.01;

/// Disagreement above this share of `max_points` is flagged for review.
pub const REVIEW_RATIO: f64 = 0.10;

/// The model proposed a different score than its own itemization implies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreDiscrepancy {
    /// Score the model reported.
    pub proposed:     f64,
    /// Score recomputed from deductions and extra credit.
    pub recomputed:   f64,
    /// Whether the gap is large enough to warrant a human look.
    pub needs_review: bool,
}

/// A result whose score has been recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResult {
    /// The result with an authoritative `final_score`.
    pub result:      GradingResult,
    /// Present when the model's score had to be overridden.
    pub discrepancy: Option<ScoreDiscrepancy>,
}

/// `max_points - deductions + extra_credit`, clamped to `[0, max_points]`.
pub fn recompute(max_points: f64, total_deductions: f64, extra_credit: f64) -> f64 {
    let ceiling = max_points.max(0.0);
    (ceiling - total_deductions + extra_credit).clamp(0.0, ceiling)
}

/// Overwrites `final_score` with the recomputed value.
///
/// When the model's score is off by more than [`SCORE_TOLERANCE`], a note is
/// appended to `overall_assessment` and the gap is returned alongside.
pub fn apply(mut result: GradingResult, max_points: f64) -> ScoredResult {
    let proposed = result.final_score;
    let recomputed = recompute(
        max_points,
        result.total_deductions(),
        result.extra_credit.awarded,
    );
    result.final_score = recomputed;

    let gap = (proposed - recomputed).abs();
    if gap <= SCORE_TOLERANCE {
        return ScoredResult {
            result,
            discrepancy: None,
        };
    }

    let needs_review = gap > REVIEW_RATIO * max_points;
    info!(proposed, recomputed, needs_review, "model score overridden");

    let mut note = format!(
        "Note: the proposed score of {proposed:.2} did not match the itemized deductions and \
         extra credit, so the final score was recomputed as {recomputed:.2}/{max_points:.2}."
    );
    if needs_review {
        note.push_str(" The difference is large; this result is flagged for human review.");
    }
    result.overall_assessment = if result.overall_assessment.trim().is_empty() {
        note
    } else {
        format!("{}\n\n{note}", result.overall_assessment.trim_end())
    };

    ScoredResult {
        result,
        discrepancy: Some(ScoreDiscrepancy {
            proposed,
            recomputed,
            needs_review,
        }),
    }
}
