//! Quality gate over judged copy.

use sitebuilder_shared::QualityScore;

/// Minimum fluency score a draft needs to pass.
pub const MIN_FLUENCY: f64 = 4.0;

/// Minimum originality score a draft needs to pass.
pub const MIN_ORIGINALITY: f64 = 3.5;

/// Outcome of [`evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Reject,
}

impl GateDecision {
    pub fn is_pass(self) -> bool {
        self == Self::Pass
    }
}

/// Pass iff both scores meet their thresholds. NaN never passes.
pub fn evaluate(score: &QualityScore) -> GateDecision {
    if score.fluency >= MIN_FLUENCY && score.originality >= MIN_ORIGINALITY {
        GateDecision::Pass
    } else {
        GateDecision::Reject
    }
}
