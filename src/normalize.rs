use tracing::info;

use crate::config::LegacyScorePolicy;
use crate::error::RatingResult;
use crate::model::Scores;
use crate::store::{RatingStore, validate_rater_id};

/// One-time migration of rows stored under an older score scale.
#[derive(Debug, Clone, Copy)]
pub struct ScoreNormalizer {
    policy: LegacyScorePolicy,
}

impl ScoreNormalizer {
    pub fn new(policy: LegacyScorePolicy) -> Self {
        Self { policy }
    }

    /// The sentinel and the unscored marker both map to the unscored marker;
    /// everything else is clamped into the legacy bound. Applying it to its
    /// own output is a no-op.
    pub fn repair_value(&self, value: i64) -> i64 {
        let policy = self.policy;
        if value == policy.sentinel || value == policy.unscored {
            return policy.unscored;
        }
        value.clamp(policy.min, policy.max)
    }

    pub fn repair(&self, scores: Scores) -> Scores {
        scores.map(|value| self.repair_value(value))
    }

    pub fn normalize_existing(&self, store: &mut RatingStore, rater_id: &str) -> RatingResult<usize> {
        let rater_id = validate_rater_id(rater_id)?;
        let repaired = store.repair_rows(rater_id, |scores| self.repair(scores))?;
        info!(
            rater_id,
            repaired,
            legacy_min = self.policy.min,
            legacy_max = self.policy.max,
            sentinel = self.policy.sentinel,
            "normalized stored ratings"
        );
        Ok(repaired)
    }
}
