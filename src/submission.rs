use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ScoreBounds;
use crate::error::{RatingError, RatingResult};
use crate::model::Scores;
use crate::store::{RatingStore, UpsertOutcome, validate_rater_id, validate_scores};
use crate::util::canonical_sample_id;

/// Wire shape of one rating submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatingSubmission {
    pub image_id: String,
    pub rater_id: String,
    pub image_quality: i64,
    pub text_quality: i64,
    pub consistency: i64,
}

/// A submission that passed boundary checks; ids are canonical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub sample_id: String,
    pub rater_id: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionResponse {
    Success {
        sample_id: String,
        outcome: UpsertOutcome,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl SubmissionResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn from_error(err: &RatingError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl RatingSubmission {
    pub fn parse(raw: &[u8]) -> RatingResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|err| RatingError::validation(format!("malformed submission: {err}")))
    }

    pub fn scores(&self) -> Scores {
        Scores::new(self.image_quality, self.text_quality, self.consistency)
    }

    pub fn validate(&self, bounds: ScoreBounds) -> RatingResult<ValidatedSubmission> {
        let sample_id = canonical_sample_id(&self.image_id)?;
        let rater_id = validate_rater_id(&self.rater_id)?.to_string();
        let scores = self.scores();
        validate_scores(bounds, scores)?;

        Ok(ValidatedSubmission {
            sample_id,
            rater_id,
            scores,
        })
    }
}

/// Validates and stores one submission, folding any failure into the
/// response instead of returning it.
pub fn submit(store: &mut RatingStore, submission: &RatingSubmission) -> SubmissionResponse {
    let result = submission
        .validate(store.bounds())
        .and_then(|valid| {
            let outcome = store.upsert(&valid.sample_id, &valid.rater_id, valid.scores)?;
            Ok((valid, outcome))
        });

    match result {
        Ok((valid, outcome)) => {
            info!(
                sample_id = %valid.sample_id,
                rater_id = %valid.rater_id,
                outcome = ?outcome,
                total = valid.scores.total(),
                "rating submitted"
            );
            SubmissionResponse::Success {
                sample_id: valid.sample_id,
                outcome,
            }
        }
        Err(err) => {
            warn!(
                image_id = %submission.image_id,
                rater_id = %submission.rater_id,
                kind = err.kind(),
                error = %err,
                "rating rejected"
            );
            SubmissionResponse::from_error(&err)
        }
    }
}
