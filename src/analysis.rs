use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::AnalysisSettings;
use crate::error::{RatingError, RatingResult};
use crate::model::{ExportArtifact, ReferenceRanking};
use crate::stats::{SpearmanResult, spearman};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaterCorrelation {
    pub rater_id: String,
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: String,
    pub reference_samples: usize,
    pub top_n: usize,
    pub significance_level: f64,
    pub rankings: Vec<RaterCorrelation>,
    pub top_raters: Vec<RaterCorrelation>,
    pub significant_raters: Vec<RaterCorrelation>,
}

/// Correlates every rater's exported ranks with the reference ranking.
/// A sample the reference does not know aborts the whole analysis.
pub fn analyze(
    reference: &ReferenceRanking,
    exports: &BTreeMap<String, ExportArtifact>,
) -> RatingResult<BTreeMap<String, SpearmanResult>> {
    let mut results = BTreeMap::new();
    for (rater_id, artifact) in exports {
        let result = analyze_rater(reference, rater_id, artifact)?;
        debug!(
            rater_id = %rater_id,
            correlation = ?result.correlation,
            p_value = ?result.p_value,
            samples = result.sample_count,
            "correlated rater with reference"
        );
        results.insert(rater_id.clone(), result);
    }
    Ok(results)
}

pub fn analyze_rater(
    reference: &ReferenceRanking,
    rater_id: &str,
    artifact: &ExportArtifact,
) -> RatingResult<SpearmanResult> {
    let mut rater_ranks = Vec::with_capacity(artifact.results.len());
    let mut reference_ranks = Vec::with_capacity(artifact.results.len());

    for record in &artifact.results {
        let Some(&reference_rank) = reference.get(&record.sample_id) else {
            return Err(RatingError::MissingReference {
                rater_id: rater_id.to_string(),
                sample_id: record.sample_id.clone(),
            });
        };
        rater_ranks.push(record.rank as f64);
        reference_ranks.push(reference_rank as f64);
    }

    Ok(spearman(&rater_ranks, &reference_ranks))
}

/// Orders raters by correlation (undefined last) and picks the top-N and
/// the raters below the significance level.
pub fn build_report(
    results: &BTreeMap<String, SpearmanResult>,
    reference_samples: usize,
    settings: AnalysisSettings,
    generated_at: String,
) -> AnalysisReport {
    let mut rankings: Vec<RaterCorrelation> = results
        .iter()
        .map(|(rater_id, result)| RaterCorrelation {
            rater_id: rater_id.clone(),
            correlation: result.correlation,
            p_value: result.p_value,
            sample_count: result.sample_count,
        })
        .collect();
    rankings.sort_by(compare_by_correlation);

    let top_raters = rankings.iter().take(settings.top_n).cloned().collect();
    let significant_raters = rankings
        .iter()
        .filter(|entry| {
            entry
                .p_value
                .is_some_and(|p_value| p_value < settings.significance_level)
        })
        .cloned()
        .collect();

    let report = AnalysisReport {
        generated_at,
        reference_samples,
        top_n: settings.top_n,
        significance_level: settings.significance_level,
        rankings,
        top_raters,
        significant_raters,
    };
    info!(
        raters = report.rankings.len(),
        significant = report.significant_raters.len(),
        best = report.rankings.first().map(|entry| entry.rater_id.as_str()).unwrap_or("-"),
        "correlation analysis complete"
    );
    report
}

fn compare_by_correlation(left: &RaterCorrelation, right: &RaterCorrelation) -> Ordering {
    match (left.correlation, right.correlation) {
        (Some(l), Some(r)) => r.total_cmp(&l),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| left.rater_id.cmp(&right.rater_id))
}
