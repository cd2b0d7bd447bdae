//! Score calculation for competition predictions
//!
//! Every metric of a prediction is scored by its percentage error against the
//! reported value, weighted by the metric weight, and averaged over the total
//! weight of the metrics that could be scored. Lower is better, and rank 1 is
//! the smallest weighted error.

use crate::{
    ActualResults, MetricCode, MetricScore, PredictionInput, PredictionScore,
};

/// Reference weighting scheme applied when a metric is created without an
/// explicit weight. The five entries sum to 1.0.
pub const DEFAULT_METRIC_WEIGHTS: [(MetricCode, f64); 5] = [
    (MetricCode::Revenue, 0.25),
    (MetricCode::Eps, 0.25),
    (MetricCode::NetIncome, 0.20),
    (MetricCode::ForwardRevenueGuidance, 0.15),
    (MetricCode::ForwardEpsGuidance, 0.15),
];

/// Weight used for codes without a default and no explicit weight
pub const FALLBACK_METRIC_WEIGHT: f64 = 1.0;

impl MetricCode {
    /// Reference weight for this code, if it has one
    pub fn default_weight(&self) -> Option<f64> {
        DEFAULT_METRIC_WEIGHTS
            .iter()
            .find(|(code, _)| code == self)
            .map(|(_, weight)| *weight)
    }
}

/// Weight to store for a new metric: the explicit weight when given,
/// otherwise the code's default, otherwise [`FALLBACK_METRIC_WEIGHT`]
pub fn resolve_weight(code: MetricCode, explicit: Option<f64>) -> f64 {
    explicit
        .or_else(|| code.default_weight())
        .unwrap_or(FALLBACK_METRIC_WEIGHT)
}

/// Relative error of `predicted` against `actual`, as a percentage
///
/// - `actual != 0`: `|predicted - actual| / |actual| * 100`
/// - `actual == 0`: `0` for an exact match, otherwise `|predicted| * 100`
///
/// The zero branch is not a relative error and lives on a different scale
/// than the general case. Leaderboards already published depend on it, so it
/// stays as is.
pub fn percentage_error(predicted: f64, actual: f64) -> f64 {
    if actual == 0.0 {
        return if predicted == 0.0 {
            0.0
        } else {
            predicted.abs() * 100.0
        };
    }
    (predicted - actual).abs() / actual.abs() * 100.0
}

/// Percentage error scaled by the metric weight. The weight is not
/// normalised against the other metrics here.
pub fn weighted_error(percentage_error: f64, weight: f64) -> f64 {
    percentage_error * weight
}

/// Weighted average of percentage errors: `sum(weighted_error) / sum(weight)`
///
/// Returns `0` when the total weight is zero, which covers predictions with
/// nothing scorable as well as all-zero weights.
pub fn total_score(metric_scores: &[MetricScore]) -> f64 {
    let (total_weight, total_weighted_error) = metric_scores
        .iter()
        .fold((0.0, 0.0), |(weight, error), score| {
            (weight + score.weight, error + score.weighted_error)
        });

    if total_weight == 0.0 {
        return 0.0;
    }
    total_weighted_error / total_weight
}

/// Score a single prediction. Values whose metric has no reported result are
/// left out of both sums.
pub fn score_prediction(
    prediction: &PredictionInput,
    actual_results: &ActualResults,
) -> (Vec<MetricScore>, f64) {
    let metric_scores: Vec<MetricScore> = prediction
        .values
        .iter()
        .filter_map(|value| {
            let actual = actual_results.get(&value.metric_id)?;
            let percentage_error = percentage_error(value.value, actual.actual_value);
            Some(MetricScore {
                metric_id: value.metric_id,
                metric_code: value.metric.code,
                predicted_value: value.value,
                actual_value: actual.actual_value,
                weight: value.metric.weight,
                percentage_error,
                weighted_error: weighted_error(percentage_error, value.metric.weight),
            })
        })
        .collect();

    let total = total_score(&metric_scores);
    (metric_scores, total)
}

/// Score all predictions for a competition
///
/// Returns the scores sorted ascending by `total_weighted_error` with ranks
/// assigned by [`rank_scores`]. The sort is stable: predictions with equal
/// errors keep the order they were passed in.
pub fn score_competition(
    predictions: &[PredictionInput],
    actual_results: &ActualResults,
) -> Vec<PredictionScore> {
    let mut scores: Vec<PredictionScore> = predictions
        .iter()
        .map(|prediction| {
            let (metric_scores, total_weighted_error) =
                score_prediction(prediction, actual_results);
            PredictionScore {
                prediction_id: prediction.id,
                user_id: prediction.user_id,
                metric_scores,
                total_weighted_error,
                rank: 0,
            }
        })
        .collect();

    scores.sort_by(|a, b| a.total_weighted_error.total_cmp(&b.total_weighted_error));

    let ranks = rank_scores(
        &scores
            .iter()
            .map(|score| score.total_weighted_error)
            .collect::<Vec<_>>(),
    );
    for (score, rank) in scores.iter_mut().zip(ranks) {
        score.rank = rank;
    }

    scores
}

/// Competition ranking with gaps for an already sorted list of errors
///
/// An entry exactly equal to its predecessor shares its rank, any other entry
/// takes its 1-based position: `[1.0, 1.0, 2.0, 3.0]` ranks as `[1, 1, 3, 4]`.
pub fn rank_scores(sorted_errors: &[f64]) -> Vec<u32> {
    let mut ranks = Vec::with_capacity(sorted_errors.len());
    let mut current_rank = 1;
    for (index, error) in sorted_errors.iter().enumerate() {
        if index > 0 && *error != sorted_errors[index - 1] {
            current_rank = index as u32 + 1;
        }
        ranks.push(current_rank);
    }
    ranks
}
