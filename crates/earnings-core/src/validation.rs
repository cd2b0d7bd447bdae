//! Validation utilities shared between the service and its clients

use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    ActualResults, CoreError, MetricCode, MetricDefinition, MetricResultSubmission,
    PredictionValueSubmission,
};

/// Validate the metric set of a new competition
pub fn validate_metric_definitions(metrics: &[MetricDefinition]) -> Result<(), CoreError> {
    if metrics.is_empty() {
        return Err(CoreError::Validation("at least one metric required".into()));
    }

    let mut seen_codes = HashSet::new();
    for metric in metrics {
        if metric.name.trim().is_empty() {
            return Err(CoreError::InvalidMetric("name cannot be empty".into()));
        }
        if let Some(weight) = metric.weight {
            if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
                return Err(CoreError::InvalidMetric(format!(
                    "weight for {} must be between 0 and 1, got {}",
                    metric.code, weight
                )));
            }
        }
        // CUSTOM may appear more than once under different names
        if metric.code != MetricCode::Custom && !seen_codes.insert(metric.code) {
            return Err(CoreError::InvalidMetric(format!(
                "duplicate metric code {}",
                metric.code
            )));
        }
    }

    Ok(())
}

/// Validate a prediction against the metric ids of its competition
pub fn validate_prediction_values(
    values: &[PredictionValueSubmission],
    competition_metrics: &HashSet<Uuid>,
) -> Result<(), CoreError> {
    if values.is_empty() {
        return Err(CoreError::Validation(
            "at least one prediction value required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for value in values {
        check_metric_value(value.metric_id, value.value, competition_metrics, &mut seen)?;
    }

    Ok(())
}

/// Validate reported results against the metric ids of their competition.
/// A partial set is accepted here; completeness is checked before scoring.
pub fn validate_metric_results(
    results: &[MetricResultSubmission],
    competition_metrics: &HashSet<Uuid>,
) -> Result<(), CoreError> {
    if results.is_empty() {
        return Err(CoreError::Validation("at least one result required".into()));
    }

    let mut seen = HashSet::new();
    for result in results {
        check_metric_value(
            result.metric_id,
            result.actual_value,
            competition_metrics,
            &mut seen,
        )?;
    }

    Ok(())
}

fn check_metric_value(
    metric_id: Uuid,
    value: f64,
    competition_metrics: &HashSet<Uuid>,
    seen: &mut HashSet<Uuid>,
) -> Result<(), CoreError> {
    if !competition_metrics.contains(&metric_id) {
        return Err(CoreError::InvalidMetric(format!(
            "invalid metric id: {}",
            metric_id
        )));
    }
    if !seen.insert(metric_id) {
        return Err(CoreError::Validation(format!(
            "duplicate value for metric {}",
            metric_id
        )));
    }
    if !value.is_finite() {
        return Err(CoreError::Validation(format!(
            "value for metric {} must be a finite number",
            metric_id
        )));
    }
    Ok(())
}

/// Metric ids with no reported result, in the order given
pub fn missing_results(metric_ids: &[Uuid], actual_results: &ActualResults) -> Vec<Uuid> {
    metric_ids
        .iter()
        .filter(|id| !actual_results.contains_key(id))
        .copied()
        .collect()
}
