//! Lifetime statistics per user, folded from scored predictions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::PredictionScore;

/// Running totals across every scored prediction of a user
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub total_predictions: u32,
    /// Count of rank 1 finishes. Podium places are a display concern only.
    pub total_wins: u32,
    /// Mean of all contributed total scores, unset until the first score
    pub average_score: Option<f64>,
}

impl UserStats {
    /// Fold one scored prediction into the running totals
    ///
    /// `average = (average * n + score) / (n + 1)`, treating an unset average
    /// as zero. Applying the same score twice counts it twice, so callers
    /// must only apply each prediction of a scoring pass once.
    pub fn apply(self, score: &PredictionScore) -> UserStats {
        let n = f64::from(self.total_predictions);
        let current_average = self.average_score.unwrap_or(0.0);
        let average_score = (current_average * n + score.total_weighted_error) / (n + 1.0);

        UserStats {
            total_predictions: self.total_predictions + 1,
            total_wins: self.total_wins + u32::from(score.rank == 1),
            average_score: Some(average_score),
        }
    }
}

/// Apply a whole scoring pass to the users' current stats
///
/// Users missing from `current` start from [`UserStats::default`]. The
/// returned map holds an entry for every user that appears in `scores`.
pub fn fold_scores(
    mut current: HashMap<Uuid, UserStats>,
    scores: &[PredictionScore],
) -> HashMap<Uuid, UserStats> {
    for score in scores {
        let stats = current.entry(score.user_id).or_default();
        *stats = stats.apply(score);
    }
    current
}
