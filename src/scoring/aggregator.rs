//! Merges validated messages into a registration's exposure history.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ScoringError;
use crate::storage::{HelloMessageDetail, Registration};
use crate::validation::ValidatedMessage;

use super::strategy::ScoringStrategy;

#[derive(Clone)]
pub struct ExposureAggregator {
    strategy: Arc<dyn ScoringStrategy>,
}

impl ExposureAggregator {
    pub fn new(strategy: Arc<dyn ScoringStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &Arc<dyn ScoringStrategy> {
        &self.strategy
    }

    /// Score `messages` per epoch, append the scores to the matching
    /// expositions and flag the registration for risk re-evaluation.
    ///
    /// Returns the number of scores appended.
    pub fn merge(
        &self,
        registration: &mut Registration,
        messages: &[ValidatedMessage],
    ) -> Result<usize, ScoringError> {
        let mut by_epoch: BTreeMap<i32, Vec<HelloMessageDetail>> = BTreeMap::new();
        for message in messages {
            by_epoch
                .entry(message.epoch_id)
                .or_default()
                .push(message.detail.clone());
        }

        let mut appended = 0;
        for (epoch_id, details) in &by_epoch {
            let scores = self.strategy.score(details)?;
            appended += scores.len();
            registration.add_exposure_scores(*epoch_id, &scores);
        }

        if appended > 0 {
            registration.outdated_risk = true;
        }
        Ok(appended)
    }
}
