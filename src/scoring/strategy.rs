//! Pluggable scoring.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::storage::HelloMessageDetail;

use super::v2::{ScoringV2, V2Parameters};

/// Turns HELLO observations into exposure scores and folds scores into a
/// single risk value.
pub trait ScoringStrategy: Send + Sync {
    /// Scores for a group of messages belonging to the same epoch. Fails
    /// with [`ScoringError::NoMessages`] on an empty group.
    fn score(&self, messages: &[HelloMessageDetail]) -> Result<Vec<f64>, ScoringError>;

    fn aggregate(&self, scores: &[f64]) -> f64;
}

/// Known algorithm versions, with their parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum ScoringAlgorithm {
    V2(V2Parameters),
}

impl Default for ScoringAlgorithm {
    fn default() -> Self {
        ScoringAlgorithm::V2(V2Parameters::default())
    }
}

impl ScoringAlgorithm {
    pub fn version(&self) -> u8 {
        match self {
            ScoringAlgorithm::V2(_) => 2,
        }
    }

    pub fn validate(&self, epoch_duration_secs: u32) -> Result<(), ScoringError> {
        match self {
            ScoringAlgorithm::V2(parameters) => parameters.validate(epoch_duration_secs),
        }
    }

    pub fn build(
        &self,
        epoch_duration_secs: u32,
    ) -> Result<Arc<dyn ScoringStrategy>, ScoringError> {
        self.validate(epoch_duration_secs)?;
        Ok(match self {
            ScoringAlgorithm::V2(parameters) => {
                Arc::new(ScoringV2::new(parameters.clone(), epoch_duration_secs))
            }
        })
    }
}
