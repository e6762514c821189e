//! Risk evaluation of one registration.

use std::sync::Arc;

use rand::Rng;

use crate::clock::RobertInstant;
use crate::log_info;
use crate::logging::LogContext;
use crate::scoring::ScoringStrategy;
use crate::storage::Registration;

use super::jitter::{next_last_contact, randomize_last_contact};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEvaluation {
    pub aggregate: f64,
    pub risk_detected: bool,
}

#[derive(Clone)]
pub struct RiskEvaluator {
    strategy: Arc<dyn ScoringStrategy>,
    risk_threshold: f64,
    retention_days: i64,
}

impl RiskEvaluator {
    pub fn new(
        strategy: Arc<dyn ScoringStrategy>,
        risk_threshold: f64,
        retention_days: i64,
    ) -> Self {
        Self {
            strategy,
            risk_threshold,
            retention_days,
        }
    }

    /// Aggregate the expositions newer than `latest_risk_epoch` and raise
    /// the risk when the aggregate is strictly above the threshold.
    ///
    /// A sub-threshold aggregate never clears an existing risk, and
    /// `is_notified` is left alone. `outdated_risk` is always cleared.
    pub fn evaluate<R: Rng + ?Sized>(
        &self,
        registration: &mut Registration,
        now: RobertInstant,
        rng: &mut R,
        ctx: &LogContext,
    ) -> RiskEvaluation {
        let latest_risk_epoch = registration.latest_risk_epoch;
        let considered = registration
            .exposed_epochs
            .iter()
            .filter(|exposition| exposition.epoch_id > latest_risk_epoch);

        let last_exposed_epoch = considered.clone().map(|e| e.epoch_id).max();
        let scores: Vec<f64> = considered
            .flat_map(|exposition| exposition.exposition_scores.iter().copied())
            .collect();
        let aggregate = self.strategy.aggregate(&scores);

        let risk_detected = match last_exposed_epoch {
            Some(last_epoch) if aggregate > self.risk_threshold => {
                let current_epoch = now.as_epoch_id();
                registration.at_risk = true;
                registration.latest_risk_epoch =
                    latest_risk_epoch.max(last_epoch.min(current_epoch));

                let contact = now.clock().at_epoch(last_epoch);
                let candidate = randomize_last_contact(contact, now, self.retention_days, rng);
                registration.last_contact_timestamp = Some(next_last_contact(
                    registration.last_contact_timestamp,
                    candidate,
                    now,
                ));

                log_info!(
                    ctx,
                    "RISK_DETECTED",
                    aggregate = aggregate,
                    threshold = self.risk_threshold,
                    since_epoch = latest_risk_epoch,
                    latest_risk_epoch = registration.latest_risk_epoch
                );
                true
            }
            _ => false,
        };

        registration.outdated_risk = false;
        RiskEvaluation {
            aggregate,
            risk_detected,
        }
    }
}
