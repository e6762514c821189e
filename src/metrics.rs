//! Batch counters.
//!
//! Thread-safe counters updated by the rayon workers of a batch, read back
//! as a serializable snapshot once the batch is done.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::validation::{ContactOutcome, ContactValidation, DiscardReason, MessageRejection};

#[derive(Debug, Default)]
pub struct BatchMetrics {
    pub contacts_processed: AtomicU64,
    pub contacts_accepted: AtomicU64,
    discarded: [AtomicU64; DiscardReason::ALL.len()],
    pub messages_mac_invalid: AtomicU64,
    pub messages_time_tolerance_exceeded: AtomicU64,
    pub messages_epoch_divergence: AtomicU64,
    pub messages_timestamp_out_of_range: AtomicU64,
    pub scores_appended: AtomicU64,
    pub risks_detected: AtomicU64,
    pub risk_resets_notified: AtomicU64,
    pub risk_resets_never_notified: AtomicU64,
    pub expositions_purged: AtomicU64,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_validation(&self, validation: &ContactValidation) {
        self.contacts_processed.fetch_add(1, Ordering::Relaxed);
        match &validation.outcome {
            ContactOutcome::Accepted(_) => {
                self.contacts_accepted.fetch_add(1, Ordering::Relaxed);
            }
            ContactOutcome::Discarded(reason) => self.record_discard(*reason),
        }
        for rejection in &validation.rejections {
            let counter = match rejection {
                MessageRejection::MacInvalid => &self.messages_mac_invalid,
                MessageRejection::TimeToleranceExceeded { .. } => {
                    &self.messages_time_tolerance_exceeded
                }
                MessageRejection::EpochDivergence { .. } => &self.messages_epoch_divergence,
                MessageRejection::TimestampOutOfRange { .. } => {
                    &self.messages_timestamp_out_of_range
                }
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Used when an accepted contact is dropped at merge time.
    pub fn record_late_discard(&self, reason: DiscardReason) {
        self.contacts_accepted.fetch_sub(1, Ordering::Relaxed);
        self.record_discard(reason);
    }

    fn record_discard(&self, reason: DiscardReason) {
        self.discarded[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scores(&self, count: usize) {
        self.scores_appended.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_risk_detected(&self) {
        self.risks_detected.fetch_add(1, Ordering::Relaxed);
    }

    /// Reset counter, tagged by whether the user had been notified.
    pub fn record_risk_reset(&self, notified: bool) {
        let counter = if notified {
            &self.risk_resets_notified
        } else {
            &self.risk_resets_never_notified
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purged(&self, count: usize) {
        self.expositions_purged.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn discarded(&self, reason: DiscardReason) -> u64 {
        self.discarded[reason as usize].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            contacts_processed: load(&self.contacts_processed),
            contacts_accepted: load(&self.contacts_accepted),
            contacts_discarded: DiscardReason::ALL
                .iter()
                .map(|reason| (reason.as_str(), self.discarded(*reason)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            messages_mac_invalid: load(&self.messages_mac_invalid),
            messages_time_tolerance_exceeded: load(&self.messages_time_tolerance_exceeded),
            messages_epoch_divergence: load(&self.messages_epoch_divergence),
            messages_timestamp_out_of_range: load(&self.messages_timestamp_out_of_range),
            scores_appended: load(&self.scores_appended),
            risks_detected: load(&self.risks_detected),
            risk_resets_notified: load(&self.risk_resets_notified),
            risk_resets_never_notified: load(&self.risk_resets_never_notified),
            expositions_purged: load(&self.expositions_purged),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub contacts_processed: u64,
    pub contacts_accepted: u64,
    pub contacts_discarded: BTreeMap<&'static str, u64>,
    pub messages_mac_invalid: u64,
    pub messages_time_tolerance_exceeded: u64,
    pub messages_epoch_divergence: u64,
    pub messages_timestamp_out_of_range: u64,
    pub scores_appended: u64,
    pub risks_detected: u64,
    pub risk_resets_notified: u64,
    pub risk_resets_never_notified: u64,
    pub expositions_purged: u64,
}

impl MetricsSnapshot {
    pub fn contacts_discarded_total(&self) -> u64 {
        self.contacts_discarded.values().sum()
    }
}
