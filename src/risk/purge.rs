//! Removal of expositions older than the contagious period.

use crate::clock::RobertClock;
use crate::storage::Registration;

#[derive(Debug, Clone, Copy)]
pub struct EpochRetentionPurger {
    contagious_period_days: i64,
    epochs_per_day: i64,
}

impl EpochRetentionPurger {
    pub fn new(clock: &RobertClock, contagious_period_days: u32) -> Self {
        Self {
            contagious_period_days: i64::from(contagious_period_days),
            epochs_per_day: i64::from(clock.epochs_per_day()),
        }
    }

    /// Epochs at or below this value are purged.
    pub fn purge_boundary(&self, current_epoch: i32) -> i64 {
        i64::from(current_epoch) - self.contagious_period_days * self.epochs_per_day
    }

    /// Keep expositions strictly newer than the boundary. Returns the
    /// number of expositions removed.
    pub fn purge(&self, registration: &mut Registration, current_epoch: i32) -> usize {
        let boundary = self.purge_boundary(current_epoch);
        let before = registration.exposed_epochs.len();
        registration
            .exposed_epochs
            .retain(|exposition| i64::from(exposition.epoch_id) > boundary);
        before - registration.exposed_epochs.len()
    }
}
