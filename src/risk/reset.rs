//! Reset of stale risk flags.

use crate::clock::RobertInstant;
use crate::log_info;
use crate::logging::LogContext;
use crate::storage::Registration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDecision {
    Unchanged,
    /// Risk cleared; `notified` is the `is_notified` value at reset time.
    Reset { notified: bool },
}

#[derive(Debug, Clone, Copy)]
pub struct RiskReset {
    retention_days: i64,
}

impl RiskReset {
    pub fn new(retention_days: i64) -> Self {
        Self { retention_days }
    }

    /// A registration at risk is reset right away when the user was never
    /// notified, and once the last contact is more than the retention
    /// period in the past otherwise.
    pub fn decide(&self, registration: &Registration, now: RobertInstant) -> ResetDecision {
        if !registration.at_risk {
            return ResetDecision::Unchanged;
        }
        if !registration.is_notified || self.retention_expired(registration, now) {
            ResetDecision::Reset {
                notified: registration.is_notified,
            }
        } else {
            ResetDecision::Unchanged
        }
    }

    /// Whole days between the day of the last contact and today. A missing
    /// last contact, or one the clock cannot place, counts as expired.
    fn retention_expired(&self, registration: &Registration, now: RobertInstant) -> bool {
        let Some(last_contact) = registration.last_contact_timestamp else {
            return true;
        };
        match now.clock().at_ntp_timestamp(last_contact) {
            Ok(contact) => {
                let contact_day = contact.truncated_to_day();
                contact_day.until(&now.truncated_to_day()).num_days() > self.retention_days
            }
            Err(e) => {
                log::warn!(
                    "LAST_CONTACT_OUT_OF_RANGE last_contact={} error={}",
                    last_contact,
                    e
                );
                true
            }
        }
    }

    pub fn apply(
        &self,
        registration: &mut Registration,
        now: RobertInstant,
        ctx: &LogContext,
    ) -> ResetDecision {
        let decision = self.decide(registration, now);
        if let ResetDecision::Reset { notified } = decision {
            registration.at_risk = false;
            registration.notified_for_current_risk = false;
            log_info!(ctx, "RISK_LEVEL_RESET", notified = notified);
        }
        decision
    }
}
