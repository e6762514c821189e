//! Day-level jitter on the last contact date.
//!
//! The date reported to the device is moved by up to one day around the
//! real contact and truncated to the day, so the exact day of exposure
//! cannot be correlated with a specific encounter.

use rand::Rng;

use crate::clock::RobertInstant;

/// Inclusive day offsets allowed for a contact `days_since_contact` days
/// old.
///
/// Near the retention boundary the window is shifted so the jittered date
/// stays on the same side of the boundary as the real one.
pub fn jitter_bounds(days_since_contact: i64, retention_days: i64) -> (i64, i64) {
    if days_since_contact == 0 {
        (-1, 0)
    } else if days_since_contact == retention_days {
        (0, 1)
    } else if days_since_contact == retention_days + 1 {
        (-1, 0)
    } else {
        (-1, 1)
    }
}

/// Randomized, day-truncated version of `contact`.
pub fn randomize_last_contact<R: Rng + ?Sized>(
    contact: RobertInstant,
    now: RobertInstant,
    retention_days: i64,
    rng: &mut R,
) -> RobertInstant {
    let days_since_contact = contact.until(&now).num_days();
    let (past, future) = jitter_bounds(days_since_contact, retention_days);
    let offset = rng.gen_range(past..=future);
    contact.plus_days(offset).truncated_to_day()
}

/// Next value of `lastContactTimestamp`: the candidate, clamped to today
/// when it lies in the future, and never older than the existing value.
pub fn next_last_contact(
    existing: Option<u64>,
    candidate: RobertInstant,
    now: RobertInstant,
) -> u64 {
    let candidate = if candidate.is_after(&now) {
        log::warn!("last contact exposition is in the future, setting lastContactDate to today");
        now.truncated_to_day()
    } else {
        candidate
    };
    let candidate = candidate.as_ntp_timestamp();
    existing.map_or(candidate, |existing| existing.max(candidate))
}
