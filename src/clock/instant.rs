//! A point in time seen through the protocol clock.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ClockError;

use super::{RobertClock, SECONDS_BETWEEN_NTP_AND_UNIX_EPOCH};

lazy_static! {
    static ref INSTANT_PATTERN: Regex =
        Regex::new(r"(?P<instant>[^Z]+Z)=(?P<epoch_id>\d+)E").unwrap();
}

/// An instant bound to the clock it was created from, so it can be
/// rendered as an NTP timestamp, an epoch index, or the truncated forms
/// carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobertInstant {
    clock: RobertClock,
    time: DateTime<Utc>,
}

impl RobertInstant {
    pub(super) fn new(clock: RobertClock, time: DateTime<Utc>) -> Self {
        Self { clock, time }
    }

    /// Parse the textual form `2007-12-03T10:15:30Z=3598E`.
    ///
    /// The clock start is reconstructed from the pair, using the given
    /// epoch duration.
    pub fn parse(text: &str, epoch_duration_secs: u32) -> Result<Self, ClockError> {
        let captures = INSTANT_PATTERN
            .captures(text)
            .ok_or_else(|| ClockError::Pattern(text.to_string()))?;

        let time = DateTime::parse_from_rfc3339(&captures["instant"])
            .map_err(|e| ClockError::Instant(e.to_string()))?
            .with_timezone(&Utc);
        let epoch_id: i64 = captures["epoch_id"]
            .parse()
            .map_err(|_| ClockError::Pattern(text.to_string()))?;

        if epoch_duration_secs == 0 {
            return Err(ClockError::Instant("epoch duration must be greater than 0".to_string()));
        }
        let start = epoch_id
            .checked_mul(i64::from(epoch_duration_secs))
            .and_then(Duration::try_seconds)
            .and_then(|offset| time.checked_sub_signed(offset))
            .ok_or(ClockError::OutOfRange(i128::from(epoch_id)))?;
        let clock = RobertClock::from_parts(start, epoch_duration_secs);
        Ok(clock.at(time))
    }

    pub fn clock(&self) -> &RobertClock {
        &self.clock
    }

    pub fn as_instant(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn as_unix_timestamp(&self) -> i64 {
        self.time.timestamp()
    }

    /// Seconds since 1900-01-01T00:00:00Z.
    pub fn as_ntp_timestamp(&self) -> u64 {
        (self.time.timestamp() + SECONDS_BETWEEN_NTP_AND_UNIX_EPOCH).max(0) as u64
    }

    /// Epoch index relative to the service start (floor division).
    pub fn as_epoch_id(&self) -> i32 {
        let elapsed = (self.time - self.clock.start()).num_seconds();
        elapsed.div_euclid(self.clock.epoch_duration_secs()) as i32
    }

    /// The 16 less significant bits of the NTP seconds timestamp, as
    /// embedded in HELLO messages.
    pub fn as_16_less_significant_bits(&self) -> u16 {
        crate::codec::truncate_to_16_bits(self.as_ntp_timestamp())
    }

    /// The 4 less significant bytes of the NTP timestamp, big-endian.
    pub fn as_time32(&self) -> [u8; 4] {
        crate::codec::time32_from_ntp(self.as_ntp_timestamp())
    }

    pub fn plus(&self, amount: Duration) -> Self {
        self.clock.at(self.time + amount)
    }

    pub fn minus(&self, amount: Duration) -> Self {
        self.clock.at(self.time - amount)
    }

    pub fn plus_days(&self, days: i64) -> Self {
        self.plus(Duration::days(days))
    }

    pub fn minus_days(&self, days: i64) -> Self {
        self.minus(Duration::days(days))
    }

    pub fn plus_epochs(&self, epochs: i64) -> Self {
        self.plus(Duration::seconds(epochs * self.clock.epoch_duration_secs()))
    }

    /// Truncate to 00:00:00 UTC of the same day.
    pub fn truncated_to_day(&self) -> Self {
        let midnight = self.time.date_naive().and_time(NaiveTime::MIN);
        self.clock.at(Utc.from_utc_datetime(&midnight))
    }

    /// Truncate to the start of the epoch containing this instant.
    pub fn truncated_to_epoch(&self) -> Self {
        self.clock.at_epoch(self.as_epoch_id())
    }

    pub fn until(&self, other: &RobertInstant) -> Duration {
        other.time - self.time
    }

    pub fn is_before(&self, other: &RobertInstant) -> bool {
        self.time < other.time
    }

    pub fn is_after(&self, other: &RobertInstant) -> bool {
        self.time > other.time
    }

    /// Every epoch start from this instant's epoch up to `end_exclusive`.
    pub fn epochs_until(
        &self,
        end_exclusive: RobertInstant,
    ) -> impl Iterator<Item = RobertInstant> {
        let first = self.truncated_to_epoch();
        std::iter::successors(Some(first), |instant| Some(instant.plus_epochs(1)))
            .take_while(move |instant| instant.is_before(&end_exclusive))
    }
}

impl PartialOrd for RobertInstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RobertInstant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time)
    }
}

impl fmt::Display for RobertInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}E",
            self.time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.as_epoch_id()
        )
    }
}
