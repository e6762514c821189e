//! Protocol clock.
//!
//! The protocol splits time into fixed-duration *epochs* counted from the
//! service start, and carries NTP seconds timestamps (origin 1900-01-01)
//! on the wire. [`RobertClock`] converts between wall-clock instants, NTP
//! timestamps and epoch indices. All arithmetic is done in UTC so day
//! truncation is deterministic.

mod instant;

pub use instant::RobertInstant;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{ClockError, ConfigError};

/// Seconds between 1900-01-01T00:00:00Z and 1970-01-01T00:00:00Z.
pub const SECONDS_BETWEEN_NTP_AND_UNIX_EPOCH: i64 = 2_208_988_800;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Clock aware of the service start time and the epoch duration.
///
/// Cheap to copy; every component holds its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobertClock {
    start: DateTime<Utc>,
    epoch_duration_secs: u32,
}

impl RobertClock {
    /// Build a clock starting at 00:00:00 UTC on `start_date`.
    pub fn new(start_date: NaiveDate, epoch_duration_secs: u32) -> Result<Self, ConfigError> {
        if epoch_duration_secs == 0 {
            return Err(ConfigError::invalid(
                "epochDurationSecs",
                "must be greater than 0",
            ));
        }
        let start = Utc.from_utc_datetime(&start_date.and_time(NaiveTime::MIN));
        Ok(Self::from_parts(start, epoch_duration_secs))
    }

    /// Build a clock from a `YYYY-MM-DD` start date.
    pub fn from_start_date(
        start_date: &str,
        epoch_duration_secs: u32,
    ) -> Result<Self, ConfigError> {
        let date = NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
            .map_err(|e| ConfigError::invalid("serviceStartDate", e.to_string()))?;
        Self::new(date, epoch_duration_secs)
    }

    pub(crate) fn from_parts(start: DateTime<Utc>, epoch_duration_secs: u32) -> Self {
        Self {
            start,
            epoch_duration_secs,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn epoch_duration_secs(&self) -> i64 {
        i64::from(self.epoch_duration_secs)
    }

    pub fn epoch_duration(&self) -> Duration {
        Duration::seconds(self.epoch_duration_secs())
    }

    /// Number of epochs in one day (96 for 15-minute epochs).
    pub fn epochs_per_day(&self) -> i32 {
        (SECONDS_PER_DAY / self.epoch_duration_secs()) as i32
    }

    /// NTP timestamp of the service start.
    pub fn start_ntp_timestamp(&self) -> u64 {
        self.at(self.start).as_ntp_timestamp()
    }

    pub fn at(&self, time: DateTime<Utc>) -> RobertInstant {
        RobertInstant::new(*self, time)
    }

    /// Fails when the timestamp is outside the range chrono can represent.
    pub fn at_unix_timestamp(&self, unix_seconds: i64) -> Result<RobertInstant, ClockError> {
        DateTime::<Utc>::from_timestamp(unix_seconds, 0)
            .map(|time| self.at(time))
            .ok_or(ClockError::OutOfRange(i128::from(unix_seconds)))
    }

    pub fn at_ntp_timestamp(&self, ntp_seconds: u64) -> Result<RobertInstant, ClockError> {
        let unix_seconds = i64::try_from(ntp_seconds)
            .ok()
            .and_then(|ntp| ntp.checked_sub(SECONDS_BETWEEN_NTP_AND_UNIX_EPOCH))
            .ok_or(ClockError::OutOfRange(i128::from(ntp_seconds)))?;
        self.at_unix_timestamp(unix_seconds)
            .map_err(|_| ClockError::OutOfRange(i128::from(ntp_seconds)))
    }

    pub fn at_epoch(&self, epoch_id: i32) -> RobertInstant {
        self.at(self.start + Duration::seconds(i64::from(epoch_id) * self.epoch_duration_secs()))
    }

    /// Decode a 4-byte big-endian truncated NTP timestamp.
    pub fn at_time32(&self, time32: [u8; 4]) -> Result<RobertInstant, ClockError> {
        self.at_ntp_timestamp(crate::codec::ntp_from_time32(time32))
    }

    pub fn now(&self) -> RobertInstant {
        self.at(Utc::now())
    }

    /// Epoch index of an NTP timestamp.
    pub fn epoch_at(&self, ntp_seconds: u64) -> Result<i32, ClockError> {
        Ok(self.at_ntp_timestamp(ntp_seconds)?.as_epoch_id())
    }

    /// NTP timestamp of the first second of an epoch.
    pub fn ntp_timestamp_at(&self, epoch_id: i32) -> u64 {
        self.at_epoch(epoch_id).as_ntp_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> RobertClock {
        RobertClock::from_start_date("2020-06-01", 900).unwrap()
    }

    #[test]
    fn test_zero_epoch_duration_is_rejected() {
        let result = RobertClock::from_start_date("2020-06-01", 0);
        assert!(matches!(result, Err(ConfigError::Invalid { field: "epochDurationSecs", .. })));
    }

    #[test]
    fn test_bad_start_date_is_rejected() {
        assert!(RobertClock::from_start_date("2020-13-45", 900).is_err());
    }

    #[test]
    fn test_start_is_epoch_zero() {
        let clock = clock();
        assert_eq!(clock.epoch_at(clock.start_ntp_timestamp()), Ok(0));
        // 2020-06-01T00:00:00Z
        assert_eq!(clock.start_ntp_timestamp(), 3_799_958_400);
    }

    #[test]
    fn test_epoch_is_floor_division() {
        let clock = clock();
        let start = clock.start_ntp_timestamp();
        assert_eq!(clock.epoch_at(start + 899), Ok(0));
        assert_eq!(clock.epoch_at(start + 900), Ok(1));
        assert_eq!(clock.epoch_at(start + 96 * 900 + 1), Ok(96));
    }

    #[test]
    fn test_ntp_timestamp_at_epoch() {
        let clock = clock();
        assert_eq!(
            clock.ntp_timestamp_at(96),
            clock.start_ntp_timestamp() + 86_400
        );
        assert_eq!(clock.epochs_per_day(), 96);
    }

    #[test]
    fn test_unix_and_ntp_round_trip() {
        let clock = clock();
        let instant = clock.at_unix_timestamp(1_600_000_000).unwrap();
        assert_eq!(instant.as_unix_timestamp(), 1_600_000_000);
        assert_eq!(
            instant.as_ntp_timestamp(),
            1_600_000_000 + SECONDS_BETWEEN_NTP_AND_UNIX_EPOCH as u64
        );
    }

    #[test]
    fn test_at_time32() {
        let clock = clock();
        let now = clock.now();
        let decoded = clock.at_time32(now.as_time32()).unwrap();
        assert_eq!(decoded.as_ntp_timestamp(), now.as_ntp_timestamp());
    }

    #[test]
    fn test_out_of_range_timestamps_are_errors() {
        let clock = clock();
        assert_eq!(
            clock.at_ntp_timestamp(0xFFFF_FFFF_FFFF),
            Err(ClockError::OutOfRange(0xFFFF_FFFF_FFFF))
        );
        assert!(clock.at_ntp_timestamp(u64::MAX).is_err());
        assert!(clock.at_unix_timestamp(i64::MAX).is_err());
        assert!(clock.epoch_at(0xFFFF_FFFF_FFFF).is_err());
        // Before 1970 is still representable.
        assert_eq!(clock.at_ntp_timestamp(0).unwrap().as_ntp_timestamp(), 0);
    }
}
