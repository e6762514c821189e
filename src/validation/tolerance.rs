//! Per-message time and epoch checks.

use std::fmt;

use crate::clock::RobertClock;
use crate::codec::{reconstitute_ntp_timestamp, MAX_TIME32};
use crate::storage::HelloMessageDetail;

/// Number of adjacent epochs a message may diverge from its EBID epoch.
pub const EPOCH_DIVERGENCE_TOLERANCE: i32 = 1;

/// Why a single HELLO was dropped from an otherwise valid contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageRejection {
    MacInvalid,
    /// A timestamp the clock cannot place, such as a receive time wider
    /// than its 32-bit wire field.
    TimestampOutOfRange {
        timestamp: u64,
    },
    TimeToleranceExceeded {
        time_from_hello: u64,
        time_collected: u64,
        tolerance: u64,
    },
    EpochDivergence {
        message_epoch: i32,
        ebid_epoch: i32,
    },
}

impl MessageRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRejection::MacInvalid => "mac_invalid",
            MessageRejection::TimestampOutOfRange { .. } => "timestamp_out_of_range",
            MessageRejection::TimeToleranceExceeded { .. } => "time_tolerance_exceeded",
            MessageRejection::EpochDivergence { .. } => "epoch_divergence",
        }
    }
}

impl fmt::Display for MessageRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A HELLO that passed every check, with its reconstituted send time.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMessage {
    pub detail: HelloMessageDetail,
    /// Sender NTP timestamp rebuilt from the 16 transmitted bits.
    pub sent_at: u64,
    /// Epoch of `sent_at`.
    pub epoch_id: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct ToleranceCheck {
    clock: RobertClock,
    tolerance_secs: u64,
}

impl ToleranceCheck {
    pub fn new(clock: RobertClock, tolerance_secs: u64) -> Self {
        Self {
            clock,
            tolerance_secs,
        }
    }

    /// Absolute sender timestamp, using the receiver timestamp for the
    /// high-order bits.
    pub fn sent_at(&self, detail: &HelloMessageDetail) -> u64 {
        reconstitute_ntp_timestamp(detail.time_from_hello_message, detail.time_collected_on_device)
    }

    pub fn check_time(&self, detail: &HelloMessageDetail) -> Result<u64, MessageRejection> {
        if detail.time_collected_on_device > MAX_TIME32 {
            return Err(MessageRejection::TimestampOutOfRange {
                timestamp: detail.time_collected_on_device,
            });
        }
        let sent_at = self.sent_at(detail);
        if sent_at.abs_diff(detail.time_collected_on_device) > self.tolerance_secs {
            return Err(MessageRejection::TimeToleranceExceeded {
                time_from_hello: sent_at,
                time_collected: detail.time_collected_on_device,
                tolerance: self.tolerance_secs,
            });
        }
        Ok(sent_at)
    }

    /// Symmetric: the message may sit one epoch before or after the EBID.
    pub fn check_epoch(&self, sent_at: u64, ebid_epoch: i32) -> Result<i32, MessageRejection> {
        let message_epoch = self
            .clock
            .epoch_at(sent_at)
            .map_err(|_| MessageRejection::TimestampOutOfRange { timestamp: sent_at })?;
        if (i64::from(message_epoch) - i64::from(ebid_epoch)).abs()
            > i64::from(EPOCH_DIVERGENCE_TOLERANCE)
        {
            return Err(MessageRejection::EpochDivergence {
                message_epoch,
                ebid_epoch,
            });
        }
        Ok(message_epoch)
    }

    pub fn check(
        &self,
        detail: &HelloMessageDetail,
        ebid_epoch: i32,
    ) -> Result<ValidatedMessage, MessageRejection> {
        let sent_at = self.check_time(detail)?;
        let epoch_id = self.check_epoch(sent_at, ebid_epoch)?;
        Ok(ValidatedMessage {
            detail: detail.clone(),
            sent_at,
            epoch_id,
        })
    }
}
