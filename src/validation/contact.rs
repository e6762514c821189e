//! Contact validation.
//!
//! A contact is checked as a whole first (messages present, oracle
//! verdict, MAC failures, country code), then message by message. A
//! contact keeping at least one message is accepted; dropped messages are
//! reported alongside.

use std::fmt;
use std::sync::Arc;

use crate::logging::LogContext;
use crate::oracle::{CryptoOracle, OracleVerdict, ValidateContactRequest};
use crate::storage::{Contact, ContactId, HelloMessageDetail, PermanentIdentifier};
use crate::{log_info, log_warn};

use super::tolerance::{MessageRejection, ToleranceCheck, ValidatedMessage};

/// Why a whole contact was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscardReason {
    NoMessages,
    AuthenticationFailure,
    UnknownIdentity,
    AllMacsInvalid,
    CountryCodeMismatch,
    NoValidMessages,
}

impl DiscardReason {
    pub const ALL: [DiscardReason; 6] = [
        DiscardReason::NoMessages,
        DiscardReason::AuthenticationFailure,
        DiscardReason::UnknownIdentity,
        DiscardReason::AllMacsInvalid,
        DiscardReason::CountryCodeMismatch,
        DiscardReason::NoValidMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::NoMessages => "no_messages",
            DiscardReason::AuthenticationFailure => "authentication_failure",
            DiscardReason::UnknownIdentity => "unknown_identity",
            DiscardReason::AllMacsInvalid => "all_macs_invalid",
            DiscardReason::CountryCodeMismatch => "country_code_mismatch",
            DiscardReason::NoValidMessages => "no_valid_messages",
        }
    }
}

impl fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and surviving messages of an accepted contact.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedContact {
    pub contact_id: ContactId,
    pub permanent_identifier: PermanentIdentifier,
    /// Epoch decrypted from the EBID.
    pub ebid_epoch_id: i32,
    pub messages: Vec<ValidatedMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContactOutcome {
    Accepted(ValidatedContact),
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactValidation {
    pub contact_id: ContactId,
    pub outcome: ContactOutcome,
    pub rejections: Vec<MessageRejection>,
}

impl ContactValidation {
    fn discarded(
        contact_id: &ContactId,
        reason: DiscardReason,
        rejections: Vec<MessageRejection>,
    ) -> Self {
        Self {
            contact_id: contact_id.clone(),
            outcome: ContactOutcome::Discarded(reason),
            rejections,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self.outcome, ContactOutcome::Accepted(_))
    }
}

pub struct ContactValidator {
    oracle: Arc<dyn CryptoOracle>,
    tolerance: ToleranceCheck,
    server_country_code: u8,
}

impl ContactValidator {
    pub fn new(
        oracle: Arc<dyn CryptoOracle>,
        tolerance: ToleranceCheck,
        server_country_code: u8,
    ) -> Self {
        Self {
            oracle,
            tolerance,
            server_country_code,
        }
    }

    /// Validate one contact. Never fails: every problem ends as a discard
    /// or a message rejection. The oracle is called at most once.
    pub fn validate(&self, contact: &Contact, ctx: &LogContext) -> ContactValidation {
        let ctx = ctx.with_contact(&contact.id);
        let validation = self.run(contact, &ctx);
        if let ContactOutcome::Discarded(reason) = &validation.outcome {
            log_info!(ctx, "CONTACT_DISCARDED", reason = reason);
        }
        validation
    }

    fn run(&self, contact: &Contact, ctx: &LogContext) -> ContactValidation {
        if contact.message_details.is_empty() {
            return ContactValidation::discarded(&contact.id, DiscardReason::NoMessages, Vec::new());
        }

        let request = ValidateContactRequest::for_contact(contact, self.server_country_code);
        let resolved = match self.oracle.verify(&request) {
            OracleVerdict::Resolved(resolved) => resolved,
            OracleVerdict::UnknownIdentity => {
                return ContactValidation::discarded(
                    &contact.id,
                    DiscardReason::UnknownIdentity,
                    Vec::new(),
                )
            }
            OracleVerdict::AuthenticationFailure(cause) => {
                log_warn!(ctx, "ORACLE_AUTHENTICATION_FAILED", cause = cause);
                return ContactValidation::discarded(
                    &contact.id,
                    DiscardReason::AuthenticationFailure,
                    Vec::new(),
                );
            }
        };

        let mut rejections = Vec::new();
        let authenticated: Vec<&HelloMessageDetail> = contact
            .message_details
            .iter()
            .filter(|detail| {
                let invalid = resolved.invalid_details.iter().any(|check| check.matches(detail));
                if invalid {
                    rejections.push(MessageRejection::MacInvalid);
                }
                !invalid
            })
            .collect();
        if !rejections.is_empty() {
            log_info!(ctx, "HELLO_MAC_INVALID", count = rejections.len());
        }
        if authenticated.is_empty() {
            return ContactValidation::discarded(
                &contact.id,
                DiscardReason::AllMacsInvalid,
                rejections,
            );
        }

        if resolved.country_code != self.server_country_code {
            log_info!(
                ctx,
                "COUNTRY_CODE_NOT_MANAGED",
                country_code = resolved.country_code,
                server_country_code = self.server_country_code
            );
            return ContactValidation::discarded(
                &contact.id,
                DiscardReason::CountryCodeMismatch,
                rejections,
            );
        }

        let mut messages = Vec::with_capacity(authenticated.len());
        for detail in authenticated {
            match self.tolerance.check(detail, resolved.epoch_id) {
                Ok(message) => messages.push(message),
                Err(rejection) => {
                    log_rejection(ctx, &rejection);
                    rejections.push(rejection);
                }
            }
        }

        if messages.is_empty() {
            log::info!("{} Contact did not contain any valid messages; discarding contact", ctx);
            return ContactValidation::discarded(
                &contact.id,
                DiscardReason::NoValidMessages,
                rejections,
            );
        }

        ContactValidation {
            contact_id: contact.id.clone(),
            outcome: ContactOutcome::Accepted(ValidatedContact {
                contact_id: contact.id.clone(),
                permanent_identifier: resolved.permanent_identifier,
                ebid_epoch_id: resolved.epoch_id,
                messages,
            }),
            rejections,
        }
    }
}

fn log_rejection(ctx: &LogContext, rejection: &MessageRejection) {
    match rejection {
        MessageRejection::TimeToleranceExceeded {
            time_from_hello,
            time_collected,
            tolerance,
        } => {
            log_warn!(
                ctx,
                "HELLO_TIME_TOLERANCE_EXCEEDED",
                time_from_hello = time_from_hello,
                time_collected = time_collected,
                tolerance = tolerance
            );
        }
        MessageRejection::EpochDivergence {
            message_epoch,
            ebid_epoch,
        } => {
            log_warn!(
                ctx,
                "HELLO_EPOCH_DIVERGENCE",
                message_epoch = message_epoch,
                ebid_epoch = ebid_epoch
            );
        }
        MessageRejection::TimestampOutOfRange { timestamp } => {
            log_warn!(ctx, "HELLO_TIMESTAMP_OUT_OF_RANGE", timestamp = timestamp);
        }
        MessageRejection::MacInvalid => {}
    }
}
