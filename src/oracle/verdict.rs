//! Interpretation of an oracle round-trip.

use crate::error::OracleError;
use crate::storage::PermanentIdentifier;

use super::messages::{HelloMessageCheck, ValidateContactResponse, UNKNOWN_IDENTITY_CODE};

/// What the validator learns from the oracle about one contact.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleVerdict {
    Resolved(ResolvedContact),
    UnknownIdentity,
    AuthenticationFailure(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContact {
    pub permanent_identifier: PermanentIdentifier,
    pub country_code: u8,
    /// Epoch encoded in the EBID.
    pub epoch_id: i32,
    pub invalid_details: Vec<HelloMessageCheck>,
}

impl OracleVerdict {
    pub fn authentication_failure(reason: impl Into<String>) -> Self {
        OracleVerdict::AuthenticationFailure(reason.into())
    }

    /// Map a raw oracle outcome to a verdict.
    ///
    /// Transport errors, empty answers and responses missing the identity
    /// or the country code all count as an authentication failure.
    pub fn interpret(outcome: Result<Option<ValidateContactResponse>, OracleError>) -> Self {
        let response = match outcome {
            Ok(Some(response)) => response,
            Ok(None) => return Self::authentication_failure("empty oracle response"),
            Err(e) => return Self::authentication_failure(e.to_string()),
        };

        if let Some(error) = response.error {
            return if error.code == UNKNOWN_IDENTITY_CODE {
                OracleVerdict::UnknownIdentity
            } else {
                Self::authentication_failure(format!("{} {}", error.code, error.description))
            };
        }

        let (id_a, country_code) = match (response.id_a, response.country_code) {
            (Some(id_a), Some(country_code)) => (id_a, country_code),
            _ => {
                return Self::authentication_failure(
                    OracleError::MalformedResponse("missing idA or country code".to_string())
                        .to_string(),
                )
            }
        };

        match PermanentIdentifier::new(id_a) {
            Ok(permanent_identifier) => OracleVerdict::Resolved(ResolvedContact {
                permanent_identifier,
                country_code,
                epoch_id: response.epoch_id,
                invalid_details: response.invalid_hello_message_details,
            }),
            Err(e) => Self::authentication_failure(
                OracleError::MalformedResponse(e.to_string()).to_string(),
            ),
        }
    }
}
