//! Crypto oracle client contract.
//!
//! The oracle decrypts the EBID and ECC of a contact, checks the MAC of
//! each HELLO and returns the permanent identity behind the EBID. The
//! engine only consumes this contract; retries and timeouts belong to the
//! implementation.

pub mod messages;
pub mod scripted;
pub mod verdict;

pub use messages::*;
pub use scripted::{ScriptedAnswer, ScriptedOracle};
pub use verdict::{OracleVerdict, ResolvedContact};

use crate::error::OracleError;

/// Blocking, possibly slow, remote verifier.
pub trait CryptoOracle: Send + Sync {
    /// `Ok(None)` means the oracle answered with nothing usable.
    fn validate_contact(
        &self,
        request: &ValidateContactRequest,
    ) -> Result<Option<ValidateContactResponse>, OracleError>;

    /// Call the oracle and interpret its answer.
    fn verify(&self, request: &ValidateContactRequest) -> OracleVerdict {
        OracleVerdict::interpret(self.validate_contact(request))
    }
}
