//! Store interfaces consumed by the engine.
//!
//! Each call is a single-document operation; the engine never relies on
//! multi-record transactions.

use crate::error::StoreError;

use super::models::{Contact, ContactId, PermanentIdentifier, Registration};

/// Registrations keyed by permanent identifier.
pub trait RegistrationRepository: Send + Sync {
    fn find_by_id(&self, id: &PermanentIdentifier) -> Result<Option<Registration>, StoreError>;

    /// Insert or replace, returning the stored record.
    fn save(&self, registration: Registration) -> Result<Registration, StoreError>;

    fn delete(&self, registration: &Registration) -> Result<(), StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;

    fn find_all(&self) -> Result<Vec<Registration>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}

/// Pending contacts waiting for validation.
pub trait ContactRepository: Send + Sync {
    fn save_all(&self, contacts: Vec<Contact>) -> Result<(), StoreError>;

    fn find_all(&self) -> Result<Vec<Contact>, StoreError>;

    fn delete(&self, id: &ContactId) -> Result<(), StoreError>;

    fn delete_all(&self) -> Result<(), StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}
