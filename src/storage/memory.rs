//! In-memory stores.
//!
//! Backed by `parking_lot` locks so they can be shared across the rayon
//! workers of a batch. A store can be switched to an unavailable state to
//! exercise error propagation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::StoreError;

use super::models::{Contact, ContactId, PermanentIdentifier, Registration};
use super::repository::{ContactRepository, RegistrationRepository};

#[derive(Debug, Default)]
pub struct InMemoryRegistrationRepository {
    registrations: RwLock<BTreeMap<PermanentIdentifier, Registration>>,
    unavailable: AtomicBool,
}

impl InMemoryRegistrationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("registration store".to_string()));
        }
        Ok(())
    }
}

impl RegistrationRepository for InMemoryRegistrationRepository {
    fn find_by_id(&self, id: &PermanentIdentifier) -> Result<Option<Registration>, StoreError> {
        self.check()?;
        Ok(self.registrations.read().get(id).cloned())
    }

    fn save(&self, registration: Registration) -> Result<Registration, StoreError> {
        self.check()?;
        self.registrations
            .write()
            .insert(registration.permanent_identifier.clone(), registration.clone());
        Ok(registration)
    }

    fn delete(&self, registration: &Registration) -> Result<(), StoreError> {
        self.check()?;
        self.registrations
            .write()
            .remove(&registration.permanent_identifier);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.check()?;
        self.registrations.write().clear();
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<Registration>, StoreError> {
        self.check()?;
        Ok(self.registrations.read().values().cloned().collect())
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.check()?;
        Ok(self.registrations.read().len())
    }
}

/// Pending contacts, kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<Vec<Contact>>,
    unavailable: AtomicBool,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("contact store".to_string()));
        }
        Ok(())
    }
}

impl ContactRepository for InMemoryContactRepository {
    fn save_all(&self, contacts: Vec<Contact>) -> Result<(), StoreError> {
        self.check()?;
        let mut stored = self.contacts.write();
        for contact in contacts {
            match stored.iter_mut().find(|c| c.id == contact.id) {
                Some(existing) => *existing = contact,
                None => stored.push(contact),
            }
        }
        Ok(())
    }

    fn find_all(&self) -> Result<Vec<Contact>, StoreError> {
        self.check()?;
        Ok(self.contacts.read().clone())
    }

    fn delete(&self, id: &ContactId) -> Result<(), StoreError> {
        self.check()?;
        self.contacts.write().retain(|c| &c.id != id);
        Ok(())
    }

    fn delete_all(&self) -> Result<(), StoreError> {
        self.check()?;
        self.contacts.write().clear();
        Ok(())
    }

    fn count(&self) -> Result<usize, StoreError> {
        self.check()?;
        Ok(self.contacts.read().len())
    }
}
