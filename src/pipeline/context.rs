//! Pipeline context management.
//!
//! Provides the batch identity and the reference instant shared by every
//! step of a batch run.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::clock::{RobertClock, RobertInstant};
use crate::logging::LogContext;
use crate::storage::{ContactId, PermanentIdentifier};

/// Context for one batch run.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
    /// Reference "now" for every decision taken during the batch.
    pub now: RobertInstant,
}

impl BatchContext {
    pub fn new(clock: &RobertClock) -> Self {
        Self::at(clock.now())
    }

    /// Context with a fixed reference instant.
    pub fn at(now: RobertInstant) -> Self {
        let batch_id = format!("batch-{}", &Uuid::new_v4().to_string()[..8]);
        Self {
            batch_id,
            started_at: Utc::now(),
            now,
        }
    }

    pub fn current_epoch(&self) -> i32 {
        self.now.as_epoch_id()
    }

    pub fn log_context(&self) -> LogContext {
        LogContext::new(&self.batch_id)
    }

    pub fn contact_context(&self, contact_id: &ContactId) -> LogContext {
        self.log_context().with_contact(contact_id)
    }

    pub fn registration_context(&self, id: &PermanentIdentifier) -> LogContext {
        self.log_context().with_registration(id)
    }
}
