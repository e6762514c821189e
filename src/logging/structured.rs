//! Structured logging utilities.
//!
//! Every line starts with the batch id, optionally followed by the contact
//! or the registration being processed. Registrations are identified by
//! their fingerprint, never by the raw permanent identifier.

use std::fmt;

use crate::storage::{ContactId, PermanentIdentifier};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Subject {
    Contact(String),
    Registration(String),
}

/// Logging context for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub batch_id: String,
    subject: Option<Subject>,
}

impl LogContext {
    pub fn new(batch_id: &str) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            subject: None,
        }
    }

    pub fn with_contact(&self, contact_id: &ContactId) -> Self {
        Self {
            batch_id: self.batch_id.clone(),
            subject: Some(Subject::Contact(contact_id.to_string())),
        }
    }

    pub fn with_registration(&self, id: &PermanentIdentifier) -> Self {
        Self {
            batch_id: self.batch_id.clone(),
            subject: Some(Subject::Registration(id.fingerprint())),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(Subject::Contact(id)) => write!(f, "[batch={}] [contact={}]", self.batch_id, id),
            Some(Subject::Registration(fp)) => {
                write!(f, "[batch={}] [registration={}]", self.batch_id, fp)
            }
            None => write!(f, "[batch={}]", self.batch_id),
        }
    }
}

/// Log an info event with context and `key=value` pairs.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            "{} {}{}",
            $ctx,
            $event,
            format_args!(concat!($(" ", stringify!($key), "={}"),*) $(, $value)*)
        )
    };
}

/// Log a warning event with context and `key=value` pairs.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            "{} {}{}",
            $ctx,
            $event,
            format_args!(concat!($(" ", stringify!($key), "={}"),*) $(, $value)*)
        )
    };
}

/// Log an error event with context and `key=value` pairs.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            "{} {}{}",
            $ctx,
            $event,
            format_args!(concat!($(" ", stringify!($key), "={}"),*) $(, $value)*)
        )
    };
}

/// Log a debug event with context and `key=value` pairs.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            "{} {}{}",
            $ctx,
            $event,
            format_args!(concat!($(" ", stringify!($key), "={}"),*) $(, $value)*)
        )
    };
}
