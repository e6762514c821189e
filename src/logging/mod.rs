//! Structured logging with batch context.
//!
//! Provides logging macros and utilities that include the batch id and the
//! record being processed in every log message for easy correlation.

pub mod structured;

pub use structured::*;
