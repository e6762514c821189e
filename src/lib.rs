//! ROBERT Core - Contact validation and risk aggregation engine
//!
//! This crate implements the server-side core of the ROBERT proximity
//! tracing protocol. The implementation prioritizes:
//!
//! 1. **Privacy** - Permanent identifiers never appear in logs
//! 2. **Logging** - Every discard and risk decision logged with context
//! 3. **Performance** - Per-record isolation, parallel sweeps
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `clock` - Epoch clock and NTP timestamp conversions
//! - `codec` - HELLO wire layout and truncated timestamps
//! - `oracle` - Crypto oracle contract and response interpretation
//! - `validation` - Contact validation and HELLO tolerance checks
//! - `scoring` - Pluggable exposure scoring and aggregation
//! - `risk` - Risk evaluation, reset and exposition purge
//! - `pipeline` - Batch orchestration
//! - `storage` - Records and repository contracts
//! - `logging` - Structured logging with batch context

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod oracle;
pub mod pipeline;
pub mod risk;
pub mod scoring;
pub mod storage;
pub mod validation;

pub use clock::{RobertClock, RobertInstant};
pub use config::RobertConfig;
pub use error::{RobertError, RobertResult};
pub use pipeline::{BatchMode, BatchReport, RiskBatch};

/// Initialize the process-wide logger. Safe to call more than once.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
