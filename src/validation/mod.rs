//! Contact validation module.
//!
//! - Oracle round-trip and contact-level discards
//! - Per-message timestamp tolerance and epoch coherence checks

pub mod contact;
pub mod tolerance;

pub use contact::*;
pub use tolerance::*;
