//! Pipeline orchestration module.
//!
//! Batch run that coordinates:
//! - Purge of old epoch expositions
//! - Risk level reset
//! - Contact validation and scoring
//! - Risk evaluation

pub mod batch;
pub mod contact_processing;
pub mod context;

pub use batch::*;
pub use contact_processing::*;
pub use context::*;
