//! Risk state management.
//!
//! - Risk evaluation with last-contact jitter
//! - Reset of stale risk flags
//! - Purge of expositions older than the contagious period

pub mod evaluation;
pub mod jitter;
pub mod purge;
pub mod reset;

pub use evaluation::{RiskEvaluation, RiskEvaluator};
pub use jitter::{jitter_bounds, next_last_contact, randomize_last_contact};
pub use purge::EpochRetentionPurger;
pub use reset::{ResetDecision, RiskReset};
