//! Exposure scoring.
//!
//! The formula is pluggable through [`ScoringStrategy`]; the algorithm in
//! use is chosen from configuration by [`ScoringAlgorithm`].

pub mod aggregator;
pub mod strategy;
pub mod v2;

pub use aggregator::ExposureAggregator;
pub use strategy::{ScoringAlgorithm, ScoringStrategy};
pub use v2::{ScoringResult, ScoringV2, V2Parameters};
