//! Storage module.
//!
//! Records read and written by the engine, the repository traits the
//! engine consumes, and thread-safe in-memory implementations.

pub mod memory;
pub mod models;
pub mod repository;

pub use memory::*;
pub use models::*;
pub use repository::*;
