//! Binary codec.
//!
//! Bit-exact encoding of the fields exchanged with client apps and the
//! crypto oracle: truncated NTP timestamps and the HELLO layout.

pub mod bytes;
pub mod hello;

pub use bytes::*;
pub use hello::*;
