//! Core constants and error types for the termcast protocol.
//!
//! Everything here is available regardless of enabled features.

mod constants;
mod error;

pub use constants::*;
pub use error::*;
