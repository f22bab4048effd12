//! Common types and utilities.

/// Log publishing error type.
pub use crate::error::Error;

/// Log publishing result type.
pub type Result<T> = core::result::Result<T, Error>;
