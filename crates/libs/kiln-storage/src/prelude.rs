//! Common types and utilities.

/// Storage error type.
pub use crate::error::Error;

/// Storage result type.
pub type Result<T> = core::result::Result<T, Error>;
