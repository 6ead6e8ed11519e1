//! Result type aliases for Murmur.

use crate::MurmurError;

/// A specialized `Result` type for Murmur operations.
pub type MurmurResult<T> = Result<T, MurmurError>;
