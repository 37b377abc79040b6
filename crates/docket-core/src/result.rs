//! Result type aliases for Docket.

use crate::DocketError;

/// A specialized `Result` type for application-level operations.
pub type DocketResult<T> = Result<T, DocketError>;
