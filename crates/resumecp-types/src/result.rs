//! Result type alias for resumecp operations

use crate::Error;

/// Result type alias for resumecp operations
pub type Result<T> = std::result::Result<T, Error>;
