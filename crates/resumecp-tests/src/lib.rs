//! resumecp integration test support
//!
//! Shared fixtures and reporters for the end-to-end tests under `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Test data generation, fast copy options and reporters that record or
/// interrupt copies at chosen points.
pub mod test_utils;
