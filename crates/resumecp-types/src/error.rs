//! Error types and handling for resumecp
//!
//! Every fallible operation in the workspace returns [`Error`]. Corrupt
//! checkpoints and pre-existing destinations are not errors; they are
//! handled where they are detected and never reach this type.

use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - the file's job failed, siblings may continue
    Medium,
    /// High severity - the whole copy should stop
    High,
    /// Critical severity - entire process should be terminated
    Critical,
}

/// Main error type for resumecp operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// The source file could not be opened or stat'd
    #[error("Cannot open source '{path}': {message}")]
    SourceOpen {
        /// Source path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// Writing or flushing the destination failed
    #[error("Failed to write destination '{path}': {message}")]
    DestinationWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// A chunk kept failing after all retries were used up
    #[error("Reading '{path}' at offset {position} failed after {attempts} attempts: {message}")]
    ChunkRead {
        /// Source path
        path: PathBuf,
        /// Offset of the failing range
        position: u64,
        /// Number of attempts made for this range
        attempts: u32,
        /// Last read error
        message: String,
    },

    /// The source ended before the size recorded when the job started
    #[error("Source '{path}' changed during copy: expected {expected} bytes, stream ended at {actual}")]
    SourceChanged {
        /// Source path
        path: PathBuf,
        /// Size recorded at job creation
        expected: u64,
        /// Offset at which end-of-stream was observed
        actual: u64,
    },

    /// Writing a checkpoint failed
    #[error("Checkpoint error: {message}")]
    Checkpoint {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A destination path exists but is not a directory
    #[error("{path} already exists but is not a directory")]
    NotADirectory {
        /// Offending path
        path: PathBuf,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors, source and destination included
    Io,
    /// Chunk read errors
    Read,
    /// Checkpoint persistence errors
    Checkpoint,
    /// Configuration errors
    Config,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. }
            | Self::SourceOpen { .. }
            | Self::DestinationWrite { .. }
            | Self::NotADirectory { .. } => ErrorKind::Io,
            Self::ChunkRead { .. } | Self::SourceChanged { .. } => ErrorKind::Read,
            Self::Checkpoint { .. } => ErrorKind::Checkpoint,
            Self::Config { .. } => ErrorKind::Config,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::SourceOpen { .. } | Self::ChunkRead { .. } | Self::SourceChanged { .. } => {
                ErrorSeverity::Medium
            }
            Self::DestinationWrite { .. } | Self::Checkpoint { .. } => ErrorSeverity::High,
            Self::Config { .. } | Self::NotADirectory { .. } => ErrorSeverity::High,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Whether a directory walk may move on to the next file after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SourceOpen { .. } | Self::ChunkRead { .. } | Self::SourceChanged { .. } => true,
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("TimedOut")
            }
            Self::DestinationWrite { .. }
            | Self::Checkpoint { .. }
            | Self::Config { .. }
            | Self::NotADirectory { .. }
            | Self::Cancelled => false,
            Self::Other { .. } => false,
        }
    }

    /// Create a new source-open error
    pub fn source_open<P: Into<PathBuf>>(path: P, error: &std::io::Error) -> Self {
        Self::SourceOpen {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// Create a new destination write error
    pub fn destination_write<P: Into<PathBuf>>(path: P, error: &std::io::Error) -> Self {
        Self::DestinationWrite {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// Create a new checkpoint error
    pub fn checkpoint<S: Into<String>>(message: S) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    proptest! {
        #[test]
        fn test_recoverable_errors_never_escalate(message in ".*", position in any::<u64>()) {
            let errors = vec![
                Error::Io { message: message.clone() },
                Error::ChunkRead {
                    path: PathBuf::from("a.bin"),
                    position,
                    attempts: 3,
                    message: message.clone(),
                },
                Error::Checkpoint { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::Other { message: message.clone() },
            ];

            for error in errors {
                // A walk only continues past errors that leave the rest of the tree intact
                if error.is_recoverable() {
                    prop_assert!(error.severity() <= ErrorSeverity::Medium);
                }
            }
        }
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
        assert!(ErrorSeverity::High < ErrorSeverity::Critical);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(error.to_string().contains("test file"));
    }

    #[test]
    fn test_source_open_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = Error::source_open("/protected/file.bin", &io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.is_recoverable());
        assert!(error.to_string().contains("/protected/file.bin"));
    }

    #[test]
    fn test_destination_write_is_fatal() {
        let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let error = Error::destination_write("/mnt/out/file.bin", &io_error);

        assert_eq!(error.severity(), ErrorSeverity::High);
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_chunk_read_error_message() {
        let error = Error::ChunkRead {
            path: PathBuf::from("big.iso"),
            position: 65536,
            attempts: 6,
            message: "device removed".to_string(),
        };

        assert_eq!(error.kind(), ErrorKind::Read);
        let text = error.to_string();
        assert!(text.contains("65536"));
        assert!(text.contains("6 attempts"));
    }

    #[test]
    fn test_not_a_directory() {
        let error = Error::NotADirectory {
            path: PathBuf::from("out"),
        };
        assert_eq!(error.to_string(), "out already exists but is not a directory");
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_cancelled_error() {
        let error = Error::Cancelled;

        assert_eq!(error.kind(), ErrorKind::Cancelled);
        assert_eq!(error.severity(), ErrorSeverity::Low);
        assert!(!error.is_recoverable());
    }
}
