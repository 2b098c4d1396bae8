use thiserror::Error;

/// Centralized error types for the filename index.
///
/// All errors are explicit enum variants (no Box<dyn Error>) so callers
/// can decide between retrying, rebuilding and aborting.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// `SQLite` operation on a snapshot failed
    #[error("database error: {source}")]
    Database {
        #[from]
        source: rusqlite::Error,
    },

    /// File system I/O operation failed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Build root is missing or not a directory
    #[error("invalid root '{path}': {reason}")]
    InvalidRoot { path: String, reason: String },

    /// Invalid CLI configuration value
    #[error("invalid {field}: {value} ({reason})")]
    ConfigInvalid { field: String, value: String, reason: String },

    /// Snapshot exists but cannot be trusted; rebuild from scratch
    #[error("snapshot corrupted: {reason}")]
    SnapshotCorrupted { reason: String },

    /// Snapshot belongs to a different application (never auto-delete)
    #[error("snapshot belongs to different application (app_id: {app_id:#x})")]
    ForeignDatabase { app_id: u32 },

    /// Filesystem watcher could not be started
    #[error("watch error: {source}")]
    Watch {
        #[from]
        source: notify::Error,
    },

    /// JSON serialization error
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl IndexerError {
    /// Returns true when the error means the snapshot should be rebuilt.
    #[must_use]
    pub const fn is_snapshot_unusable(&self) -> bool {
        matches!(self, Self::SnapshotCorrupted { .. } | Self::Database { .. })
    }
}

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Exit codes for the CLI application.
///
/// Based on BSD sysexits.h conventions for meaningful exit statuses.
/// Use `ExitCode::into()` to convert to `std::process::ExitCode`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Ok = 0,
    /// General software error (internal error, unexpected state)
    Software = 1,
    /// Invalid input data (bad query, unusable snapshot)
    DataErr = 2,
    /// I/O error (file not found, permission denied on files)
    IoErr = 3,
    /// No input provided (missing or invalid root)
    NoInput = 4,
    /// Permission denied (access control failure)
    NoPerm = 5,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code as u8)
    }
}

impl From<&IndexerError> for ExitCode {
    fn from(error: &IndexerError) -> Self {
        match error {
            IndexerError::InvalidRoot { .. } | IndexerError::ConfigInvalid { .. } => Self::NoInput,
            IndexerError::Io { source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                Self::NoPerm
            }
            IndexerError::Io { .. } | IndexerError::Watch { .. } => Self::IoErr,
            IndexerError::SnapshotCorrupted { .. } | IndexerError::ForeignDatabase { .. } => {
                Self::DataErr
            }
            IndexerError::Database { .. } | IndexerError::Json { .. } => Self::Software,
        }
    }
}
