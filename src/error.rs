//! Error types for raidsim

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::raid::RaidKind;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for raidsim
#[derive(Error, Debug)]
pub enum Error {
    // Factory errors
    #[error("Invalid RAID type: {0}")]
    InvalidKind(String),

    #[error("RAID configuration already exists: {0}")]
    NameTaken(String),

    #[error("{kind} requires {required} drives, got {actual}")]
    InsufficientDrives {
        kind: RaidKind,
        required: usize,
        actual: usize,
    },

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    // Drive errors
    #[error("Drive failed: {0}")]
    DriveFailed(String),

    #[error("Drive {drive} is not part of RAID {raid}")]
    DriveNotFound { raid: String, drive: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{kind} does not support {operation}")]
    Unsupported {
        kind: RaidKind,
        operation: &'static str,
    },

    /// A multi-drive operation stopped part way. `completed` lists the drives
    /// that were already written; they are not rolled back.
    #[error("Write of {key} failed on drive {failed} after writing {completed:?}: {source}")]
    PartialWrite {
        key: String,
        completed: Vec<String>,
        failed: String,
        #[source]
        source: Box<Error>,
    },

    // State store errors
    #[error("State already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("State not initialized at {0}")]
    NotInitialized(PathBuf),

    #[error("State checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("State document is corrupt: {0}")]
    Corrupt(String),

    #[error("Missing drives: {0:?}")]
    MissingDrives(Vec<String>),

    // Config errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True if the error means the drive could not serve the request at all
    pub fn is_drive_failed(&self) -> bool {
        match self {
            Error::DriveFailed(_) => true,
            Error::PartialWrite { source, .. } => source.is_drive_failed(),
            _ => false,
        }
    }

    /// True if the requested key has never been written
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::PartialWrite { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
