//! Error types for VaultKV
//!
//! Provides a unified error type for all operations, plus the closed
//! [`ErrorKind`] classification the command layer maps to status codes.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

/// Unified error type for VaultKV operations
#[derive(Debug, Error)]
pub enum VaultError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Directory {0} is locked by another process")]
    Locked(PathBuf),

    #[error("Database is opened in read-only mode")]
    ReadOnly,

    #[error("Database is closed")]
    Closed,

    #[error("Backup stream invalid: {0}")]
    Backup(String),

    #[error("all recovery attempts failed for {path}: {source}")]
    Unrecoverable {
        path: PathBuf,
        #[source]
        source: Box<VaultError>,
    },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("key already exists")]
    KeyExists,

    #[error("key does not exist")]
    KeyNotFound,

    #[error("stored value is not a valid record: {0}")]
    Decode(#[source] serde_json::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("query too long")]
    QueryTooLong,

    #[error("invalid syntax")]
    InvalidSyntax,

    #[error("invalid apikey")]
    InvalidApiKey,

    #[error("database name empty")]
    EmptyDatabaseName,

    #[error("invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("limit must be a non-negative number in values[0]")]
    InvalidLimit,

    #[error("invalid backup path: {0}")]
    InvalidBackupPath(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Closed classification of failures, used to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or too-long query, unknown verb, bad database name or parameter
    Validation,
    /// Secret mismatch
    Auth,
    /// Missing key on select/update
    NotFound,
    /// Insert on an existing key
    DuplicateKey,
    /// Stored bytes are not a valid record
    Decode,
    /// Engine open/transaction/backup/restore/compact failure
    Storage,
}

impl ErrorKind {
    /// HTTP-style status code for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::DuplicateKey | ErrorKind::Decode | ErrorKind::Storage => 500,
        }
    }
}

impl VaultError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::QueryTooLong
            | VaultError::InvalidSyntax
            | VaultError::EmptyDatabaseName
            | VaultError::InvalidDatabaseName(_)
            | VaultError::InvalidLimit
            | VaultError::InvalidBackupPath(_) => ErrorKind::Validation,
            VaultError::InvalidApiKey => ErrorKind::Auth,
            VaultError::KeyNotFound => ErrorKind::NotFound,
            VaultError::KeyExists => ErrorKind::DuplicateKey,
            VaultError::Decode(_) => ErrorKind::Decode,
            VaultError::Io(_)
            | VaultError::WalCorruption(_)
            | VaultError::Storage(_)
            | VaultError::Locked(_)
            | VaultError::ReadOnly
            | VaultError::Closed
            | VaultError::Backup(_)
            | VaultError::Unrecoverable { .. }
            | VaultError::Serialization(_)
            | VaultError::Config(_) => ErrorKind::Storage,
        }
    }

    /// Status code for this error (shorthand for `kind().status_code()`)
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<bincode::Error> for VaultError {
    fn from(e: bincode::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}
