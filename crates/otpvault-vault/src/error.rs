//! Vault error types for `otpvault-vault`.

use otpvault_core::CoreError;
use thiserror::Error;

use crate::import::ImportError;

/// Errors produced by vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// OTP engine failure (bad Base32 secret, invalid parameters).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Import parsing failure.
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Account not found by id.
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// The account's secret has been cleared, so no code can be produced.
    #[error("entry has no secret")]
    EmptySecret,

    /// The credential store lock was poisoned by a panicking writer.
    #[error("storage error: {0}")]
    Storage(String),

    /// Backup blob store failure, or a blob that is not a valid backup.
    #[error("backup error: {0}")]
    Backup(String),

    /// Snapshot (de)serialisation failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
