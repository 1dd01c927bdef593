use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single password generation call.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("no characters available; select character types or adjust exclusions")]
    EmptyPool,
    #[error("length must be at least {required} to include all selected types (got {length})")]
    InsufficientLength { required: usize, length: usize },
    #[error("length must be at most {max} (got {length})")]
    LengthTooLarge { max: usize, length: usize },
    #[error("OS random generator unavailable")]
    Entropy,
}

/// Record-level failures inside an unlocked vault.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("credential '{0}' not found")]
    RecordNotFound(String),
    #[error("credential id prefix '{0}' is ambiguous")]
    AmbiguousId(String),
    #[error("credential title cannot be empty")]
    EmptyTitle,
}

#[derive(Debug, Error)]
pub enum VaultError {
    /// Wrong passphrase, or ciphertext/header tampered with.
    #[error("Invalid password or corrupted data")]
    Authentication,
    #[error("corrupted vault file: {0}")]
    Corrupted(String),
    #[error("vault is locked")]
    Locked,
    #[error("vault already exists at {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("vault does not exist at {}", .0.display())]
    Missing(PathBuf),
    #[error("invalid key derivation parameters: {0}")]
    InvalidKdf(String),
    #[error("key derivation failed: {0}")]
    Kdf(String),
    #[error("encryption failed")]
    Encryption,
    #[error("OS random generator unavailable")]
    Entropy,
    #[error("failed to serialize vault: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VaultError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| VaultError::Persistence { context, source }
    }
}
