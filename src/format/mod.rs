//! File format handling for the vault.
//!
//! Provides version-aware parsing and serialization of the vault file format.

use crate::{
    crypto::{KdfParams, SALT_LEN, Sealed},
    error::VaultError,
};

pub mod v1;

/// Magic bytes identifying a passlock vault file ("PLCK").
pub const MAGIC: &[u8; 4] = b"PLCK";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of version field.
pub const VER_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// A parsed vault file: everything needed to re-derive the key and open
/// the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFile {
    version: u8,
    kdf: KdfParams,
    salt: [u8; SALT_LEN],
    sealed: Sealed,
}

impl VaultFile {
    /// Creates a new VaultFile in the current format version.
    pub fn new(kdf: KdfParams, salt: [u8; SALT_LEN], sealed: Sealed) -> Self {
        Self {
            version: CURRENT_VERSION,
            kdf,
            salt,
            sealed,
        }
    }

    /// Returns the file format version.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the KDF parameters used for key derivation.
    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    /// Returns the salt used for key derivation.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Returns nonce, tag and ciphertext.
    pub fn sealed(&self) -> &Sealed {
        &self.sealed
    }

    /// Header bytes authenticated alongside the ciphertext.
    pub fn associated_data(&self) -> Result<Vec<u8>, VaultError> {
        associated_data(self.version, self.kdf, &self.salt)
    }
}

/// Builds the authenticated header for the given version, KDF and salt.
pub fn associated_data(
    version: u8,
    kdf: KdfParams,
    salt: &[u8; SALT_LEN],
) -> Result<Vec<u8>, VaultError> {
    match version {
        v1::VERSION_V1 => Ok(v1::header_prefix(kdf, salt)),
        other => Err(VaultError::Corrupted(format!("unsupported version {other}"))),
    }
}

/// Parses a vault file, dispatching on its version byte.
///
/// # Errors
///
/// Returns [`VaultError::Corrupted`] if:
/// - The file is too short
/// - The magic bytes are invalid
/// - The version is unsupported
/// - The stored KDF parameters are invalid
pub fn parse(data: &[u8]) -> Result<VaultFile, VaultError> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return Err(VaultError::Corrupted("file too short".to_string()));
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return Err(VaultError::Corrupted("invalid magic".to_string()));
    }

    let version = data[MAGIC_LEN];

    match version {
        v1::VERSION_V1 => v1::parse(data),
        other => Err(VaultError::Corrupted(format!("unsupported version {other}"))),
    }
}

/// Serializes a VaultFile to bytes.
pub fn serialize(file: &VaultFile) -> Result<Vec<u8>, VaultError> {
    match file.version() {
        v1::VERSION_V1 => Ok(v1::serialize(file)),
        other => Err(VaultError::Corrupted(format!("unsupported version {other}"))),
    }
}
