use std::fmt;

use argon2::{Algorithm, Argon2, Params, Version};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use super::KEY_LEN;
use crate::error::VaultError;

/// Default PBKDF2-HMAC-SHA256 iteration count.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;
/// Lowest iteration count accepted when creating or opening a vault.
pub const MIN_PBKDF2_ITERATIONS: u32 = 1_000;

pub const DEFAULT_ARGON2_MEM_KIB: u32 = 64 * 1024;
pub const DEFAULT_ARGON2_TIME: u32 = 3;
pub const DEFAULT_ARGON2_PARALLELISM: u32 = 1;

/// Key derivation algorithm and its cost parameters.
///
/// Stored in the vault header, so a vault always unlocks with the
/// parameters it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    Pbkdf2Sha256 { iterations: u32 },
    Argon2id {
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2Sha256 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfParams::Pbkdf2Sha256 { iterations } => {
                write!(f, "PBKDF2-HMAC-SHA256 ({iterations} iterations)")
            }
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => write!(
                f,
                "Argon2id (memory {mem_cost_kib} KiB, time {time_cost}, parallelism {parallelism})"
            ),
        }
    }
}

impl KdfParams {
    pub fn pbkdf2(iterations: u32) -> Result<Self, VaultError> {
        let params = KdfParams::Pbkdf2Sha256 { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn argon2id(
        mem_cost_kib: u32,
        time_cost: u32,
        parallelism: u32,
    ) -> Result<Self, VaultError> {
        let params = KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Argon2id with 64 MiB, 3 passes, 1 lane.
    pub fn default_argon2id() -> Self {
        KdfParams::Argon2id {
            mem_cost_kib: DEFAULT_ARGON2_MEM_KIB,
            time_cost: DEFAULT_ARGON2_TIME,
            parallelism: DEFAULT_ARGON2_PARALLELISM,
        }
    }

    pub fn validate(&self) -> Result<(), VaultError> {
        let invalid = |msg: &str| Err(VaultError::InvalidKdf(msg.to_string()));
        match *self {
            KdfParams::Pbkdf2Sha256 { iterations } => {
                if iterations < MIN_PBKDF2_ITERATIONS {
                    return invalid("pbkdf2 iterations must be >= 1000");
                }
            }
            KdfParams::Argon2id {
                mem_cost_kib,
                time_cost,
                parallelism,
            } => {
                if mem_cost_kib < 8 {
                    return invalid("argon2 memory cost too low");
                }
                if time_cost < 1 {
                    return invalid("argon2 time cost must be >= 1");
                }
                if parallelism < 1 {
                    return invalid("argon2 parallelism must be >= 1");
                }
                if mem_cost_kib < 8 * parallelism {
                    return invalid("argon2 memory cost must be at least 8 * parallelism");
                }
            }
        }
        Ok(())
    }
}

/// Derives the 32-byte vault key from a passphrase and salt.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, VaultError> {
    kdf.validate()?;
    debug!(kdf = %kdf, "deriving vault key");

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    match kdf {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key[..]);
        }
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => {
            let params = Params::new(mem_cost_kib, time_cost, parallelism, Some(KEY_LEN))
                .map_err(|e| VaultError::InvalidKdf(e.to_string()))?;
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
                .map_err(|e| VaultError::Kdf(e.to_string()))?;
        }
    }

    Ok(key)
}
