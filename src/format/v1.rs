//! File format v1 for the vault.
//!
//! V1 File Format (integers little-endian):
//! ```text
//! MAGIC (4) | VERSION (1) | KDF_ID (1) | P1 (4) | P2 (4) | P3 (4) | SALT (16) | NONCE (24) | TAG (16) | CIPHERTEXT
//! ```
//!
//! KDF_ID 1 is PBKDF2-HMAC-SHA256 with P1 = iterations (P2, P3 zero);
//! KDF_ID 2 is Argon2id with P1 = memory KiB, P2 = time, P3 = parallelism.
//! Everything up to and including SALT is authenticated as associated data.

use super::{MAGIC, MAGIC_LEN, VER_LEN, VaultFile};
use crate::{
    crypto::{KdfParams, NONCE_LEN, SALT_LEN, Sealed, TAG_LEN},
    error::VaultError,
};

/// Current file format version.
pub const VERSION_V1: u8 = 1;

const KDF_PBKDF2_SHA256: u8 = 1;
const KDF_ARGON2ID: u8 = 2;

const KDF_ID_LEN: usize = 1;
const PARAM_LEN: usize = 4;

const PREFIX_LEN: usize = MAGIC_LEN + VER_LEN + KDF_ID_LEN + 3 * PARAM_LEN + SALT_LEN;
pub const HEADER_LEN: usize = PREFIX_LEN + NONCE_LEN + TAG_LEN;

fn encode_kdf(kdf: KdfParams) -> (u8, [u32; 3]) {
    match kdf {
        KdfParams::Pbkdf2Sha256 { iterations } => (KDF_PBKDF2_SHA256, [iterations, 0, 0]),
        KdfParams::Argon2id {
            mem_cost_kib,
            time_cost,
            parallelism,
        } => (KDF_ARGON2ID, [mem_cost_kib, time_cost, parallelism]),
    }
}

fn decode_kdf(id: u8, params: [u32; 3]) -> Result<KdfParams, VaultError> {
    let kdf = match id {
        KDF_PBKDF2_SHA256 => KdfParams::pbkdf2(params[0]),
        KDF_ARGON2ID => KdfParams::argon2id(params[0], params[1], params[2]),
        other => return Err(VaultError::Corrupted(format!("unknown kdf id {other}"))),
    };
    kdf.map_err(|e| VaultError::Corrupted(e.to_string()))
}

/// Header bytes up to and including the salt.
pub fn header_prefix(kdf: KdfParams, salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let (id, params) = encode_kdf(kdf);

    let mut buf = Vec::with_capacity(PREFIX_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.push(id);
    for p in params {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf.extend_from_slice(salt);
    buf
}

fn take<const N: usize>(data: &[u8], offset: &mut usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[*offset..*offset + N]);
    *offset += N;
    out
}

/// Parses a v1 vault file.
///
/// # Errors
///
/// Returns an error if the file is too short or has invalid parameters.
pub fn parse(data: &[u8]) -> Result<VaultFile, VaultError> {
    if data.len() < HEADER_LEN {
        return Err(VaultError::Corrupted("file too short for v1".to_string()));
    }

    let mut offset = MAGIC_LEN + VER_LEN;

    let kdf_id = data[offset];
    offset += KDF_ID_LEN;

    let params = [
        u32::from_le_bytes(take::<PARAM_LEN>(data, &mut offset)),
        u32::from_le_bytes(take::<PARAM_LEN>(data, &mut offset)),
        u32::from_le_bytes(take::<PARAM_LEN>(data, &mut offset)),
    ];
    let kdf = decode_kdf(kdf_id, params)?;

    let salt = take::<SALT_LEN>(data, &mut offset);
    let nonce = take::<NONCE_LEN>(data, &mut offset);
    let tag = take::<TAG_LEN>(data, &mut offset);
    let ciphertext = data[offset..].to_vec();

    Ok(VaultFile::new(
        kdf,
        salt,
        Sealed {
            nonce,
            tag,
            ciphertext,
        },
    ))
}

/// Serializes a VaultFile to v1 format bytes.
pub fn serialize(file: &VaultFile) -> Vec<u8> {
    let sealed = file.sealed();

    let mut buf = header_prefix(file.kdf(), file.salt());
    buf.reserve(NONCE_LEN + TAG_LEN + sealed.ciphertext.len());
    buf.extend_from_slice(&sealed.nonce);
    buf.extend_from_slice(&sealed.tag);
    buf.extend_from_slice(&sealed.ciphertext);
    buf
}
