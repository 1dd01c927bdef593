use chacha20poly1305::{
    Key, Tag, XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

use super::{KEY_LEN, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::VaultError;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), VaultError> {
    fill(buf).map_err(|_| VaultError::Entropy)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], VaultError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Output of one encryption: nonce, detached authentication tag and
/// ciphertext of the same length as the plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under a fresh random nonce.
///
/// `aad` is authenticated but not encrypted.
pub fn seal(key: &[u8; KEY_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Sealed, VaultError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), aad, &mut ciphertext)
        .map_err(|_| VaultError::Encryption)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce,
        tag: tag_bytes,
        ciphertext,
    })
}

/// Decrypts and authenticates a [`Sealed`] blob.
///
/// Any mismatch of key, nonce, tag, ciphertext or `aad` is reported as
/// [`VaultError::Authentication`].
pub fn open(
    key: &[u8; KEY_LEN],
    aad: &[u8],
    sealed: &Sealed,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut plaintext = Zeroizing::new(sealed.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(&sealed.nonce),
            aad,
            &mut plaintext,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| VaultError::Authentication)?;

    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [9u8; KEY_LEN];

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal(&KEY, b"header", b"secret data").unwrap();
        let plaintext = open(&KEY, b"header", &sealed).unwrap();

        assert_eq!(plaintext.as_slice(), b"secret data");
        assert_eq!(sealed.ciphertext.len(), b"secret data".len());
    }

    #[test]
    fn every_seal_uses_a_fresh_nonce() {
        let a = seal(&KEY, b"", b"same input twice").unwrap();
        let b = seal(&KEY, b"", b"same input twice").unwrap();

        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal(&KEY, b"", b"secret").unwrap();
        let wrong = [1u8; KEY_LEN];

        assert!(matches!(
            open(&wrong, b"", &sealed),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn tampering_is_detected() {
        let sealed = seal(&KEY, b"header", b"secret").unwrap();

        let mut flipped = sealed.clone();
        flipped.ciphertext[0] ^= 1;
        assert!(open(&KEY, b"header", &flipped).is_err());

        let mut bad_tag = sealed.clone();
        bad_tag.tag[0] ^= 1;
        assert!(open(&KEY, b"header", &bad_tag).is_err());

        assert!(open(&KEY, b"other header", &sealed).is_err());
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
