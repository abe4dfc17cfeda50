//! At-rest credential encryption (spec §3 `UserCredential`, §8 boundary
//! behaviors). AES-256-GCM via the `aes-gcm` crate, keyed by
//! `API_KEY_ENCRYPTION_KEY` (exactly 64 hex chars, i.e. 32 raw bytes).

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyFormatError {
    #[error("encryption key must be exactly 64 hex characters, got {0}")]
    WrongLength(usize),
    #[error("encryption key contains non-hex characters")]
    NotHex,
}

/// Validates the `API_KEY_ENCRYPTION_KEY` shape per spec §8: exactly 64 hex
/// characters or absent; 32, 63, 65 and any non-hex character reject.
pub fn validate_key_hex(raw: &str) -> std::result::Result<(), KeyFormatError> {
    if raw.len() != 64 {
        return Err(KeyFormatError::WrongLength(raw.len()));
    }
    if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(KeyFormatError::NotHex);
    }
    Ok(())
}

/// A validated 32-byte encryption key, ready to back BYOK credential
/// ciphertext. Constructing one is the only way past `validate_key_hex`.
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    pub fn from_hex(raw: &str) -> std::result::Result<Self, KeyFormatError> {
        validate_key_hex(raw)?;
        let bytes = hex::decode(raw).map_err(|_| KeyFormatError::NotHex)?;
        Ok(Self(*Key::<Aes256Gcm>::from_slice(&bytes)))
    }
}

pub struct EncryptedCredential {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
    /// `aes-gcm` appends the 16-byte auth tag to the ciphertext; split out
    /// here so `UserCredential` can store it as its own field per §3.
    pub auth_tag: Vec<u8>,
}

const TAG_LEN: usize = 16;

pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<EncryptedCredential> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let mut sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Other(format!("encryption failed: {e}")))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    Ok(EncryptedCredential {
        ciphertext: sealed,
        iv: nonce.to_vec(),
        auth_tag: tag,
    })
}

/// Decrypts a stored credential. Per spec §3: "only decrypted at the
/// boundary that must use it; plaintext never logged" — callers must not
/// pass the returned bytes to any logging/tracing call.
pub fn decrypt(key: &EncryptionKey, enc: &EncryptedCredential) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Nonce::from_slice(&enc.iv);
    let mut sealed = enc.ciphertext.clone();
    sealed.extend_from_slice(&enc.auth_tag);
    cipher
        .decrypt(nonce, sealed.as_slice())
        .map_err(|e| Error::Other(format!("decryption failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key_hex() -> String {
        "a".repeat(64)
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!(validate_key_hex(&"a".repeat(32)), Err(KeyFormatError::WrongLength(32)));
        assert_eq!(validate_key_hex(&"a".repeat(63)), Err(KeyFormatError::WrongLength(63)));
        assert_eq!(validate_key_hex(&"a".repeat(65)), Err(KeyFormatError::WrongLength(65)));
    }

    #[test]
    fn rejects_non_hex() {
        let mut key = "a".repeat(63);
        key.push('z');
        assert_eq!(validate_key_hex(&key), Err(KeyFormatError::NotHex));
    }

    #[test]
    fn accepts_64_hex_chars() {
        assert!(validate_key_hex(&test_key_hex()).is_ok());
    }

    #[test]
    fn round_trips_plaintext() {
        let key = EncryptionKey::from_hex(&test_key_hex()).unwrap();
        let enc = encrypt(&key, b"sk-secret-value").unwrap();
        let plain = decrypt(&key, &enc).unwrap();
        assert_eq!(plain, b"sk-secret-value");
    }

    #[test]
    fn tampered_tag_fails_to_decrypt() {
        let key = EncryptionKey::from_hex(&test_key_hex()).unwrap();
        let mut enc = encrypt(&key, b"sk-secret-value").unwrap();
        enc.auth_tag[0] ^= 0xff;
        assert!(decrypt(&key, &enc).is_err());
    }
}
