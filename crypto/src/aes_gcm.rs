use crate::encryption::{EncryptionResult, Encryptor};
use crate::error::CryptoError;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

/// AES-256-GCM encryptor for protected clinical fields.
///
/// Produces self-describing ciphertext in the form
/// `v{version}:{nonce_b64}:{ciphertext_b64}` so that stored values can be
/// decrypted after a key rotation once the matching key is looked up.
/// Nonces are 96-bit and freshly random per encryption; the key is
/// zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct Aes256GcmEncryptor {
    #[zeroize(skip)]
    cipher: Aes256Gcm,
    /// Master key, zeroized on drop
    key: [u8; 32],
    key_version: u32,
}

impl Aes256GcmEncryptor {
    /// Create a new encryptor with a 32-byte key
    pub fn new(key: [u8; 32]) -> EncryptionResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;

        Ok(Self {
            cipher,
            key,
            key_version: 1,
        })
    }

    /// Create from a base64-encoded key
    pub fn from_base64(key_b64: &str) -> EncryptionResult<Self> {
        let key_bytes = BASE64.decode(key_b64).map_err(|_| CryptoError::InvalidKey)?;

        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: key_bytes.len(),
            });
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);

        Self::new(key)
    }

    /// Create with a specific key version
    pub fn with_version(mut self, version: u32) -> Self {
        self.key_version = version;
        self
    }

    /// Generate a cryptographically secure random key
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Current key version
    pub fn version(&self) -> u32 {
        self.key_version
    }

    fn encrypt_versioned(&self, plaintext: &[u8]) -> EncryptionResult<String> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "v{}:{}:{}",
            self.key_version,
            BASE64.encode(nonce_bytes),
            BASE64.encode(&ciphertext)
        ))
    }

    fn decrypt_versioned(&self, encrypted: &str) -> EncryptionResult<Vec<u8>> {
        let mut parts = encrypted.splitn(3, ':');
        let (version_part, nonce_part, ct_part) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(n), Some(c)) => (v, n, c),
            _ => return Err(CryptoError::InvalidFormat),
        };

        let version = version_part
            .strip_prefix('v')
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or(CryptoError::InvalidFormat)?;

        // Single-key deployment: only the active version decrypts.
        if version != self.key_version {
            return Err(CryptoError::UnsupportedKeyVersion {
                version,
                supported: self.key_version,
            });
        }

        let nonce_bytes = BASE64
            .decode(nonce_part)
            .map_err(|_| CryptoError::InvalidFormat)?;
        if nonce_bytes.len() != 12 {
            return Err(CryptoError::InvalidNonce);
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = BASE64
            .decode(ct_part)
            .map_err(|_| CryptoError::InvalidFormat)?;

        self.cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt a string into the versioned format
    pub fn encrypt_string(&self, plaintext: &str) -> EncryptionResult<String> {
        self.encrypt_versioned(plaintext.as_bytes())
    }

    /// Decrypt a versioned string
    pub fn decrypt_string(&self, encrypted: &str) -> EncryptionResult<String> {
        let plaintext_bytes = self.decrypt_versioned(encrypted)?;
        String::from_utf8(plaintext_bytes).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl Encryptor for Aes256GcmEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> EncryptionResult<Vec<u8>> {
        let encrypted_str = self.encrypt_versioned(plaintext)?;
        Ok(encrypted_str.into_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> EncryptionResult<Vec<u8>> {
        let encrypted_str =
            String::from_utf8(ciphertext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)?;
        self.decrypt_versioned(&encrypted_str)
    }

    fn algorithm(&self) -> &str {
        "AES-256-GCM"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor = Aes256GcmEncryptor::new(key).unwrap();

        let plaintext = b"suspected hypertension, follow up in two weeks";
        let ciphertext = encryptor.encrypt(plaintext).unwrap();
        let decrypted = encryptor.decrypt(&ciphertext).unwrap();

        assert_eq!(plaintext, decrypted.as_slice());
    }

    #[test]
    fn test_versioned_format() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor = Aes256GcmEncryptor::new(key).unwrap().with_version(3);

        let encrypted = encryptor.encrypt_string("test data").unwrap();

        assert!(encrypted.starts_with("v3:"));
        assert_eq!(encrypted.split(':').count(), 3);
    }

    #[test]
    fn test_different_nonces() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor = Aes256GcmEncryptor::new(key).unwrap();

        let encrypted1 = encryptor.encrypt_string("same plaintext").unwrap();
        let encrypted2 = encryptor.encrypt_string("same plaintext").unwrap();

        assert_ne!(encrypted1, encrypted2);
        assert_eq!(encryptor.decrypt_string(&encrypted1).unwrap(), "same plaintext");
        assert_eq!(encryptor.decrypt_string(&encrypted2).unwrap(), "same plaintext");
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor = Aes256GcmEncryptor::new(key).unwrap();

        let mut encrypted = encryptor.encrypt_string("authenticated data").unwrap();
        encrypted.push('X');

        assert!(encryptor.decrypt_string(&encrypted).is_err());
    }

    #[test]
    fn test_wrong_version_rejected() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor_v1 = Aes256GcmEncryptor::new(key).unwrap();
        let encryptor_v2 = Aes256GcmEncryptor::new(key).unwrap().with_version(2);

        let encrypted = encryptor_v1.encrypt_string("version test").unwrap();

        assert!(encryptor_v2.decrypt_string(&encrypted).is_err());
    }

    #[test]
    fn test_from_base64() {
        let key_b64 = BASE64.encode(Aes256GcmEncryptor::generate_key());
        let encryptor = Aes256GcmEncryptor::from_base64(&key_b64).unwrap();

        let encrypted = encryptor.encrypt_string("base64 key test").unwrap();
        assert_eq!(encryptor.decrypt_string(&encrypted).unwrap(), "base64 key test");
    }

    #[test]
    fn test_invalid_key_length() {
        let short_key_b64 = BASE64.encode(b"too_short");
        assert!(Aes256GcmEncryptor::from_base64(&short_key_b64).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = Aes256GcmEncryptor::generate_key();
        let encryptor = Aes256GcmEncryptor::new(key).unwrap();

        let encrypted = encryptor.encrypt_string("").unwrap();
        assert_eq!(encryptor.decrypt_string(&encrypted).unwrap(), "");
    }
}
