//! Sealing and opening of protected clinical fields.
//!
//! Handlers seal protected string fields before every write and open
//! them on projection. Sealed values carry an `ENC:` marker over the
//! base64 of the encryptor's output, so a value that somehow reached
//! storage unsealed fails loudly at projection time instead of leaking
//! through a pull.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use crypto::Encryptor;

use crate::error::{SyncError, SyncResult};

const SEALED_MARKER: &str = "ENC:";

#[derive(Clone)]
pub struct FieldCipher {
    encryptor: Arc<dyn Encryptor>,
}

impl FieldCipher {
    pub fn new(encryptor: Arc<dyn Encryptor>) -> Self {
        Self { encryptor }
    }

    /// Encrypt a protected field for storage
    pub fn seal(&self, plaintext: &str) -> SyncResult<String> {
        let ciphertext = self.encryptor.encrypt(plaintext.as_bytes())?;
        Ok(format!("{SEALED_MARKER}{}", BASE64.encode(ciphertext)))
    }

    /// Decrypt a stored protected field
    pub fn open(&self, stored: &str) -> SyncResult<String> {
        let encoded = stored.strip_prefix(SEALED_MARKER).ok_or_else(|| {
            SyncError::Internal("protected field is not sealed".to_string())
        })?;
        let ciphertext = BASE64
            .decode(encoded)
            .map_err(|e| SyncError::Internal(format!("invalid sealed field encoding: {e}")))?;
        let plaintext = self.encryptor.decrypt(&ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| SyncError::Internal(format!("invalid UTF-8 in protected field: {e}")))
    }
}
