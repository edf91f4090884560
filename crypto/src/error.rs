use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid key")]
    InvalidKey,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Unsupported key version {version}, only version {supported} is supported")]
    UnsupportedKeyVersion { version: u32, supported: u32 },

    #[error("Invalid encrypted data format")]
    InvalidFormat,

    #[error("Invalid nonce length")]
    InvalidNonce,

    #[error("Invalid UTF-8 in decrypted data")]
    InvalidUtf8,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
