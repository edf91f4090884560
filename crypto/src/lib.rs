//! Field-level encryption primitives for FieldCare Engine
//!
//! Protected clinical fields (diagnoses, symptoms, visit notes) are never
//! persisted in the clear. This crate provides the encryption seam the
//! sync engine consumes:
//! - `Encryptor` trait, the collaborator interface
//! - `Aes256GcmEncryptor`, the production implementation
//! - `NoOpEncryptor`, a pass-through for tests and development

pub mod aes_gcm;
pub mod encryption;
pub mod error;

pub use aes_gcm::Aes256GcmEncryptor;
pub use encryption::{EncryptionResult, Encryptor, NoOpEncryptor};
pub use error::{CryptoError, CryptoResult};
