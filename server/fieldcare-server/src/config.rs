//! Environment-driven configuration.

use std::env;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Postgres connection string; the in-memory store is used when
    /// absent (local development only)
    pub database_url: Option<String>,
    /// Base64-encoded 32-byte AES key for protected clinical fields
    pub field_key_b64: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("FIELDCARE_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            field_key_b64: env::var("FIELDCARE_FIELD_KEY").ok(),
        }
    }
}
