//! FieldCare sync server.
//!
//! Wires the reconciliation engine to its collaborators: the storage
//! backend (Postgres, or in-memory for local runs), the field encryptor,
//! and the HTTP surface. Authentication is upstream; see `extract`.

mod config;
mod error;
mod extract;
mod handlers;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use crypto::{Aes256GcmEncryptor, Encryptor};
use fieldcare_sync::SyncEngine;
use storage_layer::{MemoryStore, PgStore, SyncStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SyncEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    let store: Arc<dyn SyncStore> = match &config.database_url {
        Some(url) => {
            info!("connecting to Postgres store");
            Arc::new(PgStore::connect(url).await.context("connecting to Postgres")?)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is not durable)");
            Arc::new(MemoryStore::new())
        }
    };

    let encryptor: Arc<dyn Encryptor> = match &config.field_key_b64 {
        Some(key) => Arc::new(
            Aes256GcmEncryptor::from_base64(key)
                .map_err(|e| anyhow::anyhow!("invalid FIELDCARE_FIELD_KEY: {e}"))?,
        ),
        None => {
            warn!("FIELDCARE_FIELD_KEY not set; generating an ephemeral key");
            Arc::new(
                Aes256GcmEncryptor::new(Aes256GcmEncryptor::generate_key())
                    .map_err(|e| anyhow::anyhow!("initializing field encryption: {e}"))?,
            )
        }
    };

    let state = AppState {
        engine: Arc::new(SyncEngine::new(store, encryptor)),
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "fieldcare-server listening");
    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
