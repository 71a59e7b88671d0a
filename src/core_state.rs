//! Shared application state.
//!
//! `CoreState` is built once at startup and handed to the HTTP layer behind an
//! `Arc`. It holds no open connection: every unit of work opens its own
//! SQLite connection through [`CoreState::open_db`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{ServiceConfig, SIGNED_URL_TTL_SECS};
use crate::db::{self, DatabaseError};
use crate::extraction::{GatewayClient, VisionClient};
use crate::storage::{LocalObjectStore, ObjectStore, SignatureError, StorageError, UrlSigner};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("URL signer error: {0}")]
    Signer(#[from] SignatureError),

    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    pub store: Arc<dyn ObjectStore>,
    pub client: Arc<dyn VisionClient>,
    pub signer: UrlSigner,
    pub session_ttl_hours: i64,
    pub pbkdf2_iterations: u32,
}

impl CoreState {
    /// Production wiring: filesystem store, gateway client, configured secret.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, CoreError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|source| CoreError::DataDir {
            path: config.data_dir.clone(),
            source,
        })?;

        let secret = match &config.signing_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("DOCINTAKE_SIGNING_SECRET unset; preview URLs will not survive a restart");
                rand::random::<[u8; 32]>().to_vec()
            }
        };
        if config.extraction_api_key.is_none() {
            tracing::warn!("DOCINTAKE_EXTRACTION_API_KEY unset; extraction calls will be rejected upstream");
        }

        let store = LocalObjectStore::new(config.documents_dir())?;
        let client = GatewayClient::new(
            &config.extraction_endpoint,
            config.extraction_api_key.as_deref().unwrap_or_default(),
            &config.extraction_model,
        );
        let signer = UrlSigner::new(&secret, &config.public_base_url, SIGNED_URL_TTL_SECS)?;

        let state = Self {
            db_path: config.database_path(),
            store: Arc::new(store),
            client: Arc::new(client),
            signer,
            session_ttl_hours: config.session_ttl_hours,
            pbkdf2_iterations: config.pbkdf2_iterations,
        };

        // Apply migrations once up front so a broken schema fails startup.
        state.open_db()?;
        tracing::info!(db = %state.db_path.display(), "Database ready");
        Ok(state)
    }

    /// Explicit wiring, used by tests and embedders.
    pub fn new(
        db_path: impl Into<PathBuf>,
        store: Arc<dyn ObjectStore>,
        client: Arc<dyn VisionClient>,
        signer: UrlSigner,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            store,
            client,
            signer,
            session_ttl_hours: crate::config::DEFAULT_SESSION_TTL_HOURS,
            pbkdf2_iterations: crate::config::DEFAULT_PBKDF2_ITERATIONS,
        }
    }

    /// Open a fresh connection with pragmas set and migrations applied.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
