use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "docintake";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-file upload cap (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Lifetime of a signed preview URL.
pub const SIGNED_URL_TTL_SECS: i64 = 3600;

/// Largest audit log page a caller may request.
pub const AUDIT_PAGE_LIMIT: u32 = 100;

/// Request body ceiling. Uploads arrive base64-encoded, several files per request.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_EXTRACTION_ENDPOINT: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_EXTRACTION_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "info,docintake=debug,tower_http=info"
}

/// Default data directory: `<platform data dir>/docintake`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Cannot determine a data directory; set DOCINTAKE_DATA_DIR")]
    NoDataDir,
}

/// Credentials for the first administrator, created only when the user table is empty.
#[derive(Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Runtime configuration, read from `DOCINTAKE_*` environment variables.
#[derive(Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Origin used when building signed preview URLs.
    pub public_base_url: String,
    /// `None` means a random per-process secret; preview URLs die with the process.
    pub signing_secret: Option<Vec<u8>>,
    pub extraction_endpoint: String,
    pub extraction_api_key: Option<String>,
    pub extraction_model: String,
    pub session_ttl_hours: i64,
    pub pbkdf2_iterations: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("public_base_url", &self.public_base_url)
            .field("extraction_endpoint", &self.extraction_endpoint)
            .field("extraction_model", &self.extraction_model)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Ignoring unreadable .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("DOCINTAKE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_raw.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                key: "DOCINTAKE_BIND_ADDR",
                value: bind_raw.clone(),
                reason: e.to_string(),
            }
        })?;

        let data_dir = match get("DOCINTAKE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let public_base_url = get("DOCINTAKE_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{bind_addr}"))
            .trim_end_matches('/')
            .to_string();

        let session_ttl_hours = parse_number(
            "DOCINTAKE_SESSION_TTL_HOURS",
            get("DOCINTAKE_SESSION_TTL_HOURS"),
            DEFAULT_SESSION_TTL_HOURS,
        )?;
        if session_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "DOCINTAKE_SESSION_TTL_HOURS",
                value: session_ttl_hours.to_string(),
                reason: "must be positive".into(),
            });
        }

        let pbkdf2_iterations = parse_number(
            "DOCINTAKE_PBKDF2_ITERATIONS",
            get("DOCINTAKE_PBKDF2_ITERATIONS"),
            DEFAULT_PBKDF2_ITERATIONS,
        )?;
        if pbkdf2_iterations == 0 {
            return Err(ConfigError::Invalid {
                key: "DOCINTAKE_PBKDF2_ITERATIONS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        let bootstrap_admin = match (
            get("DOCINTAKE_BOOTSTRAP_ADMIN_EMAIL"),
            get("DOCINTAKE_BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            (None, None) => None,
            (Some(_), None) | (None, Some(_)) => {
                return Err(ConfigError::Invalid {
                    key: "DOCINTAKE_BOOTSTRAP_ADMIN_EMAIL",
                    value: String::new(),
                    reason: "bootstrap email and password must be set together".into(),
                })
            }
        };

        Ok(Self {
            bind_addr,
            data_dir,
            public_base_url,
            signing_secret: get("DOCINTAKE_SIGNING_SECRET").map(String::into_bytes),
            extraction_endpoint: get("DOCINTAKE_EXTRACTION_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_EXTRACTION_ENDPOINT.to_string()),
            extraction_api_key: get("DOCINTAKE_EXTRACTION_API_KEY"),
            extraction_model: get("DOCINTAKE_EXTRACTION_MODEL")
                .unwrap_or_else(|| DEFAULT_EXTRACTION_MODEL.to_string()),
            session_ttl_hours,
            pbkdf2_iterations,
            bootstrap_admin,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docintake.db")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}

fn parse_number<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}
