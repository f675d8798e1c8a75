//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use argon2::password_hash::PasswordHash;

use appshelf_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT, DEFAULT_MAX_UPLOAD_SIZE};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Data root holding the database, packages, icons and the lock file.
    /// Env: `DATA_DIR`
    /// Default: `./app_data`
    pub data_dir: PathBuf,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Appshelf"`
    pub instance_name: String,

    /// Maximum accepted upload in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 64 MiB
    pub max_upload_size: usize,

    /// Argon2 hash (PHC string) of the password clients send, base64
    /// encoded, to use the read API.
    /// Env: `USER_PASSWORD_HASH`
    /// Default: unset, the read API is open.
    pub user_password_hash: Option<String>,

    /// Argon2 hash (PHC string) of the bearer token for the admin API.
    /// Env: `ADMIN_TOKEN_HASH`
    /// Default: unset, the admin API is disabled.
    pub admin_token_hash: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            data_dir: PathBuf::from("./app_data"),
            instance_name: APP_NAME.to_string(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            user_password_hash: None,
            admin_token_hash: None,
        }
    }
}

// secrets stay out of the logs
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("data_dir", &self.data_dir)
            .field("instance_name", &self.instance_name)
            .field("max_upload_size", &self.max_upload_size)
            .field("user_password_hash", &self.user_password_hash.as_ref().map(|_| "<redacted>"))
            .field("admin_token_hash", &self.admin_token_hash.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(path);
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(val) = lookup("MAX_UPLOAD_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_SIZE, using default"),
            }
        }

        config.user_password_hash = secret_hash(&lookup, "USER_PASSWORD_HASH");
        config.admin_token_hash = secret_hash(&lookup, "ADMIN_TOKEN_HASH");

        config
    }
}

/// Read a PHC hash setting.  A malformed one is kept so that every request
/// it guards gets rejected instead of the guard silently turning off.
fn secret_hash(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    let hash = lookup(key).filter(|v| !v.is_empty())?;
    if let Err(e) = PasswordHash::new(&hash) {
        tracing::warn!(key, "not a valid PHC hash, all matching requests will be refused: {e}");
    }
    Some(hash)
}
