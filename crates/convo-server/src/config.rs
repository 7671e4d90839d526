//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use convo_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT, MAX_ATTACHMENTS, MAX_ATTACHMENT_SIZE};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./convo.db`
    pub database_path: PathBuf,

    /// Directory for attachments when the local policy is active.
    /// Env: `UPLOADS_DIR`
    /// Default: `./uploads`
    pub uploads_dir: PathBuf,

    /// URL prefix under which local uploads are served.
    /// Env: `PUBLIC_BASE_PATH`
    /// Default: `/uploads`
    pub uploads_route: String,

    /// Largest accepted attachment in bytes.
    /// Env: `MAX_ATTACHMENT_SIZE`
    pub max_attachment_size: usize,

    /// Most attachments accepted on one message.
    /// Env: `MAX_ATTACHMENTS`
    pub max_attachments: usize,

    /// Remote object storage. When set, attachments are uploaded there
    /// instead of the local uploads directory.
    /// Env: `OBJECT_STORAGE_URL`, `OBJECT_STORAGE_PRESET`, `OBJECT_STORAGE_FOLDER`
    pub object_storage: Option<ObjectStorageConfig>,

    /// Allowed CORS origin. Any origin when unset.
    /// Env: `CORS_ORIGIN`
    pub cors_origin: Option<String>,

    /// Bearer token for `/admin/*`. Admin API disabled when unset.
    /// Env: `ADMIN_TOKEN`
    pub admin_token: Option<String>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    pub instance_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageConfig {
    /// Multipart upload endpoint.
    pub upload_url: String,
    /// Unsigned upload preset, sent as `upload_preset` when present.
    pub upload_preset: Option<String>,
    /// Destination folder, sent as `folder`.
    pub folder: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./convo.db"),
            uploads_dir: PathBuf::from("./uploads"),
            uploads_route: "/uploads".to_string(),
            max_attachment_size: MAX_ATTACHMENT_SIZE,
            max_attachments: MAX_ATTACHMENTS,
            object_storage: None,
            cors_origin: None,
            admin_token: None,
            instance_name: APP_NAME.to_string(),
        }
    }
}

// Hand-written so the admin token never reaches the logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("uploads_dir", &self.uploads_dir)
            .field("uploads_route", &self.uploads_route)
            .field("max_attachment_size", &self.max_attachment_size)
            .field("max_attachments", &self.max_attachments)
            .field("object_storage", &self.object_storage)
            .field("cors_origin", &self.cors_origin)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("instance_name", &self.instance_name)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("UPLOADS_DIR") {
            config.uploads_dir = PathBuf::from(path);
        }

        if let Ok(route) = std::env::var("PUBLIC_BASE_PATH") {
            match normalize_route(&route) {
                Some(route) => config.uploads_route = route,
                None => tracing::warn!(value = %route, "Invalid PUBLIC_BASE_PATH, using default"),
            }
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENT_SIZE") {
            match parse_positive(&val) {
                Some(n) => config.max_attachment_size = n,
                None => tracing::warn!(value = %val, "Invalid MAX_ATTACHMENT_SIZE, using default"),
            }
        }

        if let Ok(val) = std::env::var("MAX_ATTACHMENTS") {
            match parse_positive(&val) {
                Some(n) => config.max_attachments = n,
                None => tracing::warn!(value = %val, "Invalid MAX_ATTACHMENTS, using default"),
            }
        }

        if let Some(upload_url) = non_empty_var("OBJECT_STORAGE_URL") {
            config.object_storage = Some(ObjectStorageConfig {
                upload_url,
                upload_preset: non_empty_var("OBJECT_STORAGE_PRESET"),
                folder: non_empty_var("OBJECT_STORAGE_FOLDER")
                    .unwrap_or_else(|| "convo/attachments".to_string()),
            });
        }

        config.cors_origin = non_empty_var("CORS_ORIGIN");
        config.admin_token = non_empty_var("ADMIN_TOKEN");

        if let Some(name) = non_empty_var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }

    /// Upper bound on a whole send request body.
    pub fn max_request_body(&self) -> usize {
        self.max_attachment_size
            .saturating_mul(self.max_attachments)
            .saturating_add(1024 * 1024)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// `uploads/` -> `/uploads`; rejects empty and root-only routes.
fn normalize_route(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed.contains("..") {
        return None;
    }
    Some(format!("/{trimmed}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 5000).into());
        assert_eq!(config.max_attachments, 10);
        assert_eq!(config.max_attachment_size, 20 * 1024 * 1024);
        assert!(config.object_storage.is_none());
    }

    #[test]
    fn test_debug_redacts_admin_token() {
        let config = ServerConfig {
            admin_token: Some("hunter2-token".to_string()),
            ..ServerConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("hunter2-token"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("instance_name"));
    }

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive(" 42 "), Some(42));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-3"), None);
    }

    #[test]
    fn test_normalize_route() {
        assert_eq!(normalize_route("uploads/").as_deref(), Some("/uploads"));
        assert_eq!(normalize_route("/static/files").as_deref(), Some("/static/files"));
        assert_eq!(normalize_route("/"), None);
        assert_eq!(normalize_route("../etc"), None);
    }

    #[test]
    fn test_body_limit_covers_all_attachments() {
        let config = ServerConfig::default();
        assert!(config.max_request_body() > config.max_attachment_size * config.max_attachments);
    }
}
