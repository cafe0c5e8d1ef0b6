use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::paths::UnitKind;
use crate::upload::FailurePolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Catalog layout: which unit terminology this deployment uses and where titles live
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub unit_kind: UnitKind,
    #[serde(default = "default_root_collection")]
    pub root_collection: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            unit_kind: UnitKind::default(),
            root_collection: default_root_collection(),
        }
    }
}

/// Object store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Firebase,
    Local,
    Memory,
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Firebase Storage bucket, e.g. `my-app.firebasestorage.app`
    #[serde(default)]
    pub bucket: Option<String>,
    /// Env var holding an OAuth bearer token for Firebase Storage (optional)
    #[serde(default)]
    pub access_token_env: Option<String>,
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

/// Document database backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentsBackend {
    Firestore,
    Sqlite,
    Memory,
}

/// Document database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    pub backend: DocumentsBackend,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Env var holding the Firebase web API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Env var holding an OAuth bearer token for Firestore (optional)
    #[serde(default)]
    pub access_token_env: Option<String>,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

/// Upload coordinator configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_http_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_authless")]
    pub authless: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            api_key_env: default_http_api_key_env(),
            allowed_origins: default_allowed_origins(),
            authless: default_authless(),
        }
    }
}

fn default_authless() -> bool {
    false
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_api_key_env() -> String {
    "COMICDESK_API_KEY".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_root_collection() -> String {
    "comics".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8080/media".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./catalog.db")
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in COMICDESK_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("COMICDESK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&config_str)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn parse(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).context("Failed to parse config.toml")
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.catalog.root_collection.trim().is_empty() || self.catalog.root_collection.contains('/') {
            anyhow::bail!("catalog.root_collection must be a single non-empty collection name");
        }

        match self.storage.backend {
            StorageBackend::Firebase => {
                if self.storage.bucket.as_deref().map_or(true, |b| b.trim().is_empty()) {
                    anyhow::bail!("storage.bucket is required for the firebase storage backend");
                }
            }
            StorageBackend::Local => {
                url::Url::parse(&self.storage.public_base_url).with_context(|| {
                    format!("storage.public_base_url is not a valid URL: {}", self.storage.public_base_url)
                })?;
            }
            StorageBackend::Memory => {}
        }
        check_env(self.storage.access_token_env.as_deref())?;

        if self.documents.backend == DocumentsBackend::Firestore {
            if self.documents.project_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
                anyhow::bail!("documents.project_id is required for the firestore backend");
            }
            check_env(self.documents.api_key_env.as_deref())?;
            check_env(self.documents.access_token_env.as_deref())?;
        }

        Ok(())
    }

    /// Get the SQLite document store path
    pub fn db_path(&self) -> &Path {
        &self.documents.db_path
    }

    /// Get the local object store root
    pub fn local_root(&self) -> &Path {
        &self.storage.local_root
    }
}

/// Credentials are named in config but always supplied through the environment.
fn check_env(var: Option<&str>) -> Result<()> {
    if let Some(name) = var {
        std::env::var(name).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                name
            )
        })?;
    }
    Ok(())
}

/// Read an optional credential named in config
pub fn credential(var: Option<&str>) -> Option<String> {
    var.and_then(|name| std::env::var(name).ok())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const LOCAL_CONFIG: &str = r#"
[dashboard]
log_level = "debug"

[catalog]
unit_kind = "chapter"

[storage]
backend = "local"
local_root = "./storage"

[documents]
backend = "sqlite"
db_path = "./test.db"

[upload]
failure_policy = "partial"
"#;

    fn with_config_env(config_path: &Path, f: impl FnOnce()) {
        let original = std::env::var("COMICDESK_CONFIG").ok();
        std::env::set_var("COMICDESK_CONFIG", config_path.to_str().unwrap());
        f();
        std::env::remove_var("COMICDESK_CONFIG");
        if let Some(val) = original {
            std::env::set_var("COMICDESK_CONFIG", val);
        }
    }

    #[test]
    fn test_config_parse_defaults() {
        let config = Config::parse(
            r#"
[storage]
backend = "memory"

[documents]
backend = "memory"
"#,
        )
        .unwrap();
        assert_eq!(config.dashboard.log_level, "info");
        assert_eq!(config.catalog.unit_kind, UnitKind::Episode);
        assert_eq!(config.catalog.root_collection, "comics");
        assert_eq!(config.upload.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.http_server.port, 8080);
        assert!(!config.http_server.authless);
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, LOCAL_CONFIG).unwrap();
        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.dashboard.log_level, "debug");
            assert_eq!(config.catalog.unit_kind, UnitKind::Chapter);
            assert_eq!(config.upload.failure_policy, FailurePolicy::Partial);
            assert_eq!(config.storage.backend, StorageBackend::Local);
        });
    }

    #[test]
    fn test_firebase_requires_bucket() {
        let config = Config::parse(
            r#"
[storage]
backend = "firebase"

[documents]
backend = "memory"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));
    }

    #[test]
    fn test_firestore_missing_api_key_env() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        std::env::remove_var("COMICDESK_TEST_MISSING_KEY");
        let config = Config::parse(
            r#"
[storage]
backend = "memory"

[documents]
backend = "firestore"
project_id = "katha-test"
api_key_env = "COMICDESK_TEST_MISSING_KEY"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("COMICDESK_TEST_MISSING_KEY"));
    }

    #[test]
    fn test_root_collection_must_be_single_segment() {
        let config = Config::parse(
            r#"
[catalog]
root_collection = "comics/nested"

[storage]
backend = "memory"

[documents]
backend = "memory"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("COMICDESK_CONFIG").ok();
        std::env::set_var("COMICDESK_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("COMICDESK_CONFIG");
        if let Some(v) = original {
            std::env::set_var("COMICDESK_CONFIG", v);
        }
    }
}
