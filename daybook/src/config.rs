//! Configuration management for the Daybook server
//!
//! Default config location: ./daybook.toml (override with `--config`)

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub cors: CorsConfig,
    /// Upper bound for any request body, archives included.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            cors: CorsConfig::default(),
            max_body_size: 100 << 20,
        }
    }
}

/// Web front-end dev servers allowed by default.
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
    "http://127.0.0.1:3000",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// The refresh cookie needs credentialed requests, so listing "*"
    /// turns credentials off.
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: DEV_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Where the database and uploaded blobs live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: home.join(".daybook"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. Override with DAYBOOK_JWT_ACCESS_SECRET.
    #[serde(default = "default_access_secret")]
    pub access_secret: String,
    /// HMAC secret for refresh tokens. Override with DAYBOOK_JWT_REFRESH_SECRET.
    #[serde(default = "default_refresh_secret")]
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: i64,
    #[serde(default = "default_max_failed_login")]
    pub max_failed_login: u32,
    #[serde(default = "default_lock_minutes")]
    pub lock_minutes: i64,
    /// Login attempts per minute per client IP (0 disables the limit)
    #[serde(default = "default_login_per_minute")]
    pub login_per_minute: u32,
    /// Refresh calls per minute per client IP (0 disables the limit)
    #[serde(default = "default_refresh_per_minute")]
    pub refresh_per_minute: u32,
    /// Argon2 memory cost in KiB
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    /// Mark auth cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_access_secret() -> String {
    "change-me-access-secret-change-me-access-secret".to_string()
}

fn default_refresh_secret() -> String {
    "change-me-refresh-secret-change-me-refresh-secret".to_string()
}

fn default_access_ttl() -> i64 {
    15 * 60
}

fn default_refresh_ttl() -> i64 {
    14 * 24 * 60 * 60
}

fn default_max_failed_login() -> u32 {
    5
}

fn default_lock_minutes() -> i64 {
    15
}

fn default_login_per_minute() -> u32 {
    20
}

fn default_refresh_per_minute() -> u32 {
    30
}

fn default_argon2_memory_kib() -> u32 {
    19 * 1024
}

fn default_argon2_iterations() -> u32 {
    2
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: default_access_secret(),
            refresh_secret: default_refresh_secret(),
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            max_failed_login: default_max_failed_login(),
            lock_minutes: default_lock_minutes(),
            login_per_minute: default_login_per_minute(),
            refresh_per_minute: default_refresh_per_minute(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            secure_cookies: false,
        }
    }
}

/// Seed account created (or repaired) on startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_true")]
    pub seed_enabled: bool,
    #[serde(default = "default_seed_email")]
    pub seed_email: String,
    /// Override with DAYBOOK_ADMIN_PASSWORD
    #[serde(default = "default_seed_password")]
    pub seed_password: String,
    #[serde(default = "default_seed_nickname")]
    pub seed_nickname: String,
}

fn default_seed_email() -> String {
    "admin@example.com".to_string()
}

fn default_seed_password() -> String {
    "Admin1234!".to_string()
}

fn default_seed_nickname() -> String {
    "admin".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            seed_enabled: true,
            seed_email: default_seed_email(),
            seed_password: default_seed_password(),
            seed_nickname: default_seed_nickname(),
        }
    }
}

/// Bounds applied while unpacking uploaded archives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MigrationConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
}

fn default_max_depth() -> usize {
    4
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_entry_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_total_bytes() -> u64 {
    512 * 1024 * 1024
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_entries: default_max_entries(),
            max_entry_bytes: default_max_entry_bytes(),
            max_total_bytes: default_max_total_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,daybook=debug".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            config
        };
        config.expand_paths()?;
        config.apply_env();
        Ok(config)
    }

    /// Config rooted at a directory, with defaults everywhere else.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.data_dir = data_dir.into();
        config
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.storage.data_dir = expand_tilde(&self.storage.data_dir)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("DAYBOOK_JWT_ACCESS_SECRET") {
            self.auth.access_secret = secret;
        }
        if let Ok(secret) = std::env::var("DAYBOOK_JWT_REFRESH_SECRET") {
            self.auth.refresh_secret = secret;
        }
        if let Ok(password) = std::env::var("DAYBOOK_ADMIN_PASSWORD") {
            self.admin.seed_password = password;
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.storage.data_dir)?;
        fs::create_dir_all(self.uploads_dir())?;
        Ok(())
    }

    /// Path to the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join("daybook.db")
    }

    /// Directory holding uploaded file blobs
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage.data_dir.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.auth.max_failed_login, 5);
        assert_eq!(config.auth.lock_minutes, 15);
        assert_eq!(config.auth.refresh_ttl_secs, 14 * 24 * 60 * 60);
        assert_eq!(config.migration.max_depth, 4);
        assert!(config.observability.metrics_enabled);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            bind_addr = "0.0.0.0:9000"

            [migration]
            max_entries = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.server.max_body_size, 100 * 1024 * 1024);
        assert_eq!(config.migration.max_entries, 10);
        assert_eq!(config.migration.max_depth, 4);
        assert_eq!(config.admin.seed_email, "admin@example.com");
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf/daybook.toml");

        let config = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");

        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded.auth.access_ttl_secs, config.auth.access_ttl_secs);
    }

    #[test]
    fn test_paths() {
        let config = Config::with_data_dir("/tmp/daybook-test");
        assert_eq!(config.database_path(), PathBuf::from("/tmp/daybook-test/daybook.db"));
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/daybook-test/uploads"));
    }

    #[test]
    fn test_expand_tilde_passthrough() {
        let p = Path::new("/var/lib/daybook");
        assert_eq!(expand_tilde(p).unwrap(), p.to_path_buf());
    }
}
