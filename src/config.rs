use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChronicleConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    /// K: the maximum number of articles retained per (user, topic).
    pub capacity: usize,
    /// Deadline for a whole populate/merge operation, commit included.
    pub store_timeout_ms: u64,
    /// Re-snapshot attempts after a lost commit race before giving up.
    pub max_retries: u32,
    /// Candidate pools larger than this are logged as a scaling hazard.
    pub pool_warn_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            history: HistoryConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7341,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_chronicle_dir()
            .join("history.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 25,
            store_timeout_ms: 5000,
            max_retries: 3,
            pool_warn_size: 400,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        // nomic-embed-text
        Self { dimension: 768 }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl HistoryConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Returns `~/.chronicle/`, falling back to the working directory when no
/// home directory can be resolved.
pub fn default_chronicle_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chronicle")
}

/// Returns the default config file path: `~/.chronicle/config.toml`
pub fn default_config_path() -> PathBuf {
    default_chronicle_dir().join("config.toml")
}

impl ChronicleConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ChronicleConfig::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (CHRONICLE_DB, CHRONICLE_LOG_LEVEL, CHRONICLE_HISTORY_CAPACITY).
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("CHRONICLE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("CHRONICLE_HISTORY_CAPACITY") {
            self.history.capacity = val
                .parse()
                .with_context(|| format!("CHRONICLE_HISTORY_CAPACITY is not a number: {val}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.history.capacity == 0 {
            bail!("history.capacity must be at least 1");
        }
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be at least 1");
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ChronicleConfig::default();
        assert_eq!(config.server.transport, "stdio");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.history.capacity, 25);
        assert_eq!(config.embedding.dimension, 768);
        assert!(config.storage.db_path.ends_with("history.db"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[history]
capacity = 10
"#;
        let config: ChronicleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.history.capacity, 10);
        // defaults still apply for unset fields
        assert_eq!(config.history.max_retries, 3);
        assert_eq!(config.storage.busy_timeout_ms, 5000);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = ChronicleConfig::default();
        config.history.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ChronicleConfig::default();
        std::env::set_var("CHRONICLE_DB", "/tmp/override.db");
        std::env::set_var("CHRONICLE_LOG_LEVEL", "trace");
        std::env::set_var("CHRONICLE_HISTORY_CAPACITY", "7");

        config.apply_env_overrides().unwrap();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.history.capacity, 7);

        // Clean up
        std::env::remove_var("CHRONICLE_DB");
        std::env::remove_var("CHRONICLE_LOG_LEVEL");
        std::env::remove_var("CHRONICLE_HISTORY_CAPACITY");
    }
}
