//! Configuration management for the server and client commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for storing data
    pub data_dir: PathBuf,

    /// Path to the SQLite database
    pub db_path: PathBuf,

    /// Path to the config directory
    pub config_dir: PathBuf,

    /// Host the API server binds to (and the client connects to)
    pub host: String,

    /// HTTP port for the API server
    pub http_port: u16,

    /// Secret used to sign bearer tokens
    pub jwt_secret: String,

    /// Token lifetime in hours
    pub token_ttl_hours: i64,

    /// How long a client-side notification stays on screen, in seconds
    pub notification_ttl_secs: u64,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("blogcast");
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("blogcast");

        Self {
            db_path: data_dir.join("blog.db"),
            data_dir,
            config_dir,
            host: "127.0.0.1".to_string(),
            http_port: 3000,
            jwt_secret: "dev-secret-change-me".to_string(),
            token_ttl_hours: 24,
            notification_ttl_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        dirs::config_dir()
            .unwrap_or_else(|| home.join(".config"))
            .join("blogcast")
            .join("config.json")
    }

    /// Load configuration from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Ensure all directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.config_dir)?;
        Ok(())
    }

    /// Base URL of the API server this config points at.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.http_port)
    }

    /// WebSocket URL of the publish-notification stream.
    pub fn subscribe_url(&self) -> String {
        format!("ws://{}:{}/api/posts/subscribe", self.host, self.http_port)
    }
}
