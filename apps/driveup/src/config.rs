//! Uploader configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/driveup/driveup.toml`
//! - Windows: `%APPDATA%/driveup/driveup.toml`
//!
//! `DRIVEUP_CONFIG` points at another file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use driveup_protocol::constants::{
    CHUNK_GRANULARITY, DEFAULT_FILES_ENDPOINT, DEFAULT_TOKEN_ENDPOINT, DEFAULT_UPLOAD_ENDPOINT,
};
use driveup_transfer::DEFAULT_CHUNK_SIZE;
use driveup_uploader::{ContainerRef, EngineConfig, HttpTransportConfig, RetryConfig};
use serde::{Deserialize, Serialize};

/// Uploader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Bytes per chunk; a multiple of `chunk_granularity`.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_chunk_granularity")]
    pub chunk_granularity: u64,

    /// Consecutive failed requests tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Upper bound for one request, chunk body included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_upload_endpoint")]
    pub upload_endpoint: String,

    #[serde(default = "default_files_endpoint")]
    pub files_endpoint: String,

    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// Destination folder id. Takes precedence over `folder_name`.
    #[serde(default)]
    pub folder_id: String,

    /// Destination folder name, looked up case-insensitively.
    #[serde(default)]
    pub folder_name: String,

    /// Where checkpoints go (platform config dir by default).
    #[serde(default)]
    pub checkpoint_dir: String,

    /// Disables checkpointing entirely.
    #[serde(default)]
    pub disable_checkpoints: bool,

    #[serde(default)]
    pub credentials: Credentials,
}

/// Either a fixed access token or an OAuth2 refresh-token triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_granularity() -> u64 {
    CHUNK_GRANULARITY
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_upload_endpoint() -> String {
    DEFAULT_UPLOAD_ENDPOINT.into()
}

fn default_files_endpoint() -> String {
    DEFAULT_FILES_ENDPOINT.into()
}

fn default_token_endpoint() -> String {
    DEFAULT_TOKEN_ENDPOINT.into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_granularity: default_chunk_granularity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            upload_endpoint: default_upload_endpoint(),
            files_endpoint: default_files_endpoint(),
            token_endpoint: default_token_endpoint(),
            folder_id: String::new(),
            folder_name: String::new(),
            checkpoint_dir: String::new(),
            disable_checkpoints: false,
            credentials: Credentials::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    /// Loads `path`, writing a default configuration there if it is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix: the file may hold tokens.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_size: self.chunk_size,
            chunk_granularity: self.chunk_granularity,
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.initial_backoff_ms),
                max_delay: Duration::from_millis(self.max_backoff_ms),
                ..RetryConfig::default()
            },
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Destination container: explicit id, then name, then the drive root.
    pub fn destination(&self) -> ContainerRef {
        if !self.folder_id.is_empty() {
            ContainerRef::Id(self.folder_id.clone())
        } else if !self.folder_name.is_empty() {
            ContainerRef::Named(self.folder_name.clone())
        } else {
            ContainerRef::Id("root".into())
        }
    }

    /// Checkpoint directory, or `None` when checkpointing is off.
    pub fn checkpoint_dir(&self) -> Option<PathBuf> {
        if self.disable_checkpoints {
            return None;
        }
        if self.checkpoint_dir.is_empty() {
            driveup_transfer::default_checkpoint_dir()
        } else {
            Some(PathBuf::from(&self.checkpoint_dir))
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("DRIVEUP_CONFIG")
        && !path.is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("driveup").join("driveup.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("driveup")
            .join("driveup.toml"))
    }
}
