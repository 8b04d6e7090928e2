//! # Sync Configuration
//!
//! Where the mirror lives, how to reach the remote store, and how eagerly
//! to reconnect.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DUKA_REMOTE_URL=https://xyz.supabase.co                            │
//! │     DUKA_API_KEY=...        DUKA_SYNC_MODE=offline                     │
//! │     DUKA_MIRROR_PATH=...    DUKA_REQUEST_TIMEOUT_MS=8000               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/duka-pos/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.duka.pos/sync.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SyncMode::Auto, mirror.db in the platform data dir                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [mirror]
//! path = "/var/lib/duka/mirror.db"
//! max_connections = 5
//!
//! [remote]
//! url = "https://xyz.supabase.co"
//! api_key = "public-anon-key"
//! health_path = "auth/v1/health"
//! request_timeout_ms = 8000
//! probe_timeout_ms = 2000
//! probe_ttl_ms = 3000
//!
//! [sync]
//! mode = "auto"  # auto | offline
//! reconnect_poll_secs = 15
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use duka_db::DbConfig;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Mode
// =============================================================================

/// Whether the device talks to the remote store at all.
///
/// ## Mode Selection
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  AUTO (Default)                                                        │
/// │  • Every operation asks the connectivity probe                         │
/// │  • Reconciles on sign-in, reconnect and manual refresh                 │
/// │                                                                         │
/// │  OFFLINE                                                               │
/// │  • The probe always answers "offline"                                  │
/// │  • Every write lands in the mirror as pending                          │
/// │  • Use for training tills and demos                                    │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    Auto,
    Offline,
}

impl SyncMode {
    pub fn is_sync_enabled(&self) -> bool {
        !matches!(self, SyncMode::Offline)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Auto => write!(f, "auto"),
            SyncMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "online" => Ok(SyncMode::Auto),
            "offline" | "disabled" => Ok(SyncMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Mirror Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorSettings {
    /// Mirror file. Defaults to `mirror.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for MirrorSettings {
    fn default() -> Self {
        MirrorSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// How to reach the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: Option<String>,

    /// Public API key sent as the `apikey` header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Path probed by the connectivity check, relative to `url`.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Upper bound for any remote call (milliseconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Upper bound for the connectivity probe (milliseconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// How long a probe answer is reused (milliseconds).
    #[serde(default = "default_probe_ttl")]
    pub probe_ttl_ms: u64,
}

fn default_health_path() -> String {
    "auth/v1/health".to_string()
}
fn default_request_timeout() -> u64 {
    8_000
}
fn default_probe_timeout() -> u64 {
    2_000
}
fn default_probe_ttl() -> u64 {
    3_000
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            url: None,
            api_key: None,
            health_path: default_health_path(),
            request_timeout_ms: default_request_timeout(),
            probe_timeout_ms: default_probe_timeout(),
            probe_ttl_ms: default_probe_ttl(),
        }
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_ttl(&self) -> Duration {
        Duration::from_millis(self.probe_ttl_ms)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: SyncMode,

    /// How often the agent checks whether an offline device came back.
    #[serde(default = "default_reconnect_poll")]
    pub reconnect_poll_secs: u64,
}

fn default_reconnect_poll() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: SyncMode::default(),
            reconnect_poll_secs: default_reconnect_poll(),
        }
    }
}

impl SyncSettings {
    pub fn reconnect_poll(&self) -> Duration {
        Duration::from_secs(self.reconnect_poll_secs)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration of the sync layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mirror: MirrorSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(ref url) = self.remote.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    url
                )));
            }
            url::Url::parse(url)?;
        }

        if self.remote.request_timeout_ms == 0 || self.remote.probe_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "remote timeouts must be greater than 0".into(),
            ));
        }

        if self.mirror.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "mirror.max_connections must be greater than 0".into(),
            ));
        }

        if self.sync.reconnect_poll_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.reconnect_poll_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `DUKA_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DUKA_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
        }

        if let Some(key) = lookup("DUKA_API_KEY") {
            self.remote.api_key = Some(key);
        }

        if let Some(mode) = lookup("DUKA_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(path) = lookup("DUKA_MIRROR_PATH") {
            self.mirror.path = Some(PathBuf::from(path));
        }

        if let Some(timeout) = lookup("DUKA_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.remote.request_timeout_ms = ms;
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "duka", "pos")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn mode(&self) -> SyncMode {
        self.sync.mode
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.mode.is_sync_enabled()
    }

    /// Mirror file location: configured path, else the platform data dir.
    pub fn mirror_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.mirror.path {
            return Ok(path.clone());
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("mirror.db"))
            .ok_or_else(|| SyncError::InvalidConfig("no data directory for the mirror".into()))
    }

    /// Mirror store configuration derived from `[mirror]`.
    pub fn db_config(&self) -> SyncResult<DbConfig> {
        let path = self.mirror_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(DbConfig::new(path).max_connections(self.mirror.max_connections))
    }
}
