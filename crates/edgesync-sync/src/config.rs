//! # Sync Configuration
//!
//! Configuration management for the sync engine and the agent.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     EDGESYNC_REMOTE_URL=https://master.example.com/api/sync            │
//! │     EDGESYNC_SYNC_DIR=/var/lib/edgesync/sync                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/edgesync/edgesync.toml (Linux)                           │
//! │     ~/Library/Application Support/com.edgesync.agent/... (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     25s timeout, 2025-07-07 epoch, 15 minute schedule                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # edgesync.toml
//! [remote]
//! base_url = "https://master.example.com/api/sync"
//! timeout_secs = 25
//! send_since = true
//!
//! [watermark]
//! directory = "/var/lib/edgesync/sync"
//! default_epoch = "2025-07-07 00:00:00"
//!
//! [catalog]
//! denylist = ["PasswordReset", "Server"]
//!
//! [[catalog.entities]]
//! model = "Order"
//! table = "orders"
//!
//! [[catalog.entities]]
//! model = "AuditLog"
//! table = "audit_logs"
//! pull = false
//!
//! [schedule]
//! interval_secs = 900
//!
//! [server]
//! enabled = true
//! port = 8765
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use edgesync_core::{CoreError, EntityDefinition, EntityRegistry, Timestamp};

use crate::error::{SyncError, SyncResult};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "EDGESYNC_";

// =============================================================================
// Remote Settings
// =============================================================================

/// How to reach the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the master's sync API. `{base}/pull/{entity}` and
    /// `{base}/push/{entity}` are appended to it.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Send `?since=<watermark>` on pulls.
    #[serde(default = "default_true")]
    pub send_since: bool,
}

fn default_timeout() -> u64 {
    25
}

fn default_true() -> bool {
    true
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: None,
            timeout_secs: default_timeout(),
            send_since: true,
        }
    }
}

// =============================================================================
// Watermark Settings
// =============================================================================

/// Where per-entity progress is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkSettings {
    /// Sync-data directory. Defaults to `<data dir>/sync`.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Watermark of an entity that has never been synchronized.
    #[serde(default = "Timestamp::default_epoch")]
    pub default_epoch: Timestamp,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        WatermarkSettings {
            directory: None,
            default_epoch: Timestamp::default_epoch(),
        }
    }
}

// =============================================================================
// Catalog Settings
// =============================================================================

/// Declared entities and the names that must never sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Model or table names excluded from discovery.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,

    /// Entity registry, in sync order.
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

/// Credentials, OAuth tokens, pivot tables and per-node settings stay local.
fn default_denylist() -> Vec<String> {
    [
        "PasswordReset",
        "OauthAccessToken",
        "OauthRefreshToken",
        "role_user",
        "sms_gateway",
        "Server",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        CatalogSettings {
            denylist: default_denylist(),
            entities: Vec::new(),
        }
    }
}

// =============================================================================
// Probe Settings
// =============================================================================

/// Connectivity probe targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Hosts tried in order; the first successful connect wins.
    #[serde(default = "default_probe_hosts")]
    pub hosts: Vec<String>,

    #[serde(default = "default_probe_port")]
    pub port: u16,

    /// Connect timeout per host (milliseconds).
    #[serde(default = "default_probe_timeout")]
    pub timeout_ms: u64,
}

fn default_probe_hosts() -> Vec<String> {
    vec![
        "www.google.com".to_string(),
        "www.cloudflare.com".to_string(),
        "www.amazon.com".to_string(),
    ]
}

fn default_probe_port() -> u16 {
    80
}

fn default_probe_timeout() -> u64 {
    1000
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            hosts: default_probe_hosts(),
            port: default_probe_port(),
            timeout_ms: default_probe_timeout(),
        }
    }
}

// =============================================================================
// Schedule Settings
// =============================================================================

/// Periodic cycle settings for `edgesync-agent run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between cycle starts.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    900
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            enabled: true,
            interval_secs: default_interval(),
        }
    }
}

// =============================================================================
// Peer Server Settings
// =============================================================================

/// Local HTTP API exposing sync operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Bind address (default: loopback only).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8765
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            enabled: false,
            bind_addr: default_bind_addr(),
            port: default_server_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// The host application's SQLite database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `<data dir>/edgesync.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

/// Log output of the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// When false the sync engine's own events are filtered out.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            enabled: true,
            filter: None,
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub watermark: WatermarkSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl SyncConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (edgesync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
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
        if let Some(ref base) = self.remote.base_url {
            let url = Url::parse(base)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {}",
                    base
                )));
            }
            if url.cannot_be_a_base() {
                return Err(SyncError::InvalidUrl(format!("Not a base URL: {}", base)));
            }
        }

        if self.remote.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "remote.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.probe.hosts.is_empty() {
            return Err(SyncError::InvalidConfig(
                "probe.hosts must list at least one host".into(),
            ));
        }

        if self.probe.timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "probe.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.schedule.enabled && self.schedule.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "schedule.interval_secs must be greater than 0".into(),
            ));
        }

        // Individual definitions are checked at discovery; duplicates would
        // make two catalog entries share one watermark file.
        let mut seen = std::collections::HashSet::new();
        for definition in &self.catalog.entities {
            if !seen.insert(definition.table.as_str()) {
                return Err(CoreError::DuplicateEntity(definition.table.clone()).into());
            }
        }

        Ok(())
    }

    /// Applies `EDGESYNC_*` overrides read through `lookup`.
    ///
    /// ## Recognized Variables
    /// | Variable | Field |
    /// |----------|-------|
    /// | `EDGESYNC_REMOTE_URL` | `remote.base_url` |
    /// | `EDGESYNC_TIMEOUT_SECS` | `remote.timeout_secs` |
    /// | `EDGESYNC_SYNC_DIR` | `watermark.directory` |
    /// | `EDGESYNC_DATABASE` | `database.path` |
    /// | `EDGESYNC_SCHEDULE_INTERVAL` | `schedule.interval_secs` |
    /// | `EDGESYNC_SERVER_PORT` | `server.port` (also enables the server) |
    /// | `EDGESYNC_LOGGING` | `logging.enabled` |
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(url) = var("REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = Some(url);
        }

        if let Some(timeout) = var("TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(t) => self.remote.timeout_secs = t,
                Err(_) => warn!(value = %timeout, "Ignoring non-numeric EDGESYNC_TIMEOUT_SECS"),
            }
        }

        if let Some(dir) = var("SYNC_DIR") {
            debug!(dir = %dir, "Overriding sync directory from environment");
            self.watermark.directory = Some(PathBuf::from(dir));
        }

        if let Some(path) = var("DATABASE") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(interval) = var("SCHEDULE_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(i) => self.schedule.interval_secs = i,
                Err(_) => warn!(value = %interval, "Ignoring non-numeric EDGESYNC_SCHEDULE_INTERVAL"),
            }
        }

        if let Some(port) = var("SERVER_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding peer server port from environment");
                self.server.port = p;
                self.server.enabled = true;
            }
        }

        if let Some(flag) = var("LOGGING") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.logging.enabled = true,
                "0" | "false" | "off" | "no" => self.logging.enabled = false,
                _ => warn!(value = %flag, "Unknown EDGESYNC_LOGGING value"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "edgesync", "agent")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("edgesync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Builds the entity registry from `[[catalog.entities]]`.
    pub fn registry(&self) -> EntityRegistry {
        EntityRegistry::from(self.catalog.entities.clone())
    }

    /// Directory holding `{entity}_last_sync.dat` files and `sync.lock`.
    pub fn sync_dir(&self) -> PathBuf {
        self.watermark.directory.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("sync"))
                .unwrap_or_else(|| PathBuf::from("sync"))
        })
    }

    /// Path of the host application's database.
    pub fn database_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("edgesync.db"))
                .unwrap_or_else(|| PathBuf::from("edgesync.db"))
        })
    }

    /// Per-request timeout for remote calls.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    /// Returns the remote base URL, failing when none is configured.
    pub fn base_url(&self) -> SyncResult<Url> {
        let base = self.remote.base_url.as_deref().ok_or_else(|| {
            SyncError::InvalidConfig(
                "remote.base_url is not set (or set EDGESYNC_REMOTE_URL)".into(),
            )
        })?;
        Ok(Url::parse(base)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.remote.timeout_secs, 25);
        assert!(config.remote.send_since);
        assert_eq!(config.watermark.default_epoch.to_string(), "2025-07-07 00:00:00");
        assert_eq!(config.schedule.interval_secs, 900);
        assert_eq!(config.probe.port, 80);
        assert!(config.catalog.denylist.contains(&"Server".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.remote.base_url = Some("ftp://master".to_string());
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidUrl(_))
        ));

        config.remote.base_url = Some("https://master.example.com/api/sync".to_string());
        assert!(config.validate().is_ok());

        config.remote.timeout_secs = 0;
        assert!(config.validate().is_err());
        config.remote.timeout_secs = 25;

        config.probe.hosts.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_entities_rejected() {
        let mut config = SyncConfig::default();
        config.catalog.entities = vec![
            EntityDefinition::new("Order", "orders"),
            EntityDefinition::new("LegacyOrder", "orders"),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_shape() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            base_url = "http://master.local/api/sync"
            timeout_secs = 10

            [watermark]
            default_epoch = "2024-01-01 00:00:00"

            [[catalog.entities]]
            model = "Order"
            table = "orders"

            [[catalog.entities]]
            model = "AuditLog"
            table = "audit_logs"
            pull = false
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.timeout_secs, 10);
        assert!(config.remote.send_since);
        assert_eq!(config.watermark.default_epoch.to_string(), "2024-01-01 00:00:00");
        assert_eq!(config.registry().len(), 2);
        assert!(!config.registry().get("audit_logs").unwrap().pull);
        // Unspecified sections keep their defaults
        assert_eq!(config.probe.hosts.len(), 3);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("EDGESYNC_REMOTE_URL", "http://10.0.0.5/api/sync"),
            ("EDGESYNC_SYNC_DIR", "/tmp/edgesync-sync"),
            ("EDGESYNC_SERVER_PORT", "9000"),
            ("EDGESYNC_LOGGING", "off"),
            ("EDGESYNC_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = SyncConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.remote.base_url.as_deref(), Some("http://10.0.0.5/api/sync"));
        assert_eq!(config.sync_dir(), PathBuf::from("/tmp/edgesync-sync"));
        assert!(config.server.enabled);
        assert_eq!(config.server.bind_address(), "127.0.0.1:9000");
        assert!(!config.logging.enabled);
        assert_eq!(config.remote.timeout_secs, 25);
    }

    #[test]
    fn test_base_url_required_for_remote_calls() {
        let config = SyncConfig::default();
        assert!(matches!(
            config.base_url(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("edgesync.toml");

        let mut config = SyncConfig::default();
        config.remote.base_url = Some("http://master.local/api/sync".to_string());
        config.catalog.entities = vec![EntityDefinition::new("Order", "orders")];
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[remote]"));
        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.catalog.entities, config.catalog.entities);
    }
}
