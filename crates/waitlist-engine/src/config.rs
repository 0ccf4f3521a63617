//! # Engine Configuration
//!
//! Configuration for the lifecycle tracker and notification dispatcher.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     WAITLIST_DB_PATH=/var/lib/waitlist/waitlist.db                     │
//! │     WAITLIST_LOCK_TIMEOUT_MS=2000                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/waitlist/waitlist.toml (Linux)                           │
//! │     ~/Library/Application Support/com.waitlist.waitlist/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # waitlist.toml
//! [database]
//! path = "/var/lib/waitlist/waitlist.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [locking]
//! lock_timeout_ms = 2000
//! busy_retry_ms = 5000
//!
//! [notifications]
//! poll_interval_secs = 5
//! max_attempts = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use waitlist_db::DbConfig;

use crate::error::{EngineError, EngineResult};

pub const ENV_DB_PATH: &str = "WAITLIST_DB_PATH";
pub const ENV_LOCK_TIMEOUT_MS: &str = "WAITLIST_LOCK_TIMEOUT_MS";
pub const ENV_BUSY_RETRY_MS: &str = "WAITLIST_BUSY_RETRY_MS";
pub const ENV_NOTIFY_POLL_SECS: &str = "WAITLIST_NOTIFY_POLL_SECS";
pub const ENV_NOTIFY_MAX_ATTEMPTS: &str = "WAITLIST_NOTIFY_MAX_ATTEMPTS";

// =============================================================================
// Database Settings
// =============================================================================

/// Where and how to open the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. `None` uses the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long SQLite itself waits on a locked database (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}
fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Locking Settings
// =============================================================================

/// Per-queue lock behaviour.
///
/// ## Busy Handling
/// ```text
/// acquire(queue) ── waits ≤ lock_timeout_ms ──► Busy
///      ▲                                          │
///      └──── backoff (initial → max) ◄────────────┘
///                 until busy_retry_ms has elapsed, then Busy is returned
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingSettings {
    /// Longest single wait for a queue lock (milliseconds).
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Total time spent retrying a busy operation (milliseconds). 0 disables retry.
    #[serde(default = "default_busy_retry")]
    pub busy_retry_ms: u64,

    /// First backoff between retries (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_lock_timeout() -> u64 {
    2_000
}
fn default_busy_retry() -> u64 {
    5_000
}
fn default_initial_backoff() -> u64 {
    25
}
fn default_max_backoff() -> u64 {
    500
}

impl Default for LockingSettings {
    fn default() -> Self {
        LockingSettings {
            lock_timeout_ms: default_lock_timeout(),
            busy_retry_ms: default_busy_retry(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl LockingSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn busy_retry(&self) -> Duration {
        Duration::from_millis(self.busy_retry_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

/// Outbox dispatcher behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Interval between outbox poll cycles (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Rows handled per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Attempts before a row is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (seconds). Doubles per attempt.
    #[serde(default = "default_initial_retry")]
    pub initial_retry_secs: u64,

    /// Retry delay ceiling (seconds).
    #[serde(default = "default_max_retry")]
    pub max_retry_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_retry() -> u64 {
    5
}
fn default_max_retry() -> u64 {
    300
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_retry_secs: default_initial_retry(),
            max_retry_secs: default_max_retry(),
        }
    }
}

impl NotificationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay before retrying a row that has failed `attempts` times.
    ///
    /// ```text
    /// attempts: 1    2     3     4     ...
    /// delay:    5s   10s   20s   40s   ... capped at max_retry_secs
    /// ```
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(32);
        let secs = self
            .initial_retry_secs
            .saturating_mul(1u64 << exponent)
            .min(self.max_retry_secs);
        Duration::from_secs(secs)
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub locking: LockingSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (waitlist.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
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
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.locking.lock_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "locking.lock_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.locking.initial_backoff_ms > self.locking.max_backoff_ms {
            return Err(EngineError::InvalidConfig(
                "locking.initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        if self.notifications.poll_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "notifications.poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.notifications.batch_size == 0 || self.notifications.max_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "notifications.batch_size and max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from `lookup` (the process environment in [`load`](Self::load)).
    ///
    /// Unparsable numbers are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(ms) = parse_override(&lookup, ENV_LOCK_TIMEOUT_MS) {
            self.locking.lock_timeout_ms = ms;
        }

        if let Some(ms) = parse_override(&lookup, ENV_BUSY_RETRY_MS) {
            self.locking.busy_retry_ms = ms;
        }

        if let Some(secs) = parse_override(&lookup, ENV_NOTIFY_POLL_SECS) {
            self.notifications.poll_interval_secs = secs;
        }

        if let Some(attempts) = parse_override(&lookup, ENV_NOTIFY_MAX_ATTEMPTS) {
            self.notifications.max_attempts = attempts;
        }
    }

    /// Database settings as a pool configuration.
    pub fn db_config(&self) -> EngineResult<DbConfig> {
        let path = self
            .database
            .path
            .clone()
            .or_else(Self::default_database_path)
            .ok_or_else(|| EngineError::InvalidConfig("No database path available".into()))?;

        Ok(DbConfig::new(path)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms)))
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "waitlist", "waitlist")
            .map(|dirs| dirs.config_dir().join("waitlist.toml"))
    }

    /// Returns the default database file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "waitlist", "waitlist")
            .map(|dirs| dirs.data_dir().join("waitlist.db"))
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            debug!(key, value = %raw, "Overriding from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.locking.lock_timeout_ms, 2_000);
        assert_eq!(config.notifications.max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        config.locking.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.locking.initial_backoff_ms = 1_000;
        config.locking.max_backoff_ms = 10;
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.notifications.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/tmp/override.db"),
            (ENV_LOCK_TIMEOUT_MS, "750"),
            (ENV_BUSY_RETRY_MS, "not-a-number"),
            (ENV_NOTIFY_MAX_ATTEMPTS, " 9 "),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/override.db")));
        assert_eq!(config.locking.lock_timeout_ms, 750);
        assert_eq!(config.locking.busy_retry_ms, 5_000);
        assert_eq!(config.notifications.max_attempts, 9);
        assert_eq!(config.notifications.poll_interval_secs, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waitlist.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            path = "/srv/waitlist.db"

            [notifications]
            poll_interval_secs = 2
            "#,
        )
        .unwrap();

        let mut config: EngineConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        config.apply_overrides(|_| None);

        assert_eq!(config.notifications.poll_interval_secs, 2);
        assert_eq!(config.notifications.batch_size, 50);
        assert_eq!(config.locking.lock_timeout_ms, 2_000);

        let db = config.db_config().unwrap();
        assert_eq!(db.database_path, PathBuf::from("/srv/waitlist.db"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("waitlist.toml");

        let mut config = EngineConfig::default();
        config.locking.lock_timeout_ms = 1_234;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[locking]"));
        let loaded: EngineConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.locking.lock_timeout_ms, 1_234);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let settings = NotificationSettings::default();
        assert_eq!(settings.retry_delay(1), Duration::from_secs(5));
        assert_eq!(settings.retry_delay(2), Duration::from_secs(10));
        assert_eq!(settings.retry_delay(4), Duration::from_secs(40));
        assert_eq!(settings.retry_delay(20), Duration::from_secs(300));
        assert_eq!(settings.retry_delay(u32::MAX), Duration::from_secs(300));
    }
}
