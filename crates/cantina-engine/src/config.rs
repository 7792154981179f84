//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CANTINA_DB_PATH=/var/lib/cantina/cantina.db                        │
//! │     CANTINA_UTC_OFFSET_MINUTES=-360                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/cantina-pos/engine.toml (Linux)                          │
//! │     ~/Library/Application Support/com.cantina.pos/engine.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/cantina/cantina.db"
//! max_connections = 5
//!
//! [inventory]
//! low_stock_threshold = 5
//!
//! [business]
//! utc_offset_minutes = -360  # Guatemala, no DST
//!
//! [notifications]
//! capacity = 1024
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};

/// Offsets beyond these are not real time zones.
const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Created on first connect.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "cantina", "pos")
        .map(|dirs| dirs.data_dir().join("cantina.db"))
        .unwrap_or_else(|| PathBuf::from("./cantina.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Inventory Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySettings {
    /// Base products at or below this level show up in the low-stock list.
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
}

fn default_low_stock_threshold() -> i64 {
    cantina_core::DEFAULT_LOW_STOCK_THRESHOLD
}

impl Default for InventorySettings {
    fn default() -> Self {
        InventorySettings {
            low_stock_threshold: default_low_stock_threshold(),
        }
    }
}

// =============================================================================
// Business Settings
// =============================================================================

/// Where the restaurant's business day starts and ends.
///
/// ```text
///   business date 2024-03-01, offset -360
///   ───────────────────────────────────────────────
///   local   2024-03-01 00:00  ..  2024-03-02 00:00
///   UTC     2024-03-01 06:00  ..  2024-03-02 06:00
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessSettings {
    /// Fixed offset from UTC in minutes. The restaurant's zone has no DST.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset() -> i32 {
    -360
}

impl Default for BusinessSettings {
    fn default() -> Self {
        BusinessSettings {
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl BusinessSettings {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// The business date `instant` falls on.
    pub fn business_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset()).date_naive()
    }

    /// UTC range `[start, end)` covered by a business date.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let local_midnight = date.and_time(NaiveTime::MIN);
        let start = (local_midnight - Duration::minutes(i64::from(self.utc_offset_minutes))).and_utc();
        (start, start + Duration::days(1))
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Broadcast buffer size. Slow subscribers lag past this many events.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1024
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            capacity: default_capacity(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub inventory: InventorySettings,

    #[serde(default)]
    pub business: BusinessSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    ///
    /// An override that does not parse fails the load.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    fn load_with(config_path: Option<PathBuf>, env: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
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

        config.apply_overrides(env)?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.inventory.low_stock_threshold < 0 {
            return Err(ConfigError::InvalidConfig(
                "inventory.low_stock_threshold must not be negative".into(),
            ));
        }

        if !(MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&self.business.utc_offset_minutes) {
            return Err(ConfigError::InvalidConfig(format!(
                "business.utc_offset_minutes must be between {} and {}, got {}",
                MIN_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES, self.business.utc_offset_minutes
            )));
        }

        if self.notifications.capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "notifications.capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(path) = env("CANTINA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = parse_override(&env, "CANTINA_MAX_CONNECTIONS")? {
            self.database.max_connections = max;
        }

        if let Some(threshold) = parse_override(&env, "CANTINA_LOW_STOCK_THRESHOLD")? {
            self.inventory.low_stock_threshold = threshold;
        }

        if let Some(offset) = parse_override(&env, "CANTINA_UTC_OFFSET_MINUTES")? {
            debug!(offset, "Overriding business UTC offset from environment");
            self.business.utc_offset_minutes = offset;
        }

        if let Some(capacity) = parse_override(&env, "CANTINA_EVENT_CAPACITY")? {
            self.notifications.capacity = capacity;
        }

        Ok(())
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "cantina", "pos").map(|dirs| dirs.config_dir().join("engine.toml"))
    }
}

fn parse_override<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> ConfigResult<Option<T>> {
    env(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidConfig(format!("{key}: invalid value {value:?}")))
        })
        .transpose()
}
