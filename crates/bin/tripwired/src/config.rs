//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `tripwire.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;
use tripwire_domain::dependency::DependencyPath;
use tripwire_domain::schedule::{ScheduleSpec, ScheduleSpecError, Zone};
use tripwire_domain::watch::WatchOptions;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Calendar settings shared by every schedule.
    pub scheduler: SchedulerConfig,
    /// Event bus settings.
    pub events: EventsConfig,
    /// Simulated snapshot source.
    #[serde(rename = "virtual")]
    pub virtual_feed: VirtualConfig,
    /// Change watchers.
    pub watchers: Vec<WatcherConfig>,
    /// Fixed schedules.
    pub schedules: Vec<ScheduleConfig>,
    /// Schedules read from entity state.
    pub dynamic_schedules: Vec<DynamicScheduleConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `local`, `utc` or a fixed offset such as `+01:00`.
    pub timezone: Zone,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity.
    pub capacity: usize,
}

/// Longest accepted virtual tick: one hour.
pub const MAX_VIRTUAL_INTERVAL_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VirtualConfig {
    pub enabled: bool,
    /// Milliseconds between simulated snapshots.
    pub interval_ms: u64,
}

/// One `[[watchers]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherConfig {
    pub entity: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    /// Sustain duration (`for`) in milliseconds.
    #[serde(default)]
    pub for_ms: Option<u64>,
    #[serde(default)]
    pub call_on_startup: bool,
    /// Dependency paths; empty means `["state"]`.
    #[serde(default)]
    pub deps: Vec<DependencyPath>,
}

impl WatcherConfig {
    /// Translate into engine watch options.
    #[must_use]
    pub fn options(&self) -> WatchOptions {
        let mut options = WatchOptions::default().call_on_startup(self.call_on_startup);
        if let Some(from) = &self.from {
            options = options.from(from.clone());
        }
        if let Some(to) = &self.to {
            options = options.to(to.clone());
        }
        if let Some(ms) = self.for_ms {
            options = options.sustain(Duration::from_millis(ms));
        }
        if !self.deps.is_empty() {
            options = options.deps(self.deps.clone());
        }
        options
    }
}

/// One `[[schedules]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub name: String,
    /// Clock time, `Weekday@HH:MM`, ISO timestamp or cron expression.
    pub at: String,
}

/// One `[[dynamic_schedules]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamicScheduleConfig {
    pub name: String,
    pub entity: String,
    /// Path whose value is the schedule spec, e.g. `attributes.next_rising`.
    pub path: DependencyPath,
}

impl Config {
    /// Load configuration from `tripwire.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("tripwire.toml")?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = var("TRIPWIRE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("TRIPWIRE_TIMEZONE") {
            self.scheduler.timezone = val.parse().map_err(ConfigError::Timezone)?;
        }
        if let Some(val) = var("TRIPWIRE_VIRTUAL") {
            self.virtual_feed.enabled = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    /// Check semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.capacity == 0 {
            return Err(ConfigError::Validation(
                "events.capacity must be non-zero".to_string(),
            ));
        }
        if self.virtual_feed.enabled && self.virtual_feed.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "virtual.interval_ms must be non-zero".to_string(),
            ));
        }
        if self.virtual_feed.enabled && self.virtual_feed.interval_ms > MAX_VIRTUAL_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "virtual.interval_ms must be at most {MAX_VIRTUAL_INTERVAL_MS}"
            )));
        }
        for watcher in &self.watchers {
            if watcher.entity.is_empty() {
                return Err(ConfigError::Validation(
                    "watchers.entity must not be empty".to_string(),
                ));
            }
        }
        for schedule in &self.schedules {
            ScheduleSpec::parse(&schedule.at).map_err(|source| ConfigError::Schedule {
                name: schedule.name.clone(),
                source,
            })?;
        }
        for dynamic in &self.dynamic_schedules {
            if dynamic.entity.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "dynamic schedule {:?} has an empty entity",
                    dynamic.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "tripwired=info,tripwire_app=info".to_string(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for VirtualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1000,
        }
    }
}

impl VirtualConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Unparseable time zone override.
    #[error("invalid TRIPWIRE_TIMEZONE")]
    Timezone(#[source] ScheduleSpecError),
    /// A `[[schedules]]` entry with a malformed spec.
    #[error("invalid schedule {name:?}")]
    Schedule {
        name: String,
        #[source]
        source: ScheduleSpecError,
    },
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
