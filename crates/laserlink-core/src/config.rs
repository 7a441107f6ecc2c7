//! Relay configuration.
//!
//! Loaded from TOML with every field defaulted, then overridden from the
//! environment. Priority: explicit path, `laserlink.toml` in the working
//! directory, built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "laserlink.toml";

/// Default values.
pub mod defaults {
    pub const BIND: &str = "0.0.0.0:8080";
    pub const DATA_DIR: &str = "data";
    pub const DEFAULT_WAIT_SECS: u64 = 25;
    pub const MIN_WAIT_SECS: u64 = 5;
    pub const MAX_WAIT_SECS: u64 = 60;
    pub const FETCH_LIMIT: usize = 200;
    pub const TAIL_CACHE_SIZE: usize = 500;
    pub const OFF_STEP_SECS: u64 = 20;
    pub const OFF_SCENE: &str = "1";
    pub const TICK_SECS: u64 = 60;
    pub const TIMEZONE: &str = "UTC";
}

/// Environment variable names.
pub mod env_vars {
    pub const BIND: &str = "LASERLINK_BIND";
    pub const DB_PATH: &str = "LASERLINK_DB_PATH";
    pub const AUTH_TOKEN: &str = "LASERLINK_AUTH_TOKEN";
    /// Legacy name still honoured when the prefixed one is absent.
    pub const LEGACY_AUTH_TOKEN: &str = "AUTH_TOKEN";
    /// Port only; keeps the host part of `bind`.
    pub const PORT: &str = "PORT";
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Socket address the HTTP server binds to.
    pub bind: String,
    /// Directory holding the redb database files.
    pub data_dir: PathBuf,
    /// Bearer token for admin routes. `None` leaves them open.
    pub auth_token: Option<String>,
    pub poll: PollConfig,
    pub macros: MacroConfig,
    pub schedule: ScheduleConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND.to_string(),
            data_dir: PathBuf::from(defaults::DATA_DIR),
            auth_token: None,
            poll: PollConfig::default(),
            macros: MacroConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

/// Long-poll tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub default_wait_secs: u64,
    pub min_wait_secs: u64,
    pub max_wait_secs: u64,
    /// Row cap for the log fallback query.
    pub fetch_limit: usize,
    /// Events kept in memory per device.
    pub tail_cache_size: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_wait_secs: defaults::DEFAULT_WAIT_SECS,
            min_wait_secs: defaults::MIN_WAIT_SECS,
            max_wait_secs: defaults::MAX_WAIT_SECS,
            fetch_limit: defaults::FETCH_LIMIT,
            tail_cache_size: defaults::TAIL_CACHE_SIZE,
        }
    }
}

impl PollConfig {
    /// Resolve a requested wait (seconds) into the bounded wait budget.
    pub fn clamp_wait(&self, requested: Option<u64>) -> Duration {
        let secs = requested
            .unwrap_or(self.default_wait_secs)
            .clamp(self.min_wait_secs, self.max_wait_secs);
        Duration::from_secs(secs)
    }
}

/// OFF macro tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    /// Spacing between OFF macro steps.
    pub off_step_secs: u64,
    /// Scene argument used by the first OFF step.
    pub off_scene: String,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            off_step_secs: defaults::OFF_STEP_SECS,
            off_scene: defaults::OFF_SCENE.to_string(),
        }
    }
}

/// Schedule engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub tick_secs: u64,
    /// IANA timezone name used for time-of-day.
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: defaults::TICK_SECS,
            timezone: defaults::TIMEZONE.to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| Error::Config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

impl RelayConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load from `path`, or `laserlink.toml` when present, or defaults; then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::info!(path = %path.display(), "Loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = non_empty(env_vars::BIND) {
            self.bind = bind;
        }
        if let Some(port) = non_empty(env_vars::PORT) {
            match port.trim().parse::<u16>() {
                Ok(port) => {
                    let host = self
                        .bind
                        .rsplit_once(':')
                        .map(|(host, _)| host.to_string())
                        .unwrap_or_else(|| self.bind.clone());
                    self.bind = format!("{}:{}", host, port);
                }
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid PORT"),
            }
        }
        if let Some(dir) = non_empty(env_vars::DB_PATH) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(token) =
            non_empty(env_vars::AUTH_TOKEN).or_else(|| non_empty(env_vars::LEGACY_AUTH_TOKEN))
        {
            self.auth_token = Some(token);
        }
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        let poll = &self.poll;
        if poll.min_wait_secs == 0 {
            return Err(Error::Config("poll.min_wait_secs must be positive".into()));
        }
        if poll.min_wait_secs > poll.max_wait_secs {
            return Err(Error::Config(format!(
                "poll.min_wait_secs ({}) exceeds poll.max_wait_secs ({})",
                poll.min_wait_secs, poll.max_wait_secs
            )));
        }
        if poll.fetch_limit == 0 || poll.tail_cache_size == 0 {
            return Err(Error::Config(
                "poll.fetch_limit and poll.tail_cache_size must be positive".into(),
            ));
        }
        if self.macros.off_step_secs == 0 {
            return Err(Error::Config("macros.off_step_secs must be positive".into()));
        }
        if self.macros.off_scene.trim().is_empty() {
            return Err(Error::Config("macros.off_scene must not be empty".into()));
        }
        if self.schedule.tick_secs == 0 {
            return Err(Error::Config("schedule.tick_secs must be positive".into()));
        }
        self.schedule.tz()?;
        Ok(())
    }

    /// Database file for the event log.
    pub fn events_db_path(&self) -> PathBuf {
        self.data_dir.join("events.redb")
    }

    /// Database file for schedule rules.
    pub fn schedules_db_path(&self) -> PathBuf {
        self.data_dir.join("schedules.redb")
    }

    /// Normalized admin token; blank counts as unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.poll.tail_cache_size, 500);
        assert_eq!(config.admin_token(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config = RelayConfig::from_toml_str(
            r#"
            auth_token = "secret"
            [poll]
            max_wait_secs = 30
            [schedule]
            timezone = "Europe/Berlin"
            "#,
        )
        .unwrap();
        assert_eq!(config.admin_token(), Some("secret"));
        assert_eq!(config.poll.max_wait_secs, 30);
        assert_eq!(config.poll.min_wait_secs, 5);
        assert_eq!(config.schedule.tz().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_clamp_wait() {
        let poll = PollConfig::default();
        assert_eq!(poll.clamp_wait(None), Duration::from_secs(25));
        assert_eq!(poll.clamp_wait(Some(1)), Duration::from_secs(5));
        assert_eq!(poll.clamp_wait(Some(600)), Duration::from_secs(60));
        assert_eq!(poll.clamp_wait(Some(42)), Duration::from_secs(42));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("LASERLINK_DB_PATH", "/var/lib/laserlink"),
            ("AUTH_TOKEN", "legacy"),
        ]
        .into_iter()
        .collect();
        let mut config = RelayConfig::default();
        config.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/laserlink"));
        assert_eq!(config.admin_token(), Some("legacy"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RelayConfig::default();
        config.poll.min_wait_secs = 70;
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.schedule.timezone = "Mars/Olympus".into();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = RelayConfig::default();
        config.macros.off_step_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "bind = \"127.0.0.1:7000\"\n[macros]\noff_step_secs = 5\n").unwrap();
        let config = RelayConfig::load(Some(&path)).unwrap();
        assert_eq!(config.macros.off_step_secs, 5);
        assert!(RelayConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
