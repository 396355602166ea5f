use chrono_tz::Tz;
use thiserror::Error;

use patrimoine_core::utils::time_utils::DEFAULT_LEDGER_TZ;

const DEFAULT_DB_PATH: &str = "./data/patrimoine.db";
const DEFAULT_SCHEDULER_HOUR: u32 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("PATRIMOINE_TIMEZONE '{0}' is not a known timezone")]
    InvalidTimezone(String),

    #[error("PATRIMOINE_SCHEDULER_HOUR must be an hour between 0 and 23, got '{0}'")]
    InvalidSchedulerHour(String),

    #[error("PATRIMOINE_LOG_FORMAT must be 'text' or 'json', got '{0}'")]
    InvalidLogFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    /// Raw key material; credential storage is disabled when absent.
    pub secret_key: Option<String>,
    pub timezone: Tz,
    pub scheduler_hour: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_path = var("PATRIMOINE_DB_PATH")
            .or_else(|| var("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_DB_PATH.into());

        let timezone = match var("PATRIMOINE_TIMEZONE") {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(raw))?,
            None => DEFAULT_LEDGER_TZ,
        };

        let scheduler_hour = match var("PATRIMOINE_SCHEDULER_HOUR") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|h| *h < 24)
                .ok_or(ConfigError::InvalidSchedulerHour(raw))?,
            None => DEFAULT_SCHEDULER_HOUR,
        };

        let log_format = match var("PATRIMOINE_LOG_FORMAT") {
            Some(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(raw) if raw.eq_ignore_ascii_case("text") => LogFormat::Text,
            Some(raw) => return Err(ConfigError::InvalidLogFormat(raw)),
            None => LogFormat::Text,
        };

        Ok(Self {
            db_path,
            secret_key: var("PATRIMOINE_SECRET_KEY"),
            timezone,
            scheduler_hour,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_with(&[]).unwrap();
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.secret_key, None);
        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
        assert_eq!(config.scheduler_hour, 2);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn explicit_db_path_wins_over_database_url() {
        let config = config_with(&[
            ("DATABASE_URL", "/tmp/url.db"),
            ("PATRIMOINE_DB_PATH", "/tmp/explicit.db"),
        ])
        .unwrap();
        assert_eq!(config.db_path, "/tmp/explicit.db");

        let config = config_with(&[("DATABASE_URL", "/tmp/url.db")]).unwrap();
        assert_eq!(config.db_path, "/tmp/url.db");
    }

    #[test]
    fn values_are_parsed() {
        let config = config_with(&[
            ("PATRIMOINE_TIMEZONE", "America/New_York"),
            ("PATRIMOINE_SCHEDULER_HOUR", "23"),
            ("PATRIMOINE_LOG_FORMAT", "JSON"),
            ("PATRIMOINE_SECRET_KEY", "  key  "),
        ])
        .unwrap();
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.scheduler_hour, 23);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.secret_key.as_deref(), Some("key"));
    }

    #[test]
    fn blank_secret_key_counts_as_absent() {
        let config = config_with(&[("PATRIMOINE_SECRET_KEY", "   ")]).unwrap();
        assert_eq!(config.secret_key, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            config_with(&[("PATRIMOINE_TIMEZONE", "Mars/Olympus")]).unwrap_err(),
            ConfigError::InvalidTimezone("Mars/Olympus".into())
        );
        assert_eq!(
            config_with(&[("PATRIMOINE_SCHEDULER_HOUR", "24")]).unwrap_err(),
            ConfigError::InvalidSchedulerHour("24".into())
        );
        assert_eq!(
            config_with(&[("PATRIMOINE_SCHEDULER_HOUR", "two")]).unwrap_err(),
            ConfigError::InvalidSchedulerHour("two".into())
        );
        assert_eq!(
            config_with(&[("PATRIMOINE_LOG_FORMAT", "xml")]).unwrap_err(),
            ConfigError::InvalidLogFormat("xml".into())
        );
    }
}
