use std::{env, fmt, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::engine::Policy;
use crate::limits::{DEFAULT_HORIZON_MONTHS, MAX_HORIZON_MONTHS};

const PREFIX: &str = "VILLABOOK_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: String, value: String, reason: String },
    FailOpenInProduction,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => write!(f, "invalid {key}={value:?}: {reason}"),
            ConfigError::FailOpenInProduction => write!(
                f,
                "{PREFIX}FAIL_OPEN_ON_STORE_ERROR cannot be enabled when {PREFIX}ENVIRONMENT is production"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub default_horizon_months: u32,
    pub fail_open_on_store_error: bool,
    pub environment: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Keys are passed without the prefix.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(&format!("{PREFIX}{key}"));

        let config = Self {
            bind: load(&get, "BIND", "0.0.0.0")?,
            port: load(&get, "PORT", "8080")?,
            data_dir: PathBuf::from(load::<String>(&get, "DATA_DIR", "./data")?),
            metrics_port: load_optional(&get, "METRICS_PORT")?,
            compact_threshold: load(&get, "COMPACT_THRESHOLD", "1000")?,
            default_horizon_months: load(&get, "DEFAULT_HORIZON_MONTHS", &DEFAULT_HORIZON_MONTHS.to_string())?,
            fail_open_on_store_error: load_bool(&get, "FAIL_OPEN_ON_STORE_ERROR")?,
            environment: load::<String>(&get, "ENVIRONMENT", "production")?.to_ascii_lowercase(),
        };

        if !(1..=MAX_HORIZON_MONTHS).contains(&config.default_horizon_months) {
            return Err(ConfigError::Invalid {
                key: format!("{PREFIX}DEFAULT_HORIZON_MONTHS"),
                value: config.default_horizon_months.to_string(),
                reason: format!("must be between 1 and {MAX_HORIZON_MONTHS}"),
            });
        }
        if config.fail_open_on_store_error {
            if config.is_production() {
                return Err(ConfigError::FailOpenInProduction);
            }
            warn!(
                "conflict checks will report availability when the store is unreachable ({} environment)",
                config.environment
            );
        }
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("reservations.wal")
    }

    pub fn policy(&self) -> Policy {
        Policy {
            fail_open_on_store_error: self.fail_open_on_store_error,
            default_horizon_months: self.default_horizon_months,
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> ConfigError {
    warn!("Invalid {PREFIX}{key} value: {reason}");
    ConfigError::Invalid {
        key: format!("{PREFIX}{key}"),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn load<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    let raw = get(key).unwrap_or_else(|| {
        info!("{PREFIX}{key} not set, using default: {default}");
        default.to_string()
    });
    raw.trim().parse().map_err(|e| invalid(key, &raw, e))
}

fn load_optional<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e| invalid(key, &raw, e)),
        _ => Ok(None),
    }
}

fn load_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, &raw, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr(), "0.0.0.0:8080");
        assert_eq!(c.data_dir, PathBuf::from("./data"));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.policy(), Policy::default());
        assert!(c.is_production());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("PORT", "9000"),
            ("BIND", "127.0.0.1"),
            ("METRICS_PORT", "9100"),
            ("DEFAULT_HORIZON_MONTHS", "6"),
            ("DATA_DIR", "/var/lib/villabook"),
        ])
        .unwrap();
        assert_eq!(c.addr(), "127.0.0.1:9000");
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.policy().default_horizon_months, 6);
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/villabook/reservations.wal"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("DEFAULT_HORIZON_MONTHS", "0")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("DEFAULT_HORIZON_MONTHS", "25")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(
            config(&[("FAIL_OPEN_ON_STORE_ERROR", "maybe")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn fail_open_refused_in_production() {
        assert_eq!(
            config(&[("FAIL_OPEN_ON_STORE_ERROR", "true")]),
            Err(ConfigError::FailOpenInProduction)
        );
        let c = config(&[("FAIL_OPEN_ON_STORE_ERROR", "true"), ("ENVIRONMENT", "Staging")]).unwrap();
        assert!(c.policy().fail_open_on_store_error);
        assert_eq!(c.environment, "staging");
    }
}
