use std::{env, fmt, net::SocketAddr, time::Duration};

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
    Other(String),
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" => Self::Development,
            "production" => Self::Production,
            "test" => Self::Test,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub environment: Environment,
    pub bind_addr: String,
    pub port: u16,
    pub log_level: String,
    pub debug_enabled: bool,
    #[serde(rename = "call_timeout_ms", serialize_with = "serialize_timeout")]
    pub call_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("DEBUG must be one of true, false, 1, 0, yes, no, on, off")]
    InvalidDebugFlag,
    #[error("TOOL_CALL_TIMEOUT_MS must be a positive integer")]
    InvalidTimeout,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let environment = read("APP_ENV")
            .map(|value| Environment::parse(&value))
            .unwrap_or(Environment::Development);
        let bind_addr = read("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = read("PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(3000);
        let log_level = read("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        // An explicit DEBUG wins over the environment default.
        let debug_enabled = read("DEBUG")
            .map(|value| parse_flag(&value).ok_or(ConfigError::InvalidDebugFlag))
            .transpose()?
            .unwrap_or(environment == Environment::Development);

        let call_timeout = read("TOOL_CALL_TIMEOUT_MS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|millis| *millis > 0)
                    .map(Duration::from_millis)
                    .ok_or(ConfigError::InvalidTimeout)
            })
            .transpose()?;

        let config = Self {
            environment,
            bind_addr,
            port,
            log_level,
            debug_enabled,
            call_timeout,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn serialize_timeout<S: Serializer>(
    timeout: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match timeout {
        Some(timeout) => serializer.serialize_some(&(timeout.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = config_from(&[]).expect("config should parse");

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.debug_enabled);
        assert!(config.is_development());
        assert_eq!(config.call_timeout, None);
    }

    #[test]
    fn explicit_debug_flag_wins_in_development() {
        let config = config_from(&[("DEBUG", "false")]).expect("config should parse");
        assert!(config.is_development());
        assert!(!config.debug_enabled);
    }

    #[test]
    fn production_disables_debug_unless_requested() {
        let config = config_from(&[("APP_ENV", "production")]).expect("config should parse");
        assert!(config.is_production());
        assert!(!config.debug_enabled);

        let config = config_from(&[("APP_ENV", "Production"), ("DEBUG", "on")])
            .expect("config should parse");
        assert!(config.debug_enabled);
    }

    #[test]
    fn unknown_environment_is_kept_verbatim() {
        let config = config_from(&[("APP_ENV", "staging")]).expect("config should parse");
        assert_eq!(config.environment, Environment::Other("staging".to_string()));
        assert!(!config.debug_enabled);
    }

    #[test]
    fn invalid_values_fail() {
        assert!(matches!(
            config_from(&[("PORT", "70000")]),
            Err(ConfigError::InvalidPort)
        ));
        assert!(matches!(
            config_from(&[("DEBUG", "maybe")]),
            Err(ConfigError::InvalidDebugFlag)
        ));
        assert!(matches!(
            config_from(&[("TOOL_CALL_TIMEOUT_MS", "0")]),
            Err(ConfigError::InvalidTimeout)
        ));
        assert!(matches!(
            config_from(&[("BIND_ADDR", "not an address")]),
            Err(ConfigError::InvalidSocket)
        ));
    }

    #[test]
    fn serializes_for_startup_logging() {
        let config = config_from(&[("APP_ENV", "test"), ("TOOL_CALL_TIMEOUT_MS", "1500")])
            .expect("config should parse");
        let value = serde_json::to_value(&config).expect("serializable");

        assert_eq!(value["environment"], "test");
        assert_eq!(value["port"], 3000);
        assert_eq!(value["call_timeout_ms"], 1500);
    }
}
