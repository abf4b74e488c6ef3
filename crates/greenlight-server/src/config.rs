use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Secrets that ship in sample `.env` files and must never reach production.
const PLACEHOLDER_SECRETS: [&str; 2] = ["dev-secret-change-me", "change-me"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is a placeholder; generate a real secret")]
    Placeholder { var: &'static str },

    #[error("{var}='{value}' is not a valid {expected}")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// `None` disables the in-process sweep loop.
    pub reminder_interval: Option<Duration>,
    pub service_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = "GREENLIGHT_JWT_SECRET";
        let jwt_secret = get(var).filter(|s| !s.is_empty()).ok_or(ConfigError::Missing(var))?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::Placeholder { var });
        }

        let interval_secs: u64 = parse_or(&get, "GREENLIGHT_REMINDER_INTERVAL_SECS", 300, "number of seconds")?;

        Ok(Self {
            host: get("GREENLIGHT_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "GREENLIGHT_PORT", 3000, "port")?,
            db_path: PathBuf::from(get("GREENLIGHT_DB_PATH").unwrap_or_else(|| "greenlight.db".into())),
            jwt_secret,
            token_ttl_days: parse_or(&get, "GREENLIGHT_TOKEN_TTL_DAYS", 30, "number of days")?,
            reminder_interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            service_token: get("GREENLIGHT_SERVICE_TOKEN").filter(|s| !s.is_empty()),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            var: "GREENLIGHT_HOST",
            value: self.host.clone(),
            expected: "bind address",
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            value,
            expected,
        }),
    }
}
