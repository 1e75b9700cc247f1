//! Server configuration loaded from environment variables.
//!
//! All knobs use the `PARLEY_` prefix. Only the bootstrap admin password is
//! required; everything else has a default suitable for local development.

use std::collections::HashMap;
use std::time::Duration;

use common::secret::{ExposeSecret, SecretString};
use thiserror::Error;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:7450";
const DEFAULT_MAX_CONNECTIONS: usize = 100;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_CHAT_HISTORY_LIMIT: usize = 50;
const DEFAULT_ADMIN_LOGIN: &str = "admin";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Runtime configuration for the server.
#[derive(Clone)]
pub struct Config {
    /// Address the TCP listener binds to.
    pub bind_address: String,
    /// Cap on concurrently served connections.
    pub max_connections: usize,
    /// A connection that sends nothing for this long is dropped.
    pub idle_timeout: Duration,
    /// How many recent chat messages a joining participant receives.
    pub chat_history_limit: usize,
    /// Bcrypt cost factor used when hashing passwords.
    pub bcrypt_cost: u32,
    /// Login of the bootstrap admin account created on first start.
    pub admin_login: String,
    /// Password of the bootstrap admin account.
    pub admin_password: SecretString,
}

// Manual Debug so the admin password never lands in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("max_connections", &self.max_connections)
            .field("idle_timeout", &self.idle_timeout)
            .field("chat_history_limit", &self.chat_history_limit)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("admin_login", &self.admin_login)
            .field("admin_password", &"[REDACTED]")
            .finish()
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map. Used by tests.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("PARLEY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let max_connections = parse_var(vars, "PARLEY_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PARLEY_MAX_CONNECTIONS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let idle_timeout_secs =
            parse_var(vars, "PARLEY_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS)?;

        let chat_history_limit =
            parse_var(vars, "PARLEY_CHAT_HISTORY_LIMIT", DEFAULT_CHAT_HISTORY_LIMIT)?;

        let bcrypt_cost = parse_var(vars, "PARLEY_BCRYPT_COST", bcrypt::DEFAULT_COST)?;
        if !(4..=16).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                name: "PARLEY_BCRYPT_COST",
                reason: format!("{bcrypt_cost} is outside the supported range 4..=16"),
            });
        }

        let admin_login = vars
            .get("PARLEY_ADMIN_LOGIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ADMIN_LOGIN.to_string());

        let admin_password = vars
            .get("PARLEY_ADMIN_PASSWORD")
            .map(|s| SecretString::from(s.clone()))
            .ok_or(ConfigError::MissingEnvVar("PARLEY_ADMIN_PASSWORD"))?;
        if admin_password.expose_secret().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "PARLEY_ADMIN_PASSWORD",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(Config {
            bind_address,
            max_connections,
            idle_timeout: Duration::from_secs(idle_timeout_secs),
            chat_history_limit,
            bcrypt_cost,
            admin_login,
            admin_password,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match vars.get(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert(
            "PARLEY_ADMIN_PASSWORD".to_string(),
            "bootstrap-secret".to_string(),
        );
        vars
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_vars(&base_vars()).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:7450");
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.chat_history_limit, 50);
        assert_eq!(config.admin_login, "admin");
    }

    #[test]
    fn test_missing_admin_password_rejected() {
        let err = Config::from_vars(&HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("PARLEY_ADMIN_PASSWORD")));
    }

    #[test]
    fn test_empty_admin_password_rejected() {
        let mut vars = HashMap::new();
        vars.insert("PARLEY_ADMIN_PASSWORD".to_string(), String::new());
        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "PARLEY_ADMIN_PASSWORD", .. }
        ));
    }

    #[test]
    fn test_bcrypt_cost_range_enforced() {
        let mut vars = base_vars();
        vars.insert("PARLEY_BCRYPT_COST".to_string(), "20".to_string());
        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PARLEY_BCRYPT_COST", .. }));

        vars.insert("PARLEY_BCRYPT_COST".to_string(), "4".to_string());
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.bcrypt_cost, 4);
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let mut vars = base_vars();
        vars.insert("PARLEY_MAX_CONNECTIONS".to_string(), "0".to_string());
        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "PARLEY_MAX_CONNECTIONS", .. }
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("bootstrap-secret"));
    }
}
