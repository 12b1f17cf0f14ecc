//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use risknexus_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_ROLE_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `None` selects the in-memory role repository.
    pub database_url: Option<String>,
    pub role_cache_ttl: Duration,
    /// `None` disables the background sweeper.
    pub cache_sweep_interval: Option<Duration>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("role_cache_ttl", &self.role_cache_ttl)
            .field("cache_sweep_interval", &self.cache_sweep_interval)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", e.to_string()))?;

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string());

        let role_cache_ttl = match get("ROLE_CACHE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("ROLE_CACHE_TTL_SECS", &raw)?),
            None => DEFAULT_ROLE_CACHE_TTL,
        };

        let cache_sweep_interval = match get("CACHE_SWEEP_INTERVAL_SECS") {
            Some(raw) => match parse_secs("CACHE_SWEEP_INTERVAL_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => Some(DEFAULT_CACHE_SWEEP_INTERVAL),
        };

        let log_format = match get("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::invalid("LOG_FORMAT", e.to_string()))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            role_cache_ttl,
            cache_sweep_interval,
            log_format,
        })
    }
}

impl AppConfig {
    /// Whether `JWT_SECRET` was left unset and the insecure dev default is in use.
    pub fn uses_dev_jwt_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_secs(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(var, format!("expected whole seconds, got '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse::<SocketAddr>().unwrap());
        assert!(cfg.uses_dev_jwt_secret());
        assert_eq!(cfg.database_url, None);
        assert_eq!(cfg.role_cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.cache_sweep_interval, Some(Duration::from_secs(60)));
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn values_are_read() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("DATABASE_URL", "postgres://localhost/risknexus"),
            ("ROLE_CACHE_TTL_SECS", "30"),
            ("CACHE_SWEEP_INTERVAL_SECS", "0"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/risknexus"));
        assert_eq!(cfg.role_cache_ttl, Duration::from_secs(30));
        assert_eq!(cfg.cache_sweep_interval, None);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config(&[("ROLE_CACHE_TTL_SECS", "five")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ROLE_CACHE_TTL_SECS", .. }));

        let err = config(&[("LOG_FORMAT", "xml")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "LOG_FORMAT", .. }));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = config(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert!(!format!("{cfg:?}").contains("s3cret"));
    }
}
