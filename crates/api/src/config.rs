//! Process configuration, read once at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use authgate_core::OrganizationId;
use authgate_infra::DEFAULT_PERMISSION_TTL;
use authgate_observability::LogFormat;

pub const JWT_SECRET_VAR: &str = "AUTHGATE_JWT_SECRET";
pub const BIND_ADDR_VAR: &str = "AUTHGATE_BIND_ADDR";
pub const IO_TIMEOUT_VAR: &str = "AUTHGATE_IO_TIMEOUT_MS";
pub const PERMISSION_CACHE_TTL_VAR: &str = "AUTHGATE_PERMISSION_CACHE_TTL_SECS";
pub const REDIS_URL_VAR: &str = "AUTHGATE_REDIS_URL";
pub const LOG_FORMAT_VAR: &str = "AUTHGATE_LOG_FORMAT";
pub const REPORTS_ORGANIZATION_VAR: &str = "AUTHGATE_REPORTS_ORGANIZATION_ID";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_IO_TIMEOUT_MS: u64 = 250;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No signing secret; the process must not start.
    #[error("`AUTHGATE_JWT_SECRET` must be set to a non-empty secret")]
    MissingSecret,

    #[error("invalid value for `{var}`: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// The API configuration.
#[derive(Clone)]
pub struct ApiConfig {
    /// HS256 signing secret. Never logged.
    pub jwt_secret: String,

    /// Address to open a TCP socket on.
    pub bind_addr: SocketAddr,

    /// Upper bound on each authorization step's cache/codec work.
    pub io_timeout: Duration,

    /// Lifetime of cached permission sets.
    pub permission_cache_ttl: Duration,

    /// Redis connection string; the in-memory cache is used when absent.
    pub redis_url: Option<String>,

    pub log_format: LogFormat,

    /// Organization scope of the demo reports route (global when `None`).
    pub reports_organization: Option<OrganizationId>,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("jwt_secret", &"<redacted>")
            .field("bind_addr", &self.bind_addr)
            .field("io_timeout", &self.io_timeout)
            .field("permission_cache_ttl", &self.permission_cache_ttl)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("log_format", &self.log_format)
            .field("reports_organization", &self.reports_organization)
            .finish()
    }
}

impl ApiConfig {
    /// Creates a new [ApiConfig] by parsing the relevant environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`ApiConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup(JWT_SECRET_VAR)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        let bind_addr = parse_var::<SocketAddr, _>(&lookup, BIND_ADDR_VAR)?
            .map_or_else(|| parse_value(BIND_ADDR_VAR, DEFAULT_BIND_ADDR), Ok)?;

        let io_timeout_ms: u64 =
            parse_var(&lookup, IO_TIMEOUT_VAR)?.unwrap_or(DEFAULT_IO_TIMEOUT_MS);
        if io_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: IO_TIMEOUT_VAR,
                reason: "must be greater than zero".to_string(),
            });
        }

        let permission_cache_ttl = parse_var::<u64, _>(&lookup, PERMISSION_CACHE_TTL_VAR)?
            .map_or(DEFAULT_PERMISSION_TTL, Duration::from_secs);
        if permission_cache_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: PERMISSION_CACHE_TTL_VAR,
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            jwt_secret,
            bind_addr,
            io_timeout: Duration::from_millis(io_timeout_ms),
            permission_cache_ttl,
            redis_url: lookup(REDIS_URL_VAR).filter(|s| !s.trim().is_empty()),
            log_format: parse_var::<LogFormat, _>(&lookup, LOG_FORMAT_VAR)?.unwrap_or_default(),
            reports_organization: parse_var(&lookup, REPORTS_ORGANIZATION_VAR)?,
        })
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => parse_value(var, raw.trim()).map(Some),
        _ => Ok(None),
    }
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse().map_err(|err: T::Err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let cfg = ApiConfig::from_lookup(lookup(&[(JWT_SECRET_VAR, "s3cret")])).unwrap();

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.io_timeout, Duration::from_millis(250));
        assert_eq!(cfg.permission_cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.redis_url, None);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.reports_organization, None);
    }

    #[test]
    fn missing_or_blank_secret_is_fatal() {
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingSecret
        );
        assert_eq!(
            ApiConfig::from_lookup(lookup(&[(JWT_SECRET_VAR, "  ")])).unwrap_err(),
            ConfigError::MissingSecret
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let org = OrganizationId::new();
        let org_str = org.to_string();
        let cfg = ApiConfig::from_lookup(lookup(&[
            (JWT_SECRET_VAR, "s3cret"),
            (BIND_ADDR_VAR, "127.0.0.1:9000"),
            (IO_TIMEOUT_VAR, "100"),
            (PERMISSION_CACHE_TTL_VAR, "60"),
            (LOG_FORMAT_VAR, "pretty"),
            (REPORTS_ORGANIZATION_VAR, org_str.as_str()),
        ]))
        .unwrap();

        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.io_timeout, Duration::from_millis(100));
        assert_eq!(cfg.permission_cache_ttl, Duration::from_secs(60));
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.reports_organization, Some(org));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ApiConfig::from_lookup(lookup(&[
            (JWT_SECRET_VAR, "s3cret"),
            (IO_TIMEOUT_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: IO_TIMEOUT_VAR, .. }));

        let err =
            ApiConfig::from_lookup(lookup(&[(JWT_SECRET_VAR, "s3cret"), (IO_TIMEOUT_VAR, "0")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: IO_TIMEOUT_VAR, .. }));
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = ApiConfig::from_lookup(lookup(&[(JWT_SECRET_VAR, "hunter2")])).unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
