//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::query::PagingConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 50059).
    pub port: u16,

    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Idle time before a pooled connection is closed (default: 600s).
    pub database_idle_timeout: Duration,

    /// Maximum lifetime of a pooled connection (default: 1800s).
    pub database_max_lifetime: Duration,

    /// Server-side timeout applied to every list statement (default: 10s).
    pub statement_timeout: Duration,

    /// Page size used when the client sends none (default: 50).
    pub default_page_size: u32,

    /// Largest page a client may request (default: 200).
    pub max_page_size: u32,

    /// How long table definitions stay cached (default: 300s).
    pub schema_cache_ttl: Duration,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of
    /// a variable when it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = parse_or(&lookup, "PORT", 50059u16)?;

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .context("DATABASE_URL environment variable is required")?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;
        let database_idle_timeout =
            Duration::from_secs(parse_or(&lookup, "DATABASE_IDLE_TIMEOUT_SECS", 600u64)?);
        let database_max_lifetime =
            Duration::from_secs(parse_or(&lookup, "DATABASE_MAX_LIFETIME_SECS", 1800u64)?);
        let statement_timeout =
            Duration::from_secs(parse_or(&lookup, "STATEMENT_TIMEOUT_SECS", 10u64)?);

        let default_page_size = parse_or(&lookup, "DEFAULT_PAGE_SIZE", 50u32)?;
        let max_page_size = parse_or(&lookup, "MAX_PAGE_SIZE", 200u32)?;
        if default_page_size == 0 || max_page_size == 0 {
            bail!("DEFAULT_PAGE_SIZE and MAX_PAGE_SIZE must be positive");
        }
        if default_page_size > max_page_size {
            bail!(
                "DEFAULT_PAGE_SIZE ({default_page_size}) must not exceed MAX_PAGE_SIZE ({max_page_size})"
            );
        }

        let schema_cache_ttl =
            Duration::from_secs(parse_or(&lookup, "SCHEMA_CACHE_TTL_SECS", 300u64)?);

        let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| vec!["*".to_string()]);

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            database_idle_timeout,
            database_max_lifetime,
            statement_timeout,
            default_page_size,
            max_page_size,
            schema_cache_ttl,
            cors_allowed_origins,
        })
    }

    /// Page-size policy for the list service.
    pub fn paging(&self) -> PagingConfig {
        PagingConfig {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/adempiere")]).unwrap();
        assert_eq!(config.port, 50059);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.database_idle_timeout, Duration::from_secs(600));
        assert_eq!(config.database_max_lifetime, Duration::from_secs(1800));
        assert_eq!(config.statement_timeout, Duration::from_secs(10));
        assert_eq!(config.paging(), PagingConfig::default());
        assert_eq!(config.schema_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cors_allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/erp"),
            ("PORT", "8080"),
            ("MAX_PAGE_SIZE", "500"),
            ("DEFAULT_PAGE_SIZE", "25"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.paging().max_page_size, 500);
        assert_eq!(config.paging().default_page_size, 25);
        assert_eq!(config.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn database_url_is_required() {
        assert!(load(&[]).is_err());
    }

    #[test]
    fn invalid_numbers_fail() {
        assert!(load(&[("DATABASE_URL", "postgres://x"), ("PORT", "abc")]).is_err());
        assert!(load(&[("DATABASE_URL", "postgres://x"), ("MAX_PAGE_SIZE", "-1")]).is_err());
    }

    #[test]
    fn default_page_size_must_fit_max() {
        let err = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("DEFAULT_PAGE_SIZE", "300"),
            ("MAX_PAGE_SIZE", "200"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("DEFAULT_PAGE_SIZE"));
        assert!(load(&[("DATABASE_URL", "postgres://x"), ("MAX_PAGE_SIZE", "0")]).is_err());
    }
}
