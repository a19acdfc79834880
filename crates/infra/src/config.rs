//! Runtime configuration loaded from environment variables.
//!
//! Every key has a default. A key that is set but malformed is an error
//! rather than a silent fallback.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::store::postgres::DatabaseConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Expiry sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryConfig {
    /// How long a registration may stay pending before the sweeper releases it.
    pub pending_timeout: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on registrations examined per sweep.
    pub batch_size: i64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            pending_timeout: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupConfig {
    /// `None` runs against the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub expiry: ExpiryConfig,
    pub bind_addr: String,
}

impl SignupConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?,
                acquire_timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "DATABASE_ACQUIRE_TIMEOUT_SECS",
                    5u64,
                )?),
            }),
            None => None,
        };

        let timeout_hours: u64 = parse_or(&lookup, "PENDING_TIMEOUT_HOURS", 24)?;
        if timeout_hours == 0 {
            return Err(invalid("PENDING_TIMEOUT_HOURS", "0", "must be at least 1"));
        }
        let timeout_secs = timeout_hours.checked_mul(60 * 60).ok_or_else(|| {
            invalid(
                "PENDING_TIMEOUT_HOURS",
                &timeout_hours.to_string(),
                "too large",
            )
        })?;
        let interval_secs: u64 = parse_or(&lookup, "EXPIRY_SWEEP_INTERVAL_SECS", 300)?;
        if interval_secs == 0 {
            return Err(invalid("EXPIRY_SWEEP_INTERVAL_SECS", "0", "must be at least 1"));
        }
        let batch_size: i64 = parse_or(&lookup, "EXPIRY_SWEEP_BATCH_SIZE", 500)?;
        if batch_size < 1 {
            return Err(invalid(
                "EXPIRY_SWEEP_BATCH_SIZE",
                &batch_size.to_string(),
                "must be at least 1",
            ));
        }

        Ok(Self {
            database,
            expiry: ExpiryConfig {
                pending_timeout: Duration::from_secs(timeout_secs),
                sweep_interval: Duration::from_secs(interval_secs),
                batch_size,
            },
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
