//! Configuration module
//!
//! Loads gateway settings from environment variables (and a `.env` file when
//! one is present).

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Call policy for one backend service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Bound on a single backend call.
    pub timeout: Duration,
    /// Extra immediate attempts for read-only calls. Mutations are never retried.
    pub read_retries: u32,
    /// Bulkhead: maximum in-flight calls to this service.
    pub max_in_flight: usize,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(2_000),
            read_retries: 1,
            max_in_flight: 64,
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub account: CallPolicy,
    pub catalog: CallPolicy,
    pub order: CallPolicy,

    /// Channel capacity of each in-process backend service
    pub service_buffer_size: usize,

    /// Deadline for one whole query or mutation
    pub request_timeout: Duration,

    /// Largest `take` a paginated field accepts; also the default page size
    pub max_page_size: usize,

    /// Re-read the catalog right before persisting an order
    pub revalidate_on_commit: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            account: CallPolicy::default(),
            catalog: CallPolicy::default(),
            order: CallPolicy::default(),
            service_buffer_size: 100,
            request_timeout: Duration::from_secs(10),
            max_page_size: 100,
            revalidate_on_commit: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; the process environment still applies.
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        Ok(Self {
            account: policy_from_env("ACCOUNT", defaults.account)?,
            catalog: policy_from_env("CATALOG", defaults.catalog)?,
            order: policy_from_env("ORDER", defaults.order)?,
            service_buffer_size: parse_var("SERVICE_BUFFER_SIZE", defaults.service_buffer_size)?,
            request_timeout: Duration::from_millis(parse_var(
                "REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )?),
            max_page_size: parse_var("MAX_PAGE_SIZE", defaults.max_page_size)?,
            revalidate_on_commit: parse_var(
                "ORDER_REVALIDATE_ON_COMMIT",
                defaults.revalidate_on_commit,
            )?,
        })
    }
}

fn policy_from_env(prefix: &str, defaults: CallPolicy) -> Result<CallPolicy, ConfigError> {
    let timeout_ms = parse_var(
        &format!("{prefix}_TIMEOUT_MS"),
        defaults.timeout.as_millis() as u64,
    )?;
    let max_in_flight = parse_var(&format!("{prefix}_MAX_IN_FLIGHT"), defaults.max_in_flight)?;
    if max_in_flight == 0 {
        return Err(ConfigError::InvalidValue(format!("{prefix}_MAX_IN_FLIGHT")));
    }
    Ok(CallPolicy {
        timeout: Duration::from_millis(timeout_ms),
        read_retries: parse_var(&format!("{prefix}_READ_RETRIES"), defaults.read_retries)?,
        max_in_flight,
    })
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue(name.to_string())),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let value = parse_var("STOREFRONT_TEST_SURELY_UNSET", 42usize).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn malformed_values_name_the_variable() {
        env::set_var("STOREFRONT_TEST_BAD_NUMBER", "ten");
        let err = parse_var("STOREFRONT_TEST_BAD_NUMBER", 1u64).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for environment variable: STOREFRONT_TEST_BAD_NUMBER"
        );
    }

    #[test]
    fn default_policy_retries_reads_once() {
        let config = GatewayConfig::default();
        assert_eq!(config.catalog.read_retries, 1);
        assert_eq!(config.max_page_size, 100);
        assert!(!config.revalidate_on_commit);
    }
}
