//! Application configuration loaded from environment variables.

use std::time::Duration;

use indexer::RunnerConfig;
use thiserror::Error;

const DEFAULT_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server and indexer configuration.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; without it state is kept in memory
/// - `RPC_URL`: fullnode JSON-RPC endpoint (default: testnet)
/// - `SWAP_PACKAGE_ID`: package whose lock and escrow modules are indexed (required)
/// - `POLLING_INTERVAL_MS`, `ERROR_BACKOFF_MS`, `EVENT_PAGE_LIMIT`: runner tuning
/// - `MAX_QUERY_LIMIT`: largest page the query API returns (default: `50`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub rpc_url: String,
    pub package_id: String,
    pub polling_interval: Duration,
    pub error_backoff: Duration,
    pub page_limit: usize,
    pub max_query_limit: usize,
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let runner = RunnerConfig::default();

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected text or json".to_string(),
                });
            }
        };

        let package_id = lookup("SWAP_PACKAGE_ID")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("SWAP_PACKAGE_ID"))?;

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port)?,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            rpc_url: lookup("RPC_URL").unwrap_or(defaults.rpc_url),
            package_id,
            polling_interval: Duration::from_millis(parse_or(
                &lookup,
                "POLLING_INTERVAL_MS",
                runner.polling_interval.as_millis() as u64,
            )?),
            error_backoff: Duration::from_millis(parse_or(
                &lookup,
                "ERROR_BACKOFF_MS",
                runner.error_backoff.as_millis() as u64,
            )?),
            page_limit: positive_or(&lookup, "EVENT_PAGE_LIMIT", runner.page_limit)?,
            max_query_limit: positive_or(&lookup, "MAX_QUERY_LIMIT", defaults.max_query_limit)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings handed to every tracker runner.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            polling_interval: self.polling_interval,
            error_backoff: self.error_backoff,
            page_limit: self.page_limit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let runner = RunnerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            package_id: String::new(),
            polling_interval: runner.polling_interval,
            error_backoff: runner.error_backoff,
            page_limit: runner.page_limit,
            max_query_limit: 50,
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn positive_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_or(lookup, name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    Ok(value)
}
