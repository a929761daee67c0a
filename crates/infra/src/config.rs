//! Process configuration read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use erpguard_observability::{LogConfig, LogFormat};
use erpguard_validation::PipelineConfig;

pub const CATALOG_PATH: &str = "ERPGUARD_CATALOG_PATH";
pub const RULES_PATH: &str = "ERPGUARD_RULES_PATH";
pub const INTEGRITY_CONCURRENCY: &str = "ERPGUARD_INTEGRITY_CONCURRENCY";
pub const LOG_FORMAT: &str = "ERPGUARD_LOG_FORMAT";
pub const LOG_FILTER: &str = "ERPGUARD_LOG_FILTER";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const STATEMENT_TIMEOUT_MS: &str = "ERPGUARD_STATEMENT_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub statement_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// `None`: the catalog embedded in `erpguard-auth`.
    pub catalog_path: Option<PathBuf>,
    /// `None`: no business rules.
    pub rules_path: Option<PathBuf>,
    pub integrity_concurrency: usize,
    pub log: LogConfig,
    pub database: Option<DatabaseConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            rules_path: None,
            integrity_concurrency: PipelineConfig::default().integrity_concurrency,
            log: LogConfig::default(),
            database: None,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let integrity_concurrency = match get(INTEGRITY_CONCURRENCY) {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => return Err(ConfigError::new(INTEGRITY_CONCURRENCY, &raw, "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::new(INTEGRITY_CONCURRENCY, &raw, e.to_string())),
            },
            None => defaults.integrity_concurrency,
        };

        let format = match get(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::new(LOG_FORMAT, &raw, e.to_string()))?,
            None => defaults.log.format,
        };
        let log = LogConfig {
            filter: get(LOG_FILTER).unwrap_or(defaults.log.filter),
            format,
        };

        let statement_timeout = match get(STATEMENT_TIMEOUT_MS) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| ConfigError::new(STATEMENT_TIMEOUT_MS, &raw, e.to_string()))?,
            ),
            None => None,
        };
        let database = get(DATABASE_URL).map(|url| DatabaseConfig {
            url,
            statement_timeout,
        });

        Ok(Self {
            catalog_path: get(CATALOG_PATH).map(PathBuf::from),
            rules_path: get(RULES_PATH).map(PathBuf::from),
            integrity_concurrency,
            log,
            database,
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            integrity_concurrency: self.integrity_concurrency,
        }
    }
}
