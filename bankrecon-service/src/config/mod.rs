//! Configuration module for bankrecon-service.

use rust_decimal::Decimal;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct BankreconConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: Option<DatabaseConfig>,
    pub books_service: BooksServiceConfig,
    pub ledger_service: LedgerServiceConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Source of reconcilable business records (payments, disbursements).
#[derive(Debug, Clone)]
pub struct BooksServiceConfig {
    pub url: Option<String>,
}

/// Downstream journal-entry poster for adjustments and reversals.
#[derive(Debug, Clone)]
pub struct LedgerServiceConfig {
    pub url: String,
}

/// Matching constants, centralized here so call sites never hard-code them.
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Fractional amount band for the default tolerance (1%).
    pub tolerance_pct: Decimal,
    /// Lower clamp bound on the default tolerance.
    pub tolerance_min: Decimal,
    /// Upper clamp bound on the default tolerance.
    pub tolerance_max: Decimal,
    /// Gaps at or below this require no difference classification.
    pub difference_threshold: Decimal,
    /// Cap on automatic suggestion results.
    pub suggestion_limit: usize,
    /// Cap on free-text search results.
    pub search_limit: usize,
    /// Half-width of the candidate pool date window, in days.
    pub candidate_window_days: i64,
    /// How far back to scan for reversal originals, in days.
    pub reversal_lookback_days: i64,
    /// Narration patterns flagging probable reversals. Extensible, not a
    /// closed set.
    pub reversal_patterns: Vec<String>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tolerance_pct: Decimal::new(1, 2),
            tolerance_min: Decimal::from(100),
            tolerance_max: Decimal::from(10_000),
            difference_threshold: Decimal::from(10),
            suggestion_limit: 10,
            search_limit: 20,
            candidate_window_days: 30,
            reversal_lookback_days: 60,
            reversal_patterns: default_reversal_patterns(),
        }
    }
}

fn default_reversal_patterns() -> Vec<String> {
    [
        r"(?i)\brev(ersal)?\b",
        r"(?i)\brefund\b",
        r"(?i)\breturn(ed)?\b",
        r"(?i)\brtn\b",
        r"(?i)\bchq\s*ret",
        r"(?i)\bneft\s*ret",
        r"(?i)\bimps\s*ret",
        r"(?i)\bbounce(d)?\b",
        r"(?i)\bfailed\b",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl MatchingConfig {
    fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(v) = decimal_env("MATCHING_TOLERANCE_PCT")? {
            config.tolerance_pct = v;
        }
        if let Some(v) = decimal_env("MATCHING_TOLERANCE_MIN")? {
            config.tolerance_min = v;
        }
        if let Some(v) = decimal_env("MATCHING_TOLERANCE_MAX")? {
            config.tolerance_max = v;
        }
        if let Some(v) = decimal_env("MATCHING_DIFFERENCE_THRESHOLD")? {
            config.difference_threshold = v;
        }
        if let Ok(v) = env::var("MATCHING_REVERSAL_LOOKBACK_DAYS") {
            config.reversal_lookback_days = v.parse().map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Invalid MATCHING_REVERSAL_LOOKBACK_DAYS: {}",
                    v
                ))
            })?;
        }
        if let Ok(v) = env::var("MATCHING_REVERSAL_PATTERNS") {
            let extra: Vec<String> = v
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            config.reversal_patterns.extend(extra);
        }

        if config.tolerance_min > config.tolerance_max {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MATCHING_TOLERANCE_MIN must not exceed MATCHING_TOLERANCE_MAX"
            )));
        }

        Ok(config)
    }
}

fn decimal_env(key: &str) -> Result<Option<Decimal>, AppError> {
    match env::var(key) {
        Ok(v) => Decimal::from_str(&v)
            .map(Some)
            .map_err(|_| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, v))),
        Err(_) => Ok(None),
    }
}

impl BankreconConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "bankrecon-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: env::var("DATABASE_URL").ok().map(|url| DatabaseConfig {
                url,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            }),
            books_service: BooksServiceConfig {
                url: env::var("BOOKS_SERVICE_URL").ok().filter(|u| !u.is_empty()),
            },
            ledger_service: LedgerServiceConfig {
                url: env::var("LEDGER_SERVICE_URL")
                    .unwrap_or_else(|_| "http://ledger-service:3001".to_string()),
            },
            matching: MatchingConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn default_reversal_patterns_compile() {
        for pattern in default_reversal_patterns() {
            assert!(Regex::new(&pattern).is_ok(), "bad pattern: {}", pattern);
        }
    }

    #[test]
    fn default_tolerance_band_is_one_percent_bounded() {
        let config = MatchingConfig::default();
        assert_eq!(config.tolerance_pct, Decimal::new(1, 2));
        assert_eq!(config.tolerance_min, Decimal::from(100));
        assert_eq!(config.tolerance_max, Decimal::from(10_000));
        assert_eq!(config.difference_threshold, Decimal::from(10));
    }
}
