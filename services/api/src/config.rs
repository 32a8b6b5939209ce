//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{FixedOffset, NaiveTime};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub upload_dir: PathBuf,
    /// Local wall-clock time of the daily due-date scan.
    pub scan_time: NaiveTime,
    /// The zone the scan and all "today" computations run in.
    pub utc_offset: FixedOffset,
    /// Upper bound on any single store call or per-invoice step during a scan.
    pub scan_invoice_timeout: Duration,
    pub ollama_base_url: String,
    pub amount_model: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let upload_dir = std::env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./files"));

        // --- Load Scanner Settings ---
        let scan_time_str = std::env::var("SCAN_TIME").unwrap_or_else(|_| "09:00".to_string());
        let scan_time = NaiveTime::parse_from_str(&scan_time_str, "%H:%M").map_err(|e| {
            ConfigError::InvalidValue("SCAN_TIME".to_string(), e.to_string())
        })?;

        let offset_hours_str =
            std::env::var("UTC_OFFSET_HOURS").unwrap_or_else(|_| "1".to_string());
        let offset_hours = offset_hours_str.parse::<i32>().map_err(|e| {
            ConfigError::InvalidValue("UTC_OFFSET_HOURS".to_string(), e.to_string())
        })?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ConfigError::InvalidValue(
                "UTC_OFFSET_HOURS".to_string(),
                format!("'{}' is out of range", offset_hours),
            )
        })?;

        let timeout_secs_str =
            std::env::var("SCAN_TIMEOUT_SECS").unwrap_or_else(|_| "30".to_string());
        let timeout_secs = timeout_secs_str.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue("SCAN_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        let scan_invoice_timeout = Duration::from_secs(timeout_secs);

        // --- Load Adapter-specific Settings ---
        let ollama_base_url = std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string());
        let amount_model =
            std::env::var("AMOUNT_MODEL").unwrap_or_else(|_| "tinyllama:latest".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            upload_dir,
            scan_time,
            utc_offset,
            scan_invoice_timeout,
            ollama_base_url,
            amount_model,
        })
    }
}
