//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in secrecy::SecretString since it
//! may carry credentials.

pub mod catalog;
pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub workflows_file: Option<PathBuf>,
    pub tick_interval: Duration,
    pub max_concurrent_runs: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            workflows_file: std::env::var("WORKFLOWS_FILE").ok().map(PathBuf::from),
            tick_interval: Duration::from_millis(parsed_var("TICK_INTERVAL_MS", 1000u64)?.max(1)),
            max_concurrent_runs: parsed_var("MAX_CONCURRENT_RUNS", 4usize)?.max(1),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
