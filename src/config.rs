// Copyright 2025
// Licensed under the Elastic License v2.0

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::pipeline::dispatch::{DispatchOptions, ErrorPolicy, SchemaLagPolicy, WriteMode};

// =============================================================================
// Input Configuration
// =============================================================================

/// Where change envelopes are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    fn from_value(value: &str) -> Self {
        match value.trim() {
            "" | "-" => InputSource::Stdin,
            path => InputSource::File(PathBuf::from(path)),
        }
    }
}

impl std::fmt::Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputSource::Stdin => write!(f, "stdin"),
            InputSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Central configuration for cdcmux loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Routing
    pub catalog_path: PathBuf,
    pub routing_case_sensitive: bool,

    // Input
    pub input: InputSource,
    pub channel_capacity: usize,

    // Output
    pub quarantine_path: PathBuf,

    // Projection
    pub write_mode: WriteMode,
    pub schema_lag_policy: SchemaLagPolicy,
    pub error_policy: ErrorPolicy,

    // Pipeline
    pub flush_size: usize,
    pub flush_interval_ms: u64,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn optional_env(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, failing on values that do not parse
fn parse_env<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = optional_env(name, default);
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value '{}' for {}", raw, name))
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => bail!("Invalid value '{}' for {}: expected true or false", raw, name),
        },
    }
}

// =============================================================================
// Config Implementation
// =============================================================================

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Variables
    /// - CATALOG_PATH (required)
    /// - INPUT_PATH, CHANNEL_CAPACITY, ROUTING_CASE_SENSITIVE
    /// - QUARANTINE_PATH
    /// - WRITE_MODE, SCHEMA_LAG_POLICY, ERROR_POLICY
    /// - FLUSH_SIZE, FLUSH_INTERVAL_MS
    pub fn from_env() -> Result<Self> {
        let catalog_path = env::var("CATALOG_PATH")
            .map(PathBuf::from)
            .context("CATALOG_PATH must be set")?;

        let routing_case_sensitive = parse_bool_env("ROUTING_CASE_SENSITIVE", true)?;

        let input = InputSource::from_value(&optional_env("INPUT_PATH", "-"));

        let quarantine_path = optional_env("QUARANTINE_PATH", "quarantine.jsonl");
        let quarantine_path = match quarantine_path.trim() {
            "" | "-" => bail!("QUARANTINE_PATH must name a file; stdout and stderr are taken"),
            path => PathBuf::from(path),
        };

        let channel_capacity: usize = parse_env("CHANNEL_CAPACITY", "10000")?;
        if channel_capacity == 0 {
            bail!("CHANNEL_CAPACITY must be greater than 0");
        }

        let write_mode: WriteMode = parse_env("WRITE_MODE", "changelog")?;
        let schema_lag_policy: SchemaLagPolicy = parse_env("SCHEMA_LAG_POLICY", "drop-extra")?;
        let error_policy: ErrorPolicy = parse_env("ERROR_POLICY", "quarantine")?;

        let flush_size: usize = parse_env("FLUSH_SIZE", "1000")?;
        if flush_size == 0 {
            bail!("FLUSH_SIZE must be greater than 0");
        }

        let flush_interval_ms: u64 = parse_env("FLUSH_INTERVAL_MS", "1000")?;
        if flush_interval_ms == 0 {
            bail!("FLUSH_INTERVAL_MS must be greater than 0");
        }

        Ok(Self {
            catalog_path,
            routing_case_sensitive,
            input,
            channel_capacity,
            quarantine_path,
            write_mode,
            schema_lag_policy,
            error_policy,
            flush_size,
            flush_interval_ms,
        })
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            write_mode: self.write_mode,
            schema_lag_policy: self.schema_lag_policy,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Print banner with configuration
    pub fn print_banner(&self) {
        info!("Starting cdcmux...");
        info!(
            "Catalog: {} (routing case {})",
            self.catalog_path.display(),
            if self.routing_case_sensitive {
                "sensitive"
            } else {
                "insensitive"
            }
        );
        info!("Input: {}", self.input);
        info!("Quarantine: {}", self.quarantine_path.display());
        info!(
            "Mode: {} (schema lag: {}, errors: {})",
            self.write_mode, self.schema_lag_policy, self.error_policy
        );
        info!(
            "Flush: {} rows or {}ms interval",
            self.flush_size, self.flush_interval_ms
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        env::remove_var("CATALOG_PATH");
        env::remove_var("INPUT_PATH");
        env::remove_var("QUARANTINE_PATH");
        env::remove_var("CHANNEL_CAPACITY");
        env::remove_var("ROUTING_CASE_SENSITIVE");
        env::remove_var("WRITE_MODE");
        env::remove_var("SCHEMA_LAG_POLICY");
        env::remove_var("ERROR_POLICY");
        env::remove_var("FLUSH_SIZE");
        env::remove_var("FLUSH_INTERVAL_MS");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env_vars();

        env::set_var("CATALOG_PATH", "/etc/cdcmux/catalog.json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.catalog_path, PathBuf::from("/etc/cdcmux/catalog.json"));
        assert!(config.routing_case_sensitive);
        assert_eq!(config.input, InputSource::Stdin);
        assert_eq!(config.quarantine_path, PathBuf::from("quarantine.jsonl"));
        assert_eq!(config.channel_capacity, 10000);
        assert_eq!(config.write_mode, WriteMode::Changelog);
        assert_eq!(config.schema_lag_policy, SchemaLagPolicy::DropExtra);
        assert_eq!(config.error_policy, ErrorPolicy::Quarantine);
        assert_eq!(config.flush_size, 1000);
        assert_eq!(config.flush_interval_ms, 1000);
        assert_eq!(config.dispatch_options(), DispatchOptions::default());

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_all_vars() {
        clear_env_vars();

        env::set_var("CATALOG_PATH", "catalog.json");
        env::set_var("INPUT_PATH", "changes.jsonl");
        env::set_var("QUARANTINE_PATH", "/var/lib/cdcmux/rejected.jsonl");
        env::set_var("CHANNEL_CAPACITY", "64");
        env::set_var("ROUTING_CASE_SENSITIVE", "false");
        env::set_var("WRITE_MODE", "append");
        env::set_var("SCHEMA_LAG_POLICY", "await-schema");
        env::set_var("ERROR_POLICY", "fail");
        env::set_var("FLUSH_SIZE", "500");
        env::set_var("FLUSH_INTERVAL_MS", "250");

        let config = Config::from_env().unwrap();

        assert!(!config.routing_case_sensitive);
        assert_eq!(config.input, InputSource::File(PathBuf::from("changes.jsonl")));
        assert_eq!(
            config.quarantine_path,
            PathBuf::from("/var/lib/cdcmux/rejected.jsonl")
        );
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.write_mode, WriteMode::Append);
        assert_eq!(config.schema_lag_policy, SchemaLagPolicy::AwaitSchema);
        assert_eq!(config.error_policy, ErrorPolicy::FailFast);
        assert_eq!(config.flush_size, 500);
        assert_eq!(config.flush_interval(), Duration::from_millis(250));

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_missing_catalog_path() {
        clear_env_vars();

        assert!(Config::from_env().is_err());

        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_errors() {
        let cases = [
            ("WRITE_MODE", "upsert"),
            ("ERROR_POLICY", "retry"),
            ("SCHEMA_LAG_POLICY", "ignore"),
            ("ROUTING_CASE_SENSITIVE", "maybe"),
            ("FLUSH_SIZE", "lots"),
            ("FLUSH_SIZE", "0"),
            ("FLUSH_INTERVAL_MS", "0"),
            ("CHANNEL_CAPACITY", "-1"),
            ("QUARANTINE_PATH", "-"),
        ];

        for (name, value) in cases {
            clear_env_vars();
            env::set_var("CATALOG_PATH", "catalog.json");
            env::set_var(name, value);

            let err = Config::from_env().unwrap_err();
            assert!(
                err.to_string().contains(name),
                "{}={} gave unexpected error: {}",
                name,
                value,
                err
            );
        }

        clear_env_vars();
    }

    #[test]
    fn test_input_source_parsing() {
        assert_eq!(InputSource::from_value("-"), InputSource::Stdin);
        assert_eq!(InputSource::from_value("  "), InputSource::Stdin);
        assert_eq!(
            InputSource::from_value("/data/in.jsonl"),
            InputSource::File(PathBuf::from("/data/in.jsonl"))
        );
        assert_eq!(InputSource::Stdin.to_string(), "stdin");
    }
}
