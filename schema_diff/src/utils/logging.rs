//! Logging utilities for schema_diff
//!
//! This module provides logging setup and configuration.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize logging based on configuration
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let config = match config {
        Some(cfg) => cfg,
        None => return Ok(()), // No logging configuration, use defaults
    };

    let env_filter = env_filter(config)?;
    let json = config.format.eq_ignore_ascii_case("json");

    if let Some(file_path) = &config.file {
        if let Some(parent) = Path::new(file_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(file_path)?;

        let builder = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false);
        if json {
            install(builder.json().finish())
        } else {
            install(builder.finish())
        }
    } else if config.stdout {
        let builder = fmt::Subscriber::builder().with_env_filter(env_filter);
        if json {
            install(builder.json().finish())
        } else {
            install(builder.finish())
        }
    } else {
        Ok(())
    }
}

/// Initialize logging on stderr, leaving stdout to command output
pub fn init_stderr_logging(config: &LoggingConfig) -> Result<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(env_filter(config)?)
        .with_writer(std::io::stderr);
    if config.format.eq_ignore_ascii_case("json") {
        install(builder.json().finish())
    } else {
        install(builder.finish())
    }
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directive = format!("schema_diff={}", parse_level(&config.level))
        .parse::<Directive>()
        .map_err(|e| Error::ConfigError(format!("Invalid log directive: {}", e)))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

fn install<S>(subscriber: S) -> Result<()>
where
    S: tracing::Subscriber + Send + Sync + 'static,
{
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::ConfigError(format!("Failed to install logger: {}", e)))
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
