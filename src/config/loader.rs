//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Names the config file to load. Without it, defaults plus environment apply.
pub const CONFIG_PATH_VAR: &str = "VENTURE_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file, apply environment overrides, then validate.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    finish(config)
}

/// Load from `VENTURE_CONFIG` if set, otherwise start from defaults.
pub fn from_env() -> Result<AppConfig, ConfigError> {
    match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if !path.is_empty() => load_config(Path::new(&path)),
        _ => finish(AppConfig::default()),
    }
}

fn finish(mut config: AppConfig) -> Result<AppConfig, ConfigError> {
    apply_env_overrides(&mut config).map_err(ConfigError::Validation)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `VENTURE_*` variables from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) -> Result<(), Vec<ValidationError>> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from any key lookup. Unparseable values are all reported.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), Vec<ValidationError>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    if let Some(v) = lookup("VENTURE_BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("VENTURE_STORE_URL") {
        config.store.url = v;
    }
    if let Some(v) = lookup("VENTURE_STORE_API_KEY") {
        config.store.api_key = v;
    }
    if let Some(v) = lookup("VENTURE_LOG_LEVEL") {
        config.observability.log_level = v;
    }

    parse_into(&lookup, "VENTURE_RATE_LIMIT", &mut config.rate_limit.limit, &mut errors);
    parse_into(
        &lookup,
        "VENTURE_RATE_LIMIT_WINDOW_MS",
        &mut config.rate_limit.window_ms,
        &mut errors,
    );
    parse_into(
        &lookup,
        "VENTURE_RETRY_ATTEMPTS",
        &mut config.retries.max_attempts,
        &mut errors,
    );
    parse_into(
        &lookup,
        "VENTURE_RETRY_DELAY_MS",
        &mut config.retries.base_delay_ms,
        &mut errors,
    );
    parse_into(
        &lookup,
        "VENTURE_CACHE_TTL_SECS",
        &mut config.cache.default_ttl_secs,
        &mut errors,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T, errors: &mut Vec<ValidationError>)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => errors.push(ValidationError::new(key, format!("'{raw}' is not a number"))),
    }
}
