//! Configuration loading from disk and the environment.

use std::ffi::OsString;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    Env { var: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;
    finish(config, utf8_vars(std::env::vars_os())?)
}

/// Build configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    finish(GatewayConfig::default(), utf8_vars(std::env::vars_os())?)
}

/// Variables read by [`apply_env_overrides`].
pub const ENV_VARS: [&str; 8] = [
    "GATEWAY_BIND_ADDRESS",
    "GATEWAY_UPSTREAM",
    "GATEWAY_RATE_LIMIT",
    "GATEWAY_RATE_LIMIT_WINDOW_MS",
    "GATEWAY_AUTH_PROVIDER_URL",
    "GATEWAY_AUTH_API_KEY",
    "GATEWAY_LOG",
    "APP_ENV",
];

/// Keep the environment entries that are valid Unicode.
///
/// Other processes' variables are skipped when they are not Unicode; one of
/// ours that is not is an error.
fn utf8_vars(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> Result<Vec<(String, String)>, ConfigError> {
    let mut out = Vec::new();
    for (var, value) in vars {
        let Ok(var) = var.into_string() else {
            continue;
        };
        match value.into_string() {
            Ok(value) => out.push((var, value)),
            Err(value) if ENV_VARS.contains(&var.as_str()) => {
                return Err(ConfigError::Env {
                    value: value.to_string_lossy().into_owned(),
                    var,
                });
            }
            Err(_) => {}
        }
    }
    Ok(out)
}

fn finish(
    mut config: GatewayConfig,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<GatewayConfig, ConfigError> {
    apply_env_overrides(&mut config, vars)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply recognized environment variables on top of `config`.
pub fn apply_env_overrides(
    config: &mut GatewayConfig,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (var, value) in vars {
        match var.as_str() {
            "GATEWAY_BIND_ADDRESS" => config.listener.bind_address = value,
            "GATEWAY_UPSTREAM" => config.upstream.address = value,
            "GATEWAY_RATE_LIMIT" => config.rate_limit.limit = parse_number(&var, &value)?,
            "GATEWAY_RATE_LIMIT_WINDOW_MS" => {
                config.rate_limit.window_ms = parse_number(&var, &value)?
            }
            "GATEWAY_AUTH_PROVIDER_URL" => config.auth.provider_url = value,
            "GATEWAY_AUTH_API_KEY" => config.auth.api_key = value,
            "GATEWAY_LOG" => config.observability.log_level = value,
            "APP_ENV" => {
                config.security.is_development = value.eq_ignore_ascii_case("development")
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_number(var: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
    })
}
