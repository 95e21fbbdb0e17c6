//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

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

/// Load configuration: optional TOML file, then environment overrides, then
/// validation.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, std::env::vars())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay recognised environment variables onto `config`.
///
/// Takes the variables as an iterator so callers (and tests) decide where
/// they come from.
pub fn apply_env_overrides<I>(config: &mut ProxyConfig, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, value) in vars {
        match name.as_str() {
            "JMESPATH_EXPRESSION" => config.transform.expression = value,
            "METRICS_ANNOTATION_EXPRESSION" => {
                config.transform.metrics_annotation_expression = value
            }
            "FORWARD_URL" => config.forward.url = value,
            "HTTPX_TIMEOUT" => {
                config.forward.timeout_secs = parse_env("HTTPX_TIMEOUT", &value)?;
            }
            // Only an explicit "false" turns verification off.
            "VERIFY_SSL" => config.forward.verify_ssl = !value.eq_ignore_ascii_case("false"),
            "FORWARD_BASIC_AUTH_USERNAME" => config.forward.basic_auth_username = value,
            "FORWARD_BASIC_AUTH_PASSWORD" => config.forward.basic_auth_password = value,
            "HOST" => config.listener.host = value,
            "PORT" => config.listener.port = parse_env("PORT", &value)?,
            "LOG_LEVEL" => config.observability.log_level = value.to_lowercase(),
            "LOG_FORMAT" => {
                config.observability.log_format = match value.to_lowercase().as_str() {
                    "text" | "pretty" => LogFormat::Text,
                    "json" => LogFormat::Json,
                    _ => {
                        return Err(ConfigError::InvalidEnv {
                            name: "LOG_FORMAT",
                            value,
                        })
                    }
                }
            }
            "METRICS_ENABLED" => {
                config.observability.metrics_enabled = parse_flag("METRICS_ENABLED", value)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

fn parse_flag(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name, value }),
    }
}
