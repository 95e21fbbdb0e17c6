//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeout > 0, body limit > 0)
//! - Check the upstream URL is an absolute http(s) URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Expressions are not validated here; a bad expression degrades at
//!   request time instead of blocking startup

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("forward.timeout_secs must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("forward.url {url:?} is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("forward.url {url:?} must use http or https, got {scheme:?}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("listener.host must not be empty")]
    EmptyHost,

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodyLimit,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let timeout = config.forward.timeout_secs;
    if !timeout.is_finite() || timeout <= 0.0 {
        errors.push(ValidationError::InvalidTimeout(timeout));
    }

    // An empty URL is allowed; forwarding reports it per request.
    if !config.forward.url.is_empty() {
        match Url::parse(&config.forward.url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                errors.push(ValidationError::UnsupportedScheme {
                    url: config.forward.url.clone(),
                    scheme: url.scheme().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => errors.push(ValidationError::InvalidUrl {
                url: config.forward.url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ProxyConfig::default();
        config.forward.timeout_secs = 0.0;
        config.forward.url = "ftp://example.com/drop".into();
        config.listener.host = " ".into();
        config.security.max_body_size = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], ValidationError::InvalidTimeout(_)));
        assert!(matches!(
            &errors[1],
            ValidationError::UnsupportedScheme { scheme, .. } if scheme == "ftp"
        ));
        assert_eq!(errors[2], ValidationError::EmptyHost);
        assert_eq!(errors[3], ValidationError::ZeroBodyLimit);
    }

    #[test]
    fn test_rejects_unparsable_url_and_nan_timeout() {
        let mut config = ProxyConfig::default();
        config.forward.url = "not a url".into();
        config.forward.timeout_secs = f64::NAN;

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidTimeout(_)));
        assert!(matches!(errors[1], ValidationError::InvalidUrl { .. }));
    }

    #[test]
    fn test_https_url_is_accepted() {
        let mut config = ProxyConfig::default();
        config.forward.url = "https://hooks.example.com/alerts".into();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
