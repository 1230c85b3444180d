//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse, statuses valid)
//! - Check that the chosen auth mode has credentials
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use argon2::password_hash::PasswordHash;

use crate::config::schema::{AuthMode, GatewayConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::new("listener.max_body_size", "must be greater than 0"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                "listener.tls",
                "cert_path and key_path are both required",
            ));
        }
    }

    match url::Url::parse(&config.bus.uri) {
        Ok(uri) if uri.scheme() == "memory" => {}
        Ok(uri) => errors.push(ValidationError::new(
            "bus.uri",
            format!("unsupported scheme '{}'", uri.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("bus.uri", e.to_string())),
    }
    if config.bus.exchange.is_empty() {
        errors.push(ValidationError::new("bus.exchange", "must not be empty"));
    }
    if config.bus.request_timeout_secs == 0 {
        errors.push(ValidationError::new("bus.request_timeout_secs", "must be greater than 0"));
    }

    if config.timeouts.request_secs <= config.bus.request_timeout_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be greater than bus.request_timeout_secs",
        ));
    }

    for (name, code) in &config.error_codes {
        if !(400..=599).contains(&code.http) {
            errors.push(ValidationError::new(
                format!("error_codes.{name}.http"),
                format!("{} is not an error status", code.http),
            ));
        }
    }

    match config.auth.mode {
        AuthMode::None => {}
        AuthMode::Bearer if config.auth.tokens.is_empty() => {
            errors.push(ValidationError::new("auth.tokens", "bearer mode needs at least one token"));
        }
        AuthMode::Bearer => {}
        AuthMode::Basic => {
            if config.auth.users.is_empty() {
                errors.push(ValidationError::new("auth.users", "basic mode needs at least one user"));
            }
            for (user, hash) in &config.auth.users {
                if !is_argon2_phc(hash) {
                    errors.push(ValidationError::new(
                        format!("auth.users.{user}"),
                        "must be an argon2 PHC hash string",
                    ));
                }
            }
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_argon2_phc(hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Ok(argon2::Algorithm::new(parsed.algorithm.as_str())?))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ErrorCodeConfig;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.bus.uri = "amqp://localhost/".into();
        config.bus.request_timeout_secs = 0;
        config.error_codes.insert("NOT_FOUND".into(), ErrorCodeConfig { rpc: 404, http: 200 });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "bus.uri",
                "bus.request_timeout_secs",
                "error_codes.NOT_FOUND.http",
            ]
        );
    }

    #[test]
    fn test_http_timeout_must_exceed_bus_timeout() {
        let mut config = GatewayConfig::default();
        config.timeouts.request_secs = config.bus.request_timeout_secs;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "timeouts.request_secs");
    }

    #[test]
    fn test_auth_modes_need_credentials() {
        let mut config = GatewayConfig::default();
        config.auth.mode = AuthMode::Bearer;
        assert_eq!(validate_config(&config).unwrap_err()[0].field, "auth.tokens");

        config.auth.mode = AuthMode::Basic;
        config.auth.users.insert("admin".into(), "not-a-hash".into());
        assert_eq!(validate_config(&config).unwrap_err()[0].field, "auth.users.admin");
    }

    #[test]
    fn test_basic_users_need_argon2_hashes() {
        let mut config = GatewayConfig::default();
        config.auth.mode = AuthMode::Basic;
        config
            .auth
            .users
            .insert("admin".into(), crate::security::auth::hash_password("pw").unwrap());
        assert_eq!(validate_config(&config), Ok(()));

        // A bare SHA-256 digest is no longer accepted.
        config.auth.users.insert(
            "legacy".into(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad".into(),
        );
        // A PHC string for some other algorithm is rejected too.
        config.auth.users.insert(
            "other".into(),
            "$pbkdf2-sha256$i=1000$c2FsdHNhbHQ$Y2hlY2tzdW1jaGVja3N1bWNoZWNrc3Vt".into(),
        );
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["auth.users.legacy", "auth.users.other"]);
    }
}
