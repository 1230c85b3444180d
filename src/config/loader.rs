//! Configuration loading from disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::schema::{AuthConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
    #[error("Users file {path}: {reason}")]
    UsersFile { path: PathBuf, reason: String },
}

/// One entry of an `auth.users_file`.
#[derive(Debug, Deserialize)]
struct UserEntry {
    hash: String,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let mut config: GatewayConfig = toml::from_str(content)?;
    merge_users_file(&mut config.auth)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Fold the users named by `auth.users_file` into `auth.users`.
fn merge_users_file(auth: &mut AuthConfig) -> Result<(), ConfigError> {
    let Some(path) = &auth.users_file else {
        return Ok(());
    };
    let users_file_error = |reason: String| ConfigError::UsersFile {
        path: path.clone(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| users_file_error(e.to_string()))?;
    let entries: BTreeMap<String, UserEntry> =
        serde_json::from_str(&content).map_err(|e| users_file_error(e.to_string()))?;

    tracing::info!(path = %path.display(), users = entries.len(), "Loaded basic auth users file");
    auth.users
        .extend(entries.into_iter().map(|(user, entry)| (user, entry.hash)));
    Ok(())
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(parse_config("[bus"), Err(ConfigError::Parse(_))));
    }

    fn users_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bus-gateway-{}-{name}.json", std::process::id()));
        fs::write(&path, content).unwrap();
        path
    }

    fn basic_config(users_file: &Path, inline: &str) -> String {
        format!(
            "[auth]\nmode = \"basic\"\nusers_file = {:?}\n[auth.users]\nops = \"{inline}\"\n",
            users_file.display().to_string()
        )
    }

    #[test]
    fn test_users_file_is_merged_over_inline_users() {
        let inline = crate::security::auth::hash_password("inline").unwrap();
        let from_file = crate::security::auth::hash_password("file").unwrap();
        let extra = crate::security::auth::hash_password("extra").unwrap();
        let path = users_file(
            "merge",
            &serde_json::json!({"ops": {"hash": from_file}, "admin": {"hash": extra}}).to_string(),
        );

        let config = parse_config(&basic_config(&path, &inline)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.auth.users.len(), 2);
        assert_eq!(config.auth.users["ops"], from_file);
        assert_eq!(config.auth.users["admin"], extra);
    }

    #[test]
    fn test_unreadable_users_file_fails_load() {
        let inline = crate::security::auth::hash_password("inline").unwrap();

        let missing = std::env::temp_dir().join("bus-gateway-no-such-users.json");
        let err = parse_config(&basic_config(&missing, &inline)).unwrap_err();
        assert!(matches!(err, ConfigError::UsersFile { .. }));

        let path = users_file("garbled", "{\"ops\": \"not an object\"}");
        let err = parse_config(&basic_config(&path, &inline)).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::UsersFile { .. }));
    }

    #[test]
    fn test_users_file_hashes_are_validated() {
        let inline = crate::security::auth::hash_password("inline").unwrap();
        let path = users_file("weak", r#"{"admin": {"hash": "plaintext"}}"#);
        let err = parse_config(&basic_config(&path, &inline)).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("auth.users.admin"));
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config("[bus]\nuri = \"amqp://broker/\"\nexchange = \"\"").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("Validation failed: "));
        assert!(text.contains("bus.uri"));
        assert!(text.contains("bus.exchange"));
    }
}
