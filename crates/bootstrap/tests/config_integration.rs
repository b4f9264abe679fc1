//! Integration tests for loading application settings from disk.
//!
//! Exercises the full start-up path: file + environment overlay, placeholder
//! expansion, duration strings, validation in an after-load hook, and handing
//! the loaded token settings to the token service.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use bootstrap::config::{ConfigLoader, LoadError};
use bootstrap::logging::LoggingConfig;
use serde::Deserialize;
use shared::jwt::{bearer_token, JwtConfig, JwtError, JwtSettings};
use shared::validation::validate;

#[derive(Debug, Deserialize)]
struct AppSettings {
    #[serde(default)]
    logging: LoggingConfig,
    jwt: JwtSettings,
    uploads: UploadSettings,
}

#[derive(Debug, Deserialize)]
struct UploadSettings {
    dir: String,
    allowed_types: Vec<String>,
    #[serde(deserialize_with = "bootstrap::duration::deserialize")]
    retention: Duration,
}

const SETTINGS_TOML: &str = r#"
[logging]
level = "debug"
format = "console"

[jwt]
secret = "${ITEST_JWT_SECRET}"
issuer = "toolkit"

[uploads]
dir = "${ITEST_DATA_ROOT}/uploads"
allowed_types = ["image/png", "image/jpeg"]
retention = "7d12h"
"#;

/// Writes `contents` to a fresh temporary file with the given extension.
fn write_settings(contents: &str, extension: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "bootstrap-settings-{}.{}",
        uuid::Uuid::new_v4(),
        extension
    ));
    fs::write(&path, contents).unwrap();
    path
}

fn loader(path: PathBuf) -> ConfigLoader<AppSettings> {
    ConfigLoader::new(path)
        .env_prefix("ITEST")
        .after_load(|settings: &mut AppSettings| validate(&settings.jwt))
}

// ============================================================================
// Loading Tests
// ============================================================================

#[test]
fn test_load_settings_file() {
    std::env::set_var("ITEST_JWT_SECRET", "integration-secret-0123456789abcdef");
    std::env::set_var("ITEST_DATA_ROOT", "/srv/data");
    std::env::set_var("ITEST__JWT__EXPIRY_HOURS", "6");

    let path = write_settings(SETTINGS_TOML, "toml");
    let settings = loader(path.clone()).load().unwrap();
    fs::remove_file(path).unwrap();

    assert_eq!(settings.logging.level, "debug");
    assert_eq!(settings.logging.format, "console");
    assert_eq!(settings.jwt.secret, "integration-secret-0123456789abcdef");
    assert_eq!(settings.jwt.expiry_hours, 6);
    assert_eq!(settings.uploads.dir, "/srv/data/uploads");
    assert_eq!(settings.uploads.allowed_types, vec!["image/png", "image/jpeg"]);
    assert_eq!(settings.uploads.retention, Duration::from_secs(7 * 86_400 + 12 * 3_600));

    let service = JwtConfig::from_settings(&settings.jwt).unwrap();
    let issued = service.generate_token("grace@example.com", "user-7").unwrap();
    let header = format!("Bearer {}", issued.token);

    let claims = service.authorize_header(&header).unwrap();
    assert_eq!(claims.email, "grace@example.com");
    assert_eq!(claims.iss, "toolkit");
    assert_eq!(claims.exp - claims.iat, 6 * 3_600);
    assert_eq!(bearer_token(&header).unwrap(), issued.token);
}

#[test]
fn test_allowed_types_from_comma_separated_env() {
    std::env::set_var("ITEST_LIST__JWT__SECRET", "list-secret-0123456789abcdef0123456789");
    std::env::set_var("ITEST_LIST__UPLOADS__ALLOWED_TYPES", "image/png,image/jpeg,application/pdf");
    std::env::set_var("ITEST_DATA_ROOT", "/srv/data");

    let path = write_settings(SETTINGS_TOML, "toml");
    let settings = ConfigLoader::<AppSettings>::new(path.clone())
        .env_prefix("ITEST_LIST")
        .env_list_key("uploads.allowed_types")
        .after_load(|settings: &mut AppSettings| validate(&settings.jwt))
        .load()
        .unwrap();
    fs::remove_file(path).unwrap();

    assert_eq!(
        settings.uploads.allowed_types,
        vec!["image/png", "image/jpeg", "application/pdf"]
    );
    assert_eq!(settings.jwt.secret, "list-secret-0123456789abcdef0123456789");
    assert_eq!(settings.jwt.expiry_hours, 24);
}

#[test]
fn test_load_yaml_file() {
    let contents = r#"
jwt:
  secret: "yaml-secret-0123456789abcdef0123456789"
  issuer: "toolkit-yaml"
uploads:
  dir: "/tmp/uploads"
  allowed_types: ["application/pdf"]
  retention: 3600
"#;
    let path = write_settings(contents, "yaml");
    let settings = ConfigLoader::<AppSettings>::new(path.clone()).load().unwrap();
    fs::remove_file(path).unwrap();

    assert_eq!(settings.logging.format, "json");
    assert_eq!(settings.jwt.expiry_hours, 24);
    assert_eq!(settings.uploads.retention, Duration::from_secs(3600));
}

#[test]
fn test_weak_secret_rejected_by_hook() {
    let contents = r#"
[jwt]
secret = "too-short"
issuer = "toolkit"

[uploads]
dir = "/tmp"
allowed_types = []
retention = "1h"
"#;
    let path = write_settings(contents, "toml");
    let result = loader(path.clone()).load();
    fs::remove_file(path).unwrap();

    match result {
        Err(LoadError::Hook(message)) => assert_eq!(message, "secret is 'secret_too_short'"),
        other => panic!("expected hook error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_missing_settings_file() {
    let result = loader(PathBuf::from("/definitely/not/here.toml")).load();
    assert!(matches!(result, Err(LoadError::NotFound(_))));
}

#[test]
fn test_tokens_from_other_issuer_secret_rejected() {
    let first = JwtConfig::new("first-secret-0123456789abcdef0123456", "a", 1).unwrap();
    let second = JwtConfig::new("second-secret-0123456789abcdef012345", "b", 1).unwrap();

    let issued = first.generate_token("heidi@example.com", "user-8").unwrap();
    assert!(matches!(
        second.is_authorized(&issued.token),
        Err(JwtError::InvalidToken)
    ));
}
