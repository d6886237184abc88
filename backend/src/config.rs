//! Runtime configuration, read from the environment once at startup.
//!
//! ```bash
//! PORT=3000
//! DATA_DIR=./data
//! ENCRYPTION_KEY=...            # or ENCRYPTION_KEY_FILE=/run/secrets/encryption_key
//! ADMIN_PASSWORD_HASH='$argon2id$...'   # or ADMIN_PASSWORD=...
//! ALLOWED_ORIGINS=https://example.com,https://www.example.com
//! RETENTION_DAYS=180
//! SESSION_TTL_MINUTES=60
//! TRUST_PROXY=false
//!
//! SMTP_HOST=smtp.example.com
//! SMTP_PORT=587
//! SMTP_USERNAME=mailer
//! SMTP_PASSWORD=...
//! SMTP_USE_TLS=true
//! MAIL_FROM=website@example.com
//! NOTIFY_EMAIL=hello@example.com
//! SEND_CONFIRMATION=false
//! ```

use std::env;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

use crate::crypto::passwords::{hash_password, is_password_hash};
use crate::store::MAX_RETENTION_DAYS;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_RETENTION_DAYS: i64 = 180;
const DEFAULT_SESSION_TTL_MINUTES: i64 = 60;
const MAX_SESSION_TTL_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error("key source unreadable: {0}")]
    KeySourceUnreadable(String),
    #[error("admin password hashing failed: {0}")]
    PasswordHash(String),
    #[error("{0} is required when SMTP_HOST is set")]
    SmtpIncomplete(&'static str),
}

/// Outgoing mail settings. Present only when `SMTP_HOST` is set.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub from_address: String,
    pub notify_address: String,
    pub send_confirmation: bool,
}

pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub encryption_secret: Zeroizing<String>,
    /// Argon2 PHC string.
    pub admin_password_hash: String,
    pub allowed_origins: Vec<String>,
    pub retention_days: i64,
    pub session_ttl_minutes: i64,
    pub trust_proxy: bool,
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retention_days = parse_or(&get, "RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(invalid(
                "RETENTION_DAYS",
                &format!("must be between 1 and {MAX_RETENTION_DAYS}"),
            ));
        }
        let session_ttl_minutes =
            parse_or(&get, "SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES)?;
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&session_ttl_minutes) {
            return Err(invalid(
                "SESSION_TTL_MINUTES",
                &format!("must be between 1 and {MAX_SESSION_TTL_MINUTES}"),
            ));
        }

        Ok(Self {
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            data_dir: PathBuf::from(get("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            encryption_secret: encryption_secret(&get)?,
            admin_password_hash: admin_password_hash(&get)?,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            retention_days,
            session_ttl_minutes,
            trust_proxy: parse_bool(&get, "TRUST_PROXY", false)?,
            smtp: smtp_config(&get)?,
        })
    }
}

fn encryption_secret(get: &impl Fn(&str) -> Option<String>) -> Result<Zeroizing<String>, ConfigError> {
    if let Some(secret) = get("ENCRYPTION_KEY") {
        return Ok(Zeroizing::new(secret));
    }
    if let Some(path) = get("ENCRYPTION_KEY_FILE") {
        let content = fs::read_to_string(&path)
            .map_err(|e| ConfigError::KeySourceUnreadable(format!("{path}: {e}")))?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::KeySourceUnreadable(format!("{path} is empty")));
        }
        return Ok(Zeroizing::new(trimmed.to_string()));
    }
    Err(ConfigError::MissingEnvVar("ENCRYPTION_KEY".to_string()))
}

fn admin_password_hash(get: &impl Fn(&str) -> Option<String>) -> Result<String, ConfigError> {
    if let Some(hash) = get("ADMIN_PASSWORD_HASH") {
        if !is_password_hash(&hash) {
            return Err(invalid("ADMIN_PASSWORD_HASH", "not an Argon2 PHC string"));
        }
        return Ok(hash);
    }
    if let Some(plaintext) = get("ADMIN_PASSWORD").map(Zeroizing::new) {
        info!("ADMIN_PASSWORD_HASH not set, hashing ADMIN_PASSWORD at startup");
        return hash_password(&plaintext).map_err(|e| ConfigError::PasswordHash(format!("{e}")));
    }
    Err(ConfigError::MissingEnvVar("ADMIN_PASSWORD".to_string()))
}

fn smtp_config(get: &impl Fn(&str) -> Option<String>) -> Result<Option<SmtpConfig>, ConfigError> {
    let Some(host) = get("SMTP_HOST") else {
        info!("SMTP_HOST not set, e-mail notifications disabled");
        return Ok(None);
    };

    Ok(Some(SmtpConfig {
        host,
        port: parse_or(get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
        username: get("SMTP_USERNAME"),
        password: get("SMTP_PASSWORD"),
        use_tls: parse_bool(get, "SMTP_USE_TLS", true)?,
        from_address: get("MAIL_FROM").ok_or(ConfigError::SmtpIncomplete("MAIL_FROM"))?,
        notify_address: get("NOTIFY_EMAIL").ok_or(ConfigError::SmtpIncomplete("NOTIFY_EMAIL"))?,
        send_confirmation: parse_bool(get, "SEND_CONFIRMATION", false)?,
    }))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" || v == "yes" => Ok(true),
        Some(v) if v == "false" || v == "0" || v == "no" => Ok(false),
        Some(v) => Err(invalid(key, &format!("expected a boolean, got {v:?}"))),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError};
    use crate::crypto::passwords::{hash_password, verify_password};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::NamedTempFile;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn applies_defaults() {
        let hash = hash_password("pw").unwrap();
        let config = load(&[("ENCRYPTION_KEY", "secret"), ("ADMIN_PASSWORD_HASH", &hash)])
            .expect("config should load");
        assert_eq!(config.port, 3000);
        assert_eq!(config.retention_days, 180);
        assert_eq!(config.session_ttl_minutes, 60);
        assert_eq!(config.data_dir.to_str(), Some("./data"));
        assert!(config.allowed_origins.is_empty());
        assert!(!config.trust_proxy);
        assert!(config.smtp.is_none());
        assert_eq!(config.admin_password_hash, hash);
    }

    #[test]
    fn hashes_plain_admin_password() {
        let config = load(&[("ENCRYPTION_KEY", "secret"), ("ADMIN_PASSWORD", "letmein")])
            .expect("config should load");
        assert!(verify_password("letmein", &config.admin_password_hash));
    }

    #[test]
    fn reads_key_from_file() {
        let file = NamedTempFile::new().expect("temp file");
        fs::write(file.path(), "file-secret\n").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let config = load(&[("ENCRYPTION_KEY_FILE", &path), ("ADMIN_PASSWORD", "pw")])
            .expect("config should load");
        assert_eq!(config.encryption_secret.as_str(), "file-secret");
    }

    #[test]
    fn requires_secrets() {
        assert!(matches!(
            load(&[("ADMIN_PASSWORD", "pw")]),
            Err(ConfigError::MissingEnvVar(key)) if key == "ENCRYPTION_KEY"
        ));
        assert!(matches!(
            load(&[("ENCRYPTION_KEY", "s")]),
            Err(ConfigError::MissingEnvVar(key)) if key == "ADMIN_PASSWORD"
        ));
        assert!(matches!(
            load(&[("ENCRYPTION_KEY", "s"), ("ADMIN_PASSWORD_HASH", "plain")]),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_bad_numbers() {
        let base = [("ENCRYPTION_KEY", "s"), ("ADMIN_PASSWORD", "pw")];
        let mut vars = base.to_vec();
        vars.push(("RETENTION_DAYS", "0"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { key, .. }) if key == "RETENTION_DAYS"));

        let mut vars = base.to_vec();
        vars.push(("PORT", "http"));
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { key, .. }) if key == "PORT"));
    }

    #[test]
    fn rejects_durations_too_large_for_timestamps() {
        let base = [("ENCRYPTION_KEY", "s"), ("ADMIN_PASSWORD", "pw")];
        for (key, value) in [
            ("RETENTION_DAYS", "36501"),
            ("RETENTION_DAYS", "9223372036854775807"),
            ("SESSION_TTL_MINUTES", "10081"),
            ("SESSION_TTL_MINUTES", "9223372036854775807"),
        ] {
            let mut vars = base.to_vec();
            vars.push((key, value));
            assert!(
                matches!(load(&vars), Err(ConfigError::Invalid { key: k, .. }) if k == key),
                "{key}={value} should be rejected"
            );
        }

        let mut vars = base.to_vec();
        vars.push(("RETENTION_DAYS", "36500"));
        vars.push(("SESSION_TTL_MINUTES", "10080"));
        let config = load(&vars).expect("upper bounds are accepted");
        assert_eq!(config.retention_days, 36_500);
        assert_eq!(config.session_ttl_minutes, 10_080);
    }

    #[test]
    fn parses_origins_and_smtp() {
        let config = load(&[
            ("ENCRYPTION_KEY", "s"),
            ("ADMIN_PASSWORD", "pw"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example ,"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USE_TLS", "false"),
            ("MAIL_FROM", "site@example.com"),
            ("NOTIFY_EMAIL", "team@example.com"),
        ])
        .expect("config should load");
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        let smtp = config.smtp.expect("smtp configured");
        assert_eq!(smtp.port, 587);
        assert!(!smtp.use_tls);
        assert!(!smtp.send_confirmation);
        assert_eq!(smtp.notify_address, "team@example.com");
    }

    #[test]
    fn smtp_requires_addresses() {
        let err = load(&[
            ("ENCRYPTION_KEY", "s"),
            ("ADMIN_PASSWORD", "pw"),
            ("SMTP_HOST", "smtp.example.com"),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::SmtpIncomplete("MAIL_FROM")));
    }
}
