//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default cron expression for the scheduled export: every day at 18:00.
pub const DEFAULT_EXPORT_CRON: &str = "0 0 18 * * * *";

/// Top-level bot configuration.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Base64-encoded 32-byte field encryption key.
    pub encryption_key: SecretString,
    /// Idle time after which an unfinished session is dropped. `None` keeps
    /// sessions until restart.
    pub session_ttl: Option<Duration>,
    /// Whether to run the stdin REPL channel.
    pub cli_enabled: bool,
    pub telegram: Option<TelegramConfig>,
    pub export: Option<ExportConfig>,
    /// Directory for daily-rolling log files, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

/// Telegram channel settings. Present only when a bot token is set.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` admits everyone.
    pub allowed_users: Vec<String>,
}

/// Scheduled export settings. Present only when an export dir is set.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub dir: PathBuf,
    pub cron: String,
    /// Write plaintext instead of stored ciphertext.
    pub decrypt: bool,
}

impl IntakeConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = var("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/intake.db"));

        let encryption_key = var("INTAKE_ENCRYPTION_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("INTAKE_ENCRYPTION_KEY".into()))?;

        let ttl_secs: u64 = parse_or("INTAKE_SESSION_TTL_SECS", var("INTAKE_SESSION_TTL_SECS"), 0)?;
        let session_ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));

        let cli_enabled = parse_bool("INTAKE_CLI", var("INTAKE_CLI"))?;

        let telegram = var("TELEGRAM_BOT_TOKEN").map(|token| TelegramConfig {
            bot_token: SecretString::from(token),
            allowed_users: var("TELEGRAM_ALLOWED_USERS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        });

        let export = match var("INTAKE_EXPORT_DIR") {
            Some(dir) => {
                let cron = var("INTAKE_EXPORT_CRON").unwrap_or_else(|| DEFAULT_EXPORT_CRON.to_string());
                cron::Schedule::from_str(&cron).map_err(|e| ConfigError::InvalidValue {
                    key: "INTAKE_EXPORT_CRON".into(),
                    message: e.to_string(),
                })?;
                Some(ExportConfig {
                    dir: PathBuf::from(dir),
                    cron,
                    decrypt: parse_bool("INTAKE_EXPORT_DECRYPT", var("INTAKE_EXPORT_DECRYPT"))?,
                })
            }
            None => None,
        };

        Ok(Self {
            db_path,
            encryption_key,
            session_ttl,
            cli_enabled,
            telegram,
            export,
            log_dir: var("INTAKE_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Whether at least one inbound channel is configured.
    pub fn has_channel(&self) -> bool {
        self.cli_enabled || self.telegram.is_some()
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{v:?}: {e}"),
        }),
    }
}

fn parse_bool(key: &str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
