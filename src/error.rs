//! Error types for Intake Desk.

use std::path::PathBuf;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Field encryption failed: {0}")]
    Codec(#[from] CodecError),
}

impl DatabaseError {
    /// Classify a libSQL error raised by a write, separating constraint
    /// violations (duplicate key, dangling foreign key) from other failures.
    pub(crate) fn from_write(op: &str, err: libsql::Error) -> Self {
        let text = err.to_string();
        if text.contains("constraint failed") || text.contains("SQLITE_CONSTRAINT") {
            Self::Constraint(format!("{op}: {text}"))
        } else {
            Self::Query(format!("{op}: {text}"))
        }
    }
}

/// Symmetric field codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Failed to decode ciphertext: {0}")]
    Decode(String),
}

/// Field validation failures. Recoverable: the user is re-prompted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("name may contain letters and spaces only")]
    InvalidName,

    #[error("phone must be +7 or 8 followed by 10 digits")]
    InvalidPhone,
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("No channel named {0}")]
    UnknownChannel(String),
}

/// Export job errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to decrypt {table}.{column}: {source}")]
    Decrypt {
        table: &'static str,
        column: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("Invalid export schedule: {0}")]
    Schedule(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
