//! Record types for the `users` and `requests` tables.

use serde::{Deserialize, Serialize};

/// A user's most recent identity and contact details. Plaintext in memory,
/// ciphertext at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub user_name: String,
    pub contact_info: String,
}

/// One submitted request. Never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: String,
    pub user_id: String,
    pub problem_description: String,
    pub contact_time: String,
}

/// A completed intake flow, ready to be persisted as a user upsert plus a
/// request insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub user: UserRecord,
    pub request: RequestRecord,
}

/// A table row exactly as stored: key columns in clear, the rest ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub columns: Vec<(&'static str, String)>,
}

impl StoredRow {
    /// Look up a column value by name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value.as_str())
    }
}

/// The two persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Requests,
}

impl Table {
    pub const ALL: [Table; 2] = [Table::Users, Table::Requests];

    /// Column names in schema order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Users => &["user_id", "user_name", "contact_info"],
            Self::Requests => &["request_id", "user_id", "problem_description", "contact_time"],
        }
    }

    /// Columns stored as plaintext (keys). Everything else is ciphertext.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Users => &["user_id"],
            Self::Requests => &["request_id", "user_id"],
        }
    }

    pub fn is_encrypted(&self, column: &str) -> bool {
        !self.key_columns().contains(&column)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Requests => "requests",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(Self::Users),
            "requests" => Ok(Self::Requests),
            other => Err(format!("unknown table: {other}")),
        }
    }
}
