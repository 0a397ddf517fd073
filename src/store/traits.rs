//! `RecordStore` trait — single async interface for intake persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::store::model::{RequestRecord, StoredRow, Submission, Table, UserRecord};

/// Backend-agnostic record repository. Implementations encrypt every
/// non-key column before it reaches storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create both tables if absent. Idempotent.
    async fn create_schema(&self) -> Result<(), DatabaseError>;

    /// Insert or overwrite the user row for `user.user_id`.
    async fn upsert_user_record(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    /// Insert a new request row. Fails with `Constraint` on a duplicate
    /// `request_id` or an unknown `user_id`.
    async fn insert_request_record(&self, request: &RequestRecord) -> Result<(), DatabaseError>;

    /// Persist a finished flow: user upsert then request insert, atomically.
    async fn save_submission(&self, submission: &Submission) -> Result<(), DatabaseError>;

    /// Fetch and decrypt one user.
    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Fetch and decrypt every request filed by `user_id`.
    async fn list_user_requests(&self, user_id: &str)
    -> Result<Vec<RequestRecord>, DatabaseError>;

    /// Raw rows of a table, ciphertext left intact.
    async fn list_rows(&self, table: Table) -> Result<Vec<StoredRow>, DatabaseError>;
}
