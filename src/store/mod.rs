//! Persistence layer — libSQL-backed storage for user and request records.

pub mod libsql_backend;
pub mod migrations;
pub mod model;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use model::{RequestRecord, StoredRow, Submission, Table, UserRecord};
pub use traits::RecordStore;
