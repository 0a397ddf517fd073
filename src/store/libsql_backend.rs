//! libSQL backend — async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases. Every non-key column passes
//! through the [`FieldCodec`] on the way in and out.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::FieldCodec;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::model::{RequestRecord, StoredRow, Submission, Table, UserRecord};
use crate::store::traits::RecordStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes are
/// serialized through `write_lock` so a finalization transaction never
/// interleaves with another user's statements on the shared connection.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    codec: FieldCodec,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and create the schema.
    pub async fn new_local(path: &Path, codec: FieldCodec) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db, codec).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(codec: FieldCodec) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, codec).await
    }

    async fn from_database(db: LibSqlDatabase, codec: FieldCodec) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to enable foreign keys: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            codec,
            write_lock: Mutex::new(()),
        };
        backend.create_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    fn seal_user(&self, user: &UserRecord) -> Result<[String; 2], DatabaseError> {
        Ok(self
            .codec
            .encrypt_fields([user.user_name.as_str(), user.contact_info.as_str()])?)
    }

    fn seal_request(&self, request: &RequestRecord) -> Result<[String; 2], DatabaseError> {
        Ok(self.codec.encrypt_fields([
            request.problem_description.as_str(),
            request.contact_time.as_str(),
        ])?)
    }
}

// ── Helper functions ────────────────────────────────────────────────

async fn write_user(
    conn: &Connection,
    user_id: &str,
    sealed: &[String; 2],
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (user_id, user_name, contact_info) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET user_name = ?2, contact_info = ?3",
        params![user_id, sealed[0].as_str(), sealed[1].as_str()],
    )
    .await
    .map_err(|e| DatabaseError::from_write("upsert_user_record", e))?;
    Ok(())
}

async fn write_request(
    conn: &Connection,
    request: &RequestRecord,
    sealed: &[String; 2],
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO requests (request_id, user_id, problem_description, contact_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            request.request_id.as_str(),
            request.user_id.as_str(),
            sealed[0].as_str(),
            sealed[1].as_str(),
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_write("insert_request_record", e))?;
    Ok(())
}

/// Read a column as text. Rows adopted from older deployments may hold
/// integer keys.
fn text_value(row: &libsql::Row, idx: i32) -> Result<String, libsql::Error> {
    Ok(match row.get_value(idx)? {
        libsql::Value::Text(s) => s,
        libsql::Value::Integer(i) => i.to_string(),
        libsql::Value::Null => String::new(),
        other => format!("{other:?}"),
    })
}

fn column_list(table: Table) -> String {
    table.columns().join(", ")
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn create_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn upsert_user_record(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        let sealed = self.seal_user(user)?;
        let _guard = self.write_lock.lock().await;
        write_user(self.conn(), &user.user_id, &sealed).await?;
        debug!(user_id = %user.user_id, "User record upserted");
        Ok(())
    }

    async fn insert_request_record(&self, request: &RequestRecord) -> Result<(), DatabaseError> {
        let sealed = self.seal_request(request)?;
        let _guard = self.write_lock.lock().await;
        write_request(self.conn(), request, &sealed).await?;
        debug!(request_id = %request.request_id, user_id = %request.user_id, "Request record inserted");
        Ok(())
    }

    async fn save_submission(&self, submission: &Submission) -> Result<(), DatabaseError> {
        let user_sealed = self.seal_user(&submission.user)?;
        let request_sealed = self.seal_request(&submission.request)?;

        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("save_submission begin: {e}")))?;

        let written = async {
            write_user(&tx, &submission.user.user_id, &user_sealed).await?;
            write_request(&tx, &submission.request, &request_sealed).await
        }
        .await;

        match written {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("save_submission commit: {e}")))?;
                info!(
                    user_id = %submission.user.user_id,
                    request_id = %submission.request.request_id,
                    "Submission saved"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("save_submission rollback failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_name, contact_info FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_user: {e}"))),
        };
        let name: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("get_user row parse: {e}")))?;
        let contact: String = row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("get_user row parse: {e}")))?;
        let [user_name, contact_info] = self.codec.decrypt_fields([name.as_str(), contact.as_str()])?;

        Ok(Some(UserRecord {
            user_id: user_id.to_string(),
            user_name,
            contact_info,
        }))
    }

    async fn list_user_requests(
        &self,
        user_id: &str,
    ) -> Result<Vec<RequestRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT request_id, problem_description, contact_time FROM requests
                 WHERE user_id = ?1 ORDER BY rowid",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_user_requests: {e}")))?;

        let mut requests = Vec::new();
        loop {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_user_requests: {e}"))),
            };
            let parse = |e: libsql::Error| {
                DatabaseError::Query(format!("list_user_requests row parse: {e}"))
            };
            let request_id = text_value(&row, 0).map_err(parse)?;
            let problem: String = row.get(1).map_err(parse)?;
            let time: String = row.get(2).map_err(parse)?;
            let [problem_description, contact_time] =
                self.codec.decrypt_fields([problem.as_str(), time.as_str()])?;
            requests.push(RequestRecord {
                request_id,
                user_id: user_id.to_string(),
                problem_description,
                contact_time,
            });
        }
        Ok(requests)
    }

    async fn list_rows(&self, table: Table) -> Result<Vec<StoredRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM {table} ORDER BY rowid", column_list(table));
        let mut rows = self
            .conn()
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("list_rows({table}): {e}")))?;

        let mut out = Vec::new();
        loop {
            let row = match rows.next().await {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_rows({table}): {e}"))),
            };
            let mut columns = Vec::with_capacity(table.columns().len());
            for (idx, name) in table.columns().iter().enumerate() {
                let value = text_value(&row, idx as i32).map_err(|e| {
                    DatabaseError::Query(format!("list_rows({table}) row parse: {e}"))
                })?;
                columns.push((*name, value));
            }
            out.push(StoredRow { columns });
        }
        Ok(out)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> FieldCodec {
        FieldCodec::from_base64_key(&FieldCodec::generate_key()).unwrap()
    }

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory(test_codec()).await.unwrap()
    }

    fn user(id: &str, name: &str, phone: &str) -> UserRecord {
        UserRecord {
            user_id: id.into(),
            user_name: name.into(),
            contact_info: phone.into(),
        }
    }

    fn request(id: &str, user_id: &str, problem: &str) -> RequestRecord {
        RequestRecord {
            request_id: id.into(),
            user_id: user_id.into(),
            problem_description: problem.into(),
            contact_time: "tomorrow 10am".into(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_user() {
        let db = test_db().await;
        db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
            .await
            .unwrap();

        let fetched = db.get_user("U1").await.unwrap().unwrap();
        assert_eq!(fetched, user("U1", "Ann", "+79991234567"));
        assert!(db.get_user("U2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_user() {
        let db = test_db().await;
        db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
            .await
            .unwrap();
        db.upsert_user_record(&user("U1", "Anna", "89990000000"))
            .await
            .unwrap();

        let fetched = db.get_user("U1").await.unwrap().unwrap();
        assert_eq!(fetched.user_name, "Anna");
        assert_eq!(fetched.contact_info, "89990000000");
        assert_eq!(db.list_rows(Table::Users).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_keeps_existing_requests() {
        let db = test_db().await;
        db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
            .await
            .unwrap();
        db.insert_request_record(&request("r1", "U1", "printer broken"))
            .await
            .unwrap();
        db.upsert_user_record(&user("U1", "Ann", "89991234567"))
            .await
            .unwrap();

        assert_eq!(db.list_user_requests("U1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn columns_hold_ciphertext() {
        let db = test_db().await;
        db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
            .await
            .unwrap();
        db.insert_request_record(&request("r1", "U1", "printer broken"))
            .await
            .unwrap();

        let users = db.list_rows(Table::Users).await.unwrap();
        assert_eq!(users[0].get("user_id"), Some("U1"));
        assert_ne!(users[0].get("user_name"), Some("Ann"));
        assert_ne!(users[0].get("contact_info"), Some("+79991234567"));

        let requests = db.list_rows(Table::Requests).await.unwrap();
        assert_eq!(requests[0].get("request_id"), Some("r1"));
        assert_eq!(requests[0].get("user_id"), Some("U1"));
        assert_ne!(requests[0].get("problem_description"), Some("printer broken"));
    }

    #[tokio::test]
    async fn duplicate_request_id_is_constraint_error() {
        let db = test_db().await;
        db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
            .await
            .unwrap();
        db.insert_request_record(&request("r1", "U1", "first"))
            .await
            .unwrap();

        let err = db
            .insert_request_record(&request("r1", "U1", "second"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)), "got {err:?}");

        let requests = db.list_user_requests("U1").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].problem_description, "first");
    }

    #[tokio::test]
    async fn request_for_unknown_user_is_constraint_error() {
        let db = test_db().await;
        let err = db
            .insert_request_record(&request("r1", "ghost", "broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn save_submission_writes_both_rows() {
        let db = test_db().await;
        let submission = Submission {
            user: user("U1", "Ann", "+79991234567"),
            request: request("r1", "U1", "printer broken"),
        };
        db.save_submission(&submission).await.unwrap();

        assert_eq!(db.get_user("U1").await.unwrap().unwrap(), submission.user);
        assert_eq!(
            db.list_user_requests("U1").await.unwrap(),
            vec![submission.request.clone()]
        );
    }

    #[tokio::test]
    async fn failed_submission_rolls_back_user_upsert() {
        let db = test_db().await;
        db.save_submission(&Submission {
            user: user("U1", "Ann", "+79991234567"),
            request: request("r1", "U1", "first"),
        })
        .await
        .unwrap();

        let err = db
            .save_submission(&Submission {
                user: user("U1", "Bob", "89990000000"),
                request: request("r1", "U1", "second"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));

        let fetched = db.get_user("U1").await.unwrap().unwrap();
        assert_eq!(fetched.user_name, "Ann", "upsert must roll back with the insert");
    }

    #[tokio::test]
    async fn history_of_requests_is_preserved() {
        let db = test_db().await;
        for (rid, problem) in [("r1", "printer"), ("r2", "scanner")] {
            db.save_submission(&Submission {
                user: user("U1", "Ann", "+79991234567"),
                request: request(rid, "U1", problem),
            })
            .await
            .unwrap();
        }
        let problems: Vec<String> = db
            .list_user_requests("U1")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.problem_description)
            .collect();
        assert_eq!(problems, vec!["printer", "scanner"]);
    }

    #[tokio::test]
    async fn reading_with_another_key_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("intake.db");
        {
            let db = LibSqlBackend::new_local(&path, test_codec()).await.unwrap();
            db.upsert_user_record(&user("U1", "Ann", "+79991234567"))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path, test_codec()).await.unwrap();
        let err = db.get_user("U1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::Codec(_)));
    }

    #[tokio::test]
    async fn adopted_rows_with_integer_keys_are_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("legacy.db");
        let codec = test_codec();
        let [problem, time] = codec.encrypt_fields(["no wifi", "noon"]).unwrap();
        {
            let db = libsql::Builder::new_local(&path).build().await.unwrap();
            let conn = db.connect().unwrap();
            conn.execute_batch(
                "CREATE TABLE users (user_id PRIMARY KEY, user_name, contact_info);
                 CREATE TABLE requests (
                    request_id PRIMARY KEY,
                    user_id,
                    problem_description,
                    contact_time,
                    FOREIGN KEY(user_id) REFERENCES users(user_id));
                 INSERT INTO users VALUES ('42', 'x', 'y');",
            )
            .await
            .unwrap();
            conn.execute(
                "INSERT INTO requests VALUES (7, '42', ?1, ?2)",
                params![problem.as_str(), time.as_str()],
            )
            .await
            .unwrap();
        }

        let db = LibSqlBackend::new_local(&path, codec).await.unwrap();
        let requests = db.list_user_requests("42").await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_id, "7");
        assert_eq!(requests[0].problem_description, "no wifi");

        let rows = db.list_rows(Table::Requests).await.unwrap();
        assert_eq!(rows[0].get("request_id"), Some("7"));
    }

    #[tokio::test]
    async fn open_creates_directory_and_schema_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("dir").join("intake.db");
        let db = LibSqlBackend::new_local(&path, test_codec()).await.unwrap();
        assert!(path.exists());
        db.create_schema().await.unwrap();
        db.create_schema().await.unwrap();
    }
}
