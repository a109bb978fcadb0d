//! SQLite implementation of the store traits.
//!
//! The primary storage backend. Uses rusqlite with bundled SQLite, wrapped in
//! async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use medledger_core::{
    decode_grants, grants_bytes, EncryptedBlob, PermissionKey, PermissionSet, Record,
    ResourceKey, SubjectType,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::traits::{PermissionStore, PutResult, RecordStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

fn version_to_sql(version_id: u64) -> Result<i64> {
    i64::try_from(version_id)
        .map_err(|_| StoreError::InvalidData(format!("version_id {} out of range", version_id)))
}

fn id_to_sql(name: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} {} out of range", name, value)))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let resource_type: String = row.get("resource_type")?;
    let resource_id: String = row.get("resource_id")?;
    let version_id: i64 = row.get("version_id")?;
    let capsule: Vec<u8> = row.get("capsule")?;
    let ciphertext: Vec<u8> = row.get("ciphertext")?;

    Ok(Record::new(
        ResourceKey::new(resource_type, resource_id, version_id as u64),
        EncryptedBlob::new(capsule, ciphertext),
    ))
}

fn row_to_permissions(row: &rusqlite::Row<'_>) -> Result<PermissionSet> {
    let code: u8 = row.get("subject_type")?;
    let token_id: i64 = row.get("token_id")?;
    let scope_id: i64 = row.get("scope_id")?;
    let grants: Vec<u8> = row.get("grants")?;

    let subject_type = SubjectType::from_ledger_code(code)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown subject type code {}", code)))?;
    let key = PermissionKey::new(subject_type, token_id as u64, scope_id as u64);

    Ok(PermissionSet::new(key, decode_grants(&grants)?))
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_record(&self, key: &ResourceKey) -> Result<Option<Record>> {
        let key = key.clone();
        let version = version_to_sql(key.version_id)?;

        self.run(move |conn| {
            let record = conn
                .query_row(
                    "SELECT * FROM records
                     WHERE resource_type = ?1 AND resource_id = ?2 AND version_id = ?3",
                    params![key.resource_type, key.resource_id, version],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn put_record(&self, record: &Record) -> Result<PutResult> {
        let record = record.clone();
        let version = version_to_sql(record.key.version_id)?;

        self.run(move |conn| {
            let key = &record.key;
            let updated = conn.execute(
                "UPDATE records SET capsule = ?4, ciphertext = ?5, updated_at = ?6
                 WHERE resource_type = ?1 AND resource_id = ?2 AND version_id = ?3",
                params![
                    key.resource_type,
                    key.resource_id,
                    version,
                    record.payload.capsule.as_ref(),
                    record.payload.ciphertext.as_ref(),
                    now_millis(),
                ],
            )?;
            if updated > 0 {
                return Ok(PutResult::Replaced);
            }

            conn.execute(
                "INSERT INTO records (
                    resource_type, resource_id, version_id, capsule, ciphertext, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.resource_type,
                    key.resource_id,
                    version,
                    record.payload.capsule.as_ref(),
                    record.payload.ciphertext.as_ref(),
                    now_millis(),
                ],
            )?;
            Ok(PutResult::Inserted)
        })
        .await
    }

    async fn has_record(&self, key: &ResourceKey) -> Result<bool> {
        let key = key.clone();
        let version = version_to_sql(key.version_id)?;

        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM records
                 WHERE resource_type = ?1 AND resource_id = ?2 AND version_id = ?3)",
                params![key.resource_type, key.resource_id, version],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn scan_records(&self) -> Result<Vec<Record>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM records")?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn record_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn get_permissions(&self, key: &PermissionKey) -> Result<Option<PermissionSet>> {
        let code = key.subject_type.ledger_code();
        let token_id = id_to_sql("token_id", key.token_id)?;
        let scope_id = id_to_sql("scope_id", key.scope_id)?;

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM permissions
                 WHERE subject_type = ?1 AND token_id = ?2 AND scope_id = ?3",
            )?;
            let mut rows = stmt.query(params![code, token_id, scope_id])?;
            match rows.next()? {
                Some(row) => row_to_permissions(row).map(Some),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_permissions(&self, set: &PermissionSet) -> Result<()> {
        let code = set.subject_type.ledger_code();
        let token_id = id_to_sql("token_id", set.token_id)?;
        let scope_id = id_to_sql("scope_id", set.scope_id)?;
        let grants = grants_bytes(&set.grants);

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO permissions (subject_type, token_id, scope_id, grants, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(subject_type, token_id, scope_id) DO UPDATE SET
                    grants = excluded.grants,
                    updated_at = excluded.updated_at",
                params![code, token_id, scope_id, grants, now_millis()],
            )?;
            Ok(())
        })
        .await
    }
}
