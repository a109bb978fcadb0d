//! Database schema migrations for SQLite.
//!
//! A simple versioned migration system. Each migration transforms the schema
//! from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// Idempotent: it can be called on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: records and permissions.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per record version; payload is replaced in place on update
        CREATE TABLE records (
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            version_id INTEGER NOT NULL,
            capsule BLOB NOT NULL,
            ciphertext BLOB NOT NULL,
            updated_at INTEGER NOT NULL,    -- local write time (Unix ms)

            PRIMARY KEY (resource_type, resource_id, version_id)
        );

        -- Off-chain permission table
        CREATE TABLE permissions (
            subject_type INTEGER NOT NULL,  -- ledger code: 1=doctor, 2=patient, 3=assistant
            token_id INTEGER NOT NULL,
            scope_id INTEGER NOT NULL,
            grants BLOB NOT NULL,           -- canonical CBOR array of grant names
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (subject_type, token_id, scope_id)
        );
        "#,
    )?;

    Ok(())
}
