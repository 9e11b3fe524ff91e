//! SQLite cache backend.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use clamflow_common::{SwError, SwResult};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::{CacheBackend, RequestKey, ResponseSnapshot};

/// Database schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Namespaces persisted in a SQLite database.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Initialize or open the cache database at `path`.
    pub fn open(path: &Path) -> SwResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| SwError::storage(format!("Failed to open cache database: {}", e)))?;
        info!(path = %path.display(), "Cache database opened");
        Self::with_connection(conn)
    }

    /// A private database that disappears with the process.
    pub fn in_memory() -> SwResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> SwResult<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(storage_err)?;

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
                [],
                |row| row.get::<_, i32>(0).map(|count| count > 0),
            )
            .unwrap_or(false);

        let version: i32 = if table_exists {
            conn.query_row(
                "SELECT version FROM schema_version ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?
            .unwrap_or(0)
        } else {
            0
        };

        if version < SCHEMA_VERSION {
            migrate_database(&conn, version)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> SwResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SwError::storage("cache database lock poisoned"))
    }
}

fn storage_err(e: rusqlite::Error) -> SwError {
    SwError::storage(e.to_string())
}

/// Run database migrations
fn migrate_database(conn: &Connection, from_version: i32) -> SwResult<()> {
    if from_version < 1 {
        create_schema_v1(conn)?;
    }
    Ok(())
}

/// Create initial schema (version 1)
fn create_schema_v1(conn: &Connection) -> SwResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version INTEGER NOT NULL,
            applied_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS namespaces (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entries (
            namespace TEXT NOT NULL REFERENCES namespaces(name) ON DELETE CASCADE,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            response_url TEXT,
            status INTEGER NOT NULL,
            headers TEXT NOT NULL,
            body BLOB NOT NULL,
            cached_at INTEGER NOT NULL,
            PRIMARY KEY (namespace, method, url)
        );
        "#,
    )
    .map_err(|e| SwError::storage(format!("Failed to create schema: {}", e)))?;

    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?, ?)",
        params![SCHEMA_VERSION, Utc::now().timestamp()],
    )
    .map_err(storage_err)?;

    Ok(())
}

fn ensure_namespace(conn: &Connection, name: &str) -> SwResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO namespaces (name, created_at) VALUES (?, ?)",
        params![name, Utc::now().timestamp()],
    )
    .map_err(storage_err)?;
    Ok(())
}

impl CacheBackend for SqliteBackend {
    fn open(&self, name: &str) -> SwResult<()> {
        let conn = self.conn()?;
        ensure_namespace(&conn, name)
    }

    fn has(&self, name: &str) -> SwResult<bool> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM namespaces WHERE name = ?",
                params![name],
                |row| row.get::<_, i64>(0).map(|count| count > 0),
            )
            .map_err(storage_err)
    }

    fn names(&self) -> SwResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name FROM namespaces ORDER BY name")
            .map_err(storage_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(names)
    }

    fn delete(&self, name: &str) -> SwResult<bool> {
        let conn = self.conn()?;
        let deleted = conn
            .execute("DELETE FROM namespaces WHERE name = ?", params![name])
            .map_err(storage_err)?;
        Ok(deleted > 0)
    }

    fn get(&self, name: &str, key: &RequestKey) -> SwResult<Option<ResponseSnapshot>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT response_url, status, headers, body, cached_at FROM entries
                 WHERE namespace = ? AND method = ? AND url = ?",
                params![name, key.method, key.url],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, u16>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_err)?;

        match row {
            Some((url, status, headers, body, cached_at)) => Ok(Some(ResponseSnapshot {
                url,
                status,
                headers: serde_json::from_str(&headers)?,
                body,
                cached_at,
            })),
            None => Ok(None),
        }
    }

    fn put(&self, name: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> SwResult<()> {
        let headers = serde_json::to_string(&snapshot.headers)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(storage_err)?;
        ensure_namespace(&tx, name)?;
        tx.execute(
            "INSERT OR REPLACE INTO entries
             (namespace, method, url, response_url, status, headers, body, cached_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                name,
                key.method,
                key.url,
                snapshot.url,
                snapshot.status,
                headers,
                snapshot.body,
                snapshot.cached_at,
            ],
        )
        .map_err(storage_err)?;
        tx.commit().map_err(storage_err)
    }

    fn delete_entry(&self, name: &str, key: &RequestKey) -> SwResult<bool> {
        let deleted = self
            .conn()?
            .execute(
                "DELETE FROM entries WHERE namespace = ? AND method = ? AND url = ?",
                params![name, key.method, key.url],
            )
            .map_err(storage_err)?;
        Ok(deleted > 0)
    }

    fn keys(&self, name: &str) -> SwResult<Vec<RequestKey>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT method, url FROM entries WHERE namespace = ? ORDER BY url")
            .map_err(storage_err)?;
        let keys = stmt
            .query_map(params![name], |row| {
                Ok(RequestKey {
                    method: row.get(0)?,
                    url: row.get(1)?,
                })
            })
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;
        Ok(keys)
    }
}
