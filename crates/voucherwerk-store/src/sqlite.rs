// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable object store and leases backed by a single SQLite file.
//
// Schema:
//   objects(
//     key        TEXT    PRIMARY KEY,
//     data       BLOB    NOT NULL,
//     size       INTEGER NOT NULL,
//     metadata   TEXT    NOT NULL,   -- JSON object of string → string
//     updated_at TEXT    NOT NULL    -- RFC 3339
//   )
//   leases(
//     key        TEXT    PRIMARY KEY,
//     holder     TEXT    NOT NULL,   -- provider instance UUID
//     expires_at INTEGER NOT NULL    -- Unix milliseconds
//   )

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use voucherwerk_core::Metadata;
use voucherwerk_core::error::{Result, VoucherwerkError};

use crate::lease::{LeaseGuard, LeaseProvider};
use crate::store::{ObjectHead, ObjectStore};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS objects (
        key        TEXT    PRIMARY KEY,
        data       BLOB    NOT NULL,
        size       INTEGER NOT NULL,
        metadata   TEXT    NOT NULL,
        updated_at TEXT    NOT NULL
    )
"#;

const CREATE_LEASES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS leases (
        key        TEXT    PRIMARY KEY,
        holder     TEXT    NOT NULL,
        expires_at INTEGER NOT NULL
    )
"#;

/// How long a connection waits on another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert a `rusqlite::Error` into a `VoucherwerkError::Database`.
fn db_err(e: rusqlite::Error) -> VoucherwerkError {
    VoucherwerkError::Database(e.to_string())
}

/// Object store persisted in SQLite.
///
/// `rusqlite::Connection` is not `Sync`, so access is serialised through a
/// mutex. Promotion runs in one transaction.
pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
}

impl SqliteObjectStore {
    /// Open (or create) the store at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_shared(path.as_ref())?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| VoucherwerkError::Database(format!("create table: {e}")))?;

        info!("object store database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VoucherwerkError::Database(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| VoucherwerkError::Database(format!("create table: {e}")))?;
        debug!("in-memory object store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VoucherwerkError::Storage("sqlite connection lock poisoned".into()))
    }
}

/// Open a connection that other processes may share: WAL journal, and a busy
/// timeout so concurrent writers queue instead of failing.
fn open_shared(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|e| VoucherwerkError::Database(format!("open: {e}")))?;

    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| VoucherwerkError::Database(format!("busy timeout: {e}")))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| VoucherwerkError::Database(format!("WAL pragma: {e}")))?;

    Ok(conn)
}

impl ObjectStore for SqliteObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.conn()?
            .query_row("SELECT data FROM objects WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| VoucherwerkError::NotFound(key.to_owned()))
    }

    #[instrument(skip(self, bytes, metadata), fields(len = bytes.len()))]
    fn put(&self, key: &str, bytes: &[u8], metadata: &Metadata) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata)?;
        self.conn()?
            .execute(
                "INSERT INTO objects (key, data, size, metadata, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    data = excluded.data,
                    size = excluded.size,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at",
                params![
                    key,
                    bytes,
                    bytes.len() as i64,
                    metadata_json,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(|e| VoucherwerkError::Database(format!("put {key}: {e}")))?;
        debug!("object stored");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT key FROM objects
                 WHERE substr(key, 1, length(?1)) = ?1
                 ORDER BY key",
            )
            .map_err(|e| VoucherwerkError::Database(format!("prepare list: {e}")))?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(keys)
    }

    fn head(&self, key: &str) -> Result<ObjectHead> {
        let row = self
            .conn()?
            .query_row(
                "SELECT size, metadata FROM objects WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let (size, metadata_json) = row.ok_or_else(|| VoucherwerkError::NotFound(key.to_owned()))?;
        Ok(ObjectHead {
            size: size as u64,
            metadata: serde_json::from_str(&metadata_json)?,
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM objects WHERE key = ?1", params![key])
            .map_err(|e| VoucherwerkError::Database(format!("delete {key}: {e}")))?;
        Ok(())
    }

    #[instrument(skip_all, fields(count = moves.len()))]
    fn promote(&self, moves: &[(String, String)]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        for (staged, final_key) in moves {
            tx.execute("DELETE FROM objects WHERE key = ?1", params![final_key])
                .map_err(db_err)?;
            let moved = tx
                .execute(
                    "UPDATE objects SET key = ?2, updated_at = ?3 WHERE key = ?1",
                    params![staged, final_key, Utc::now().to_rfc3339()],
                )
                .map_err(db_err)?;
            if moved == 0 {
                // Dropping `tx` rolls back the earlier renames.
                return Err(VoucherwerkError::NotFound(staged.clone()));
            }
        }
        tx.commit().map_err(db_err)?;
        debug!("staged objects promoted");
        Ok(())
    }
}

/// Leases recorded in the `leases` table, so they hold across processes that
/// open the same database file.
///
/// A lease row carries an expiry, so a holder that dies without releasing
/// blocks its key for at most `ttl`.
pub struct SqliteLeaseProvider {
    conn: Mutex<Connection>,
    holder: String,
    ttl: Duration,
    poll_interval: Duration,
}

impl SqliteLeaseProvider {
    /// Default lifetime of a lease row that is never released.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// Open (or create) the lease table in the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_shared(path.as_ref())?;
        conn.execute_batch(CREATE_LEASES_SQL)
            .map_err(|e| VoucherwerkError::Database(format!("create leases table: {e}")))?;

        let holder = Uuid::new_v4().to_string();
        info!(holder, "lease table opened");
        Ok(Self {
            conn: Mutex::new(conn),
            holder,
            ttl: Self::DEFAULT_TTL,
            poll_interval: Duration::from_millis(20),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VoucherwerkError::Storage("lease connection lock poisoned".into()))
    }

    /// Clear an expired row for `key`, then try to insert ours.
    fn try_claim(&self, key: &str) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX));
        let conn = self.conn()?;
        let reclaimed = conn
            .execute(
                "DELETE FROM leases WHERE key = ?1 AND expires_at < ?2",
                params![key, now],
            )
            .map_err(db_err)?;
        if reclaimed > 0 {
            warn!(key, "expired lease reclaimed");
        }
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO leases (key, holder, expires_at) VALUES (?1, ?2, ?3)",
                params![key, self.holder, expires_at],
            )
            .map_err(db_err)?;
        Ok(inserted == 1)
    }
}

impl std::fmt::Debug for SqliteLeaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLeaseProvider")
            .field("holder", &self.holder)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl LeaseProvider for SqliteLeaseProvider {
    fn acquire(&self, key: &str, timeout: Duration) -> Result<LeaseGuard<'_>> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_claim(key)? {
                debug!(key, holder = %self.holder, "lease acquired");
                return Ok(LeaseGuard::new(self, key));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(key, ?timeout, "lease wait timed out");
                return Err(VoucherwerkError::LeaseTimeout(key.to_owned()));
            }
            thread::sleep(remaining.min(self.poll_interval));
        }
    }

    fn release(&self, key: &str) {
        let released = self.conn().and_then(|conn| {
            conn.execute(
                "DELETE FROM leases WHERE key = ?1 AND holder = ?2",
                params![key, self.holder],
            )
            .map_err(db_err)
        });
        match released {
            Ok(_) => debug!(key, "lease released"),
            Err(err) => warn!(key, error = %err, "lease row not removed; it expires on its own"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc_no: &str) -> Metadata {
        Metadata::from([("document-no".to_string(), doc_no.to_string())])
    }

    #[test]
    fn put_get_head_round_trip() {
        let store = SqliteObjectStore::open_in_memory().unwrap();
        store.put("v/a.pdf", b"%PDF-1.4", &meta("MPU01-1")).unwrap();

        assert_eq!(store.get("v/a.pdf").unwrap(), b"%PDF-1.4");
        let head = store.head("v/a.pdf").unwrap();
        assert_eq!(head.size, 8);
        assert_eq!(head.metadata, meta("MPU01-1"));
    }

    #[test]
    fn put_replaces_existing() {
        let store = SqliteObjectStore::open_in_memory().unwrap();
        store.put("k", b"one", &meta("A")).unwrap();
        store.put("k", b"three", &meta("B")).unwrap();
        assert_eq!(store.get("k").unwrap(), b"three");
        assert_eq!(store.head("k").unwrap().metadata["document-no"], "B");
    }

    #[test]
    fn list_by_prefix() {
        let store = SqliteObjectStore::open_in_memory().unwrap();
        for key in ["p/2", "p/1", "q/1", "p_other"] {
            store.put(key, b"x", &Metadata::new()).unwrap();
        }
        assert_eq!(store.list("p/").unwrap(), vec!["p/1", "p/2"]);
    }

    #[test]
    fn promote_rolls_back_on_missing_stage() {
        let store = SqliteObjectStore::open_in_memory().unwrap();
        store.put("s/1", b"new", &Metadata::new()).unwrap();
        store.put("final", b"old", &Metadata::new()).unwrap();

        let moves = vec![
            ("s/1".to_string(), "final".to_string()),
            ("s/2".to_string(), "other".to_string()),
        ];
        assert!(matches!(store.promote(&moves), Err(VoucherwerkError::NotFound(_))));
        assert_eq!(store.get("final").unwrap(), b"old");
        assert_eq!(store.get("s/1").unwrap(), b"new");

        store.promote(&moves[..1]).unwrap();
        assert_eq!(store.get("final").unwrap(), b"new");
        assert!(!store.exists("s/1").unwrap());
    }

    #[test]
    fn lease_holds_across_connections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("objects.db");
        let first = SqliteLeaseProvider::open(&path).unwrap();
        let second = SqliteLeaseProvider::open(&path).unwrap();
        assert_ne!(first.holder(), second.holder());

        let guard = first.acquire("v/a.pdf", Duration::ZERO).unwrap();
        let err = second.acquire("v/a.pdf", Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, VoucherwerkError::LeaseTimeout(key) if key == "v/a.pdf"));
        let _other = second.acquire("v/b.pdf", Duration::ZERO).unwrap();

        drop(guard);
        let _taken = second.acquire("v/a.pdf", Duration::ZERO).unwrap();
    }

    #[test]
    fn waiter_gets_lease_once_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("objects.db");
        let first = SqliteLeaseProvider::open(&path).unwrap();
        let second = SqliteLeaseProvider::open(&path).unwrap();

        let guard = first.acquire("k", Duration::ZERO).unwrap();
        thread::scope(|scope| {
            let waiter = scope.spawn(|| second.acquire("k", Duration::from_secs(5)).map(|_| ()));
            thread::sleep(Duration::from_millis(60));
            drop(guard);
            waiter.join().unwrap().unwrap();
        });
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("objects.db");
        let crashed = SqliteLeaseProvider::open(&path)
            .unwrap()
            .with_ttl(Duration::from_millis(1));
        std::mem::forget(crashed.acquire("k", Duration::ZERO).unwrap());
        thread::sleep(Duration::from_millis(10));

        let next = SqliteLeaseProvider::open(&path).unwrap();
        let _guard = next.acquire("k", Duration::from_millis(100)).unwrap();
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("objects.db");
        {
            let store = SqliteObjectStore::open(&path).unwrap();
            store.put("v/x.pdf", b"persisted", &meta("REC01-9")).unwrap();
        }
        let store = SqliteObjectStore::open(&path).unwrap();
        assert_eq!(store.get("v/x.pdf").unwrap(), b"persisted");
        store.delete("v/x.pdf").unwrap();
        assert!(matches!(store.get("v/x.pdf"), Err(VoucherwerkError::NotFound(_))));
    }
}
