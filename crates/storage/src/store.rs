// SPDX-License-Identifier: MIT

//! The Persistence Core: a single-writer embedded relational store opened
//! with fixed pragmas and idempotent schema migrations.

use crate::error::StorageError;
use crate::idempotency::IdempotencyStore;
use crate::journal::JournalStore;
use crate::kv::KvStore;
use crate::stats::StorageStats;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Schema version bumped whenever a migration is added. Stored in
/// `core_schema_version` so repeated opens are cheap no-ops.
pub const SCHEMA_VERSION: i64 = 1;

/// Tunables for opening the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub data_dir: PathBuf,
    /// Page-count quota is derived from this divided by the page size.
    pub max_bytes: u64,
    /// Byte budget enforced by the Event Journal's own eviction logic.
    pub journal_max_bytes: u64,
    pub busy_timeout: Duration,
    /// `PRAGMA wal_autocheckpoint` page count.
    pub wal_autocheckpoint_pages: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            max_bytes: 256 * 1024 * 1024,
            journal_max_bytes: 64 * 1024 * 1024,
            busy_timeout: Duration::from_secs(5),
            wal_autocheckpoint_pages: 1000,
        }
    }
}

impl StoreOptions {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("flowd.db")
    }
}

/// The opened store: one shared connection guarded by a mutex, since the
/// store allows exactly one writer.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) opts: StoreOptions,
}

impl Store {
    /// Open (creating if absent) the store at `<data_dir>/flowd.db`,
    /// apply fixed pragmas, and run idempotent migrations.
    pub fn open(opts: StoreOptions) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&opts.data_dir)?;
        let conn = Connection::open(opts.db_path())?;
        configure_pragmas(&conn, &opts)?;
        run_migrations(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), opts })
    }

    /// An in-memory store for tests — same pragmas and migrations, no
    /// file on disk.
    pub fn open_in_memory(opts: StoreOptions) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn, &opts)?;
        run_migrations(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)), opts })
    }

    /// Drop this handle. SQLite connections close on `Drop`; this method
    /// exists so callers have an explicit lifecycle hook to log against.
    pub fn close(self) {
        tracing::debug!("closing persistence core");
    }

    pub fn journal(&self) -> JournalStore {
        JournalStore::new(self.conn.clone(), self.opts.journal_max_bytes)
    }

    pub fn idempotency(&self) -> IdempotencyStore {
        IdempotencyStore::new(self.conn.clone())
    }

    pub fn kv(&self) -> KvStore {
        KvStore::new(self.conn.clone())
    }

    /// `collect_storage_stats`: page accounting, journal
    /// payload bytes, schema version, and the `ok`/`eviction_active`
    /// heuristics.
    pub fn collect_storage_stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        let journal_bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM core_run_journal",
            [],
            |r| r.get(0),
        )?;
        let schema_version: i64 = conn.query_row(
            "SELECT version FROM core_schema_version LIMIT 1",
            [],
            |r| r.get(0),
        )?;
        drop(conn);

        let used_bytes = (page_count * page_size).max(0) as u64;
        let max_bytes = self.opts.max_bytes;
        let journal_bytes = journal_bytes.max(0) as u64;
        let used_ratio = if max_bytes > 0 { used_bytes as f64 / max_bytes as f64 } else { 0.0 };
        let eviction_active = used_ratio >= 0.90 || journal_bytes >= self.opts.journal_max_bytes;
        let ok = used_bytes <= max_bytes;

        Ok(StorageStats {
            page_count: page_count.max(0) as u64,
            page_size: page_size.max(0) as u64,
            used_bytes,
            max_bytes,
            journal_bytes,
            journal_max_bytes: self.opts.journal_max_bytes,
            schema_version,
            ok,
            eviction_active,
        })
    }
}

fn configure_pragmas(conn: &Connection, opts: &StoreOptions) -> Result<(), StorageError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "locking_mode", "EXCLUSIVE")?;
    conn.pragma_update(None, "wal_autocheckpoint", opts.wal_autocheckpoint_pages)?;
    conn.busy_timeout(opts.busy_timeout)?;

    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
    if page_size > 0 {
        let max_pages = (opts.max_bytes / page_size as u64).max(1);
        conn.pragma_update(None, "max_page_count", max_pages)?;
    }
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS core_schema_version (
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS core_idempotency (
            key TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            body_sha256 TEXT NOT NULL,
            status INTEGER NOT NULL,
            body BLOB NOT NULL,
            created_at INTEGER NOT NULL,
            ttl_expires_at INTEGER NOT NULL,
            PRIMARY KEY (key, endpoint)
        );
        CREATE INDEX IF NOT EXISTS idx_core_idempotency_ttl
            ON core_idempotency (ttl_expires_at);

        CREATE TABLE IF NOT EXISTS core_run_journal (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload BLOB NOT NULL,
            ts INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_core_run_journal_run_ts
            ON core_run_journal (run_id, ts);

        COMMIT;",
    )?;

    let has_version: i64 =
        conn.query_row("SELECT COUNT(*) FROM core_schema_version", [], |r| r.get(0))?;
    if has_version == 0 {
        conn.execute("INSERT INTO core_schema_version (version) VALUES (?1)", [SCHEMA_VERSION])?;
    }
    Ok(())
}

/// Build the literal table name for a KV namespace, following the
/// `core_kv_<namespace>` convention. Callers must validate the
/// namespace with `flowd_core::kv::is_valid_namespace` first — this
/// function does not re-validate, so it must never see attacker input.
pub(crate) fn kv_table_name(namespace: &str) -> String {
    format!("core_kv_{namespace}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_migrations_idempotently() {
        let store = Store::open_in_memory(StoreOptions::default()).unwrap();
        let stats = store.collect_storage_stats().unwrap();
        assert_eq!(stats.schema_version, SCHEMA_VERSION);

        // Re-running migrations against the same connection is a no-op.
        run_migrations(&store.conn.lock()).unwrap();
        let stats2 = store.collect_storage_stats().unwrap();
        assert_eq!(stats2.schema_version, SCHEMA_VERSION);
    }
}
