// SPDX-License-Identifier: MIT

//! Rule-Y KV: per-namespace tables, bounded entry sizes, byte quota,
//! lexicographic prefix scan with exclusive cursor.

use crate::error::StorageError;
use crate::store::kv_table_name;
use flowd_core::kv::{is_valid_namespace, next_prefix, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

#[derive(Clone)]
pub struct KvStore {
    conn: Arc<Mutex<Connection>>,
}

/// One row returned from a prefix scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub ts: i64,
}

impl KvStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn ensure_namespace(conn: &Connection, ns: &str) -> Result<(), StorageError> {
        if !is_valid_namespace(ns) {
            return Err(StorageError::InvalidNamespace(ns.to_string()));
        }
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (k BLOB PRIMARY KEY, v BLOB NOT NULL, ts INTEGER NOT NULL)",
                kv_table_name(ns)
            ),
            [],
        )?;
        Ok(())
    }

    /// Validate sizes, enforce the namespace byte budget (when
    /// `limit_bytes > 0`), and upsert.
    pub fn put(
        &self,
        ns: &str,
        key: &[u8],
        value: &[u8],
        limit_bytes: u64,
        ts: i64,
    ) -> Result<(), StorageError> {
        if key.len() > MAX_KEY_BYTES || value.len() > MAX_VALUE_BYTES {
            return Err(StorageError::EntryTooLarge);
        }
        let conn = self.conn.lock();
        Self::ensure_namespace(&conn, ns)?;
        let table = kv_table_name(ns);

        let existing_size: i64 = conn
            .query_row(
                &format!("SELECT LENGTH(k) + LENGTH(v) FROM {table} WHERE k = ?1"),
                params![key],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if limit_bytes > 0 {
            let current: i64 =
                conn.query_row(&format!("SELECT COALESCE(SUM(LENGTH(k) + LENGTH(v)), 0) FROM {table}"), [], |r| {
                    r.get(0)
                })?;
            let delta = (key.len() + value.len()) as i64 - existing_size;
            if current + delta > limit_bytes as i64 {
                return Err(StorageError::NamespaceQuota { namespace: ns.to_string() });
            }
        }

        conn.execute(
            &format!(
                "INSERT INTO {table} (k, v, ts) VALUES (?1, ?2, ?3)
                 ON CONFLICT(k) DO UPDATE SET v = excluded.v, ts = excluded.ts"
            ),
            params![key, value, ts],
        )?;
        Ok(())
    }

    /// Defensive copy of the stored value.
    pub fn get(&self, ns: &str, key: &[u8]) -> Result<Option<(Vec<u8>, i64)>, StorageError> {
        if !is_valid_namespace(ns) {
            return Err(StorageError::InvalidNamespace(ns.to_string()));
        }
        let conn = self.conn.lock();
        if !table_exists(&conn, &kv_table_name(ns))? {
            return Ok(None);
        }
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                &format!("SELECT v, ts FROM {} WHERE k = ?1", kv_table_name(ns)),
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    pub fn delete(&self, ns: &str, key: &[u8]) -> Result<bool, StorageError> {
        if !is_valid_namespace(ns) {
            return Err(StorageError::InvalidNamespace(ns.to_string()));
        }
        let conn = self.conn.lock();
        if !table_exists(&conn, &kv_table_name(ns))? {
            return Ok(false);
        }
        let affected =
            conn.execute(&format!("DELETE FROM {} WHERE k = ?1", kv_table_name(ns)), params![key])?;
        Ok(affected > 0)
    }

    /// Lexicographic ascending scan over `[prefix, next(prefix))`, with an
    /// exclusive `cursor` lower bound. Fetches `limit + 1` rows to detect
    /// whether a next cursor should be returned.
    pub fn scan(
        &self,
        ns: &str,
        prefix: &[u8],
        cursor: Option<&[u8]>,
        limit: usize,
    ) -> Result<(Vec<ScannedEntry>, Option<Vec<u8>>), StorageError> {
        if !is_valid_namespace(ns) {
            return Err(StorageError::InvalidNamespace(ns.to_string()));
        }
        let conn = self.conn.lock();
        let table = kv_table_name(ns);
        if !table_exists(&conn, &table)? {
            return Ok((Vec::new(), None));
        }

        let lower: Vec<u8> = match cursor {
            Some(c) if c > prefix => c.to_vec(),
            _ => prefix.to_vec(),
        };
        let upper = next_prefix(prefix);

        let fetch = limit + 1;
        let mut rows = Vec::new();
        let sql = match &upper {
            Some(_) => format!(
                "SELECT k, v, ts FROM {table} WHERE k > ?1 AND k < ?2 ORDER BY k ASC LIMIT ?3"
            ),
            None => format!("SELECT k, v, ts FROM {table} WHERE k > ?1 ORDER BY k ASC LIMIT ?2"),
        };
        let mut stmt = conn.prepare(&sql)?;
        let mut result_rows = match &upper {
            Some(u) => stmt.query(params![lower, u, fetch as i64])?,
            None => stmt.query(params![lower, fetch as i64])?,
        };
        while let Some(row) = result_rows.next()? {
            rows.push(ScannedEntry { key: row.get(0)?, value: row.get(1)?, ts: row.get(2)? });
        }

        if rows.len() > limit {
            rows.truncate(limit);
            let next_cursor = rows.last().map(|e| e.key.clone());
            Ok((rows, next_cursor))
        } else {
            Ok((rows, None))
        }
    }

    /// Total bytes of keys plus values currently stored under `ns`.
    pub fn namespace_size(&self, ns: &str) -> Result<u64, StorageError> {
        if !is_valid_namespace(ns) {
            return Err(StorageError::InvalidNamespace(ns.to_string()));
        }
        let conn = self.conn.lock();
        let table = kv_table_name(ns);
        if !table_exists(&conn, &table)? {
            return Ok(0);
        }
        let size: i64 =
            conn.query_row(&format!("SELECT COALESCE(SUM(LENGTH(k) + LENGTH(v)), 0) FROM {table}"), [], |r| {
                r.get(0)
            })?;
        Ok(size.max(0) as u64)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let exists: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |r| r.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}
