// SPDX-License-Identifier: MIT

//! The Idempotency Store: content-hashed, endpoint- and principal-scoped
//! replay cache with TTL.

use crate::error::StorageError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// A stored idempotent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub body: Vec<u8>,
    pub status: u16,
    pub body_sha256: String,
}

#[derive(Clone)]
pub struct IdempotencyStore {
    conn: Arc<Mutex<Connection>>,
}

impl IdempotencyStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// `scoped_key = hex(sha256(principal_id)) || ":" || raw_key`
    pub fn scope_key(principal_id: &str, raw_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(principal_id.as_bytes());
        let digest = hasher.finalize();
        format!("{}:{}", hex::encode(digest), raw_key)
    }

    /// `raw_key` shape required before scoping: `^[A-Za-z0-9_-]{20,128}$`.
    pub fn is_valid_raw_key(raw_key: &str) -> bool {
        let len = raw_key.len();
        (20..=128).contains(&len)
            && raw_key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    /// Look up a replay candidate, deleting and reporting not-found if
    /// the TTL has lapsed.
    pub fn lookup(
        &self,
        scoped_key: &str,
        endpoint: &str,
        now: i64,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, i64, String, i64)> = conn
            .query_row(
                "SELECT body, status, body_sha256, ttl_expires_at FROM core_idempotency
                 WHERE key = ?1 AND endpoint = ?2",
                params![scoped_key, endpoint],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .optional()?;

        let Some((body, status, body_sha256, ttl_expires_at)) = row else {
            return Ok(None);
        };

        if ttl_expires_at > 0 && now > ttl_expires_at {
            conn.execute(
                "DELETE FROM core_idempotency WHERE key = ?1 AND endpoint = ?2",
                params![scoped_key, endpoint],
            )?;
            tracing::debug!(scoped_key, endpoint, "idempotency entry evicted by ttl");
            return Ok(None);
        }

        Ok(Some(IdempotencyRecord { body, status: status as u16, body_sha256 }))
    }

    /// Upsert on `(key, endpoint)`.
    pub fn store(
        &self,
        scoped_key: &str,
        endpoint: &str,
        body_sha256: &str,
        status: u16,
        body: &[u8],
        created_at: i64,
        expires_at: i64,
    ) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO core_idempotency (key, endpoint, body_sha256, status, body, created_at, ttl_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(key, endpoint) DO UPDATE SET
                body_sha256 = excluded.body_sha256,
                status = excluded.status,
                body = excluded.body,
                created_at = excluded.created_at,
                ttl_expires_at = excluded.ttl_expires_at",
            params![scoped_key, endpoint, body_sha256, status as i64, body, created_at, expires_at],
        )?;
        Ok(())
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreOptions};

    fn store() -> Store {
        Store::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn raw_key_shape_enforced() {
        assert!(IdempotencyStore::is_valid_raw_key("aaaaaaaaaaaaaaaaaaaa"));
        assert!(!IdempotencyStore::is_valid_raw_key("tooshort"));
        assert!(!IdempotencyStore::is_valid_raw_key("has a space aaaaaaaaaa"));
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let store = store();
        let idem = store.idempotency();
        let scoped = IdempotencyStore::scope_key("alice", "aaaaaaaaaaaaaaaaaaaa");
        idem.store(&scoped, "POST /runs", "deadbeef", 201, b"{}", 0, 0).unwrap();
        let found = idem.lookup(&scoped, "POST /runs", 100).unwrap().unwrap();
        assert_eq!(found.status, 201);
        assert_eq!(found.body_sha256, "deadbeef");
    }

    #[test]
    fn ttl_expiry_evicts_and_reports_not_found() {
        let store = store();
        let idem = store.idempotency();
        let scoped = IdempotencyStore::scope_key("alice", "aaaaaaaaaaaaaaaaaaaa");
        idem.store(&scoped, "POST /runs", "deadbeef", 201, b"{}", 0, 50).unwrap();
        assert!(idem.lookup(&scoped, "POST /runs", 100).unwrap().is_none());
        // deleted: a second lookup also reports not-found, not an error
        assert!(idem.lookup(&scoped, "POST /runs", 100).unwrap().is_none());
    }

    #[test]
    fn different_principal_is_scoped_independently() {
        let a = IdempotencyStore::scope_key("alice", "aaaaaaaaaaaaaaaaaaaa");
        let b = IdempotencyStore::scope_key("bob", "aaaaaaaaaaaaaaaaaaaa");
        assert_ne!(a, b);
    }
}
