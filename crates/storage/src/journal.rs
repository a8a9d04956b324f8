// SPDX-License-Identifier: MIT

//! The Event Journal: append-only, globally monotonic, byte-budget FIFO
//! eviction.

use crate::error::StorageError;
use flowd_core::JournalEntry;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

#[derive(Clone)]
pub struct JournalStore {
    conn: Arc<Mutex<Connection>>,
    max_bytes: u64,
}

impl JournalStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, max_bytes: u64) -> Self {
        Self { conn, max_bytes }
    }

    /// Append one event. Fails with `QuotaExceeded` before touching the
    /// table if the payload alone exceeds the budget; otherwise evicts
    /// the lowest `seq` rows (oldest-first) until there is room, then
    /// inserts inside the same transaction.
    pub fn append(
        &self,
        run_id: &str,
        event_type: &str,
        payload: &[u8],
        ts: i64,
    ) -> Result<JournalEntry, StorageError> {
        if run_id.is_empty() {
            return Err(StorageError::Validation("run_id must be non-empty".into()));
        }
        if payload.is_empty() {
            return Err(StorageError::Validation("payload must be non-empty".into()));
        }
        if payload.len() as u64 > self.max_bytes {
            return Err(StorageError::QuotaExceeded);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut existing: i64 =
            tx.query_row("SELECT COALESCE(SUM(LENGTH(payload)), 0) FROM core_run_journal", [], |r| {
                r.get(0)
            })?;

        let incoming = payload.len() as i64;
        while existing + incoming > self.max_bytes as i64 {
            let evicted: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT seq, LENGTH(payload) FROM core_run_journal ORDER BY seq ASC LIMIT 1",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            match evicted {
                Some((seq, size)) => {
                    tx.execute("DELETE FROM core_run_journal WHERE seq = ?1", params![seq])?;
                    existing -= size;
                    tracing::debug!(evicted_seq = seq, eviction_bytes = size, "journal eviction");
                }
                None => break,
            }
        }

        tx.execute(
            "INSERT INTO core_run_journal (run_id, event_type, payload, ts) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, event_type, payload, ts],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        Ok(JournalEntry { seq, run_id: run_id.to_string(), event_type: event_type.to_string(), payload: payload.to_vec(), ts })
    }

    /// `(earliest, latest)` retained sequence for a run; `0` means no
    /// entries retained.
    pub fn bounds(&self, run_id: &str) -> Result<(i64, i64), StorageError> {
        let conn = self.conn.lock();
        let row: (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(seq), MAX(seq) FROM core_run_journal WHERE run_id = ?1",
            params![run_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((row.0.unwrap_or(0), row.1.unwrap_or(0)))
    }

    /// Iterate rows for `run_id` with `seq > after_seq` in ascending
    /// order. `f` may stop iteration by returning `Err`, which is then
    /// surfaced to the caller.
    pub fn for_each<F>(&self, run_id: &str, after_seq: i64, mut f: F) -> Result<(), StorageError>
    where
        F: FnMut(&JournalEntry) -> Result<(), StorageError>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, run_id, event_type, payload, ts FROM core_run_journal
             WHERE run_id = ?1 AND seq > ?2 ORDER BY seq ASC",
        )?;
        let mut rows = stmt.query(params![run_id, after_seq])?;
        while let Some(row) = rows.next()? {
            let entry = JournalEntry {
                seq: row.get(0)?,
                run_id: row.get(1)?,
                event_type: row.get(2)?,
                payload: row.get(3)?,
                ts: row.get(4)?,
            };
            f(&entry)?;
        }
        Ok(())
    }

    /// `(earliest, latest)` retained sequence across every run, for the
    /// global `/events` subscription whose cursor spans the whole
    /// journal rather than a single run.
    pub fn global_bounds(&self) -> Result<(i64, i64), StorageError> {
        let conn = self.conn.lock();
        let row: (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(seq), MAX(seq) FROM core_run_journal",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok((row.0.unwrap_or(0), row.1.unwrap_or(0)))
    }

    /// Iterate every run's rows with `seq > after_seq` in ascending
    /// order, for global SSE replay.
    pub fn for_each_all<F>(&self, after_seq: i64, mut f: F) -> Result<(), StorageError>
    where
        F: FnMut(&JournalEntry) -> Result<(), StorageError>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT seq, run_id, event_type, payload, ts FROM core_run_journal
             WHERE seq > ?1 ORDER BY seq ASC",
        )?;
        let mut rows = stmt.query(params![after_seq])?;
        while let Some(row) = rows.next()? {
            let entry = JournalEntry {
                seq: row.get(0)?,
                run_id: row.get(1)?,
                event_type: row.get(2)?,
                payload: row.get(3)?,
                ts: row.get(4)?,
            };
            f(&entry)?;
        }
        Ok(())
    }

    /// Parse an SSE `Last-Event-ID` / cursor string.
    pub fn parse_event_id(s: &str) -> Result<i64, StorageError> {
        flowd_core::journal::parse_event_id(s)
            .map_err(|e| StorageError::MalformedCursor(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreOptions};

    fn store_with_budget(max_bytes: u64) -> Store {
        let opts = StoreOptions { journal_max_bytes: max_bytes, ..StoreOptions::default() };
        Store::open_in_memory(opts).unwrap()
    }

    #[test]
    fn monotonic_sequence_across_appends() {
        let store = store_with_budget(1024);
        let journal = store.journal();
        let e1 = journal.append("run-1", "step.log", b"a", 1).unwrap();
        let e2 = journal.append("run-1", "step.log", b"b", 2).unwrap();
        assert!(e2.seq > e1.seq);
    }

    #[test]
    fn quota_admission_rejects_oversized_payload_without_evicting() {
        let store = store_with_budget(10);
        let journal = store.journal();
        journal.append("run-1", "step.log", b"hello", 1).unwrap();
        let err = journal.append("run-1", "step.log", &vec![0u8; 20], 2).unwrap_err();
        assert!(err.is_quota_exceeded());
        // the prior entry must still be there — no eviction happened for
        // an append that can never succeed.
        let (earliest, latest) = journal.bounds("run-1").unwrap();
        assert_eq!(earliest, latest);
    }

    #[test]
    fn eviction_is_fifo_and_keeps_contiguous_suffix() {
        let store = store_with_budget(30);
        let journal = store.journal();
        journal.append("run-1", "step.log", br#"{"m":"alpha"}"#, 1).unwrap();
        let second = journal.append("run-1", "step.log", br#"{"m":"bravo"}"#, 2).unwrap();

        let mut seen = Vec::new();
        journal.for_each("run-1", 0, |e| {
            seen.push(e.seq);
            Ok(())
        }).unwrap();
        assert_eq!(seen, vec![second.seq]);
        assert_eq!(journal.bounds("run-1").unwrap(), (second.seq, second.seq));
    }

    #[test]
    fn for_each_scopes_to_run_and_after_seq() {
        let store = store_with_budget(1024);
        let journal = store.journal();
        journal.append("run-1", "a", b"1", 1).unwrap();
        journal.append("run-2", "a", b"1", 1).unwrap();
        let e3 = journal.append("run-1", "a", b"1", 2).unwrap();

        let mut seen = Vec::new();
        journal.for_each("run-1", 0, |e| {
            seen.push(e.seq);
            Ok(())
        }).unwrap();
        assert_eq!(seen.len(), 2);

        let mut after = Vec::new();
        journal.for_each("run-1", seen[0], |e| {
            after.push(e.seq);
            Ok(())
        }).unwrap();
        assert_eq!(after, vec![e3.seq]);
    }

    #[test]
    fn global_bounds_and_for_each_all_span_every_run() {
        let store = store_with_budget(1024);
        let journal = store.journal();
        let e1 = journal.append("run-1", "a", b"1", 1).unwrap();
        let e2 = journal.append("run-2", "a", b"1", 2).unwrap();
        let e3 = journal.append("run-1", "a", b"1", 3).unwrap();

        assert_eq!(journal.global_bounds().unwrap(), (e1.seq, e3.seq));

        let mut seen = Vec::new();
        journal.for_each_all(0, |e| {
            seen.push(e.seq);
            Ok(())
        }).unwrap();
        assert_eq!(seen, vec![e1.seq, e2.seq, e3.seq]);

        let mut after = Vec::new();
        journal.for_each_all(e2.seq, |e| {
            after.push(e.run_id.clone());
            Ok(())
        }).unwrap();
        assert_eq!(after, vec!["run-1".to_string()]);
    }
}
