// SPDX-License-Identifier: MIT

//! The Persistence Core: a single-writer embedded
//! relational store with three cooperating stores — the idempotency
//! cache, the append-only run-event journal, and the per-namespace KV
//! surface — plus a storage-stats collector and canonical body hashing.

pub mod canonical;
pub mod error;
pub mod idempotency;
pub mod journal;
pub mod kv;
pub mod stats;
pub mod store;

pub use error::StorageError;
pub use idempotency::{IdempotencyRecord, IdempotencyStore};
pub use journal::JournalStore;
pub use kv::{KvStore, ScannedEntry};
pub use stats::StorageStats;
pub use store::{Store, StoreOptions};
