// SPDX-License-Identifier: MIT

//! In-memory source registry, mirroring
//! `flowd_core::run`'s treatment of the run store.

use crate::error::SourceError;
use flowd_core::Source;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
pub struct SourceStore {
    inner: RwLock<HashMap<String, Source>>,
}

impl SourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, source: Source) {
        self.inner.write().insert(source.name.clone(), source);
    }

    pub fn get(&self, name: &str) -> Option<Source> {
        self.inner.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<Source, SourceError> {
        self.get(name).ok_or_else(|| SourceError::NotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.inner.read().values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    /// Remove a source record. Cached files on disk are left in place;
    /// deletion only drops the registry entry.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.write().remove(name).is_some()
    }
}
