// SPDX-License-Identifier: MIT

//! In-memory run registry and cancellation signaling. Runs themselves are not persisted beyond process lifetime —
//! only their journaled events survive a restart.

use crate::error::ControllerError;
use flowd_core::run::{Run, RunId, RunStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Pagination request for `GET /runs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunPage {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<RunId, Run>>,
    cancellations: RwLock<HashMap<RunId, CancellationToken>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, run: Run) {
        self.runs.write().insert(run.id.clone(), run);
    }

    pub fn get(&self, id: &RunId) -> Option<Run> {
        self.runs.read().get(id).cloned()
    }

    pub fn require(&self, id: &RunId) -> Result<Run, ControllerError> {
        self.get(id).ok_or_else(|| ControllerError::RunNotFound(id.to_string()))
    }

    /// Apply `f` to the stored run under the write lock, returning
    /// whatever `f` returns. Used for status transitions so read-modify-
    /// write races between the executor and a concurrent cancel request
    /// can't interleave.
    pub fn update<F, T>(&self, id: &RunId, f: F) -> Result<T, ControllerError>
    where
        F: FnOnce(&mut Run) -> T,
    {
        let mut runs = self.runs.write();
        let run = runs.get_mut(id).ok_or_else(|| ControllerError::RunNotFound(id.to_string()))?;
        Ok(f(run))
    }

    /// List runs newest-first, optionally filtered by status, with
    /// offset/limit pagination.
    pub fn list(&self, status: Option<RunStatus>, page: RunPage) -> (Vec<Run>, usize) {
        let runs = self.runs.read();
        let mut matching: Vec<&Run> = runs
            .values()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.to_string().cmp(&a.id.to_string())));
        let total = matching.len();
        let limit = if page.limit == 0 { total } else { page.limit };
        let page_items = matching.into_iter().skip(page.offset).take(limit).cloned().collect();
        (page_items, total)
    }

    /// Register a fresh cancellation token for a run about to execute.
    pub fn register_cancellation(&self, id: &RunId) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellations.write().insert(id.clone(), token.clone());
        token
    }

    /// Signal cancellation, if the run still has an active token. Returns
    /// `true` if a token was found and canceled.
    pub fn cancel(&self, id: &RunId) -> bool {
        match self.cancellations.read().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn clear_cancellation(&self, id: &RunId) {
        self.cancellations.write().remove(id);
    }

    /// Signal every still-active run, for graceful shutdown.
    pub fn cancel_all(&self) {
        for token in self.cancellations.read().values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_core::run::Executor;

    fn run() -> Run {
        Run::new(RunId::new(), "demo", Executor::Host, 0)
    }

    #[test]
    fn require_missing_run_is_not_found() {
        let store = RunStore::new();
        let err = store.require(&RunId::new()).unwrap_err();
        assert!(matches!(err, ControllerError::RunNotFound(_)));
    }

    #[test]
    fn update_mutates_in_place() {
        let store = RunStore::new();
        let r = run();
        let id = r.id.clone();
        store.insert(r);
        store.update(&id, |r| r.transition(RunStatus::Running, 1)).unwrap();
        assert_eq!(store.require(&id).unwrap().status, RunStatus::Running);
    }

    #[test]
    fn list_filters_by_status_and_paginates() {
        let store = RunStore::new();
        for i in 0..3 {
            let mut r = run();
            r.started_at = i;
            if i == 1 {
                r.transition(RunStatus::Running, i);
            }
            store.insert(r);
        }
        let (running, total) = store.list(Some(RunStatus::Running), RunPage::default());
        assert_eq!(running.len(), 1);
        assert_eq!(total, 1);

        let (page, total_all) = store.list(None, RunPage { offset: 1, limit: 1 });
        assert_eq!(page.len(), 1);
        assert_eq!(total_all, 3);
    }

    #[test]
    fn cancel_signals_registered_token() {
        let store = RunStore::new();
        let id = RunId::new();
        let token = store.register_cancellation(&id);
        assert!(!token.is_cancelled());
        assert!(store.cancel(&id));
        assert!(token.is_cancelled());
        assert!(!store.cancel(&RunId::new()));
    }

    #[test]
    fn cancel_all_signals_every_registered_token() {
        let store = RunStore::new();
        let a = store.register_cancellation(&RunId::new());
        let b = store.register_cancellation(&RunId::new());
        store.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }
}
