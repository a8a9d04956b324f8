// SPDX-License-Identifier: MIT

//! Shared server state: the storage handles, in-memory registries, event
//! plane, and process collaborators every route handler needs.

use crate::config::Config;
use crate::metrics::Metrics;
use flowd_adapters::{ContainerRuntime, GitClient, ImageVerifier};
use flowd_core::{Clock, SystemClock};
use flowd_engine::{JobCatalog, JournalSink, LiveHub, RunStore};
use flowd_policy::PolicyBundle;
use flowd_sources::{GitAllow, SourceStore};
use flowd_storage::Store;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub runs: RunStore,
    pub sources: SourceStore,
    pub catalog: RwLock<JobCatalog>,
    pub hub: Arc<LiveHub>,
    pub journal_sink: JournalSink,
    pub policy: RwLock<PolicyBundle>,
    pub clock: SystemClock,
    pub container_runtime: Arc<dyn ContainerRuntime>,
    pub image_verifier: Arc<dyn ImageVerifier>,
    pub git_client: Arc<dyn GitClient>,
    pub local_allow_roots: Vec<PathBuf>,
    pub git_allow: Vec<GitAllow>,
    pub oci_cache_root: PathBuf,
    pub git_checkout_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub metrics: Metrics,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn now_ms(&self) -> i64 {
        self.clock.epoch_ms()
    }

    /// Rebuild the job catalog from every registered source and swap it
    /// in. Returns the number of
    /// directories/config files skipped along the way, which callers
    /// surface via the `x-flowd-discovery-errors` header on `GET /jobs`.
    pub fn refresh_catalog(&self) -> usize {
        match flowd_engine::rebuild(&self.sources) {
            Ok(catalog) => {
                let errors = catalog.discovery_errors();
                *self.catalog.write() = catalog;
                errors
            }
            Err(e) => {
                tracing::warn!(error = %e, "discovery refresh failed, keeping previous catalog");
                1
            }
        }
    }
}
