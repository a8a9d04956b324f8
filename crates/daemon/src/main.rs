// SPDX-License-Identifier: MIT

//! flowd — run control plane daemon.
//!
//! Binds the HTTP/JSON API over the persistence core, source
//! manager, policy engine, and run lifecycle controller. Configuration is
//! loaded once here and threaded explicitly afterward.

use std::sync::Arc;
use std::time::Duration;

use flowd_adapters::{ProcessContainerRuntime, ProcessGitClient, ProcessImageVerifier};
use flowd_daemon::config::Config;
use flowd_daemon::metrics::Metrics;
use flowd_daemon::state::AppState;
use flowd_daemon::{build_router, state::SharedState};
use flowd_engine::{JobCatalog, JournalSink, LiveHub, RunStore};
use flowd_policy::PolicyBundle;
use flowd_sources::{GitAllow, SourceStore};
use flowd_storage::{Store, StoreOptions};
use parking_lot::RwLock;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let config = Config::from_env().map_err(|e| {
        error!("failed to load configuration: {e}");
        e
    })?;

    std::fs::create_dir_all(&config.data_dir)?;
    for root in &config.local_allow_roots {
        std::fs::create_dir_all(root)?;
    }
    std::fs::create_dir_all(&config.git_checkout_dir)?;
    std::fs::create_dir_all(&config.oci_cache_root)?;
    std::fs::create_dir_all(&config.runs_dir)?;

    let store = Store::open(StoreOptions {
        data_dir: config.data_dir.clone(),
        max_bytes: config.storage_max_bytes,
        journal_max_bytes: config.journal_max_bytes,
        ..StoreOptions::default()
    })?;

    let policy = PolicyBundle::load(config.policy_file.as_deref())?;

    let container_runtime: Arc<dyn flowd_adapters::ContainerRuntime> =
        Arc::new(ProcessContainerRuntime::new(config.container_runtime_binary.clone()));
    let image_verifier: Arc<dyn flowd_adapters::ImageVerifier> =
        Arc::new(ProcessImageVerifier::new(config.verifier_binary.clone()));
    let git_client: Arc<dyn flowd_adapters::GitClient> = Arc::new(ProcessGitClient::new(config.git_binary.clone()));

    let git_allow = git_allow_list(&config);

    let hub = Arc::new(LiveHub::new());
    let journal_sink = JournalSink::new(store.journal(), Arc::clone(&hub));

    let state: SharedState = Arc::new(AppState {
        store,
        runs: RunStore::new(),
        sources: SourceStore::new(),
        catalog: RwLock::new(JobCatalog::empty()),
        hub,
        journal_sink,
        policy: RwLock::new(policy),
        clock: flowd_core::SystemClock,
        container_runtime,
        image_verifier,
        git_client,
        local_allow_roots: config.local_allow_roots.clone(),
        git_allow,
        oci_cache_root: config.oci_cache_root.clone(),
        git_checkout_dir: config.git_checkout_dir.clone(),
        runs_dir: config.runs_dir.clone(),
        metrics: Metrics::default(),
        config,
    });

    let discovery_errors = state.refresh_catalog();
    if discovery_errors > 0 {
        info!(discovery_errors, "initial job discovery completed with errors");
    }

    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr).await?;
    info!(addr = %state.config.bind_addr, version = %state.config.version, "flowd daemon ready");

    let grace = Duration::from_secs(state.config.shutdown_grace_seconds);
    let shutdown_state = Arc::clone(&state);
    let router = build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_state, grace))
        .await?;

    info!("flowd daemon stopped");
    Ok(())
}

/// Wait for SIGINT/SIGTERM, then cascade cancellation to every in-flight
/// run before releasing the listener, driven by `axum::serve`'s own
/// graceful-shutdown future.
async fn shutdown_signal(state: SharedState, grace: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    state.runs.cancel_all();
    tokio::time::sleep(grace).await;
}

fn git_allow_list(config: &Config) -> Vec<GitAllow> {
    let mut allow: Vec<GitAllow> = config.git_allow_hosts.iter().cloned().map(GitAllow::Host).collect();
    allow.extend(config.git_allow_file_roots.iter().cloned().map(GitAllow::FileRoot));
    allow
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
