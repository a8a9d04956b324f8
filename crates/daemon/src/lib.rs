// SPDX-License-Identifier: MIT

//! The flowd HTTP/JSON daemon: axum router, auth, and request handlers
//! over the run control plane.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

use axum::routing::{delete, get, post, put};
use axum::Router;
use state::SharedState;
use tower_http::trace::TraceLayer;

/// Build the full router over `state`. Split out from `main` so
/// integration tests can mount it directly without a bound socket.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(routes::health::healthz))
        .route("/health/storage", get(routes::health::storage_health))
        .route("/metrics", get(routes::health::metrics))
        .route("/jobs", get(routes::jobs::list_jobs))
        .route("/plans", post(routes::plans::create_plan))
        .route("/runs", post(routes::runs::create_run).get(routes::runs::list_runs))
        .route("/runs/{id}", get(routes::runs::get_run))
        .route("/runs/{id}:cancel", post(routes::runs::cancel_run))
        .route("/runs/{id}/events", get(routes::events::run_events))
        .route("/runs/{id}/events.ndjson", get(routes::events::run_events_ndjson))
        .route("/events", get(routes::events::global_events))
        .route("/sources", get(routes::sources::list_sources).post(routes::sources::register_source))
        .route("/sources/{name}", get(routes::sources::get_source).delete(routes::sources::remove_source))
        .route(
            "/kv/{ns}/{key}",
            get(routes::kv::get_value).put(routes::kv::put_value).delete(routes::kv::delete_value),
        )
        .route("/kv/{ns}", get(routes::kv::scan_namespace))
        .fallback(routes::health::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Re-export the verbs not already used above so `Router::route` calls read
// naturally against the method table.
#[allow(unused_imports)]
use {delete as _delete, put as _put};
