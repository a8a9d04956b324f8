// SPDX-License-Identifier: MIT

//! Liveness, storage health, metrics, and the 404 fallback.

use crate::error::ApiResult;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Serialize)]
struct Healthz {
    status: &'static str,
    version: String,
}

pub async fn healthz(State(state): State<SharedState>) -> Json<Healthz> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    Json(Healthz { status: "ok", version: state.config.version.clone() })
}

pub async fn storage_health(State(state): State<SharedState>) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    let stats = state.store.collect_storage_stats()?;
    if !stats.ok {
        state.metrics.storage_quota_exceeded_total.fetch_add(1, Ordering::Relaxed);
        return Ok((StatusCode::SERVICE_UNAVAILABLE, Json(stats)).into_response());
    }
    Ok(Json(stats).into_response())
}

pub async fn metrics(State(state): State<SharedState>) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    crate::error::ApiError::NotFound("no route matches this request".to_string()).into_response()
}
