// SPDX-License-Identifier: MIT

//! `GET /runs/{id}/events`, `GET /runs/{id}/events.ndjson`, `GET /events`.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use flowd_core::Scope;
use flowd_engine::{subscribe_global, subscribe_run, ReplaySubscription, DEFAULT_BUFFER, DEFAULT_KEEPALIVE_SECS};
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default, rename = "since")]
    pub since: Option<i64>,
}

/// Bridge a replay-then-live [`ReplaySubscription`] into an SSE body:
/// push every replayed frame first, then forward live frames as they
/// arrive, interleaving `:keepalive` comments on an idle timer so
/// intermediaries don't close the connection.
fn sse_response(mut sub: ReplaySubscription) -> Response {
    let (tx, rx) = mpsc::channel::<Result<axum::body::Bytes, std::io::Error>>(DEFAULT_BUFFER);

    tokio::spawn(async move {
        for frame in sub.replayed.drain(..) {
            if tx.send(Ok(axum::body::Bytes::from(frame.encode()))).await.is_err() {
                return;
            }
        }
        let mut keepalive = tokio::time::interval(Duration::from_secs(DEFAULT_KEEPALIVE_SECS));
        keepalive.tick().await;
        loop {
            tokio::select! {
                biased;
                frame = sub.subscription.rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if tx.send(Ok(axum::body::Bytes::from(frame.encode()))).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = keepalive.tick() => {
                    if tx.send(Ok(axum::body::Bytes::from_static(b":keepalive\n\n"))).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-store")
        .header("x-accel-buffering", "no")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub async fn run_events(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::EventsRead)?;
    state.runs.require(&flowd_core::run::RunId::from(id.clone()))?;

    let journal = state.store.journal();
    let sub = subscribe_run(&journal, &state.hub, &id, query.since.unwrap_or(0), DEFAULT_BUFFER).map_err(|e| {
        if matches!(e, flowd_engine::ControllerError::CursorExpired(_)) {
            state.metrics.sse_cursor_expired_total.fetch_add(1, Ordering::Relaxed);
        }
        ApiError::from(e)
    })?;
    Ok(sse_response(sub))
}

#[derive(Debug, Deserialize)]
pub struct NdjsonQuery {
    #[serde(default, rename = "since")]
    pub since: Option<i64>,
    #[serde(default = "default_ndjson_limit")]
    pub limit: usize,
}

fn default_ndjson_limit() -> usize {
    1000
}

/// `GET /runs/{id}/events.ndjson`: a bounded, non-streaming dump of the
/// run's journaled events, gated behind `FLWD_EXT_NDJSON` since it
/// isn't part of the core wire contract.
pub async fn run_events_ndjson(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
    Query(query): Query<NdjsonQuery>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    if !state.config.extensions_ndjson {
        return Err(ApiError::ExtensionUnsupported("events.ndjson".to_string()));
    }
    require_scope(&principal, Scope::EventsRead)?;
    state.runs.require(&flowd_core::run::RunId::from(id.clone()))?;

    let journal = state.store.journal();
    let mut lines = Vec::new();
    let mut seen = 0usize;
    journal.for_each(&id, query.since.unwrap_or(0), |entry| {
        if seen >= query.limit {
            return Ok(());
        }
        seen += 1;
        lines.push(String::from_utf8_lossy(&entry.payload).into_owned());
        Ok(())
    })?;

    let body = lines.join("\n") + if lines.is_empty() { "" } else { "\n" };
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}

pub async fn global_events(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::EventsRead)?;

    let journal = state.store.journal();
    let sub = subscribe_global(&journal, &state.hub, query.since.unwrap_or(0), DEFAULT_BUFFER).map_err(|e| {
        if matches!(e, flowd_engine::ControllerError::CursorExpired(_)) {
            state.metrics.sse_cursor_expired_total.fetch_add(1, Ordering::Relaxed);
        }
        ApiError::from(e)
    })?;
    Ok(sse_response(sub))
}
