// SPDX-License-Identifier: MIT

//! `GET/PUT/DELETE /kv/{ns}/{key}`, `GET /kv/{ns}`. Values are opaque bytes on the wire, so request and
//! response bodies carry them base64-encoded.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::{ApiError, ApiResult};
use crate::state::SharedState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flowd_core::Scope;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

fn decode_b64(field: &str, value: &str) -> ApiResult<Vec<u8>> {
    STANDARD.decode(value).map_err(|_| ApiError::BadRequest(format!("'{field}' is not valid base64")))
}

#[derive(Debug, Deserialize)]
pub struct PutValueRequest {
    pub value: String,
}

#[derive(Serialize)]
struct ValueResponse {
    value: String,
    ts: i64,
}

pub async fn get_value(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path((ns, key)): Path<(String, String)>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RuleyRead)?;
    let kv = state.store.kv();
    match kv.get(&ns, key.as_bytes())? {
        Some((value, ts)) => Ok(Json(ValueResponse { value: STANDARD.encode(value), ts }).into_response()),
        None => Err(ApiError::NotFound(format!("key '{key}' in namespace '{ns}'"))),
    }
}

pub async fn put_value(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path((ns, key)): Path<(String, String)>,
    Json(req): Json<PutValueRequest>,
) -> ApiResult<StatusCode> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RuleyWrite)?;
    let value = decode_b64("value", &req.value)?;
    let now = state.now_ms();
    let kv = state.store.kv();
    kv.put(&ns, key.as_bytes(), &value, state.config.kv_namespace_quota_bytes, now)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_value(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path((ns, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RuleyWrite)?;
    let kv = state.store.kv();
    if kv.delete(&ns, key.as_bytes())? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("key '{key}' in namespace '{ns}'")))
    }
}

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_scan_limit")]
    pub limit: usize,
}

fn default_scan_limit() -> usize {
    100
}

#[derive(Serialize)]
struct ScannedEntryResponse {
    key: String,
    value: String,
    ts: i64,
}

#[derive(Serialize)]
struct ScanResponse {
    entries: Vec<ScannedEntryResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

pub async fn scan_namespace(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(ns): Path<String>,
    Query(query): Query<ScanQuery>,
) -> ApiResult<Json<ScanResponse>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RuleyRead)?;

    let prefix = match &query.prefix {
        Some(p) => decode_b64("prefix", p)?,
        None => Vec::new(),
    };
    let cursor = query.cursor.as_deref().map(|c| decode_b64("cursor", c)).transpose()?;

    let kv = state.store.kv();
    let (entries, next) = kv.scan(&ns, &prefix, cursor.as_deref(), query.limit)?;
    let entries = entries
        .into_iter()
        .map(|e| ScannedEntryResponse {
            key: STANDARD.encode(&e.key),
            value: STANDARD.encode(&e.value),
            ts: e.ts,
        })
        .collect();
    Ok(Json(ScanResponse { entries, next_cursor: next.map(|c| STANDARD.encode(c)) }))
}
