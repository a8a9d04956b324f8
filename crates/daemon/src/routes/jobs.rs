// SPDX-License-Identifier: MIT

//! `GET /jobs`: the merged job catalog plus the alias index.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::ApiResult;
use crate::state::SharedState;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowd_core::{ArgSpec, Scope};
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Serialize)]
struct JobSummary {
    id: String,
    name: String,
    summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    argspec: ArgSpec,
    is_oci: bool,
    has_container: bool,
}

#[derive(Serialize)]
struct AliasSummary {
    name: String,
    target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
}

#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<JobSummary>,
    aliases: Vec<AliasSummary>,
}

pub async fn list_jobs(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::JobsRead)?;

    let catalog = state.catalog.read();
    let jobs = catalog
        .list()
        .into_iter()
        .map(|job| JobSummary {
            id: job.id.clone(),
            name: job.name.clone(),
            summary: job.summary.clone(),
            description: job.description.clone(),
            argspec: job.argspec.clone(),
            is_oci: catalog.is_oci(&job.id),
            has_container: job.container.is_some(),
        })
        .collect();
    let mut aliases: Vec<AliasSummary> = catalog
        .aliases()
        .entries
        .values()
        .map(|info| AliasSummary { name: info.name.clone(), target_id: info.target_id.clone(), source: info.source.clone() })
        .collect();
    aliases.sort_by(|a, b| a.name.cmp(&b.name));
    let discovery_errors = catalog.discovery_errors();
    drop(catalog);

    let mut response = Json(JobsResponse { jobs, aliases }).into_response();
    if discovery_errors > 0 {
        if let Ok(value) = HeaderValue::from_str(&discovery_errors.to_string()) {
            response.headers_mut().insert("x-flowd-discovery-errors", value);
        }
    }
    Ok(response)
}
