// SPDX-License-Identifier: MIT

//! `POST /plans`: dry-run a job admission
//! without creating a run.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::{ApiError, ApiResult};
use crate::routes::support::{resolve_job, resolve_profile};
use crate::state::SharedState;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use flowd_core::Scope;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::Ordering;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePlanRequest {
    pub job_id: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub profile: Option<String>,
}

pub async fn create_plan(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    body: Bytes,
) -> ApiResult<Json<flowd_core::Plan>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::JobsRead)?;

    let req: CreatePlanRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    let resolved = resolve_job(&state, &req.job_id)?;
    let resolved_args =
        resolved.job.argspec.validate(&req.args).map_err(|errors| ApiError::ArgumentsInvalid(errors))?;
    let profile = resolve_profile(&state, req.profile.as_deref())?;
    let bundle = state.policy.read().clone();

    let plan = flowd_engine::build_plan(
        &resolved.job,
        resolved_args,
        profile,
        &bundle,
        state.image_verifier.as_ref(),
        resolved.provenance,
    )
    .await?;

    Ok(Json(plan))
}
