// SPDX-License-Identifier: MIT

//! `POST /runs`, `GET /runs`, `GET /runs/{id}`, `POST /runs/{id}:cancel`.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::{ApiError, ApiResult};
use crate::routes::support::{resolve_job, resolve_profile};
use crate::state::SharedState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowd_core::run::{Executor, Run, RunId, RunStatus};
use flowd_core::{RunEvent, Scope};
use flowd_engine::{ContainerExecutor, EventSink, HostExecutor, RunExecutor};
use flowd_storage::canonical::{canonical_body_sha256, is_hex_sha256};
use flowd_storage::{IdempotencyRecord, IdempotencyStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRunRequest {
    pub job_id: String,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub profile: Option<String>,
}

const ENDPOINT: &str = "POST /runs";

pub async fn create_run(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RunsWrite)?;

    let raw_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Idempotency-Key header is required".to_string()))?;
    if !IdempotencyStore::is_valid_raw_key(raw_key) {
        return Err(ApiError::BadRequest("Idempotency-Key does not match the required shape".to_string()));
    }

    let body_sha256 = canonical_body_sha256(&body)?;
    if let Some(asserted) = headers.get("idempotency-sha256").and_then(|v| v.to_str().ok()) {
        if !is_hex_sha256(asserted) {
            return Err(ApiError::BadRequest("Idempotency-SHA256 must be 64 lowercase hex characters".to_string()));
        }
        if asserted != body_sha256 {
            return Err(ApiError::BadRequest("Idempotency-SHA256 does not match the request body".to_string()));
        }
    }

    let scoped_key = IdempotencyStore::scope_key(&principal.subject, raw_key);
    let now = state.now_ms();
    let idempotency = state.store.idempotency();

    if let Some(existing) = idempotency.lookup(&scoped_key, ENDPOINT, now)? {
        return Ok(replay_or_conflict(existing, &body_sha256, &state));
    }

    let req: CreateRunRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    let resolved = resolve_job(&state, &req.job_id)?;
    if resolved.is_oci {
        return Err(ApiError::Controller(flowd_engine::ControllerError::OciRunUnsupported(resolved.job.id)));
    }

    let resolved_args =
        resolved.job.argspec.validate(&req.args).map_err(|errors| ApiError::ArgumentsInvalid(errors))?;
    let profile = resolve_profile(&state, req.profile.as_deref())?;
    let bundle = state.policy.read().clone();

    let plan = flowd_engine::build_plan(
        &resolved.job,
        resolved_args.clone(),
        profile,
        &bundle,
        state.image_verifier.as_ref(),
        resolved.provenance.clone(),
    )
    .await?;

    let executor_kind = flowd_engine::executor_for(&resolved.job);
    let run_id = RunId::new();
    let container_name = format!("flwd-{}", run_id.as_str());
    if matches!(executor_kind, Executor::Container) {
        flowd_engine::ensure_no_name_conflict(state.container_runtime.as_ref(), &container_name).await?;
    }

    let run_dir = state.runs_dir.join(run_id.as_str());
    tokio::fs::create_dir_all(&run_dir).await.map_err(flowd_storage::StorageError::from)?;
    let plan_bytes = serde_json::to_vec_pretty(&plan)?;
    tokio::fs::write(run_dir.join("plan.json"), &plan_bytes).await.map_err(flowd_storage::StorageError::from)?;

    let mut run = Run::new(run_id.clone(), resolved.job.id.clone(), executor_kind, now);
    run.provenance = resolved.provenance.clone();
    run.args = resolved_args;
    if let Some(image) = plan.container_image.clone() {
        run.runtime = Some(image);
    }
    state.runs.insert(run.clone());
    let cancel = state.runs.register_cancellation(&run_id);

    if !plan.policy_findings.is_empty() {
        let decisions_event =
            RunEvent::PolicyDecision { run_id: run_id.to_string(), decisions: plan.policy_findings.clone() };
        if state.journal_sink.publish(decisions_event, now).is_none() {
            tracing::warn!(run_id = %run_id, "failed to append policy-decision event to the journal");
        }
    }

    let _ = state.runs.update(&run_id, |r| r.transition(RunStatus::Running, now));
    let start_event =
        RunEvent::RunStart { run_id: run_id.to_string(), job_id: resolved.job.id.clone(), status: "running".to_string() };
    if state.journal_sink.publish(start_event, now).is_none() {
        tracing::warn!(run_id = %run_id, "failed to append run-start event to the journal");
    }

    spawn_run(Arc::clone(&state), run_id.clone(), resolved.job.steps.clone(), plan, executor_kind, run_dir, cancel);

    state.metrics.runs_created_total.fetch_add(1, Ordering::Relaxed);

    let response_body = serde_json::to_vec(&run)?;
    idempotency.store(
        &scoped_key,
        ENDPOINT,
        &body_sha256,
        StatusCode::CREATED.as_u16(),
        &response_body,
        now,
        now + state.config.idempotency_ttl_seconds * 1000,
    )?;

    Ok((StatusCode::CREATED, Json(run)).into_response())
}

fn replay_or_conflict(existing: IdempotencyRecord, body_sha256: &str, state: &SharedState) -> Response {
    if existing.body_sha256 != body_sha256 {
        return ApiError::IdempotencyConflict { expected_sha256: existing.body_sha256, got_sha256: body_sha256.to_string() }
            .into_response();
    }
    state.metrics.idempotent_replays_total.fetch_add(1, Ordering::Relaxed);
    let status = StatusCode::from_u16(existing.status).unwrap_or(StatusCode::CREATED);
    (status, [("Idempotent-Replay", "true")], existing.body).into_response()
}

#[allow(clippy::too_many_arguments)]
fn spawn_run(
    state: SharedState,
    run_id: RunId,
    steps: Vec<flowd_core::JobStep>,
    plan: flowd_core::Plan,
    executor_kind: Executor,
    run_dir: std::path::PathBuf,
    cancel: tokio_util::sync::CancellationToken,
) {
    tokio::spawn(async move {
        let executor: Box<dyn RunExecutor> = match executor_kind {
            Executor::Host => Box::new(HostExecutor::new(steps, run_dir)),
            Executor::Container => {
                let image = plan.container_image.clone().unwrap_or_default();
                Box::new(ContainerExecutor::new(Arc::clone(&state.container_runtime), image, run_dir))
            }
        };

        let outcome = executor.execute(&run_id, &plan, cancel).await;
        let now = state.now_ms();
        let job_id = plan.job_id.clone();

        let (status, event) = if outcome.canceled {
            (
                RunStatus::Canceled,
                RunEvent::RunCanceled {
                    run_id: run_id.to_string(),
                    job_id,
                    status: "canceled".to_string(),
                    timestamp: now,
                    reason: None,
                    provenance: Some(plan.provenance.clone()),
                    runtime: plan.container_image.clone(),
                },
            )
        } else if outcome.is_success() {
            (
                RunStatus::Completed,
                RunEvent::RunFinish {
                    run_id: run_id.to_string(),
                    job_id,
                    status: "completed".to_string(),
                    exit_code: outcome.exit_code,
                    error: outcome.error.clone(),
                },
            )
        } else {
            state.metrics.runs_failed_total.fetch_add(1, Ordering::Relaxed);
            (
                RunStatus::Failed,
                RunEvent::RunFinish {
                    run_id: run_id.to_string(),
                    job_id,
                    status: "failed".to_string(),
                    exit_code: outcome.exit_code,
                    error: outcome.error.clone(),
                },
            )
        };

        let _ = state.runs.update(&run_id, |r| r.transition(status, now));
        state.runs.clear_cancellation(&run_id);
        if state.journal_sink.publish(event, now).is_none() {
            tracing::warn!(run_id = %run_id, "failed to append run-finish event to the journal");
        }
    });
}

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
struct RunsPage {
    runs: Vec<Run>,
    total: usize,
}

pub async fn list_runs(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<Json<RunsPage>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RunsRead)?;

    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;
    let page = flowd_engine::RunPage { offset: query.offset, limit: query.limit };
    let (runs, total) = state.runs.list(status, page);
    Ok(Json(RunsPage { runs, total }))
}

fn parse_status(raw: &str) -> ApiResult<RunStatus> {
    match raw {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        "canceled" => Ok(RunStatus::Canceled),
        other => Err(ApiError::BadRequest(format!("unknown run status '{other}'"))),
    }
}

pub async fn get_run(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Json<Run>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RunsRead)?;
    let run = state.runs.require(&RunId::from(id))?;
    Ok(Json(run))
}

pub async fn cancel_run(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::RunsWrite)?;
    let run_id = RunId::from(id);
    let run = state.runs.require(&run_id)?;
    if run.status.is_terminal() {
        return Ok((StatusCode::OK, Json(run)).into_response());
    }
    state.runs.cancel(&run_id);
    let run = state.runs.require(&run_id)?;
    Ok((StatusCode::ACCEPTED, Json(run)).into_response())
}
