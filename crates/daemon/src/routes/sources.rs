// SPDX-License-Identifier: MIT

//! `GET /sources`, `POST /sources`, `GET /sources/{name}`,
//! `DELETE /sources/{name}`.

use crate::auth::{require_scope, AuthenticatedPrincipal};
use crate::error::{ApiError, ApiResult};
use crate::routes::support::resolve_profile;
use crate::state::SharedState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flowd_core::source::{PullPolicy, Source, SourceType};
use flowd_core::Scope;
use serde::Deserialize;
use std::sync::atomic::Ordering;

pub async fn list_sources(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> ApiResult<Json<Vec<Source>>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::SourcesRead)?;
    let sources = state.sources.list().into_iter().map(|s| s.sanitized()).collect();
    Ok(Json(sources))
}

pub async fn get_source(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(name): Path<String>,
) -> ApiResult<Json<Source>> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::SourcesRead)?;
    let source = state.sources.require(&name)?;
    Ok(Json(source.sanitized()))
}

#[derive(Debug, Deserialize)]
pub struct RegisterSourceRequest {
    pub name: String,
    pub r#type: SourceType,
    pub r#ref: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    #[serde(default)]
    pub verify_signatures: bool,
    #[serde(default)]
    pub trusted: bool,
    #[serde(default)]
    pub profile: Option<String>,
}

pub async fn register_source(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Json(req): Json<RegisterSourceRequest>,
) -> ApiResult<Response> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::SourcesWrite)?;

    let mut source = match req.r#type {
        SourceType::Local => flowd_sources::register_local(&state.local_allow_roots, &req.name, &req.r#ref)?,
        SourceType::Git => {
            let url = req.url.ok_or_else(|| ApiError::BadRequest("git sources require a url".to_string()))?;
            flowd_sources::materialize_git(
                state.git_client.as_ref(),
                &state.git_checkout_dir,
                &state.git_allow,
                &req.name,
                &url,
                &req.r#ref,
            )
            .await?
        }
        SourceType::Oci => {
            let profile = resolve_profile(&state, req.profile.as_deref())?;
            let bundle = state.policy.read().clone();
            let materialization = flowd_sources::materialize_oci(
                state.container_runtime.as_ref(),
                state.image_verifier.as_ref(),
                &bundle,
                profile,
                &state.oci_cache_root,
                &req.name,
                &req.r#ref,
                req.pull_policy,
                req.trusted,
                req.verify_signatures,
            )
            .await?;
            materialization.source
        }
    };
    source.verify_signatures = req.verify_signatures;
    state.sources.upsert(source.clone());
    state.refresh_catalog();

    Ok((StatusCode::CREATED, Json(source.sanitized())).into_response())
}

pub async fn remove_source(
    State(state): State<SharedState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    require_scope(&principal, Scope::SourcesWrite)?;
    state.sources.require(&name)?;
    state.sources.remove(&name);
    state.refresh_catalog();
    Ok(StatusCode::NO_CONTENT)
}
