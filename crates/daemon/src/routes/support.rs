// SPDX-License-Identifier: MIT

//! Helpers shared across route handlers: job/alias resolution, provenance
//! inference, and profile resolution.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use flowd_core::source::SourceType;
use flowd_core::{JobSpec, Provenance, SecurityProfile};
use std::path::Path;

/// A job resolved against the current catalog snapshot, with the
/// provenance of the source it came from.
pub struct Resolved {
    pub job: JobSpec,
    pub is_oci: bool,
    pub provenance: Provenance,
}

/// Resolve `job_id_or_alias` (a direct job id or an alias) against the
/// current catalog snapshot.
pub fn resolve_job(state: &AppState, job_id_or_alias: &str) -> ApiResult<Resolved> {
    let catalog = state.catalog.read();
    let job = catalog.resolve(job_id_or_alias)?.clone();
    let is_oci = catalog.is_oci(&job.id);
    drop(catalog);
    let provenance = provenance_for_job(state, &job.id, is_oci);
    Ok(Resolved { job, is_oci, provenance })
}

/// Recover which registered source a resolved job id came from.
///
/// OCI jobs are prefixed `<source>/<id>` by `flowd_engine::catalog::rebuild`,
/// so the source name is the leading path segment. Local/git jobs carry no
/// such marker in their id, so the catalog alone cannot answer "which
/// source": this re-runs discovery against each non-OCI source's root and
/// returns the first one whose job list contains a match. Falls back to an
/// empty `Provenance` if nothing matches (e.g. the catalog is momentarily
/// stale relative to a source that was just removed).
fn provenance_for_job(state: &AppState, job_id: &str, is_oci: bool) -> Provenance {
    if is_oci {
        if let Some((source_name, _)) = job_id.split_once('/') {
            if let Some(source) = state.sources.get(source_name) {
                return Provenance {
                    source_name: Some(source.name),
                    source_type: Some(source.r#type.to_string()),
                    resolved_ref: source.resolved_ref,
                    resolved_commit: source.resolved_commit,
                    digest: source.digest,
                };
            }
        }
        return Provenance::default();
    }

    for source in state.sources.list() {
        if matches!(source.r#type, SourceType::Oci) {
            continue;
        }
        let Ok((jobs, _)) = flowd_sources::discover(Path::new(&source.local_path)) else {
            continue;
        };
        if jobs.iter().any(|j| j.id == job_id) {
            return Provenance {
                source_name: Some(source.name),
                source_type: Some(source.r#type.to_string()),
                resolved_ref: source.resolved_ref,
                resolved_commit: source.resolved_commit,
                digest: source.digest,
            };
        }
    }
    Provenance::default()
}

/// Resolve the effective security profile for a request: the per-request
/// `profile` field, then `FLWD_PROFILE`, then `secure`. There is no per-request config-file
/// override in this deployment, so that third source is always absent.
pub fn resolve_profile(state: &AppState, requested: Option<&str>) -> ApiResult<SecurityProfile> {
    flowd_policy::resolve_profile(requested, state.config.env_profile.as_deref(), None).map_err(ApiError::from)
}
