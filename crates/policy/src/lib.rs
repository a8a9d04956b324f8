// SPDX-License-Identifier: MIT

//! Admission policy for container-bearing runs.
//!
//! This crate evaluates already-gathered facts (a requested security
//! profile, a registry name, a verification outcome, resource
//! quantities, requested overrides) against a [`PolicyBundle`] and
//! produces the [`flowd_core::policy_types::PolicyDecision`] list that
//! gets attached to a plan and streamed as `policy.decision` events. It
//! does not itself invoke a verifier or a container runtime — those are
//! `flowd-adapters` collaborators, kept separate so policy evaluation
//! stays pure and unit-testable.

pub mod bundle;
pub mod error;
pub mod gates;

pub use bundle::{resolve_profile, Overrides, PolicyBundle};
pub use error::PolicyError;
pub use gates::{override_gate, registry_gate, resource_ceiling_gate, verify_mode_gate, ContainerRequest};

use flowd_core::policy_types::{PolicyDecision, SecurityProfile, Verdict};

/// Evaluate every applicable gate for a container-bearing run and
/// return the full decision list plus whether the run is admitted.
///
/// `verified` carries the already-computed signature verification
/// outcome (`None` if verification was never attempted, e.g. because
/// the effective verify mode is `disabled`).
pub fn evaluate(
    bundle: &PolicyBundle,
    profile: SecurityProfile,
    req: &ContainerRequest,
    verified: Option<bool>,
    verify_reason: Option<&str>,
) -> (Vec<PolicyDecision>, bool) {
    let mut decisions = Vec::new();

    decisions.push(registry_gate(bundle, &req.image));

    let mode = bundle.verify_mode_for(profile);
    decisions.push(verify_mode_gate(mode, verified, verify_reason));

    decisions.extend(resource_ceiling_gate(bundle, req.cpu.as_deref(), req.memory.as_deref()));
    decisions.extend(override_gate(bundle, profile, req));

    let admitted = !decisions.iter().any(|d| d.decision == Verdict::Denied);
    if !admitted {
        tracing::info!(
            profile = %profile,
            image = %req.image,
            "run denied by policy evaluation"
        );
    }
    (decisions, admitted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_request_under_secure_is_admitted_when_verified() {
        let bundle = PolicyBundle::default();
        let req = ContainerRequest { image: "ghcr.io/acme/app:1".to_string(), ..Default::default() };
        let (decisions, admitted) = evaluate(&bundle, SecurityProfile::Secure, &req, Some(true), None);
        assert!(admitted);
        assert!(decisions.iter().all(|d| d.decision != Verdict::Denied));
    }

    #[test]
    fn unverified_image_denied_under_secure() {
        let bundle = PolicyBundle::default();
        let req = ContainerRequest { image: "ghcr.io/acme/app:1".to_string(), ..Default::default() };
        let (_, admitted) = evaluate(&bundle, SecurityProfile::Secure, &req, Some(false), Some("no signature"));
        assert!(!admitted);
    }

    #[test]
    fn disallowed_registry_denied_regardless_of_profile() {
        let bundle = PolicyBundle { allowed_registries: vec!["ghcr.io".to_string()], ..Default::default() };
        let req = ContainerRequest { image: "docker.io/acme/app:1".to_string(), ..Default::default() };
        let (_, admitted) = evaluate(&bundle, SecurityProfile::Disabled, &req, None, None);
        assert!(!admitted);
    }
}
