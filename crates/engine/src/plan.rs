// SPDX-License-Identifier: MIT

//! Plan construction: argument validation,
//! profile resolution, policy gate evaluation, and the `Plan` artifact
//! itself. Kept pure and `Clock`-free — timestamps belong to the caller.

use crate::error::ControllerError;
use flowd_adapters::ImageVerifier;
use flowd_core::manifest::{ContainerSpec, JobSpec};
use flowd_core::plan::{ImageTrust, Plan, PlanRequirements, PlanStep};
use flowd_core::policy_types::{PolicyDecision, SecurityProfile, Verdict};
use flowd_core::run::{Executor, Provenance};
use flowd_policy::{ContainerRequest, PolicyBundle, PolicyError};
use std::collections::HashMap;

/// Turn a job's declared container config into the gate input: requests
/// are read from the job's own declared config, never from
/// client-supplied overrides.
fn container_request(container: &ContainerSpec) -> ContainerRequest {
    ContainerRequest {
        image: container.image.clone(),
        cpu: container.cpu.clone(),
        memory: container.memory.clone(),
        network: container.network.clone(),
        rootfs_writable: container.rootfs_writable,
        added_caps: container.caps.clone(),
        env_inheritance: container.env_inheritance,
    }
}

/// Map the first denied decision in a policy evaluation back onto the
/// matching [`PolicyError`] variant, since [`flowd_policy::evaluate`]
/// returns a decision list rather than a `Result` (it's meant to be
/// attachable to a plan regardless of outcome).
fn denial_to_policy_error(req: &ContainerRequest, decisions: &[PolicyDecision]) -> ControllerError {
    let denied = decisions.iter().find(|d| d.decision == Verdict::Denied);
    let Some(denied) = denied else {
        return ControllerError::Policy(PolicyError::OverrideDenied {
            subject: "unknown".to_string(),
            reason: "policy evaluation denied the run".to_string(),
        });
    };
    let err = match denied.code.as_str() {
        "image.registry.not.allowed" => PolicyError::RegistryNotAllowed {
            registry: flowd_core::policy_types::registry_from_image(&req.image),
        },
        "image.signature.required" => PolicyError::SignatureRequired { reason: denied.reason.clone() },
        "E_IMAGE_POLICY" => PolicyError::ResourceCeilingExceeded(denied.reason.clone()),
        _ => PolicyError::OverrideDenied { subject: denied.subject.clone(), reason: denied.reason.clone() },
    };
    ControllerError::Policy(err)
}

/// Executor-preview text and per-step summary for a host-mode job.
fn host_preview(job: &JobSpec) -> (String, Vec<PlanStep>) {
    let steps: Vec<PlanStep> = job
        .steps
        .iter()
        .map(|s| PlanStep { name: s.name.clone(), command: s.command.join(" ") })
        .collect();
    let preview = steps.iter().map(|s| s.command.as_str()).collect::<Vec<_>>().join(" && ");
    (preview, steps)
}

/// Build the [`Plan`] for a resolved job and already-validated args.
/// Performs the image-trust check when the
/// job declares a container and the effective verify mode requires it,
/// then runs every policy gate and fails the whole plan if any gate
/// denies.
pub async fn build_plan(
    job: &JobSpec,
    resolved_args: HashMap<String, serde_json::Value>,
    profile: SecurityProfile,
    bundle: &PolicyBundle,
    verifier: &dyn ImageVerifier,
    provenance: Provenance,
) -> Result<Plan, ControllerError> {
    let Some(container) = &job.container else {
        let (preview, steps) = host_preview(job);
        return Ok(Plan {
            job_id: job.id.clone(),
            security_profile: profile,
            resolved_args,
            executor_preview: preview,
            steps,
            image_trust: None,
            policy_findings: Vec::new(),
            provenance,
            requirements: None,
            container_image: None,
        });
    };

    let req = container_request(container);
    // The effective mode is always profile-driven (flowd_policy::evaluate
    // only takes a profile); a job's own `verify_signatures` field only
    // ever narrows it further to `disabled`, never loosens it.
    let mode = match container.verify_signatures {
        Some(flowd_core::policy_types::VerifyMode::Disabled) => flowd_core::policy_types::VerifyMode::Disabled,
        _ => bundle.verify_mode_for(profile),
    };

    let (verified, reason) = if matches!(mode, flowd_core::policy_types::VerifyMode::Disabled) {
        (None, None)
    } else {
        match verifier.verify(&container.image).await {
            Ok(outcome) => (Some(outcome.verified), outcome.reason),
            Err(e) => (Some(false), Some(e.to_string())),
        }
    };

    let (decisions, admitted) = flowd_policy::evaluate(bundle, profile, &req, verified, reason.as_deref());
    if !admitted {
        return Err(denial_to_policy_error(&req, &decisions));
    }

    let requirements = if container.cpu.is_some() || container.memory.is_some() {
        Some(PlanRequirements { cpu: container.cpu.clone(), memory: container.memory.clone() })
    } else {
        None
    };

    Ok(Plan {
        job_id: job.id.clone(),
        security_profile: profile,
        resolved_args,
        executor_preview: format!("container: {}", container.image),
        steps: Vec::new(),
        image_trust: Some(ImageTrust {
            verified: verified.unwrap_or(false),
            reason,
            resolved_digest: provenance.digest.clone(),
        }),
        policy_findings: decisions,
        provenance,
        requirements,
        container_image: Some(container.image.clone()),
    })
}

/// Which executor a job's plan implies: a declared
/// container always runs in container mode.
pub fn executor_for(job: &JobSpec) -> Executor {
    if job.container.is_some() {
        Executor::Container
    } else {
        Executor::Host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_adapters::verifier::fake::FakeImageVerifier;
    use flowd_core::argspec::ArgSpec;

    fn host_job() -> JobSpec {
        JobSpec {
            id: "demo".into(),
            name: "Demo".into(),
            summary: String::new(),
            description: None,
            argspec: ArgSpec::default(),
            steps: vec![flowd_core::manifest::JobStep { name: "run".into(), command: vec!["echo".into(), "hi".into()] }],
            container: None,
        }
    }

    fn container_job() -> JobSpec {
        JobSpec {
            id: "demo".into(),
            name: "Demo".into(),
            summary: String::new(),
            description: None,
            argspec: ArgSpec::default(),
            steps: Vec::new(),
            container: Some(ContainerSpec { image: "ghcr.io/acme/app:1".into(), ..Default::default() }),
        }
    }

    #[tokio::test]
    async fn host_job_plan_has_no_image_trust() {
        let job = host_job();
        let bundle = PolicyBundle::default();
        let verifier = FakeImageVerifier::always_verified();
        let plan = build_plan(&job, HashMap::new(), SecurityProfile::Secure, &bundle, &verifier, Provenance::default())
            .await
            .unwrap();
        assert!(plan.image_trust.is_none());
        assert_eq!(plan.executor_preview, "echo hi");
    }

    #[tokio::test]
    async fn unverified_container_under_secure_is_denied() {
        let job = container_job();
        let bundle = PolicyBundle::default();
        let verifier = FakeImageVerifier::always_failing();
        let err = build_plan(&job, HashMap::new(), SecurityProfile::Secure, &bundle, &verifier, Provenance::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Policy(PolicyError::SignatureRequired { .. })));
    }

    #[tokio::test]
    async fn verified_container_under_secure_is_admitted() {
        let job = container_job();
        let bundle = PolicyBundle::default();
        let verifier = FakeImageVerifier::always_verified();
        let plan = build_plan(&job, HashMap::new(), SecurityProfile::Secure, &bundle, &verifier, Provenance::default())
            .await
            .unwrap();
        assert!(plan.image_trust.unwrap().verified);
        assert_eq!(plan.container_image.as_deref(), Some("ghcr.io/acme/app:1"));
    }

    #[tokio::test]
    async fn disabled_profile_skips_verifier_entirely() {
        let job = container_job();
        let mut bundle = PolicyBundle::default();
        bundle.verify_signatures.insert(SecurityProfile::Disabled, flowd_core::policy_types::VerifyMode::Disabled);
        let verifier = FakeImageVerifier::always_failing();
        let plan = build_plan(&job, HashMap::new(), SecurityProfile::Disabled, &bundle, &verifier, Provenance::default())
            .await
            .unwrap();
        assert!(!plan.image_trust.unwrap().verified);
    }
}
