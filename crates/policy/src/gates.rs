// SPDX-License-Identifier: MIT

//! The four policy gates applied at plan/run admission for
//! container-bearing jobs.

use crate::bundle::PolicyBundle;
use flowd_core::policy_types::{
    parse_cpu_millis, parse_memory_bytes, registry_from_image, OverrideSubject, PolicyDecision,
    SecurityProfile, Verdict, VerifyMode,
};

/// What a container-bearing job asks for, gathered from its config and
/// the run request — the input to override evaluation.
#[derive(Debug, Clone, Default)]
pub struct ContainerRequest {
    pub image: String,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    /// Requested network mode; `None`/`"none"` means no override requested.
    pub network: Option<String>,
    pub rootfs_writable: bool,
    pub added_caps: Vec<String>,
    pub env_inheritance: bool,
}

/// Gate 1: `registry_from_image`, allow-list
/// lookup. An empty allow-list means "allow all".
pub fn registry_gate(bundle: &PolicyBundle, image: &str) -> PolicyDecision {
    let registry = registry_from_image(image);
    if bundle.allowed_registries.is_empty() || bundle.allowed_registries.iter().any(|r| r == &registry) {
        PolicyDecision {
            subject: "image.registry".to_string(),
            decision: Verdict::Allowed,
            code: "image.registry.allowed".to_string(),
            reason: format!("registry '{registry}' is allowed"),
        }
    } else {
        PolicyDecision {
            subject: "image.registry".to_string(),
            decision: Verdict::Denied,
            code: "image.registry.not.allowed".to_string(),
            reason: format!("registry '{registry}' is not in the allow-list"),
        }
    }
}

/// Gate 2: verify-mode policy given an already
/// computed verification outcome (`None` when the verifier was never
/// invoked because the mode is `disabled`).
pub fn verify_mode_gate(mode: VerifyMode, verified: Option<bool>, reason: Option<&str>) -> PolicyDecision {
    match mode {
        VerifyMode::Disabled => PolicyDecision {
            subject: "image.signature".to_string(),
            decision: Verdict::Allowed,
            code: "image.signature.disabled".to_string(),
            reason: "signature verification disabled by policy".to_string(),
        },
        VerifyMode::Required => {
            if verified.unwrap_or(false) {
                PolicyDecision {
                    subject: "image.signature".to_string(),
                    decision: Verdict::Allowed,
                    code: "image.signature.verified".to_string(),
                    reason: "signature verified".to_string(),
                }
            } else {
                PolicyDecision {
                    subject: "image.signature".to_string(),
                    decision: Verdict::Denied,
                    code: "image.signature.required".to_string(),
                    reason: reason.unwrap_or("signature verification failed").to_string(),
                }
            }
        }
        VerifyMode::Permissive => {
            if verified.unwrap_or(false) {
                PolicyDecision {
                    subject: "image.signature".to_string(),
                    decision: Verdict::Allowed,
                    code: "image.signature.verified".to_string(),
                    reason: "signature verified".to_string(),
                }
            } else {
                PolicyDecision {
                    subject: "image.signature".to_string(),
                    decision: Verdict::Warn,
                    code: "image.signature.permissive".to_string(),
                    reason: reason.unwrap_or("signature unverified, allowed under permissive policy").to_string(),
                }
            }
        }
    }
}

/// Gate 3: CPU/memory ceilings. Returns one
/// decision per configured ceiling that was checked.
pub fn resource_ceiling_gate(bundle: &PolicyBundle, cpu: Option<&str>, memory: Option<&str>) -> Vec<PolicyDecision> {
    let mut decisions = Vec::new();
    if let (Some(ceiling), Some(requested)) = (bundle.ceilings.cpu_millis, cpu) {
        let millis = parse_cpu_millis(requested);
        let decision = match millis {
            Some(m) if m <= ceiling => PolicyDecision {
                subject: "resources.cpu".to_string(),
                decision: Verdict::Allowed,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("cpu request {m}m within ceiling {ceiling}m"),
            },
            Some(m) => PolicyDecision {
                subject: "resources.cpu".to_string(),
                decision: Verdict::Denied,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("cpu request {m}m exceeds ceiling {ceiling}m"),
            },
            None => PolicyDecision {
                subject: "resources.cpu".to_string(),
                decision: Verdict::Denied,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("cpu quantity '{requested}' could not be parsed"),
            },
        };
        decisions.push(decision);
    }
    if let (Some(ceiling), Some(requested)) = (bundle.ceilings.memory_bytes, memory) {
        let bytes = parse_memory_bytes(requested);
        let decision = match bytes {
            Some(b) if b <= ceiling => PolicyDecision {
                subject: "resources.memory".to_string(),
                decision: Verdict::Allowed,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("memory request {b}B within ceiling {ceiling}B"),
            },
            Some(b) => PolicyDecision {
                subject: "resources.memory".to_string(),
                decision: Verdict::Denied,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("memory request {b}B exceeds ceiling {ceiling}B"),
            },
            None => PolicyDecision {
                subject: "resources.memory".to_string(),
                decision: Verdict::Denied,
                code: "E_IMAGE_POLICY".to_string(),
                reason: format!("memory quantity '{requested}' could not be parsed"),
            },
        };
        decisions.push(decision);
    }
    decisions
}

/// Gate 4: override evaluation for network,
/// rootfs, capabilities, and env inheritance. `secure` always denies a
/// requested override; `permissive` allows only what the bundle's
/// override list permits; `disabled` allows but warns.
pub fn override_gate(bundle: &PolicyBundle, profile: SecurityProfile, req: &ContainerRequest) -> Vec<PolicyDecision> {
    let mut decisions = Vec::new();

    if let Some(network) = req.network.as_deref().filter(|n| *n != "none") {
        decisions.push(evaluate_override(
            profile,
            OverrideSubject::ContainerNetwork,
            bundle.overrides.network.iter().any(|n| n == network),
            format!("network mode '{network}'"),
        ));
    }
    if req.rootfs_writable {
        decisions.push(evaluate_override(
            profile,
            OverrideSubject::ContainerRootfs,
            bundle.overrides.rootfs_writable,
            "writable rootfs".to_string(),
        ));
    }
    if !req.added_caps.is_empty() {
        let allowed = req.added_caps.iter().all(|c| bundle.overrides.caps.iter().any(|a| a == c));
        decisions.push(evaluate_override(
            profile,
            OverrideSubject::ContainerCapabilities,
            allowed,
            format!("added capabilities {:?}", req.added_caps),
        ));
    }
    if req.env_inheritance {
        decisions.push(evaluate_override(
            profile,
            OverrideSubject::EnvInheritance,
            bundle.overrides.env_inheritance,
            "environment inheritance".to_string(),
        ));
    }

    decisions
}

fn evaluate_override(
    profile: SecurityProfile,
    subject: OverrideSubject,
    bundle_permits: bool,
    detail: String,
) -> PolicyDecision {
    match profile {
        SecurityProfile::Secure => PolicyDecision {
            subject: subject.to_string(),
            decision: Verdict::Denied,
            code: "policy.denied".to_string(),
            reason: format!("{detail} denied under secure profile"),
        },
        SecurityProfile::Permissive => {
            if bundle_permits {
                PolicyDecision {
                    subject: subject.to_string(),
                    decision: Verdict::Allowed,
                    code: "policy.override.allowed".to_string(),
                    reason: format!("{detail} allowed by policy override list"),
                }
            } else {
                PolicyDecision {
                    subject: subject.to_string(),
                    decision: Verdict::Denied,
                    code: "policy.denied".to_string(),
                    reason: format!("{detail} not in the permitted override list"),
                }
            }
        }
        SecurityProfile::Disabled => PolicyDecision {
            subject: subject.to_string(),
            decision: Verdict::Warn,
            code: "policy.override.warn".to_string(),
            reason: format!("{detail} allowed — policy checks disabled"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_gate_allows_matching_and_denies_others() {
        let bundle = PolicyBundle { allowed_registries: vec!["ghcr.io".into()], ..Default::default() };
        assert_eq!(registry_gate(&bundle, "ghcr.io/x/y:1").decision, Verdict::Allowed);
        assert_eq!(registry_gate(&bundle, "docker.io/x/y:1").decision, Verdict::Denied);
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        let bundle = PolicyBundle::default();
        assert_eq!(registry_gate(&bundle, "anything/x").decision, Verdict::Allowed);
    }

    #[test]
    fn verify_mode_required_denies_on_failure() {
        let d = verify_mode_gate(VerifyMode::Required, Some(false), Some("bad sig"));
        assert_eq!(d.decision, Verdict::Denied);
        assert_eq!(d.code, "image.signature.required");
    }

    #[test]
    fn verify_mode_permissive_warns_on_failure() {
        let d = verify_mode_gate(VerifyMode::Permissive, Some(false), None);
        assert_eq!(d.decision, Verdict::Warn);
        assert_eq!(d.code, "image.signature.permissive");
    }

    #[test]
    fn verify_mode_disabled_skips_verifier() {
        let d = verify_mode_gate(VerifyMode::Disabled, None, None);
        assert_eq!(d.decision, Verdict::Allowed);
    }

    #[test]
    fn resource_ceiling_rejects_excess_cpu() {
        let bundle = PolicyBundle { ceilings: flowd_core::ResourceCeilings { cpu_millis: Some(1000), memory_bytes: None }, ..Default::default() };
        let decisions = resource_ceiling_gate(&bundle, Some("2"), None);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].decision, Verdict::Denied);
    }

    #[test]
    fn override_secure_always_denies() {
        let bundle = PolicyBundle { overrides: crate::bundle::Overrides { network: vec!["bridge".into()], ..Default::default() }, ..Default::default() };
        let req = ContainerRequest { network: Some("bridge".into()), ..Default::default() };
        let decisions = override_gate(&bundle, SecurityProfile::Secure, &req);
        assert_eq!(decisions[0].decision, Verdict::Denied);
    }

    #[test]
    fn override_permissive_allows_listed_network() {
        let bundle = PolicyBundle { overrides: crate::bundle::Overrides { network: vec!["bridge".into()], ..Default::default() }, ..Default::default() };
        let req = ContainerRequest { network: Some("bridge".into()), ..Default::default() };
        let decisions = override_gate(&bundle, SecurityProfile::Permissive, &req);
        assert_eq!(decisions[0].decision, Verdict::Allowed);
    }

    #[test]
    fn override_disabled_allows_with_warning() {
        let bundle = PolicyBundle::default();
        let req = ContainerRequest { rootfs_writable: true, ..Default::default() };
        let decisions = override_gate(&bundle, SecurityProfile::Disabled, &req);
        assert_eq!(decisions[0].decision, Verdict::Warn);
    }

    #[test]
    fn no_overrides_requested_yields_no_decisions() {
        let bundle = PolicyBundle::default();
        let req = ContainerRequest::default();
        assert!(override_gate(&bundle, SecurityProfile::Secure, &req).is_empty());
    }
}
