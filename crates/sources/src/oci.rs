// SPDX-License-Identifier: MIT

//! OCI add-on source registration and materialisation.

use crate::error::SourceError;
use flowd_adapters::{ContainerRuntime, ExtractionSpec, ImageVerifier};
use flowd_core::manifest::{validate_manifest, AddOnManifest};
use flowd_core::policy_types::{PolicyDecision, SecurityProfile, Verdict, VerifyMode};
use flowd_core::run::Provenance;
use flowd_core::source::{is_valid_source_name, Expose, PullPolicy, Source, SourceType};
use flowd_policy::gates::{registry_gate, verify_mode_gate};
use flowd_policy::PolicyBundle;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

const MANIFEST_PATH_IN_IMAGE: &str = "/flwd-addon/manifest.yaml";

/// Everything `materialize_oci` produces: the registered `Source`, its
/// parsed add-on manifest, and the policy decisions the caller should
/// surface as `policy.decision` findings.
pub struct OciMaterialization {
    pub source: Source,
    pub manifest: AddOnManifest,
    pub decisions: Vec<PolicyDecision>,
}

/// Register and materialise an `oci` source. `trusted` mirrors the
/// request-level `trusted=true` precondition; `requested_verify` mirrors
/// the request's own `verify_signatures` flag, which must succeed
/// regardless of the policy-driven mode.
#[allow(clippy::too_many_arguments)]
pub async fn materialize_oci(
    runtime: &dyn ContainerRuntime,
    verifier: &dyn ImageVerifier,
    bundle: &PolicyBundle,
    profile: SecurityProfile,
    cache_root: &Path,
    name: &str,
    image_ref: &str,
    pull_policy: PullPolicy,
    trusted: bool,
    requested_verify: bool,
) -> Result<OciMaterialization, SourceError> {
    if !is_valid_source_name(name) {
        return Err(SourceError::InvalidName(name.to_string()));
    }
    if !trusted {
        return Err(SourceError::PolicyDenied("oci source registration requires trusted=true".to_string()));
    }

    let mut decisions = Vec::new();

    let registry_decision = registry_gate(bundle, image_ref);
    let registry_denied = registry_decision.decision == Verdict::Denied;
    decisions.push(registry_decision);
    if registry_denied {
        return Err(SourceError::PolicyDenied("image registry is not in the allow-list".to_string()));
    }

    let mode = bundle.verify_mode_for(profile);
    let outcome = match mode {
        VerifyMode::Disabled if !requested_verify => None,
        _ => Some(verifier.verify(image_ref).await?),
    };
    let verified = outcome.as_ref().map(|o| o.verified);
    let reason = outcome.as_ref().and_then(|o| o.reason.as_deref());

    let verify_decision = verify_mode_gate(mode, verified, reason);
    let verify_denied = verify_decision.decision == Verdict::Denied;
    decisions.push(verify_decision);
    if verify_denied {
        return Err(SourceError::SignatureInvalid(reason.unwrap_or("signature verification failed").to_string()));
    }
    if requested_verify && !verified.unwrap_or(false) {
        return Err(SourceError::SignatureInvalid(
            reason.unwrap_or("requested signature verification failed").to_string(),
        ));
    }

    if matches!(pull_policy, PullPolicy::Always) || pull_policy == PullPolicy::default() {
        runtime.pull(image_ref, pull_policy).await?;
    }

    let network_none = !matches!(profile, SecurityProfile::Disabled);
    let read_only_rootfs = !matches!(profile, SecurityProfile::Disabled);
    let spec = ExtractionSpec {
        image: image_ref.to_string(),
        name: format!("flwd-extract-{}", nanoid::nanoid!(8)),
        path_in_image: MANIFEST_PATH_IN_IMAGE.to_string(),
        network_none,
        read_only_rootfs,
        pull_policy,
    };
    let manifest_bytes = runtime.run_extraction(spec).await?;
    let raw: serde_json::Value = serde_yaml::from_slice(&manifest_bytes)?;
    let manifest = validate_manifest(&raw)?;

    let image_info = runtime.inspect(image_ref).await?;

    let cache_dir = cache_dir_for(cache_root, name)?;
    std::fs::create_dir_all(&cache_dir)?;
    std::fs::write(cache_dir.join("manifest.yaml"), &manifest_bytes)?;

    let mut metadata = HashMap::new();
    metadata.insert("created".to_string(), image_info.created.clone());
    metadata.insert("image_id".to_string(), image_info.image_id.clone());
    metadata.insert("size_bytes".to_string(), image_info.size_bytes.to_string());

    let source = Source {
        name: name.to_string(),
        r#type: SourceType::Oci,
        r#ref: image_ref.to_string(),
        url: None,
        resolved_ref: None,
        resolved_commit: None,
        digest: Some(image_info.digest.clone()),
        pull_policy,
        verify_signatures: requested_verify,
        local_path: cache_dir.to_string_lossy().to_string(),
        aliases: Vec::new(),
        metadata,
        provenance: Provenance {
            source_name: Some(name.to_string()),
            source_type: Some("oci".to_string()),
            resolved_ref: Some(image_info.digest),
            ..Provenance::default()
        },
        expose: Expose::None,
    };

    Ok(OciMaterialization { source, manifest, decisions })
}

/// `<cache_root>/<name>`, rejecting any `name` that would escape
/// `cache_root` once `.`/`..` components are collapsed.
fn cache_dir_for(cache_root: &Path, name: &str) -> Result<PathBuf, SourceError> {
    let candidate = cache_root.join(name);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return Err(SourceError::NotAllowed { path: candidate.display().to_string() });
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    if !out.starts_with(cache_root) {
        return Err(SourceError::NotAllowed { path: candidate.display().to_string() });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_adapters::container::fake::FakeContainerRuntime;
    use flowd_adapters::container::ImageInfo;
    use flowd_adapters::verifier::fake::FakeImageVerifier;

    const MANIFEST_YAML: &str = r#"
apiVersion: flwd.addon/v1
kind: AddOn
metadata:
  name: Demo Add-on
  id: demo-addon
  version: 1.0.0
requires: {}
jobs:
  - id: demo.job
    name: Demo Job
    summary: Runs the demo job
    argspec:
      args: []
    steps:
      - name: run
        command: ["echo", "hi"]
"#;

    fn bundle_allowing(registry: &str) -> PolicyBundle {
        PolicyBundle { allowed_registries: vec![registry.to_string()], ..Default::default() }
    }

    #[tokio::test]
    async fn rejects_untrusted_request() {
        let runtime = FakeContainerRuntime::new();
        let verifier = FakeImageVerifier::always_verified();
        let bundle = PolicyBundle::default();
        let dir = tempfile::tempdir().unwrap();
        let err = materialize_oci(
            runtime.as_ref(),
            &verifier,
            &bundle,
            SecurityProfile::Secure,
            dir.path(),
            "demo",
            "ghcr.io/acme/demo:1",
            PullPolicy::IfNotPresent,
            false,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn rejects_disallowed_registry() {
        let runtime = FakeContainerRuntime::new();
        let verifier = FakeImageVerifier::always_verified();
        let bundle = bundle_allowing("ghcr.io");
        let dir = tempfile::tempdir().unwrap();
        let err = materialize_oci(
            runtime.as_ref(),
            &verifier,
            &bundle,
            SecurityProfile::Secure,
            dir.path(),
            "demo",
            "docker.io/acme/demo:1",
            PullPolicy::IfNotPresent,
            true,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn secure_profile_requires_verified_signature() {
        let runtime = FakeContainerRuntime::new();
        runtime.with_manifest(
            "ghcr.io/acme/demo:1",
            MANIFEST_YAML.as_bytes(),
            ImageInfo { digest: "sha256:abc".into(), ..Default::default() },
        );
        let verifier = FakeImageVerifier::always_failing();
        let bundle = bundle_allowing("ghcr.io");
        let dir = tempfile::tempdir().unwrap();
        let err = materialize_oci(
            runtime.as_ref(),
            &verifier,
            &bundle,
            SecurityProfile::Secure,
            dir.path(),
            "demo",
            "ghcr.io/acme/demo:1",
            PullPolicy::IfNotPresent,
            true,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn verified_image_materializes_and_caches_manifest() {
        let runtime = FakeContainerRuntime::new();
        runtime.with_manifest(
            "ghcr.io/acme/demo:1",
            MANIFEST_YAML.as_bytes(),
            ImageInfo { digest: "sha256:abc".into(), created: "2026-01-01T00:00:00Z".into(), ..Default::default() },
        );
        let verifier = FakeImageVerifier::always_verified();
        let bundle = bundle_allowing("ghcr.io");
        let dir = tempfile::tempdir().unwrap();
        let result = materialize_oci(
            runtime.as_ref(),
            &verifier,
            &bundle,
            SecurityProfile::Secure,
            dir.path(),
            "demo",
            "ghcr.io/acme/demo:1",
            PullPolicy::IfNotPresent,
            true,
            false,
        )
        .await
        .unwrap();
        assert_eq!(result.source.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(result.manifest.metadata.id, "demo-addon");
        assert!(dir.path().join("demo/manifest.yaml").exists());
    }

    #[tokio::test]
    async fn requested_verify_overrides_disabled_mode() {
        let runtime = FakeContainerRuntime::new();
        runtime.with_manifest(
            "ghcr.io/acme/demo:1",
            MANIFEST_YAML.as_bytes(),
            ImageInfo { digest: "sha256:abc".into(), ..Default::default() },
        );
        let verifier = FakeImageVerifier::always_failing();
        let bundle = bundle_allowing("ghcr.io");
        let dir = tempfile::tempdir().unwrap();
        let err = materialize_oci(
            runtime.as_ref(),
            &verifier,
            &bundle,
            SecurityProfile::Disabled,
            dir.path(),
            "demo",
            "ghcr.io/acme/demo:1",
            PullPolicy::IfNotPresent,
            true,
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SourceError::SignatureInvalid(_)));
    }

    #[test]
    fn cache_dir_rejects_escape() {
        let root = PathBuf::from("/data/sources/oci");
        let err = cache_dir_for(&root, "..").unwrap_err();
        assert!(matches!(err, SourceError::NotAllowed { .. }));
    }

    #[test]
    fn cache_dir_accepts_plain_name() {
        let root = PathBuf::from("/data/sources/oci");
        let dir = cache_dir_for(&root, "demo").unwrap();
        assert_eq!(dir, PathBuf::from("/data/sources/oci/demo"));
    }
}
