// SPDX-License-Identifier: MIT

//! The policy bundle: registry allow-list, per-profile
//! verify mode, resource ceilings, and override allow-lists.
//!
//! Loaded from `FLWD_POLICY_FILE` (TOML) with serde defaults for every
//! field, so an absent file yields conservative `secure`-profile
//! defaults.

use crate::error::PolicyError;
use flowd_core::policy_types::{ResourceCeilings, SecurityProfile, VerifyMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Policy-driven allowances for the four override subjects: network
/// mode, writable rootfs, added capabilities, and env inheritance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    /// Network modes other than `none` permitted under `permissive`.
    pub network: Vec<String>,
    pub rootfs_writable: bool,
    /// Added capabilities permitted under `permissive`.
    pub caps: Vec<String>,
    pub env_inheritance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyBundle {
    pub allowed_registries: Vec<String>,
    /// Per-profile verify-mode override. Profiles absent from this map
    /// fall back to the built-in default: `secure` -> `required`,
    /// `permissive` -> `permissive`, `disabled` -> `disabled`.
    pub verify_signatures: std::collections::HashMap<SecurityProfile, VerifyMode>,
    pub ceilings: ResourceCeilings,
    pub overrides: Overrides,
}

impl Default for PolicyBundle {
    fn default() -> Self {
        Self {
            allowed_registries: Vec::new(),
            verify_signatures: std::collections::HashMap::new(),
            ceilings: ResourceCeilings::default(),
            overrides: Overrides::default(),
        }
    }
}

impl PolicyBundle {
    /// Load from a TOML file at `path`. A missing file is not an error —
    /// it yields the all-defaults bundle (secure profile, no ceilings, no
    /// overrides, allow-all registries).
    pub fn load(path: Option<&Path>) -> Result<Self, PolicyError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| PolicyError::ConfigLoad(e.to_string()))?;
        toml::from_str(&raw).map_err(|e| PolicyError::ConfigLoad(e.to_string()))
    }

    /// The effective verify mode for `profile`.
    pub fn verify_mode_for(&self, profile: SecurityProfile) -> VerifyMode {
        if let Some(mode) = self.verify_signatures.get(&profile) {
            return *mode;
        }
        match profile {
            SecurityProfile::Secure => VerifyMode::Required,
            SecurityProfile::Permissive => VerifyMode::Permissive,
            SecurityProfile::Disabled => VerifyMode::Disabled,
        }
    }
}

/// Resolve the effective security profile:
/// request field, else environment variable, else config, else `secure`.
/// An unparsable non-empty value at any tier is rejected with
/// `PolicyError::InvalidProfile` (surfaced as 422 `E_POLICY`).
pub fn resolve_profile(
    requested: Option<&str>,
    env_value: Option<&str>,
    config_value: Option<&str>,
) -> Result<SecurityProfile, PolicyError> {
    for candidate in [requested, env_value, config_value] {
        if let Some(raw) = candidate {
            if raw.is_empty() {
                continue;
            }
            return raw.parse::<SecurityProfile>().map_err(|_| PolicyError::InvalidProfile(raw.to_string()));
        }
    }
    Ok(SecurityProfile::Secure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bundle_is_secure_required_allow_all() {
        let bundle = PolicyBundle::default();
        assert!(bundle.allowed_registries.is_empty());
        assert_eq!(bundle.verify_mode_for(SecurityProfile::Secure), VerifyMode::Required);
        assert_eq!(bundle.verify_mode_for(SecurityProfile::Permissive), VerifyMode::Permissive);
        assert_eq!(bundle.verify_mode_for(SecurityProfile::Disabled), VerifyMode::Disabled);
    }

    #[test]
    fn profile_resolution_precedence() {
        assert_eq!(resolve_profile(Some("permissive"), Some("secure"), None).unwrap(), SecurityProfile::Permissive);
        assert_eq!(resolve_profile(None, Some("disabled"), Some("secure")).unwrap(), SecurityProfile::Disabled);
        assert_eq!(resolve_profile(None, None, Some("permissive")).unwrap(), SecurityProfile::Permissive);
        assert_eq!(resolve_profile(None, None, None).unwrap(), SecurityProfile::Secure);
    }

    #[test]
    fn invalid_profile_value_rejected() {
        let err = resolve_profile(Some("bogus"), None, None).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidProfile(_)));
    }

    #[test]
    fn missing_policy_file_yields_defaults() {
        let bundle = PolicyBundle::load(Some(Path::new("/nonexistent/flwd-policy.toml"))).unwrap();
        assert!(bundle.allowed_registries.is_empty());
    }

    #[test]
    fn loads_toml_overrides() {
        let dir = std::env::temp_dir().join(format!("flwd-policy-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("policy.toml");
        std::fs::write(
            &path,
            r#"
            allowed_registries = ["ghcr.io"]

            [ceilings]
            cpu_millis = 2000
            memory_bytes = 536870912

            [overrides]
            network = ["bridge"]
            rootfs_writable = true
            "#,
        )
        .unwrap();
        let bundle = PolicyBundle::load(Some(&path)).unwrap();
        assert_eq!(bundle.allowed_registries, vec!["ghcr.io".to_string()]);
        assert_eq!(bundle.ceilings.cpu_millis, Some(2000));
        assert!(bundle.overrides.rootfs_writable);
        std::fs::remove_dir_all(&dir).ok();
    }
}
