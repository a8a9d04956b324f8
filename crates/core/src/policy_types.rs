// SPDX-License-Identifier: MIT

//! Shared policy vocabulary — kept in `flowd-core` because
//! both the policy engine and the run lifecycle controller (plan/run
//! admission) need these types without depending on each other.

use serde::{Deserialize, Serialize};

/// Policy strictness profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    Secure,
    Permissive,
    Disabled,
}

crate::simple_display! {
    SecurityProfile {
        Secure => "secure",
        Permissive => "permissive",
        Disabled => "disabled",
    }
}

impl std::str::FromStr for SecurityProfile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secure" => Ok(SecurityProfile::Secure),
            "permissive" => Ok(SecurityProfile::Permissive),
            "disabled" => Ok(SecurityProfile::Disabled),
            _ => Err(()),
        }
    }
}

impl Default for SecurityProfile {
    fn default() -> Self {
        SecurityProfile::Secure
    }
}

/// Image signature verification stance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    Required,
    Permissive,
    Disabled,
}

crate::simple_display! {
    VerifyMode {
        Required => "required",
        Permissive => "permissive",
        Disabled => "disabled",
    }
}

/// Subject of an override evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSubject {
    ContainerNetwork,
    ContainerRootfs,
    ContainerCapabilities,
    EnvInheritance,
}

crate::simple_display! {
    OverrideSubject {
        ContainerNetwork => "container.network",
        ContainerRootfs => "container.rootfs",
        ContainerCapabilities => "container.capabilities",
        EnvInheritance => "env.inheritance",
    }
}

/// Verdict of a single policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Denied,
    Warn,
}

/// One policy decision, emitted as a `policy.decision` event before a run
/// admission returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub subject: String,
    pub decision: Verdict,
    pub code: String,
    pub reason: String,
}

/// Container resource ceilings, expressed in normalized units
/// (millicores for CPU, bytes for memory).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCeilings {
    /// Millicores. `None` means unconstrained.
    pub cpu_millis: Option<u64>,
    /// Bytes. `None` means unconstrained.
    pub memory_bytes: Option<u64>,
}

/// Parse a Kubernetes-style CPU quantity (`"500m"` or `"2"`) into millicores.
pub fn parse_cpu_millis(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix('m') {
        stripped.parse::<u64>().ok()
    } else {
        let cores: f64 = s.parse().ok()?;
        if cores < 0.0 {
            return None;
        }
        Some((cores * 1000.0).round() as u64)
    }
}

/// Parse a Kubernetes-style memory quantity (`"512Mi"`, `"2Gi"`) into bytes.
pub fn parse_memory_bytes(s: &str) -> Option<u64> {
    let s = s.trim();
    const UNITS: &[(&str, u64)] = &[
        ("Ki", 1024),
        ("Mi", 1024 * 1024),
        ("Gi", 1024 * 1024 * 1024),
        ("Ti", 1024 * 1024 * 1024 * 1024),
    ];
    for (suffix, mult) in UNITS {
        if let Some(stripped) = s.strip_suffix(suffix) {
            let n: u64 = stripped.parse().ok()?;
            return Some(n * mult);
        }
    }
    s.parse::<u64>().ok()
}

/// Extract the registry host from an image reference: the first path
/// segment is the registry iff it contains `.` or `:`, or equals
/// `localhost`; otherwise `docker.io`.
pub fn registry_from_image(image_ref: &str) -> String {
    let without_tag_digest = image_ref.split('@').next().unwrap_or(image_ref);
    let first_segment = without_tag_digest.split('/').next().unwrap_or("");
    if first_segment == "localhost" || first_segment.contains('.') || first_segment.contains(':') {
        first_segment.to_string()
    } else {
        "docker.io".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_extraction_matches_spec_examples() {
        assert_eq!(registry_from_image("localhost:5000/a"), "localhost:5000");
        assert_eq!(registry_from_image("foo/bar"), "docker.io");
        assert_eq!(registry_from_image("ghcr.io/x/y:1"), "ghcr.io");
        assert_eq!(registry_from_image("alpine"), "docker.io");
        assert_eq!(registry_from_image("alpine:3.19"), "docker.io");
    }

    #[test]
    fn cpu_quantity_parsing() {
        assert_eq!(parse_cpu_millis("500m"), Some(500));
        assert_eq!(parse_cpu_millis("2"), Some(2000));
        assert_eq!(parse_cpu_millis("0.5"), Some(500));
    }

    #[test]
    fn memory_quantity_parsing() {
        assert_eq!(parse_memory_bytes("512Mi"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("2Gi"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("1024"), Some(1024));
    }

    #[test]
    fn profile_default_is_secure() {
        assert_eq!(SecurityProfile::default(), SecurityProfile::Secure);
    }
}
