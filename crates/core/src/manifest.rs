// SPDX-License-Identifier: MIT

//! Job definitions and the OCI add-on manifest. Shared between the source
//! manager (which extracts and validates these) and the run lifecycle
//! controller (which reads them to build a plan).

use crate::argspec::ArgSpec;
use crate::policy_types::VerifyMode;
use crate::source::PullPolicy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?(\+[0-9A-Za-z.-]+)?$").expect("static regex"))
}

fn addon_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]{1,62}[a-z0-9]$").expect("static regex"))
}

fn job_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_.:-]{2,}$").expect("static regex"))
}

/// One step of a job's executor preview/launch sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobStep {
    pub name: String,
    pub command: Vec<String>,
}

/// Container execution parameters declared by a job, subject to the
/// admission policy gates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub rootfs_writable: bool,
    #[serde(default)]
    pub caps: Vec<String>,
    #[serde(default)]
    pub env_inheritance: bool,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    /// Per-container verify-mode override.
    #[serde(default)]
    pub verify_signatures: Option<VerifyMode>,
}

/// One job declared by a local/git directory or an add-on manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub argspec: ArgSpec,
    #[serde(default)]
    pub steps: Vec<JobStep>,
    #[serde(default)]
    pub container: Option<ContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddOnMetadata {
    pub name: String,
    pub id: String,
    pub version: String,
}

/// The `flwd-addon/manifest.yaml` payload extracted from an OCI image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddOnManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: AddOnMetadata,
    pub requires: serde_json::Value,
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    Malformed(String),
    WrongApiVersion(String),
    WrongKind(String),
    EmptyMetadataField(&'static str),
    InvalidVersion(String),
    InvalidAddonId(String),
    MissingRequires,
    EmptyJobs,
    InvalidJobId(String),
    EmptyJobName(String),
    SummaryTooLong(String),
}

impl ManifestError {
    pub fn code(&self) -> &'static str {
        match self {
            ManifestError::Malformed(_) => "validation.failed",
            ManifestError::WrongApiVersion(_) => "validation.failed",
            ManifestError::WrongKind(_) => "validation.failed",
            ManifestError::EmptyMetadataField(_) => "validation.failed",
            ManifestError::InvalidVersion(_) => "validation.failed",
            ManifestError::InvalidAddonId(_) => "validation.failed",
            ManifestError::MissingRequires => "validation.failed",
            ManifestError::EmptyJobs => "validation.failed",
            ManifestError::InvalidJobId(_) => "validation.failed",
            ManifestError::EmptyJobName(_) => "validation.failed",
            ManifestError::SummaryTooLong(_) => "validation.failed",
        }
    }
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Malformed(detail) => write!(f, "malformed manifest: {detail}"),
            ManifestError::WrongApiVersion(v) => write!(f, "unsupported apiVersion '{v}', expected flwd.addon/v1"),
            ManifestError::WrongKind(k) => write!(f, "unsupported kind '{k}', expected AddOn"),
            ManifestError::EmptyMetadataField(field) => write!(f, "metadata.{field} must not be empty"),
            ManifestError::InvalidVersion(v) => write!(f, "metadata.version '{v}' is not valid SemVer"),
            ManifestError::InvalidAddonId(id) => write!(f, "metadata.id '{id}' does not match the required pattern"),
            ManifestError::MissingRequires => write!(f, "requires must be present"),
            ManifestError::EmptyJobs => write!(f, "jobs must be non-empty"),
            ManifestError::InvalidJobId(id) => write!(f, "job id '{id}' does not match the required pattern"),
            ManifestError::EmptyJobName(id) => write!(f, "job '{id}' must have a non-empty name"),
            ManifestError::SummaryTooLong(id) => write!(f, "job '{id}' summary exceeds 240 characters"),
        }
    }
}

impl std::error::Error for ManifestError {}

/// Parse and validate raw manifest JSON (already converted from YAML by
/// the caller). Unknown fields at any nesting level are rejected by `serde`'s
/// `deny_unknown_fields` on every manifest type; the remaining checks
/// (SemVer, id patterns, non-empty constraints) are applied here.
pub fn validate_manifest(raw: &serde_json::Value) -> Result<AddOnManifest, ManifestError> {
    let manifest: AddOnManifest =
        serde_json::from_value(raw.clone()).map_err(|e| ManifestError::Malformed(e.to_string()))?;

    if manifest.api_version != "flwd.addon/v1" {
        return Err(ManifestError::WrongApiVersion(manifest.api_version.clone()));
    }
    if manifest.kind != "AddOn" {
        return Err(ManifestError::WrongKind(manifest.kind.clone()));
    }
    if manifest.metadata.name.trim().is_empty() {
        return Err(ManifestError::EmptyMetadataField("name"));
    }
    if manifest.metadata.id.trim().is_empty() {
        return Err(ManifestError::EmptyMetadataField("id"));
    }
    if manifest.metadata.version.trim().is_empty() {
        return Err(ManifestError::EmptyMetadataField("version"));
    }
    if !version_re().is_match(&manifest.metadata.version) {
        return Err(ManifestError::InvalidVersion(manifest.metadata.version.clone()));
    }
    if !addon_id_re().is_match(&manifest.metadata.id) {
        return Err(ManifestError::InvalidAddonId(manifest.metadata.id.clone()));
    }
    if manifest.requires.is_null() {
        return Err(ManifestError::MissingRequires);
    }
    if manifest.jobs.is_empty() {
        return Err(ManifestError::EmptyJobs);
    }
    for job in &manifest.jobs {
        if !job_id_re().is_match(&job.id) {
            return Err(ManifestError::InvalidJobId(job.id.clone()));
        }
        if job.name.trim().is_empty() {
            return Err(ManifestError::EmptyJobName(job.id.clone()));
        }
        if job.summary.chars().count() > 240 {
            return Err(ManifestError::SummaryTooLong(job.id.clone()));
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_manifest() -> serde_json::Value {
        json!({
            "apiVersion": "flwd.addon/v1",
            "kind": "AddOn",
            "metadata": {"name": "Example AddOn", "id": "example-addon", "version": "1.0.0"},
            "requires": {},
            "jobs": [
                {
                    "id": "addon.build",
                    "name": "Build",
                    "summary": "Builds the project",
                    "argspec": {"args": []},
                }
            ],
        })
    }

    #[test]
    fn accepts_well_formed_manifest() {
        let manifest = validate_manifest(&valid_manifest()).unwrap();
        assert_eq!(manifest.metadata.id, "example-addon");
        assert_eq!(manifest.jobs[0].id, "addon.build");
    }

    #[test]
    fn rejects_wrong_api_version() {
        let mut raw = valid_manifest();
        raw["apiVersion"] = json!("flwd.addon/v2");
        let err = validate_manifest(&raw).unwrap_err();
        assert!(matches!(err, ManifestError::WrongApiVersion(_)));
    }

    #[test]
    fn rejects_invalid_semver() {
        let mut raw = valid_manifest();
        raw["metadata"]["version"] = json!("1.0");
        let err = validate_manifest(&raw).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVersion(_)));
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let mut raw = valid_manifest();
        raw["bogus"] = json!(true);
        let err = validate_manifest(&raw).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_unknown_nested_arg_field() {
        let mut raw = valid_manifest();
        raw["jobs"][0]["argspec"]["args"] = json!([{"name": "x", "bogus": 1}]);
        let err = validate_manifest(&raw).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_empty_jobs() {
        let mut raw = valid_manifest();
        raw["jobs"] = json!([]);
        let err = validate_manifest(&raw).unwrap_err();
        assert_eq!(err, ManifestError::EmptyJobs);
    }

    #[test]
    fn rejects_bad_job_id_pattern() {
        let mut raw = valid_manifest();
        raw["jobs"][0]["id"] = json!("Bad Id!");
        let err = validate_manifest(&raw).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidJobId(_)));
    }
}
