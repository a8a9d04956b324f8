// SPDX-License-Identifier: MIT

//! The pre-run computed artifact describing what a run would do
//!. Read-only derived value; never persisted as-is
//! except within the per-run plan artifact file on disk.

use crate::policy_types::{PolicyDecision, SecurityProfile};
use crate::run::Provenance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trust evaluation result for a container image, attached to a plan when
/// the job runs in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTrust {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_digest: Option<String>,
}

/// One step of the executor preview (a human/CLI-facing summary of what
/// will run, never executed directly from the plan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequirements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub job_id: String,
    pub security_profile: SecurityProfile,
    pub resolved_args: HashMap<String, serde_json::Value>,
    pub executor_preview: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<PlanStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_trust: Option<ImageTrust>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_findings: Vec<PolicyDecision>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<PlanRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
}
