// SPDX-License-Identifier: MIT

//! Registered job-definition source: local directory, git checkout, or
//! OCI add-on image.

use crate::run::Provenance;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Local,
    Git,
    Oci,
}

crate::simple_display! {
    SourceType {
        Local => "local",
        Git => "git",
        Oci => "oci",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl Default for PullPolicy {
    fn default() -> Self {
        PullPolicy::IfNotPresent
    }
}

/// What of a source's internals is exposed to clients via `/jobs` and
/// `/sources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expose {
    None,
    Read,
    ReadWrite,
}

impl Default for Expose {
    fn default() -> Self {
        Expose::None
    }
}

/// A name's validity: `[^/\\]+`.
pub fn is_valid_source_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub r#type: SourceType,
    pub r#ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    #[serde(default)]
    pub verify_signatures: bool,
    pub local_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub expose: Expose,
}

impl Source {
    /// A copy of this record sanitised for an API response: `aliases` are
    /// omitted unless `expose` allows reading them.
    pub fn sanitized(&self) -> Source {
        let mut copy = self.clone();
        if matches!(self.expose, Expose::None) {
            copy.aliases.clear();
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_name_validation() {
        assert!(is_valid_source_name("ghcr-addon"));
        assert!(!is_valid_source_name(""));
        assert!(!is_valid_source_name("a/b"));
        assert!(!is_valid_source_name("a\\b"));
    }

    #[test]
    fn sanitized_hides_aliases_when_not_exposed() {
        let src = Source {
            name: "s".into(),
            r#type: SourceType::Local,
            r#ref: ".".into(),
            url: None,
            resolved_ref: None,
            resolved_commit: None,
            digest: None,
            pull_policy: PullPolicy::Never,
            verify_signatures: false,
            local_path: "/data/s".into(),
            aliases: vec!["a".into()],
            metadata: HashMap::new(),
            provenance: Provenance::default(),
            expose: Expose::None,
        };
        assert!(src.sanitized().aliases.is_empty());

        let mut exposed = src.clone();
        exposed.expose = Expose::Read;
        assert_eq!(exposed.sanitized().aliases, vec!["a".to_string()]);
    }
}
