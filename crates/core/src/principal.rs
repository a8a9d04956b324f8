// SPDX-License-Identifier: MIT

//! Authenticated caller identity and scopes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single permission grant, as carried in a bearer token's `scope`
/// claim (space-separated list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    JobsRead,
    RunsRead,
    RunsWrite,
    EventsRead,
    SourcesRead,
    SourcesWrite,
    RuleyRead,
    RuleyWrite,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::JobsRead => "jobs:read",
            Scope::RunsRead => "runs:read",
            Scope::RunsWrite => "runs:write",
            Scope::EventsRead => "events:read",
            Scope::SourcesRead => "sources:read",
            Scope::SourcesWrite => "sources:write",
            Scope::RuleyRead => "ruley:read",
            Scope::RuleyWrite => "ruley:write",
        }
    }

    pub fn parse(s: &str) -> Option<Scope> {
        match s {
            "jobs:read" => Some(Scope::JobsRead),
            "runs:read" => Some(Scope::RunsRead),
            "runs:write" => Some(Scope::RunsWrite),
            "events:read" => Some(Scope::EventsRead),
            "sources:read" => Some(Scope::SourcesRead),
            "sources:write" => Some(Scope::SourcesWrite),
            "ruley:read" => Some(Scope::RuleyRead),
            "ruley:write" => Some(Scope::RuleyWrite),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller identity resolved from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub scopes: HashSet<Scope>,
}

impl Principal {
    pub fn from_claim_strings(subject: impl Into<String>, raw_scopes: &str) -> Principal {
        let scopes = raw_scopes.split_whitespace().filter_map(Scope::parse).collect();
        Principal { subject: subject.into(), scopes }
    }

    pub fn has(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    /// A principal that may do anything — used by in-process callers and
    /// tests, never constructed from an external token.
    pub fn root() -> Principal {
        Principal {
            subject: "root".to_string(),
            scopes: [
                Scope::JobsRead,
                Scope::RunsRead,
                Scope::RunsWrite,
                Scope::EventsRead,
                Scope::SourcesRead,
                Scope::SourcesWrite,
                Scope::RuleyRead,
                Scope::RuleyWrite,
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_space_separated_scope_claim() {
        let p = Principal::from_claim_strings("svc-1", "runs:read runs:write bogus:scope");
        assert!(p.has(Scope::RunsRead));
        assert!(p.has(Scope::RunsWrite));
        assert!(!p.has(Scope::SourcesWrite));
    }

    #[test]
    fn root_has_every_scope() {
        let root = Principal::root();
        assert!(root.has(Scope::RuleyWrite));
    }
}
