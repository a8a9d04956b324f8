// SPDX-License-Identifier: MIT

//! Alias definitions and the alias index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One alias as declared by a source (`<root>/flwd.yaml` or per-source
/// alias definitions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDef {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A resolved, normalised alias entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasInfo {
    pub name: String,
    pub target_path: String,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Why an alias declaration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidAlias {
    pub code: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasIndex {
    pub entries: HashMap<String, AliasInfo>,
    pub collisions: HashMap<String, Vec<AliasInfo>>,
    pub invalid: HashMap<String, InvalidAlias>,
}

/// Normalise an alias `from` path: backslashes and colons become `/`,
/// `..` segments collapse to `.`, runs of `/` collapse to one,
/// leading/trailing `/` are trimmed, interior spaces removed.
///
/// Returns `(target_path, target_id)`.
pub fn normalize_from(from: &str) -> (String, String) {
    let replaced: String = from
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace('\\', "/")
        .replace(':', "/")
        .replace("..", ".");

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_slash = false;
    for c in replaced.chars() {
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        collapsed.push(c);
    }
    let target_path = collapsed.trim_matches('/').to_string();
    let target_id = target_path.replace('/', ".");
    (target_path, target_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasValidationError {
    EmptyDefinition,
    Reserved,
    NameConflict,
    TargetInvalid,
}

impl AliasValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            AliasValidationError::EmptyDefinition => "alias.configuration.invalid",
            AliasValidationError::Reserved => "alias.reserved",
            AliasValidationError::NameConflict => "alias.name.conflict",
            AliasValidationError::TargetInvalid => "alias.target.invalid",
        }
    }
}

/// Validate and normalise a single alias declaration against the set of
/// known job ids. Returns the built `AliasInfo` keyed by lower-cased name,
/// or the validation failure.
pub fn validate_alias(
    def: &AliasDef,
    known_job_ids: &std::collections::HashSet<String>,
) -> Result<(String, AliasInfo), AliasValidationError> {
    let from = def.from.trim();
    let to = def.to.trim();
    if from.is_empty() || to.is_empty() {
        return Err(AliasValidationError::EmptyDefinition);
    }
    if to.contains('/') {
        return Err(AliasValidationError::TargetInvalid);
    }
    if to.starts_with(':') {
        return Err(AliasValidationError::Reserved);
    }
    if known_job_ids.iter().any(|id| id.eq_ignore_ascii_case(to)) {
        return Err(AliasValidationError::NameConflict);
    }

    let (target_path, target_id) = normalize_from(from);
    if !known_job_ids.contains(&target_id) {
        return Err(AliasValidationError::TargetInvalid);
    }

    let info = AliasInfo {
        name: to.to_string(),
        target_path,
        target_id,
        source: def.source.clone(),
        description: def.description.clone(),
    };
    Ok((to.to_lowercase(), info))
}

/// Build the alias index from a set of alias definitions gathered across
/// sources: first declaration wins visibility, later ones for the same
/// lower-cased name become collisions.
///
/// Duplicate declarations for the *same* `(name, source)` pair are
/// deduplicated before grouping — see DESIGN.md "Open Question (b)".
pub fn build_alias_index(
    defs: &[AliasDef],
    known_job_ids: &std::collections::HashSet<String>,
) -> AliasIndex {
    let mut index = AliasIndex::default();
    let mut by_name: HashMap<String, Vec<AliasInfo>> = HashMap::new();

    for def in defs {
        match validate_alias(def, known_job_ids) {
            Ok((key, info)) => by_name.entry(key).or_default().push(info),
            Err(e) => {
                index.invalid.insert(
                    def.to.trim().to_string(),
                    InvalidAlias { code: e.code().to_string(), detail: format!("{:?}", e) },
                );
            }
        }
    }

    for (key, mut infos) in by_name {
        infos.dedup_by(|a, b| a.source == b.source && a.target_id == b.target_id);
        if infos.len() == 1 {
            index.entries.insert(key, infos.into_iter().next().expect("len checked"));
        } else {
            index.entries.insert(key, infos[0].clone());
            index.collisions.insert(key, infos);
        }
    }

    index
}

impl AliasIndex {
    /// Lookup used by the run/plan endpoints.
    pub fn resolve(&self, name: &str) -> AliasResolution<'_> {
        let key = name.to_lowercase();
        if let Some(colliders) = self.collisions.get(&key) {
            return AliasResolution::Collision(colliders);
        }
        if let Some(invalid) = self.invalid.get(name) {
            return AliasResolution::Invalid(invalid);
        }
        match self.entries.get(&key) {
            Some(info) => AliasResolution::Found(info),
            None => AliasResolution::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasResolution<'a> {
    Found(&'a AliasInfo),
    Collision(&'a Vec<AliasInfo>),
    Invalid(&'a InvalidAlias),
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn jobs(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_collapses_separators() {
        let (path, id) = normalize_from("a:b\\c//d/");
        assert_eq!(path, "a/b/c/d");
        assert_eq!(id, "a.b.c.d");
    }

    #[test]
    fn normalize_handles_dotdot() {
        let (path, _) = normalize_from("a/../b");
        assert_eq!(path, "a/./b");
    }

    #[test]
    fn reserved_colon_prefix_rejected() {
        let def = AliasDef { from: "demo".into(), to: ":reserved".into(), source: None, description: None };
        let err = validate_alias(&def, &jobs(&["demo"])).unwrap_err();
        assert_eq!(err, AliasValidationError::Reserved);
    }

    #[test]
    fn target_must_exist() {
        let def = AliasDef { from: "missing".into(), to: "m".into(), source: None, description: None };
        let err = validate_alias(&def, &jobs(&["demo"])).unwrap_err();
        assert_eq!(err, AliasValidationError::TargetInvalid);
    }

    #[test]
    fn name_cannot_equal_real_job_id() {
        let def = AliasDef { from: "demo".into(), to: "demo".into(), source: None, description: None };
        let err = validate_alias(&def, &jobs(&["demo"])).unwrap_err();
        assert_eq!(err, AliasValidationError::NameConflict);
    }

    #[test]
    fn colliding_declarations_surface_full_contender_list() {
        let defs = vec![
            AliasDef { from: "demo".into(), to: "d".into(), source: Some("s1".into()), description: None },
            AliasDef { from: "other".into(), to: "d".into(), source: Some("s2".into()), description: None },
        ];
        let index = build_alias_index(&defs, &jobs(&["demo", "other"]));
        match index.resolve("d") {
            AliasResolution::Collision(colliders) => assert_eq!(colliders.len(), 2),
            other => panic!("expected collision, got {:?}", other),
        }
    }

    #[test]
    fn unique_alias_resolves() {
        let defs = vec![AliasDef {
            from: "demo".into(),
            to: "d".into(),
            source: None,
            description: None,
        }];
        let index = build_alias_index(&defs, &jobs(&["demo"]));
        match index.resolve("D") {
            AliasResolution::Found(info) => assert_eq!(info.target_id, "demo"),
            other => panic!("expected found, got {:?}", other),
        }
    }
}
