// SPDX-License-Identifier: MIT

//! Local filesystem source registration.

use crate::error::SourceError;
use flowd_core::run::Provenance;
use flowd_core::source::{is_valid_source_name, Expose, PullPolicy, Source, SourceType};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Register a `local` source: `reference` is joined against each
/// `allow_roots` entry in order; the first normalised result that stays
/// within its root wins. Denied with `source.not.allowed` if none do.
pub fn register_local(allow_roots: &[PathBuf], name: &str, reference: &str) -> Result<Source, SourceError> {
    if !is_valid_source_name(name) {
        return Err(SourceError::InvalidName(name.to_string()));
    }

    for root in allow_roots {
        let candidate = root.join(reference);
        let Ok(normalized) = normalize_path(&candidate) else { continue };
        let Ok(normalized_root) = normalize_path(root) else { continue };
        if normalized.starts_with(&normalized_root) {
            return Ok(Source {
                name: name.to_string(),
                r#type: SourceType::Local,
                r#ref: reference.to_string(),
                url: None,
                resolved_ref: None,
                resolved_commit: None,
                digest: None,
                pull_policy: PullPolicy::Never,
                verify_signatures: false,
                local_path: normalized.to_string_lossy().to_string(),
                aliases: Vec::new(),
                metadata: HashMap::new(),
                provenance: Provenance { source_name: Some(name.to_string()), source_type: Some("local".to_string()), ..Provenance::default() },
                expose: Expose::None,
            });
        }
    }

    Err(SourceError::NotAllowed { path: reference.to_string() })
}

/// Normalise a path lexically (no symlink resolution required, since the
/// destination may not exist yet) by collapsing `.`/`..` components.
fn normalize_path(path: &Path) -> Result<PathBuf, SourceError> {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !out.pop() {
                    return Err(SourceError::NotAllowed { path: path.display().to_string() });
                }
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_path_within_allow_root() {
        let root = PathBuf::from("/data/allowed");
        let source = register_local(&[root], "demo", "jobs/a").unwrap();
        assert_eq!(source.local_path, "/data/allowed/jobs/a");
    }

    #[test]
    fn rejects_escape_via_parent_dir() {
        let root = PathBuf::from("/data/allowed");
        let err = register_local(&[root], "demo", "../../etc/passwd").unwrap_err();
        assert!(matches!(err, SourceError::NotAllowed { .. }));
    }

    #[test]
    fn rejects_invalid_name() {
        let root = PathBuf::from("/data/allowed");
        let err = register_local(&[root], "a/b", ".").unwrap_err();
        assert!(matches!(err, SourceError::InvalidName(_)));
    }
}
