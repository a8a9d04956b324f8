// SPDX-License-Identifier: MIT

//! The discovered job catalog: every job found across registered source
//! roots, plus the alias index built over them.

use crate::error::ControllerError;
use flowd_core::alias::{AliasDef, AliasIndex, AliasResolution};
use flowd_core::manifest::{AddOnManifest, JobSpec};
use flowd_core::source::SourceType;
use flowd_sources::SourceStore;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// One source root's contribution to discovery: the jobs it found and
/// the aliases it declares (`<root>/flwd.yaml` plus any source-scoped
/// alias list).
pub struct DiscoveredRoot {
    pub source_name: Option<String>,
    pub source_type: Option<SourceType>,
    pub jobs: Vec<JobSpec>,
    pub aliases: Vec<AliasDef>,
    pub discovery_errors: usize,
}

/// The full set of runnable jobs known to the controller, plus their
/// alias lookup table.
#[derive(Default)]
pub struct JobCatalog {
    jobs: HashMap<String, JobSpec>,
    aliases: AliasIndex,
    /// Job ids that came from an OCI source's cached manifest, composed
    /// as `<source>/<job id>`. These resolve fine via `POST /plans` but
    /// `POST /runs` rejects them with `OciRunUnsupported`.
    oci_ids: HashSet<String>,
    /// Directories/config files skipped across every discovered root,
    /// surfaced via `x-flowd-discovery-errors`.
    discovery_errors: usize,
}

impl JobCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild the catalog from scratch given every discovered root.
    /// Jobs are merged by id — a later root's job with the same id
    /// overwrites an earlier one (last-registered source wins, matching
    /// the order sources were registered in).
    pub fn build(roots: Vec<DiscoveredRoot>) -> Self {
        let mut jobs = HashMap::new();
        let mut alias_defs = Vec::new();
        let mut oci_ids = HashSet::new();
        let mut discovery_errors = 0usize;
        for root in roots {
            let is_oci = matches!(root.source_type, Some(SourceType::Oci));
            discovery_errors += root.discovery_errors;
            for job in root.jobs {
                if is_oci {
                    oci_ids.insert(job.id.clone());
                }
                jobs.insert(job.id.clone(), job);
            }
            for mut def in root.aliases {
                if def.source.is_none() {
                    def.source = root.source_name.clone();
                }
                alias_defs.push(def);
            }
        }
        let known_ids: std::collections::HashSet<String> = jobs.keys().cloned().collect();
        let aliases = flowd_core::alias::build_alias_index(&alias_defs, &known_ids);
        Self { jobs, aliases, oci_ids, discovery_errors }
    }

    pub fn get(&self, id: &str) -> Option<&JobSpec> {
        self.jobs.get(id)
    }

    /// Whether `id` was discovered from an OCI source's cached manifest.
    pub fn is_oci(&self, id: &str) -> bool {
        self.oci_ids.contains(id)
    }

    pub fn list(&self) -> Vec<&JobSpec> {
        let mut jobs: Vec<&JobSpec> = self.jobs.values().collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    /// Total directories/config files skipped across every discovered
    /// root the last time this catalog was built.
    pub fn discovery_errors(&self) -> usize {
        self.discovery_errors
    }

    /// Resolve a job reference the way `POST /plans` and `POST /runs`
    /// do: a direct id hit wins; failing
    /// that, fall back to alias resolution.
    pub fn resolve(&self, id_or_alias: &str) -> Result<&JobSpec, ControllerError> {
        if let Some(job) = self.jobs.get(id_or_alias) {
            return Ok(job);
        }
        match self.aliases.resolve(id_or_alias) {
            AliasResolution::Found(info) => self
                .jobs
                .get(&info.target_id)
                .ok_or_else(|| ControllerError::JobNotFound(id_or_alias.to_string())),
            AliasResolution::Collision(_) => Err(ControllerError::JobAmbiguous(id_or_alias.to_string())),
            AliasResolution::Invalid(invalid) => {
                Err(ControllerError::JobAliasInvalid(id_or_alias.to_string(), invalid.detail.clone()))
            }
            AliasResolution::NotFound => Err(ControllerError::JobNotFound(id_or_alias.to_string())),
        }
    }
}

/// Rebuild the catalog from every registered source. `local`/`git` sources are walked fresh with
/// [`flowd_sources::discover`]; `oci` sources read their cached
/// `manifest.yaml` and compose each job id as `<source>/<job id>` so it
/// can never collide with a locally discovered job id.
pub fn rebuild(sources: &SourceStore) -> Result<JobCatalog, ControllerError> {
    let mut roots = Vec::new();
    for source in sources.list() {
        let root_path = Path::new(&source.local_path);
        let (jobs, aliases, discovery_errors) = match source.r#type {
            SourceType::Local | SourceType::Git => {
                let (jobs, discovery_errors) = flowd_sources::discover(root_path)?;
                let aliases = flowd_sources::load_root_aliases(root_path)?;
                (jobs, aliases, discovery_errors)
            }
            SourceType::Oci => {
                let manifest_path = root_path.join("manifest.yaml");
                let raw = std::fs::read_to_string(&manifest_path).map_err(flowd_sources::SourceError::from)?;
                let manifest: AddOnManifest =
                    serde_yaml::from_str(&raw).map_err(flowd_sources::SourceError::from)?;
                let jobs = manifest
                    .jobs
                    .into_iter()
                    .map(|mut job| {
                        job.id = format!("{}/{}", source.name, job.id);
                        job
                    })
                    .collect();
                (jobs, Vec::new(), 0)
            }
        };
        roots.push(DiscoveredRoot {
            source_name: Some(source.name.clone()),
            source_type: Some(source.r#type),
            jobs,
            aliases,
            discovery_errors,
        });
    }
    Ok(JobCatalog::build(roots))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_core::argspec::ArgSpec;

    fn job(id: &str) -> JobSpec {
        JobSpec { id: id.to_string(), name: id.to_string(), summary: String::new(), description: None, argspec: ArgSpec::default(), steps: Vec::new(), container: None }
    }

    #[test]
    fn direct_id_lookup_wins_over_alias() {
        let catalog = JobCatalog::build(vec![DiscoveredRoot { source_name: None, source_type: None, jobs: vec![job("demo")], aliases: vec![], discovery_errors: 0 }]);
        assert!(catalog.resolve("demo").is_ok());
    }

    #[test]
    fn alias_resolves_to_target_job() {
        let alias = AliasDef { from: "demo".to_string(), to: "d".to_string(), source: None, description: None };
        let catalog = JobCatalog::build(vec![DiscoveredRoot { source_name: None, source_type: None, jobs: vec![job("demo")], aliases: vec![alias], discovery_errors: 0 }]);
        let resolved = catalog.resolve("d").unwrap();
        assert_eq!(resolved.id, "demo");
    }

    #[test]
    fn unknown_reference_is_not_found() {
        let catalog = JobCatalog::build(vec![DiscoveredRoot { source_name: None, source_type: None, jobs: vec![job("demo")], aliases: vec![], discovery_errors: 0 }]);
        assert!(matches!(catalog.resolve("missing"), Err(ControllerError::JobNotFound(_))));
    }

    #[test]
    fn colliding_alias_is_ambiguous() {
        let a1 = AliasDef { from: "demo".to_string(), to: "d".to_string(), source: Some("a".to_string()), description: None };
        let a2 = AliasDef { from: "other".to_string(), to: "d".to_string(), source: Some("b".to_string()), description: None };
        let catalog = JobCatalog::build(vec![DiscoveredRoot {
            source_name: None,
            source_type: None,
            jobs: vec![job("demo"), job("other")],
            aliases: vec![a1, a2],
            discovery_errors: 0,
        }]);
        assert!(matches!(catalog.resolve("d"), Err(ControllerError::JobAmbiguous(_))));
    }
}
