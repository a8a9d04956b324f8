// SPDX-License-Identifier: MIT

//! Job discovery and root-level alias loading.
//!
//! Directory traversal is a manual `std::fs::read_dir` + explicit stack
//! walk rather than a crate, mirroring the runbook scanner this source
//! manager is grounded on: unreadable directories and malformed config
//! files are skipped with a `tracing::warn!`, not fatal.

use flowd_core::alias::AliasDef;
use flowd_core::argspec::ArgSpec;
use flowd_core::manifest::{ContainerSpec, JobSpec, JobStep};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{path}: {detail}")]
    InvalidConfig { path: PathBuf, detail: String },
}

#[derive(Debug, Default, Deserialize)]
struct RawJob {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    argspec: ArgSpec,
    #[serde(default)]
    steps: Vec<JobStep>,
    #[serde(default)]
    container: Option<ContainerSpec>,
}

impl RawJob {
    fn into_job_spec(self, derived_id: &str) -> JobSpec {
        let id = self.id.unwrap_or_else(|| derived_id.to_string());
        JobSpec {
            name: self.name.unwrap_or_else(|| id.clone()),
            id,
            summary: self.summary.unwrap_or_default(),
            description: self.description,
            argspec: self.argspec,
            steps: self.steps,
            container: self.container,
        }
    }
}

/// Walk `root`, loading every `config.d/config.yaml` found under a job
/// directory. A config file holds either a single `job:` block or a
/// `jobs:` list; a job without an explicit `id` gets one derived from its
/// directory's path relative to `root`, segments joined by `.`.
///
/// Returns the discovered jobs alongside a count of directories/config
/// files skipped along the way, surfaced by callers as
/// `x-flowd-discovery-errors` on `GET /jobs`.
pub fn discover(root: &Path) -> Result<(Vec<JobSpec>, usize), DiscoveryError> {
    let mut jobs = Vec::new();
    let mut errors = 0usize;
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %current.display(), error = %e, "skipping unreadable directory");
                errors += 1;
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some("config.d") {
                let config_path = path.join("config.yaml");
                if config_path.is_file() {
                    let derived_id = derive_id(root, &current);
                    match load_config_file(&config_path, &derived_id) {
                        Ok(mut found) => jobs.append(&mut found),
                        Err(e) => {
                            tracing::warn!(path = %config_path.display(), error = %e, "skipping invalid job config");
                            errors += 1;
                        }
                    }
                }
                continue;
            }
            stack.push(path);
        }
    }

    Ok((jobs, errors))
}

fn derive_id(root: &Path, job_dir: &Path) -> String {
    job_dir
        .strip_prefix(root)
        .unwrap_or(job_dir)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join(".")
}

fn load_config_file(path: &Path, derived_id: &str) -> Result<Vec<JobSpec>, DiscoveryError> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&raw).map_err(|e| DiscoveryError::InvalidConfig { path: path.to_path_buf(), detail: e.to_string() })?;

    let to_err = |e: serde_yaml::Error| DiscoveryError::InvalidConfig { path: path.to_path_buf(), detail: e.to_string() };

    if let Some(job_value) = value.get("job") {
        let raw_job: RawJob = serde_yaml::from_value(job_value.clone()).map_err(to_err)?;
        return Ok(vec![raw_job.into_job_spec(derived_id)]);
    }
    if let Some(jobs_value) = value.get("jobs") {
        let raw_jobs: Vec<RawJob> = serde_yaml::from_value(jobs_value.clone()).map_err(to_err)?;
        return Ok(raw_jobs.into_iter().map(|j| j.into_job_spec(derived_id)).collect());
    }

    Err(DiscoveryError::InvalidConfig {
        path: path.to_path_buf(),
        detail: "expected a top-level 'job' or 'jobs' key".to_string(),
    })
}

/// Load the root-level alias set from `<root>/flwd.yaml`. A missing file
/// yields an empty set, not an error.
pub fn load_root_aliases(root: &Path) -> Result<Vec<AliasDef>, DiscoveryError> {
    let path = root.join("flwd.yaml");
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(&path)?;

    #[derive(Deserialize)]
    struct RootAliasFile {
        #[serde(default)]
        aliases: Vec<AliasDef>,
    }

    let parsed: RootAliasFile = serde_yaml::from_str(&raw)
        .map_err(|e| DiscoveryError::InvalidConfig { path: path.clone(), detail: e.to_string() })?;
    Ok(parsed.aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn discovers_single_job_block_with_derived_id() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "build/config.d/config.yaml",
            "job:\n  name: Build\n  summary: builds the thing\n",
        );
        let (jobs, errors) = discover(tmp.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "build");
        assert_eq!(jobs[0].name, "Build");
        assert_eq!(errors, 0);
    }

    #[test]
    fn discovers_nested_job_with_dotted_id() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "team/deploy/config.d/config.yaml",
            "job:\n  name: Deploy\n",
        );
        let (jobs, _) = discover(tmp.path()).unwrap();
        assert_eq!(jobs[0].id, "team.deploy");
    }

    #[test]
    fn explicit_id_overrides_derived_one() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "build/config.d/config.yaml",
            "job:\n  id: custom.id\n  name: Build\n",
        );
        let (jobs, _) = discover(tmp.path()).unwrap();
        assert_eq!(jobs[0].id, "custom.id");
    }

    #[test]
    fn discovers_jobs_list() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "multi/config.d/config.yaml",
            "jobs:\n  - id: multi.a\n    name: A\n  - id: multi.b\n    name: B\n",
        );
        let (jobs, _) = discover(tmp.path()).unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn skips_malformed_config_without_failing_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "broken/config.d/config.yaml", "not: [valid");
        write(tmp.path(), "ok/config.d/config.yaml", "job:\n  name: Ok\n");
        let (jobs, errors) = discover(tmp.path()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "ok");
        assert_eq!(errors, 1);
    }

    #[test]
    fn missing_root_alias_file_yields_empty_set() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_root_aliases(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn loads_root_alias_file() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "flwd.yaml", "aliases:\n  - from: build\n    to: b\n");
        let aliases = load_root_aliases(tmp.path()).unwrap();
        assert_eq!(aliases.len(), 1);
        assert_eq!(aliases[0].to, "b");
    }
}
