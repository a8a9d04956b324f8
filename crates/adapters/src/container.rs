// SPDX-License-Identifier: MIT

//! `ContainerRuntime` capability: `pull`, `run --rm` extraction, `image inspect`, `rm`.

use crate::error::RuntimeError;
use async_trait::async_trait;
use flowd_core::source::PullPolicy;
use serde::Deserialize;
use std::path::PathBuf;

/// A container to run once, capture stdout from, and discard —
/// used to pull a manifest file out of an OCI add-on image.
#[derive(Debug, Clone)]
pub struct ExtractionSpec {
    pub image: String,
    pub name: String,
    pub path_in_image: String,
    pub network_none: bool,
    pub read_only_rootfs: bool,
    pub pull_policy: PullPolicy,
}

/// One container-mode job run to completion: unlike
/// [`ExtractionSpec`], output is captured rather than discarded and the
/// exit code determines the run's terminal status.
#[derive(Debug, Clone)]
pub struct JobContainerSpec {
    pub image: String,
    pub name: String,
    pub command: Vec<String>,
    pub env: std::collections::HashMap<String, String>,
    pub network_none: bool,
    pub read_only_rootfs: bool,
    pub pull_policy: PullPolicy,
}

/// Captured result of running a job container to completion.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageInfo {
    pub digest: String,
    pub created: String,
    pub image_id: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn pull(&self, image: &str, policy: PullPolicy) -> Result<(), RuntimeError>;
    async fn run_extraction(&self, spec: ExtractionSpec) -> Result<Vec<u8>, RuntimeError>;
    async fn inspect(&self, image: &str) -> Result<ImageInfo, RuntimeError>;
    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;
    /// Run a job's container to completion, capturing its exit code and
    /// output.
    async fn run_job(&self, spec: JobContainerSpec) -> Result<ProcessOutcome, RuntimeError>;
}

/// Shells out to a detected container runtime binary (`docker` or
/// `podman`) via `tokio::process::Command`.
pub struct ProcessContainerRuntime {
    binary: PathBuf,
}

impl ProcessContainerRuntime {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, RuntimeError> {
        tokio::process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for ProcessContainerRuntime {
    async fn pull(&self, image: &str, policy: PullPolicy) -> Result<(), RuntimeError> {
        if matches!(policy, PullPolicy::Never) {
            return Ok(());
        }
        let out = self.run(&["pull", image]).await?;
        if !out.status.success() {
            return Err(RuntimeError::CommandFailed(String::from_utf8_lossy(&out.stderr).to_string()));
        }
        Ok(())
    }

    async fn run_extraction(&self, spec: ExtractionSpec) -> Result<Vec<u8>, RuntimeError> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "--rm".into(),
            "--name".into(),
            spec.name.clone(),
            "--cap-drop=ALL".into(),
            "--security-opt=no-new-privileges".into(),
        ];
        args.push("--network".into());
        args.push(if spec.network_none { "none".into() } else { "bridge".into() });
        if spec.read_only_rootfs {
            args.push("--read-only".into());
        }
        args.push("--pull".into());
        args.push(match spec.pull_policy {
            PullPolicy::Always => "always".into(),
            PullPolicy::Never => "never".into(),
            PullPolicy::IfNotPresent => "missing".into(),
        });
        args.push("--entrypoint".into());
        args.push("cat".into());
        args.push(spec.image.clone());
        args.push(spec.path_in_image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.run(&arg_refs).await?;
        if !out.status.success() {
            return Err(RuntimeError::CommandFailed(String::from_utf8_lossy(&out.stderr).to_string()));
        }
        Ok(out.stdout)
    }

    async fn inspect(&self, image: &str) -> Result<ImageInfo, RuntimeError> {
        let out = self.run(&["image", "inspect", image]).await?;
        if !out.status.success() {
            return Err(RuntimeError::CommandFailed(String::from_utf8_lossy(&out.stderr).to_string()));
        }
        let raw: Vec<serde_json::Value> = serde_json::from_slice(&out.stdout)
            .map_err(|e| RuntimeError::MalformedOutput(e.to_string()))?;
        let entry = raw.first().ok_or_else(|| RuntimeError::MalformedOutput("empty inspect result".into()))?;
        Ok(ImageInfo {
            digest: entry
                .get("RepoDigests")
                .and_then(|v| v.as_array())
                .and_then(|a| a.first())
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            created: entry.get("Created").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            image_id: entry.get("Id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            size_bytes: entry.get("Size").and_then(|v| v.as_u64()).unwrap_or(0),
            labels: entry
                .get("Config")
                .and_then(|c| c.get("Labels"))
                .and_then(|v| v.as_object())
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        let out = self.run(&["rm", "-f", name]).await?;
        if !out.status.success() {
            return Err(RuntimeError::NameConflict(String::from_utf8_lossy(&out.stderr).to_string()));
        }
        Ok(())
    }

    async fn run_job(&self, spec: JobContainerSpec) -> Result<ProcessOutcome, RuntimeError> {
        let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "--name".into(), spec.name.clone()];
        args.push("--network".into());
        args.push(if spec.network_none { "none".into() } else { "bridge".into() });
        if spec.read_only_rootfs {
            args.push("--read-only".into());
        }
        args.push("--pull".into());
        args.push(match spec.pull_policy {
            PullPolicy::Always => "always".into(),
            PullPolicy::Never => "never".into(),
            PullPolicy::IfNotPresent => "missing".into(),
        });
        for (k, v) in &spec.env {
            args.push("--env".into());
            args.push(format!("{k}={v}"));
        }
        args.push(spec.image.clone());
        args.extend(spec.command.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = tokio::process::Command::new(&self.binary)
            .args(&arg_refs)
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(ProcessOutcome {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    pub struct FakeContainerRuntime {
        pub manifests: Mutex<HashMap<String, Vec<u8>>>,
        pub images: Mutex<HashMap<String, ImageInfo>>,
        pub removed: Mutex<Vec<String>>,
        pub pulls: Mutex<Vec<String>>,
        pub fail_inspect: Mutex<bool>,
        pub conflicted_names: Mutex<std::collections::HashSet<String>>,
        pub job_outcomes: Mutex<HashMap<String, ProcessOutcome>>,
        pub job_runs: Mutex<Vec<JobContainerSpec>>,
    }

    impl FakeContainerRuntime {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn with_manifest(self: &Arc<Self>, image: &str, manifest_yaml: &[u8], info: ImageInfo) {
            self.manifests.lock().insert(image.to_string(), manifest_yaml.to_vec());
            self.images.lock().insert(image.to_string(), info);
        }

        /// Subsequent `remove_container(name)` calls return `NameConflict`.
        pub fn with_conflicted_name(self: &Arc<Self>, name: &str) {
            self.conflicted_names.lock().insert(name.to_string());
        }

        /// `run_job` for `image` returns `outcome` instead of the default
        /// (exit 0, empty output).
        pub fn with_job_outcome(self: &Arc<Self>, image: &str, outcome: ProcessOutcome) {
            self.job_outcomes.lock().insert(image.to_string(), outcome);
        }
    }

    impl Default for ProcessOutcome {
        fn default() -> Self {
            Self { exit_code: 0, stdout: Vec::new(), stderr: Vec::new() }
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeContainerRuntime {
        async fn pull(&self, image: &str, _policy: PullPolicy) -> Result<(), RuntimeError> {
            self.pulls.lock().push(image.to_string());
            Ok(())
        }

        async fn run_extraction(&self, spec: ExtractionSpec) -> Result<Vec<u8>, RuntimeError> {
            self.manifests
                .lock()
                .get(&spec.image)
                .cloned()
                .ok_or_else(|| RuntimeError::CommandFailed(format!("no fake manifest for {}", spec.image)))
        }

        async fn inspect(&self, image: &str) -> Result<ImageInfo, RuntimeError> {
            if *self.fail_inspect.lock() {
                return Err(RuntimeError::Unavailable("forced failure".into()));
            }
            self.images.lock().get(image).cloned().ok_or_else(|| {
                RuntimeError::MalformedOutput(format!("no fake image info for {image}"))
            })
        }

        async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
            if self.conflicted_names.lock().remove(name) {
                return Err(RuntimeError::NameConflict(format!("{name} still running")));
            }
            self.removed.lock().push(name.to_string());
            Ok(())
        }

        async fn run_job(&self, spec: JobContainerSpec) -> Result<ProcessOutcome, RuntimeError> {
            let outcome = self.job_outcomes.lock().get(&spec.image).cloned().unwrap_or_default();
            self.job_runs.lock().push(spec);
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeContainerRuntime;
    use super::*;

    fn job_spec(image: &str) -> JobContainerSpec {
        JobContainerSpec {
            image: image.to_string(),
            name: "flwd-run-abc".to_string(),
            command: vec!["echo".to_string(), "hi".to_string()],
            env: Default::default(),
            network_none: true,
            read_only_rootfs: true,
            pull_policy: PullPolicy::IfNotPresent,
        }
    }

    #[tokio::test]
    async fn run_job_defaults_to_success_with_empty_output() {
        let runtime = FakeContainerRuntime::new();
        let outcome = runtime.run_job(job_spec("demo:1")).await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn run_job_returns_configured_outcome() {
        let runtime = FakeContainerRuntime::new();
        runtime.with_job_outcome(
            "demo:1",
            ProcessOutcome { exit_code: 7, stdout: b"out".to_vec(), stderr: b"err".to_vec() },
        );
        let outcome = runtime.run_job(job_spec("demo:1")).await.unwrap();
        assert_eq!(outcome.exit_code, 7);
        assert_eq!(outcome.stdout, b"out");
    }

    #[tokio::test]
    async fn remove_container_surfaces_configured_conflict() {
        let runtime = FakeContainerRuntime::new();
        runtime.with_conflicted_name("flwd-run-abc");
        let err = runtime.remove_container("flwd-run-abc").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NameConflict(_)));
        // the conflict is one-shot: a second removal succeeds.
        runtime.remove_container("flwd-run-abc").await.unwrap();
    }
}
