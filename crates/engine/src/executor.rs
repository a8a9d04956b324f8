// SPDX-License-Identifier: MIT

//! Run execution: host-mode runs a step's command as a child process, and
//! container-mode runs the job's image to completion, both racing
//! against the run's cancellation token.

use crate::error::ControllerError;
use async_trait::async_trait;
use flowd_adapters::{ContainerRuntime, JobContainerSpec, ProcessOutcome};
use flowd_core::manifest::JobStep;
use flowd_core::plan::Plan;
use flowd_core::run::RunId;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What an executor produced once a run finished (or was canceled).
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub canceled: bool,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(exit_code: i32) -> Self {
        Self { exit_code: Some(exit_code), canceled: false, error: None }
    }

    pub fn canceled() -> Self {
        Self { exit_code: None, canceled: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { exit_code: None, canceled: false, error: Some(error.into()) }
    }

    /// `completed` iff every step exited zero and the run wasn't
    /// canceled.
    pub fn is_success(&self) -> bool {
        !self.canceled && self.error.is_none() && self.exit_code.map(|c| c == 0).unwrap_or(false)
    }
}

#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, run_id: &RunId, plan: &Plan, cancel: CancellationToken) -> ExecutionOutcome;
}

/// Runs each of a plan's steps as a child process in sequence, stopping
/// at the first non-zero exit. stdout/stderr of every step are appended
/// to `<run_dir>/{stdout,stderr}`.
pub struct HostExecutor {
    steps: Vec<JobStep>,
    run_dir: PathBuf,
}

impl HostExecutor {
    pub fn new(steps: Vec<JobStep>, run_dir: PathBuf) -> Self {
        Self { steps, run_dir }
    }

    async fn run_step(&self, step: &JobStep) -> std::io::Result<std::process::Output> {
        let Some((program, args)) = step.command.split_first() else {
            return Ok(std::process::Output {
                status: std::process::ExitStatus::default(),
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        };
        tokio::process::Command::new(program).args(args).output().await
    }
}

#[async_trait]
impl RunExecutor for HostExecutor {
    async fn execute(&self, run_id: &RunId, _plan: &Plan, cancel: CancellationToken) -> ExecutionOutcome {
        if let Err(e) = tokio::fs::create_dir_all(&self.run_dir).await {
            return ExecutionOutcome::failed(format!("could not create run directory: {e}"));
        }
        let stdout_path = self.run_dir.join("stdout");
        let stderr_path = self.run_dir.join("stderr");

        for step in &self.steps {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(run_id = %run_id, step = %step.name, "run canceled before step completed");
                    return ExecutionOutcome::canceled();
                }
                result = self.run_step(step) => result,
            };
            let output = match outcome {
                Ok(output) => output,
                Err(e) => {
                    tracing::error!(run_id = %run_id, step = %step.name, error = %e, "step failed to launch");
                    return ExecutionOutcome::failed(e.to_string());
                }
            };
            if let Err(e) = tokio::fs::write(&stdout_path, &output.stdout).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to persist stdout");
            }
            if let Err(e) = tokio::fs::write(&stderr_path, &output.stderr).await {
                tracing::warn!(run_id = %run_id, error = %e, "failed to persist stderr");
            }
            let code = output.status.code().unwrap_or(-1);
            if code != 0 {
                return ExecutionOutcome::success(code);
            }
        }
        ExecutionOutcome::success(0)
    }
}

/// Runs a plan's container image to completion via a [`ContainerRuntime`]
/// collaborator, resolving arg env bindings and racing the runtime call
/// against cancellation.
pub struct ContainerExecutor {
    runtime: std::sync::Arc<dyn ContainerRuntime>,
    image: String,
    run_dir: PathBuf,
}

impl ContainerExecutor {
    pub fn new(runtime: std::sync::Arc<dyn ContainerRuntime>, image: String, run_dir: PathBuf) -> Self {
        Self { runtime, image, run_dir }
    }
}

/// Bind resolved args as `FLWD_ARG_<NAME>` environment variables for a
/// container-mode job, matching the plan's `resolved_args` map.
pub fn bind_args_as_env(resolved_args: &HashMap<String, serde_json::Value>) -> HashMap<String, String> {
    resolved_args
        .iter()
        .map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("FLWD_ARG_{}", k.to_uppercase()), value)
        })
        .collect()
}

#[async_trait]
impl RunExecutor for ContainerExecutor {
    async fn execute(&self, run_id: &RunId, plan: &Plan, cancel: CancellationToken) -> ExecutionOutcome {
        let name = format!("flwd-{}", run_id.as_str());
        if let Err(e) = self.runtime.remove_container(&name).await {
            tracing::debug!(run_id = %run_id, error = %e, "no prior container to remove");
        }

        let spec = JobContainerSpec {
            image: self.image.clone(),
            name: name.clone(),
            command: Vec::new(),
            env: bind_args_as_env(&plan.resolved_args),
            network_none: true,
            read_only_rootfs: true,
            pull_policy: flowd_core::source::PullPolicy::IfNotPresent,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(run_id = %run_id, "run canceled, removing container");
                let _ = self.runtime.remove_container(&name).await;
                return ExecutionOutcome::canceled();
            }
            result = self.runtime.run_job(spec) => result,
        };

        match outcome {
            Ok(ProcessOutcome { exit_code, stdout, stderr }) => {
                if let Err(e) = tokio::fs::create_dir_all(&self.run_dir).await {
                    tracing::warn!(run_id = %run_id, error = %e, "failed to create run directory");
                } else {
                    let _ = tokio::fs::write(self.run_dir.join("stdout"), &stdout).await;
                    let _ = tokio::fs::write(self.run_dir.join("stderr"), &stderr).await;
                }
                ExecutionOutcome::success(exit_code)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "container run failed");
                ExecutionOutcome::failed(e.to_string())
            }
        }
    }
}

/// Before starting a container-mode run, best-effort remove any prior
/// container sharing its name.
pub async fn ensure_no_name_conflict(
    runtime: &dyn ContainerRuntime,
    name: &str,
) -> Result<(), ControllerError> {
    runtime.remove_container(name).await.or_else(|e| match e {
        flowd_adapters::RuntimeError::NameConflict(_) => Err(ControllerError::ContainerNameConflict(name.to_string())),
        _ => Ok(()),
    })
}
