// SPDX-License-Identifier: MIT

//! Run identifier and lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Server-minted identifier for one execution of a job.
    pub struct RunId("run-");
}

/// Status of a run. Transitions are one-way within
/// `queued -> running -> (completed|failed)`; `canceled` may be entered
/// from any non-terminal state. Terminal statuses are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

crate::simple_display! {
    RunStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Canceled)
    }

    /// Whether `self -> next` is a legal transition per the one-way state
    /// machine. Terminal -> anything is always rejected by the caller
    /// (treated as a no-op, not an error).
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (Queued, Running) | (Queued, Canceled) => true,
            (Running, Completed) | (Running, Failed) | (Running, Canceled) => true,
            _ => false,
        }
    }
}

/// Which executor ran (or will run) a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Executor {
    Host,
    Container,
}

crate::simple_display! {
    Executor {
        Host => "host",
        Container => "container",
    }
}

/// Provenance snapshot recorded on a run, plan, or source record — where the
/// job definition or image came from, for audit purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single execution of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub job_id: String,
    pub status: RunStatus,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
    pub executor: Executor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RunResult>,
    #[serde(default)]
    pub args: HashMap<String, serde_json::Value>,
}

impl Run {
    pub fn new(id: RunId, job_id: impl Into<String>, executor: Executor, started_at: i64) -> Self {
        Self {
            id,
            job_id: job_id.into(),
            status: RunStatus::Queued,
            started_at,
            finished_at: None,
            executor,
            runtime: None,
            provenance: Provenance::default(),
            result: None,
            args: HashMap::new(),
        }
    }

    /// Apply a transition, returning `true` if it changed state. A
    /// transition out of a terminal status is a documented no-op.
    pub fn transition(&mut self, next: RunStatus, at: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(at);
        }
        true
    }
}
