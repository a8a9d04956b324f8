// SPDX-License-Identifier: MIT

//! Run lifecycle events published through the event plane.

use crate::policy_types::PolicyDecision;
use crate::run::Provenance;
use serde::{Deserialize, Serialize};

/// Event kinds a run (or the policy gate ahead of it) can emit. The
/// `event_type` string stored in the journal is this variant's tag name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    #[serde(rename = "policy.decision")]
    PolicyDecision { run_id: String, decisions: Vec<PolicyDecision> },
    #[serde(rename = "run.start")]
    RunStart { run_id: String, job_id: String, status: String },
    #[serde(rename = "run.finish")]
    RunFinish {
        run_id: String,
        job_id: String,
        status: String,
        exit_code: Option<i32>,
        error: Option<String>,
    },
    #[serde(rename = "run.canceled")]
    RunCanceled {
        run_id: String,
        job_id: String,
        status: String,
        timestamp: i64,
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        provenance: Option<Provenance>,
        #[serde(skip_serializing_if = "Option::is_none")]
        runtime: Option<String>,
    },
}

impl RunEvent {
    /// The `event_type` string persisted alongside the event's journal
    /// row, matching this variant's wire tag exactly.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::PolicyDecision { .. } => "policy.decision",
            RunEvent::RunStart { .. } => "run.start",
            RunEvent::RunFinish { .. } => "run.finish",
            RunEvent::RunCanceled { .. } => "run.canceled",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::PolicyDecision { run_id, .. } => run_id,
            RunEvent::RunStart { run_id, .. } => run_id,
            RunEvent::RunFinish { run_id, .. } => run_id,
            RunEvent::RunCanceled { run_id, .. } => run_id,
        }
    }
}

/// One frame as delivered to an SSE subscriber: journal sequence (`id:`),
/// event name (`event:`), and the JSON payload (`data:`).
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub id: i64,
    pub event: String,
    pub data: String,
}

impl SseFrame {
    /// Render as wire text: `id:`, `event:`, `data:` lines and a
    /// terminating blank line.
    pub fn encode(&self) -> String {
        format!("id:{}\nevent:{}\ndata:{}\n\n", self.id, self.event, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_matches_wire_tag() {
        let ev = RunEvent::RunStart {
            run_id: "run-1".into(),
            job_id: "demo".into(),
            status: "running".into(),
        };
        assert_eq!(ev.event_type(), "run.start");
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"type\":\"run.start\""));
    }

    #[test]
    fn sse_frame_encodes_three_lines_and_blank_terminator() {
        let frame = SseFrame { id: 7, event: "run.finish".into(), data: "{}".into() };
        assert_eq!(frame.encode(), "id:7\nevent:run.finish\ndata:{}\n\n");
    }
}
