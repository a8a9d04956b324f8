// SPDX-License-Identifier: MIT

//! Process-local counters rendered by `GET /metrics` in Prometheus text
//! exposition format. Metrics export formats are an external collaborator
//! concern; this is the minimal hand-rolled
//! surface the run control plane itself needs to report on.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub requests_total: AtomicU64,
    pub runs_created_total: AtomicU64,
    pub runs_failed_total: AtomicU64,
    pub idempotent_replays_total: AtomicU64,
    pub sse_cursor_expired_total: AtomicU64,
    pub storage_quota_exceeded_total: AtomicU64,
}

impl Metrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let line = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"));
        };
        line(&mut out, "flowd_requests_total", "Total HTTP requests handled.", self.requests_total.load(Ordering::Relaxed));
        line(&mut out, "flowd_runs_created_total", "Total runs accepted.", self.runs_created_total.load(Ordering::Relaxed));
        line(&mut out, "flowd_runs_failed_total", "Total runs that finished failed.", self.runs_failed_total.load(Ordering::Relaxed));
        line(
            &mut out,
            "flowd_idempotent_replays_total",
            "Total POST /runs requests served from the idempotency cache.",
            self.idempotent_replays_total.load(Ordering::Relaxed),
        );
        line(
            &mut out,
            "flowd_sse_cursor_expired_total",
            "Total SSE subscriptions rejected for an expired cursor.",
            self.sse_cursor_expired_total.load(Ordering::Relaxed),
        );
        line(
            &mut out,
            "flowd_storage_quota_exceeded_total",
            "Total writes rejected for exceeding a storage quota.",
            self.storage_quota_exceeded_total.load(Ordering::Relaxed),
        );
        out
    }
}
