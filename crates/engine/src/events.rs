// SPDX-License-Identifier: MIT

//! The Event Plane: a journal sink wraps the live hub so
//! every published event is durable before it fans out, a live hub
//! distributes SSE frames to per-topic subscribers without ever blocking
//! the publisher, and the global topic receives every run's events too.

use crate::error::ControllerError;
use flowd_core::event::{RunEvent, SseFrame};
use flowd_storage::JournalStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Subscription topic for `GET /events`, receiving every run's events.
pub const GLOBAL_TOPIC: &str = "global";
pub const DEFAULT_BUFFER: usize = 1000;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;

/// Publishes a run event, returning the frame actually written to the
/// journal (`None` if the journal append failed: the failure is logged
/// and live fan-out is skipped for that event).
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RunEvent, ts: i64) -> Option<SseFrame>;
}

/// The receiving half of a live subscription.
pub struct Subscription {
    pub rx: mpsc::Receiver<SseFrame>,
}

/// In-process pub/sub keyed by run id or [`GLOBAL_TOPIC`]. Slow
/// subscribers drop frames rather than stall the publisher.
#[derive(Default)]
pub struct LiveHub {
    topics: RwLock<HashMap<String, Vec<mpsc::Sender<SseFrame>>>>,
}

impl LiveHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: &str, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.topics.write().entry(topic.to_string()).or_default().push(tx);
        Subscription { rx }
    }

    fn publish_to(&self, topic: &str, frame: &SseFrame) {
        let mut topics = self.topics.write();
        let Some(subs) = topics.get_mut(topic) else { return };
        subs.retain(|tx| !matches!(tx.try_send(frame.clone()), Err(mpsc::error::TrySendError::Closed(_))));
    }

    /// Fan out to the run's own topic and to [`GLOBAL_TOPIC`]. Every
    /// `RunEvent` already carries its own `run_id` field, so republishing
    /// the same frame under `global` carries that id along without
    /// re-encoding.
    pub fn publish(&self, run_id: &str, frame: &SseFrame) {
        self.publish_to(run_id, frame);
        self.publish_to(GLOBAL_TOPIC, frame);
    }
}

/// Journal-backed [`EventSink`]: appends first, then fans out using the
/// journal-assigned sequence as the SSE `id:`.
pub struct JournalSink {
    journal: JournalStore,
    hub: Arc<LiveHub>,
}

impl JournalSink {
    pub fn new(journal: JournalStore, hub: Arc<LiveHub>) -> Self {
        Self { journal, hub }
    }
}

impl EventSink for JournalSink {
    fn publish(&self, event: RunEvent, ts: i64) -> Option<SseFrame> {
        let run_id = event.run_id().to_string();
        let event_type = event.event_type();
        let data = match serde_json::to_vec(&event) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(run_id, error = %e, "failed to encode run event, skipping publish");
                return None;
            }
        };
        match self.journal.append(&run_id, event_type, &data, ts) {
            Ok(entry) => {
                let frame = SseFrame {
                    id: entry.seq,
                    event: entry.event_type.clone(),
                    data: String::from_utf8_lossy(&entry.payload).into_owned(),
                };
                self.hub.publish(&run_id, &frame);
                Some(frame)
            }
            Err(e) => {
                tracing::warn!(run_id, error = %e, "journal append failed, skipping live fan-out");
                None
            }
        }
    }
}

/// Replayed history plus a live subscription for an SSE consumer,
/// returned by [`subscribe_run`]/[`subscribe_global`].
pub struct ReplaySubscription {
    pub replayed: Vec<SseFrame>,
    pub last_seq: i64,
    pub subscription: Subscription,
}

/// `GET /runs/{id}/events` subscribe semantics: validate the cursor against retained journal
/// bounds, subscribe to the live topic *before* replaying so no event
/// published during replay is missed, then replay.
pub fn subscribe_run(
    journal: &JournalStore,
    hub: &LiveHub,
    run_id: &str,
    cursor: i64,
    buffer: usize,
) -> Result<ReplaySubscription, ControllerError> {
    let (earliest, latest) = journal.bounds(run_id)?;
    if cursor > 0 && earliest > 0 && (cursor < earliest || cursor > latest) {
        return Err(ControllerError::CursorExpired(cursor));
    }
    let subscription = hub.subscribe(run_id, buffer);
    let mut replayed = Vec::new();
    let mut last_seq = cursor;
    journal.for_each(run_id, cursor, |entry| {
        last_seq = entry.seq;
        replayed.push(SseFrame {
            id: entry.seq,
            event: entry.event_type.clone(),
            data: String::from_utf8_lossy(&entry.payload).into_owned(),
        });
        Ok(())
    })?;
    Ok(ReplaySubscription { replayed, last_seq, subscription })
}

/// `GET /events` subscribe semantics, scoped to the whole journal rather
/// than one run.
pub fn subscribe_global(
    journal: &JournalStore,
    hub: &LiveHub,
    cursor: i64,
    buffer: usize,
) -> Result<ReplaySubscription, ControllerError> {
    let (earliest, latest) = journal.global_bounds()?;
    if cursor > 0 && earliest > 0 && (cursor < earliest || cursor > latest) {
        return Err(ControllerError::CursorExpired(cursor));
    }
    let subscription = hub.subscribe(GLOBAL_TOPIC, buffer);
    let mut replayed = Vec::new();
    let mut last_seq = cursor;
    journal.for_each_all(cursor, |entry| {
        last_seq = entry.seq;
        replayed.push(SseFrame {
            id: entry.seq,
            event: entry.event_type.clone(),
            data: String::from_utf8_lossy(&entry.payload).into_owned(),
        });
        Ok(())
    })?;
    Ok(ReplaySubscription { replayed, last_seq, subscription })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowd_storage::{Store, StoreOptions};

    fn sink_and_hub() -> (JournalSink, Arc<LiveHub>, JournalStore) {
        let store = Store::open_in_memory(StoreOptions::default()).unwrap();
        let journal = store.journal();
        let hub = Arc::new(LiveHub::new());
        (JournalSink::new(journal.clone(), hub.clone()), hub, journal)
    }

    fn start_event(run_id: &str) -> RunEvent {
        RunEvent::RunStart { run_id: run_id.to_string(), job_id: "demo".into(), status: "running".into() }
    }

    #[test]
    fn publish_assigns_journal_seq_as_frame_id() {
        let (sink, _hub, journal) = sink_and_hub();
        let frame = sink.publish(start_event("run-1"), 10).unwrap();
        let (earliest, latest) = journal.bounds("run-1").unwrap();
        assert_eq!(frame.id, earliest);
        assert_eq!(earliest, latest);
    }

    #[test]
    fn publish_fans_out_to_run_topic_and_global() {
        let (sink, hub, _journal) = sink_and_hub();
        let run_sub = hub.subscribe("run-1", DEFAULT_BUFFER);
        let global_sub = hub.subscribe(GLOBAL_TOPIC, DEFAULT_BUFFER);
        sink.publish(start_event("run-1"), 1);

        let mut run_rx = run_sub.rx;
        let mut global_rx = global_sub.rx;
        assert!(run_rx.try_recv().is_ok());
        assert!(global_rx.try_recv().is_ok());
    }

    #[test]
    fn subscribe_run_replays_then_reports_cursor() {
        let (sink, hub, journal) = sink_and_hub();
        sink.publish(start_event("run-1"), 1);
        let second = sink.publish(
            RunEvent::RunFinish {
                run_id: "run-1".into(),
                job_id: "demo".into(),
                status: "completed".into(),
                exit_code: Some(0),
                error: None,
            },
            2,
        ).unwrap();

        let result = subscribe_run(&journal, &hub, "run-1", 0, DEFAULT_BUFFER).unwrap();
        assert_eq!(result.replayed.len(), 2);
        assert_eq!(result.last_seq, second.id);
    }

    #[test]
    fn subscribe_run_expired_cursor_is_rejected() {
        let (sink, hub, journal) = sink_and_hub();
        sink.publish(start_event("run-1"), 1);
        let (earliest, _) = journal.bounds("run-1").unwrap();
        let err = subscribe_run(&journal, &hub, "run-1", earliest - 1, DEFAULT_BUFFER).unwrap_err();
        assert!(matches!(err, ControllerError::CursorExpired(_)));
    }

    #[test]
    fn subscribe_run_with_no_history_accepts_zero_cursor() {
        let (_sink, hub, journal) = sink_and_hub();
        let result = subscribe_run(&journal, &hub, "run-unknown", 0, DEFAULT_BUFFER).unwrap();
        assert!(result.replayed.is_empty());
        assert_eq!(result.last_seq, 0);
    }
}
