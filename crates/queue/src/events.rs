//! Per-job completion notification — spec §4.2: `on('completed'|'failed',
//! handle, cb)` and `waitUntilFinished(handle, timeout)`.
//!
//! Grounded on the teacher's `TaskStore` (`crates/gateway/src/runtime/tasks.rs`):
//! a `RwLock<HashMap<Uuid, broadcast::Sender<_>>>` created lazily per id via
//! `subscribe`, with `emit` a no-op when nobody is listening. Generalized
//! from the teacher's many-events-per-task (`TaskEvent::TurnEvent` streamed
//! throughout a run) to exactly one terminal event per job, since a job has
//! no intermediate progress to stream.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Completed(serde_json::Value),
    Failed(String),
}

/// Registry of broadcast channels keyed by job id. One entry exists for a
/// job from the moment something first subscribes (or the job completes,
/// whichever comes first) until [`JobEvents::cleanup`] removes it.
#[derive(Default)]
pub struct JobEvents {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<JobEvent>>>,
}

impl JobEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets or creates the channel for `job_id` and returns a receiver.
    /// Safe to call before the job finishes (the usual case) or after (the
    /// receiver then simply never sees an event, same as calling too late on
    /// the teacher's SSE channels).
    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<JobEvent> {
        let mut channels = self.channels.write();
        channels.entry(job_id).or_insert_with(|| broadcast::channel(8).0).subscribe()
    }

    /// Emits a terminal event. A no-op if nobody has subscribed — the
    /// consumer loop always calls this even when no caller is waiting.
    pub fn emit(&self, job_id: Uuid, event: JobEvent) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(&job_id) {
            let _ = tx.send(event);
        }
    }

    /// Drops the channel for a job once its terminal event has been
    /// delivered and no further `waitUntilFinished` calls are expected.
    pub fn cleanup(&self, job_id: Uuid) {
        self.channels.write().remove(&job_id);
    }

    /// Blocks until `job_id`'s terminal event arrives or `timeout` elapses.
    pub async fn wait_until_finished(&self, job_id: Uuid, timeout: std::time::Duration) -> Option<JobEvent> {
        let mut rx = self.subscribe(job_id);
        tokio::time::timeout(timeout, rx.recv()).await.ok()?.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_the_emitted_completion() {
        let events = JobEvents::new();
        let job_id = Uuid::new_v4();
        let mut rx = events.subscribe(job_id);
        events.emit(job_id, JobEvent::Completed(serde_json::json!({"ok": true})));
        match rx.recv().await.unwrap() {
            JobEvent::Completed(v) => assert_eq!(v, serde_json::json!({"ok": true})),
            JobEvent::Failed(_) => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn wait_until_finished_times_out_when_nothing_ever_emits() {
        let events = JobEvents::new();
        let job_id = Uuid::new_v4();
        let result = events.wait_until_finished(job_id, std::time::Duration::from_millis(20)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn emit_before_any_subscriber_is_a_harmless_no_op() {
        let events = JobEvents::new();
        let job_id = Uuid::new_v4();
        events.emit(job_id, JobEvent::Failed("boom".into()));
    }

    #[test]
    fn cleanup_removes_the_channel() {
        let events = JobEvents::new();
        let job_id = Uuid::new_v4();
        let _rx = events.subscribe(job_id);
        events.cleanup(job_id);
        assert!(events.channels.read().get(&job_id).is_none());
    }
}
