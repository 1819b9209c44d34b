//! Per-job status hash + pub/sub progress stream.
//!
//! One entry point, [`ProgressChannel::publish`]: it first writes the status
//! snapshot under `{kind}:{id}:status`, then fans a JSON event out on
//! `{kind}:{id}:events` (best-effort two-step, so a late reader can always
//! recover the latest state from the snapshot even if it missed the event).

use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{JobKind, JobStatus, ProgressEvent};

/// Latest status fields for a job, mirrored on every publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// In-process progress fan-out implementing the cache contract.
#[derive(Debug, Default)]
pub struct ProgressChannel {
    statuses: Mutex<HashMap<String, StatusSnapshot>>,
    subscribers: Mutex<HashMap<String, Vec<Sender<ProgressEvent>>>>,
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn status_key(kind: JobKind, job_id: &str) -> String {
        format!("{}:{}:status", kind.prefix(), job_id)
    }

    fn events_key(kind: JobKind, job_id: &str) -> String {
        format!("{}:{}:events", kind.prefix(), job_id)
    }

    /// Record the status snapshot, then publish the event to subscribers.
    ///
    /// An empty message is replaced by the status token, so readers always
    /// see a non-empty message field.
    pub fn publish(
        &self,
        kind: JobKind,
        job_id: &str,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) {
        let message = if message.is_empty() {
            status.as_str().to_string()
        } else {
            message.to_string()
        };

        debug!(kind = kind.prefix(), job_id, %status, progress, "progress");

        {
            let mut statuses = self.statuses.lock().expect("progress mutex poisoned");
            statuses.insert(
                Self::status_key(kind, job_id),
                StatusSnapshot {
                    status,
                    progress,
                    message: message.clone(),
                },
            );
        }

        let event = ProgressEvent {
            job_id: job_id.to_string(),
            status,
            progress,
            message,
        };

        let mut subscribers = self.subscribers.lock().expect("progress mutex poisoned");
        if let Some(senders) = subscribers.get_mut(&Self::events_key(kind, job_id)) {
            // Drop receivers that have gone away.
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Latest status snapshot for a job, if any publish has happened.
    pub fn status(&self, kind: JobKind, job_id: &str) -> Option<StatusSnapshot> {
        let statuses = self.statuses.lock().expect("progress mutex poisoned");
        statuses.get(&Self::status_key(kind, job_id)).cloned()
    }

    /// Subscribe to a job's event stream. Events published after this call
    /// are delivered in publish order.
    pub fn subscribe(&self, kind: JobKind, job_id: &str) -> Receiver<ProgressEvent> {
        let (tx, rx) = unbounded();
        let mut subscribers = self.subscribers.lock().expect("progress mutex poisoned");
        subscribers
            .entry(Self::events_key(kind, job_id))
            .or_default()
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressChannel;
    use crate::types::{JobKind, JobStatus};

    #[test]
    fn publish_updates_snapshot_and_delivers_events_in_order() {
        let channel = ProgressChannel::new();
        let rx = channel.subscribe(JobKind::Ingestion, "j1");

        channel.publish(JobKind::Ingestion, "j1", JobStatus::Started, 5, "download");
        channel.publish(JobKind::Ingestion, "j1", JobStatus::Started, 25, "parse");
        channel.publish(JobKind::Ingestion, "j1", JobStatus::Success, 100, "done");

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(events[2].status, JobStatus::Success);

        let snap = channel.status(JobKind::Ingestion, "j1").unwrap();
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.message, "done");
    }

    #[test]
    fn empty_message_falls_back_to_status_token() {
        let channel = ProgressChannel::new();
        channel.publish(JobKind::Visualization, "v1", JobStatus::Queued, 0, "");
        let snap = channel.status(JobKind::Visualization, "v1").unwrap();
        assert_eq!(snap.message, "queued");
    }

    #[test]
    fn late_subscriber_can_recover_terminal_state_from_snapshot() {
        let channel = ProgressChannel::new();
        channel.publish(JobKind::Ingestion, "j1", JobStatus::Failure, 100, "boom");

        // Subscribed after the terminal event: stream is empty, snapshot isn't.
        let rx = channel.subscribe(JobKind::Ingestion, "j1");
        assert!(rx.try_recv().is_err());
        let snap = channel.status(JobKind::Ingestion, "j1").unwrap();
        assert_eq!(snap.status, JobStatus::Failure);
    }

    #[test]
    fn channels_are_isolated_per_job_and_kind() {
        let channel = ProgressChannel::new();
        let rx_other = channel.subscribe(JobKind::Ingestion, "j2");
        let rx_viz = channel.subscribe(JobKind::Visualization, "j1");

        channel.publish(JobKind::Ingestion, "j1", JobStatus::Started, 10, "");
        assert!(rx_other.try_recv().is_err());
        assert!(rx_viz.try_recv().is_err());
    }
}
