use std::collections::VecDeque;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracelink_core::model::TraceLinkDescriptor;

/// One completed batch, copied out atomically when a trigger fires.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub descriptors: Vec<TraceLinkDescriptor>,
    pub correlation_ids: Vec<String>,
    pub first_event_ts: DateTime<Utc>,
}

/// Pending-batch state. Not synchronized on its own; every access goes
/// through the engine mutex.
#[derive(Debug)]
pub(crate) struct BatchBuffer {
    window: usize,
    descriptors: Vec<TraceLinkDescriptor>,
    correlation_ids: VecDeque<String>,
    started_at: Option<Instant>,
    first_event_ts: Option<DateTime<Utc>>,
}

impl BatchBuffer {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            window,
            descriptors: Vec::new(),
            correlation_ids: VecDeque::new(),
            started_at: None,
            first_event_ts: None,
        }
    }

    /// Appends one descriptor, keeping the correlation-id window rolling:
    /// the oldest id is evicted once more than `window` have arrived.
    pub(crate) fn append(
        &mut self,
        descriptor: TraceLinkDescriptor,
        correlation_id: Option<String>,
    ) {
        if self.descriptors.is_empty() {
            self.started_at = Some(Instant::now());
            self.first_event_ts = Some(Utc::now());
        }
        self.descriptors.push(descriptor);

        if let Some(id) = correlation_id {
            self.correlation_ids.push_back(id);
            while self.correlation_ids.len() > self.window {
                self.correlation_ids.pop_front();
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Set exactly while the buffer is non-empty.
    pub(crate) fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Copies the batch out and resets to empty. Returns `None` when there
    /// is nothing to release.
    pub(crate) fn snapshot_and_clear(&mut self) -> Option<BatchSnapshot> {
        if self.descriptors.is_empty() {
            return None;
        }
        let first_event_ts = self.first_event_ts.take().unwrap_or_else(Utc::now);
        self.started_at = None;
        Some(BatchSnapshot {
            descriptors: std::mem::take(&mut self.descriptors),
            correlation_ids: self.correlation_ids.drain(..).collect(),
            first_event_ts,
        })
    }
}
