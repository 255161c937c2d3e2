//! Buffered, best-effort delivery of feature records.
//!
//! Records accumulate in a bounded buffer. A flush takes everything buffered
//! in one synchronous step and sends it as a single batch; records appended
//! while the send is in flight go into the now-empty buffer. On failure the
//! batch is put back at the head and the buffer is trimmed to its cap, oldest
//! first. Delivery is at-least-once and may reorder across a retry.

use crate::core::record::{EngagementBatch, FeatureRecord};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default cap on retained records.
pub const MAX_BUFFERED_RECORDS: usize = 500;

/// Failure reported by a [`BatchSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Batch delivery failed: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// Destination for engagement batches.
pub trait BatchSink: Send + Sync + 'static {
    fn send_batch(
        &self,
        batch: &EngagementBatch,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Bounded FIFO of pending records.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    records: VecDeque<FeatureRecord>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a record; returns the number of records evicted to stay in bounds.
    pub fn push(&mut self, record: FeatureRecord) -> usize {
        self.records.push_back(record);
        self.enforce_cap()
    }

    /// Remove and return everything buffered.
    pub fn take_all(&mut self) -> Vec<FeatureRecord> {
        self.records.drain(..).collect()
    }

    /// Put undelivered records back at the head, then trim to the cap.
    ///
    /// Returns the number of records evicted.
    pub fn requeue_front(&mut self, items: Vec<FeatureRecord>) -> usize {
        for record in items.into_iter().rev() {
            self.records.push_front(record);
        }
        self.enforce_cap()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureRecord> {
        self.records.iter()
    }

    fn enforce_cap(&mut self) -> usize {
        let excess = self.records.len().saturating_sub(self.capacity);
        self.records.drain(..excess);
        excess
    }
}

/// Result of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// The batch was accepted
    Sent(usize),
    /// The batch failed and was put back; `dropped` records fell off the cap
    Requeued { records: usize, dropped: usize },
}

/// Buffer state after a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pushed {
    pub len: usize,
    /// Oldest records evicted to make room
    pub dropped: usize,
}

/// Shared buffer plus the sink it drains into. Cloning shares both.
pub struct BatchUploader<S> {
    buffer: Arc<Mutex<BatchBuffer>>,
    sink: Arc<S>,
    user_id: Option<String>,
    session_id: Option<u64>,
}

impl<S> Clone for BatchUploader<S> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            sink: Arc::clone(&self.sink),
            user_id: self.user_id.clone(),
            session_id: self.session_id,
        }
    }
}

impl<S: BatchSink> BatchUploader<S> {
    pub fn new(sink: S, capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BatchBuffer::new(capacity))),
            sink: Arc::new(sink),
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_session_id(mut self, session_id: Option<u64>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Append a record.
    pub fn push(&self, record: FeatureRecord) -> Pushed {
        let mut buffer = self.lock();
        let dropped = buffer.push(record);
        if dropped > 0 {
            tracing::debug!(dropped, "Buffer full, evicted oldest records");
        }
        Pushed {
            len: buffer.len(),
            dropped,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the buffered records, oldest first.
    pub fn buffered(&self) -> Vec<FeatureRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Take everything buffered as a batch, leaving the buffer empty.
    pub fn take_batch(&self) -> Option<EngagementBatch> {
        let items = self.lock().take_all();
        if items.is_empty() {
            return None;
        }
        Some(EngagementBatch {
            user_id: self.user_id.clone(),
            session_id: self.session_id,
            items,
        })
    }

    /// Send a batch taken earlier, requeueing it on failure.
    pub async fn deliver(&self, batch: EngagementBatch) -> FlushOutcome {
        let count = batch.len();
        match self.sink.send_batch(&batch).await {
            Ok(()) => {
                tracing::debug!(records = count, "Batch delivered");
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                tracing::warn!(records = count, "Batch send failed: {e}");
                let dropped = self.lock().requeue_front(batch.items);
                FlushOutcome::Requeued {
                    records: count,
                    dropped,
                }
            }
        }
    }

    /// Take-then-send everything buffered.
    pub async fn flush(&self) -> FlushOutcome {
        match self.take_batch() {
            Some(batch) => self.deliver(batch).await,
            None => FlushOutcome::Empty,
        }
    }

    /// One last send at teardown. `Ok` carries the records delivered (zero
    /// when nothing was buffered); `Err` carries the records discarded after
    /// a failed send.
    pub async fn flush_final(&self) -> Result<usize, usize> {
        let Some(batch) = self.take_batch() else {
            return Ok(0);
        };
        let count = batch.len();
        match self.sink.send_batch(&batch).await {
            Ok(()) => Ok(count),
            Err(e) => {
                tracing::warn!(records = count, "Final flush failed, discarding: {e}");
                Err(count)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BatchBuffer> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
