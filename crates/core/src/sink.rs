use crate::error::Result;
use crate::model::BatchRecord;

/// Persistence boundary for released batches.
///
/// The engine treats failures as opaque: a batch is persisted best effort,
/// never retried, and a failed write still ends the batch.
pub trait BatchSink: Send + Sync {
    /// Persist one released batch, returning its durable identity.
    fn persist(&self, record: &BatchRecord) -> Result<i64>;
}
