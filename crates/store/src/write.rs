use duckdb::params;
use tracelink_core::error::{Result, TracelinkError};
use tracelink_core::model::BatchRecord;
use tracelink_core::sink::BatchSink;
use tracing::debug;

use crate::Store;

impl Store {
    /// Writes the batch row and its links in one transaction, returning the
    /// new record id.
    pub fn insert_batch(&self, record: &BatchRecord) -> Result<i64> {
        let correlation_ids = serde_json::to_string(&record.correlation_ids)
            .map_err(|e| TracelinkError::Internal(format!("correlation ids encode failed: {e}")))?;

        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(|e| TracelinkError::Store(format!("begin tx failed: {e}")))?;

        let id: i64 = tx
            .query_row("SELECT nextval('batches_id_seq')", [], |row| row.get(0))
            .map_err(|e| TracelinkError::Store(format!("id allocation failed: {e}")))?;

        {
            tx.execute(
                "INSERT INTO batches
                 (id, trigger_reason, master_trace_id, correlation_ids, link_count, first_event_ts, released_ts)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    record.trigger_reason.as_str(),
                    record.master_trace_id,
                    correlation_ids,
                    record.links.len() as i64,
                    record.first_event_ts.to_rfc3339(),
                    record.released_ts.to_rfc3339(),
                ],
            )
            .map_err(|e| TracelinkError::Store(format!("insert batch failed: {e}")))?;

            let mut stmt = tx
                .prepare(
                    "INSERT INTO batch_links
                     (batch_id, position, trace_id, span_id, trace_flags, trace_state, traceparent)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| TracelinkError::Store(format!("prepare insert links failed: {e}")))?;

            for (position, link) in record.links.iter().enumerate() {
                stmt.execute(params![
                    id,
                    position as i64,
                    link.trace_id,
                    link.span_id,
                    link.trace_flags,
                    link.trace_state,
                    link.traceparent,
                ])
                .map_err(|e| TracelinkError::Store(format!("insert link failed: {e}")))?;
            }
        }

        tx.commit()
            .map_err(|e| TracelinkError::Store(format!("commit batch failed: {e}")))?;
        Ok(id)
    }
}

impl BatchSink for Store {
    fn persist(&self, record: &BatchRecord) -> Result<i64> {
        let id = self.insert_batch(record)?;
        debug!(
            batch_id = id,
            master_trace_id = %record.master_trace_id,
            links = record.links.len(),
            "batch record written"
        );
        Ok(id)
    }
}
