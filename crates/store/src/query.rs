use chrono::NaiveDateTime;
use duckdb::params;
use tracelink_core::error::{Result, TracelinkError};
use tracelink_core::model::{BatchRecord, PersistedBatch, TraceLinkData, TriggerReason};

use crate::Store;

impl Store {
    /// Newest-first view of released batches with their links in emission
    /// order. This is the read path a downstream consumer uses to continue
    /// the trace.
    pub fn recent_batches(&self, limit: usize) -> Result<Vec<PersistedBatch>> {
        let conn = self.conn();

        let mut stmt = conn
            .prepare(
                "SELECT id, trigger_reason, master_trace_id, correlation_ids, first_event_ts, released_ts
                 FROM batches ORDER BY released_ts DESC, id DESC LIMIT ?",
            )
            .map_err(|e| TracelinkError::Store(format!("prepare batches query failed: {e}")))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, NaiveDateTime>(4)?,
                    row.get::<_, NaiveDateTime>(5)?,
                ))
            })
            .map_err(|e| TracelinkError::Store(format!("batches query failed: {e}")))?;

        let mut headers = Vec::new();
        for row in rows {
            headers.push(row.map_err(|e| TracelinkError::Store(format!("batch row failed: {e}")))?);
        }

        let mut links_stmt = conn
            .prepare(
                "SELECT trace_id, span_id, trace_flags, trace_state, traceparent
                 FROM batch_links WHERE batch_id = ? ORDER BY position ASC",
            )
            .map_err(|e| TracelinkError::Store(format!("prepare links query failed: {e}")))?;

        let mut out = Vec::with_capacity(headers.len());
        for (id, reason, master_trace_id, correlation_ids, first_event_ts, released_ts) in headers {
            let link_rows = links_stmt
                .query_map(params![id], |row| {
                    Ok(TraceLinkData {
                        trace_id: row.get(0)?,
                        span_id: row.get(1)?,
                        trace_flags: row.get(2)?,
                        trace_state: row.get(3)?,
                        traceparent: row.get(4)?,
                    })
                })
                .map_err(|e| TracelinkError::Store(format!("links query failed: {e}")))?;

            let mut links = Vec::new();
            for link in link_rows {
                links.push(
                    link.map_err(|e| TracelinkError::Store(format!("link row failed: {e}")))?,
                );
            }

            let correlation_ids: Vec<String> = serde_json::from_str(&correlation_ids)
                .map_err(|e| TracelinkError::Parse(format!("correlation ids decode failed: {e}")))?;

            out.push(PersistedBatch {
                id,
                record: BatchRecord {
                    trigger_reason: TriggerReason::parse(&reason)?,
                    master_trace_id,
                    correlation_ids,
                    links,
                    first_event_ts: first_event_ts.and_utc(),
                    released_ts: released_ts.and_utc(),
                },
            });
        }

        Ok(out)
    }
}
