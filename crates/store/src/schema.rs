pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS batches (
  id BIGINT PRIMARY KEY,
  trigger_reason TEXT NOT NULL,
  master_trace_id TEXT NOT NULL,
  correlation_ids TEXT NOT NULL,
  link_count INTEGER NOT NULL,
  first_event_ts TIMESTAMP NOT NULL,
  released_ts TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS batch_links (
  batch_id BIGINT NOT NULL,
  position INTEGER NOT NULL,
  trace_id TEXT NOT NULL,
  span_id TEXT NOT NULL,
  trace_flags TEXT NOT NULL,
  trace_state TEXT,
  traceparent TEXT NOT NULL,
  PRIMARY KEY(batch_id, position)
);

CREATE SEQUENCE IF NOT EXISTS batches_id_seq;

CREATE INDEX IF NOT EXISTS idx_batches_released ON batches(released_ts);
CREATE INDEX IF NOT EXISTS idx_batches_master ON batches(master_trace_id);
CREATE INDEX IF NOT EXISTS idx_links_trace ON batch_links(trace_id);
"#;
