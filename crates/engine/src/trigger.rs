use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracelink_core::config::Config;
use tracelink_core::error::{Result, TracelinkError};
use tracelink_core::model::{TraceLinkDescriptor, TriggerReason};
use tracelink_core::sink::BatchSink;
use tracing::{debug, info, warn};

use crate::buffer::BatchBuffer;
use crate::release::ReleaseHandler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub count_threshold: usize,
    pub timeout_interval: Duration,
    pub tick_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            count_threshold: 3,
            timeout_interval: Duration::from_secs(10),
            tick_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for TriggerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            count_threshold: cfg.count_threshold,
            timeout_interval: cfg.timeout_interval,
            tick_interval: cfg.tick_interval,
            shutdown_grace: cfg.shutdown_grace,
        }
    }
}

impl TriggerConfig {
    fn validate(&self) -> Result<()> {
        if self.count_threshold == 0 {
            return Err(TracelinkError::Config(
                "count_threshold must be at least 1".to_string(),
            ));
        }
        if self.timeout_interval.is_zero() || self.tick_interval.is_zero() {
            return Err(TracelinkError::Config(
                "timeout_interval and tick_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The batching state machine: IDLE while the buffer is empty, ACCUMULATING
/// from the first recorded event until a count or time trigger fires.
///
/// Both entry points take the same mutex for the whole read-modify-snapshot
/// sequence, so exactly one caller performs each release and no event can
/// land in two batches. The release itself (span emission + persistence)
/// runs after the lock is dropped, keeping slow writes off the ingestion
/// critical section.
pub struct AggregationEngine {
    inner: Arc<EngineInner>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
    shutdown_grace: Duration,
}

struct EngineInner {
    count_threshold: usize,
    timeout_interval: Duration,
    buffer: Mutex<BatchBuffer>,
    release: ReleaseHandler,
}

impl AggregationEngine {
    /// Validates the trigger configuration and starts the background
    /// timeout ticker. Must be called from within a tokio runtime.
    pub fn start(cfg: TriggerConfig, sink: Arc<dyn BatchSink>) -> Result<Self> {
        cfg.validate()?;

        let inner = Arc::new(EngineInner {
            count_threshold: cfg.count_threshold,
            timeout_interval: cfg.timeout_interval,
            buffer: Mutex::new(BatchBuffer::new(cfg.count_threshold)),
            release: ReleaseHandler::new(sink),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_ticker(inner.clone(), cfg.tick_interval, stop_rx));

        Ok(Self {
            inner,
            ticker: Mutex::new(Some(ticker)),
            stop_tx,
            shutdown_grace: cfg.shutdown_grace,
        })
    }

    /// Records one inbound request. Called once per validated request by
    /// the ingest boundary; never fails and never surfaces release errors.
    pub fn record(&self, descriptor: TraceLinkDescriptor, correlation_id: Option<String>) {
        self.inner.record(descriptor, correlation_id);
    }

    /// Releases the pending batch if the time window has elapsed since its
    /// first event. Driven by the background ticker; no-op while idle.
    pub fn check_timeout(&self) {
        self.inner.check_timeout();
    }

    pub fn pending_len(&self) -> usize {
        self.inner.buffer.lock().expect("engine mutex poisoned").len()
    }

    /// Stops the ticker cooperatively, waiting up to the configured grace
    /// period before aborting it.
    pub async fn shutdown(&self) {
        let _ = self.stop_tx.send(true);
        let handle = self.ticker.lock().expect("engine mutex poisoned").take();
        let Some(mut handle) = handle else {
            return;
        };
        match tokio::time::timeout(self.shutdown_grace, &mut handle).await {
            Ok(_) => info!("aggregation ticker stopped"),
            Err(_) => {
                warn!("aggregation ticker did not stop within grace period, aborting");
                handle.abort();
            }
        }
    }
}

impl EngineInner {
    fn record(&self, descriptor: TraceLinkDescriptor, correlation_id: Option<String>) {
        let correlation_id = correlation_id.filter(|id| !id.trim().is_empty());
        let trace_id = descriptor.trace_id.clone();

        let snapshot = {
            let mut buffer = self.buffer.lock().expect("engine mutex poisoned");
            buffer.append(descriptor, correlation_id);
            info!(
                trace_id = %trace_id,
                pending = buffer.len(),
                "incoming request recorded"
            );
            if buffer.len() >= self.count_threshold {
                buffer.snapshot_and_clear()
            } else {
                None
            }
        };

        if let Some(snapshot) = snapshot {
            self.release.release(TriggerReason::CountThreshold, snapshot);
        }
    }

    fn check_timeout(&self) {
        let snapshot = {
            let mut buffer = self.buffer.lock().expect("engine mutex poisoned");
            match buffer.started_at() {
                Some(started) if started.elapsed() >= self.timeout_interval => {
                    buffer.snapshot_and_clear()
                }
                _ => None,
            }
        };

        if let Some(snapshot) = snapshot {
            self.release.release(TriggerReason::TimeInterval, snapshot);
        }
    }
}

async fn run_ticker(
    inner: Arc<EngineInner>,
    tick_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(tick_interval);
    debug!(tick_ms = tick_interval.as_millis() as u64, "aggregation ticker running");
    loop {
        tokio::select! {
            _ = ticker.tick() => inner.check_timeout(),
            res = stop_rx.changed() => {
                if res.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use testkit::{RecordingSink, init_test_tracer, sample_descriptor};
    use tracelink_core::model::TriggerReason;

    use super::*;

    fn quiet_config() -> TriggerConfig {
        // Long timeout so only explicit triggers fire during a test.
        TriggerConfig {
            count_threshold: 3,
            timeout_interval: Duration::from_secs(60),
            tick_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn below_threshold_accumulates_without_release() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let engine = AggregationEngine::start(quiet_config(), sink.clone()).unwrap();

        engine.record(sample_descriptor(1), Some("req-1".to_string()));
        engine.record(sample_descriptor(2), None);

        assert_eq!(engine.pending_len(), 2);
        assert!(sink.records().is_empty());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn threshold_record_releases_exactly_once() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let engine = AggregationEngine::start(quiet_config(), sink.clone()).unwrap();

        for n in 1..=3u8 {
            engine.record(sample_descriptor(n), Some(format!("req-{n}")));
        }

        assert_eq!(engine.pending_len(), 0);
        let records = sink.records();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.trigger_reason, TriggerReason::CountThreshold);
        assert_eq!(record.correlation_ids, vec!["req-1", "req-2", "req-3"]);
        let linked: Vec<_> = record.links.iter().map(|l| l.trace_id.clone()).collect();
        let expected: Vec<_> = (1..=3u8)
            .map(|n| sample_descriptor(n).trace_id.as_str().to_string())
            .collect();
        assert_eq!(linked, expected);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn master_trace_id_is_a_fresh_trace() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let engine = AggregationEngine::start(quiet_config(), sink.clone()).unwrap();

        for n in 1..=3u8 {
            engine.record(sample_descriptor(n), None);
        }

        let records = sink.records();
        let master = &records[0].master_trace_id;
        assert_eq!(master.len(), 32);
        assert!(master.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(master.bytes().any(|b| b != b'0'));
        assert!(records[0].links.iter().all(|l| l.trace_id != *master));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn timeout_releases_partial_batch() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let cfg = TriggerConfig {
            timeout_interval: Duration::from_millis(50),
            ..quiet_config()
        };
        let engine = AggregationEngine::start(cfg, sink.clone()).unwrap();

        engine.record(sample_descriptor(1), Some("req-1".to_string()));
        engine.check_timeout();
        assert!(sink.records().is_empty(), "window has not elapsed yet");

        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.check_timeout();

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger_reason, TriggerReason::TimeInterval);
        assert_eq!(records[0].links.len(), 1);
        assert_eq!(engine.pending_len(), 0);

        // Idle buffer: further ticks are no-ops.
        engine.check_timeout();
        assert_eq!(sink.records().len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn background_ticker_drives_timeout_release() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let cfg = TriggerConfig {
            count_threshold: 3,
            timeout_interval: Duration::from_millis(100),
            tick_interval: Duration::from_millis(20),
            shutdown_grace: Duration::from_secs(1),
        };
        let engine = AggregationEngine::start(cfg, sink.clone()).unwrap();

        engine.record(sample_descriptor(1), None);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger_reason, TriggerReason::TimeInterval);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn sink_failure_still_ends_the_batch() {
        init_test_tracer();
        let sink = RecordingSink::failing();
        let engine = AggregationEngine::start(quiet_config(), sink.clone()).unwrap();

        for n in 1..=3u8 {
            engine.record(sample_descriptor(n), None);
        }

        assert_eq!(engine.pending_len(), 0);
        assert!(sink.records().is_empty());

        // The next batch starts clean.
        sink.set_fail(false);
        for n in 4..=6u8 {
            engine.record(sample_descriptor(n), None);
        }
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].links.len(), 3);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn blank_correlation_ids_are_dropped() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let engine = AggregationEngine::start(quiet_config(), sink.clone()).unwrap();

        engine.record(sample_descriptor(1), Some("  ".to_string()));
        engine.record(sample_descriptor(2), Some(String::new()));
        engine.record(sample_descriptor(3), Some("req-3".to_string()));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].correlation_ids, vec!["req-3"]);
        engine.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_never_lose_or_duplicate() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let engine = Arc::new(AggregationEngine::start(quiet_config(), sink.clone()).unwrap());

        let mut handles = Vec::new();
        for n in 0..30u8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.record(sample_descriptor(n + 1), Some(format!("req-{n}")));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = sink.records();
        assert_eq!(records.len(), 10);
        let mut seen = HashSet::new();
        for record in &records {
            assert_eq!(record.links.len(), 3);
            assert!(record.correlation_ids.len() <= 3);
            for link in &record.links {
                assert!(seen.insert(link.trace_id.clone()), "descriptor released twice");
            }
        }
        assert_eq!(seen.len(), 30);
        assert_eq!(engine.pending_len(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn threshold_of_one_releases_every_record() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let cfg = TriggerConfig {
            count_threshold: 1,
            ..quiet_config()
        };
        let engine = AggregationEngine::start(cfg, sink.clone()).unwrap();

        engine.record(sample_descriptor(1), None);
        engine.record(sample_descriptor(2), None);

        assert_eq!(sink.records().len(), 2);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn rejects_invalid_configuration() {
        let sink = RecordingSink::new();
        let cfg = TriggerConfig {
            count_threshold: 0,
            ..TriggerConfig::default()
        };
        assert!(AggregationEngine::start(cfg, sink.clone()).is_err());

        let cfg = TriggerConfig {
            timeout_interval: Duration::ZERO,
            ..TriggerConfig::default()
        };
        assert!(AggregationEngine::start(cfg, sink).is_err());
    }

    #[tokio::test]
    async fn shutdown_stops_the_ticker() {
        init_test_tracer();
        let sink = RecordingSink::new();
        let cfg = TriggerConfig {
            timeout_interval: Duration::from_millis(40),
            tick_interval: Duration::from_millis(10),
            ..quiet_config()
        };
        let engine = AggregationEngine::start(cfg, sink.clone()).unwrap();
        engine.shutdown().await;

        engine.record(sample_descriptor(1), None);
        tokio::time::sleep(Duration::from_millis(120)).await;
        // No ticker left to fire the time trigger.
        assert!(sink.records().is_empty());
        assert_eq!(engine.pending_len(), 1);
    }
}
