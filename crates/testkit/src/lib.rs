use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use opentelemetry::global;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracelink_core::error::{Result, TracelinkError};
use tracelink_core::ids::{SpanId, TraceId};
use tracelink_core::model::{BatchRecord, TraceLinkDescriptor};
use tracelink_core::sink::BatchSink;

/// Installs a real tracer provider once per process so spans created in
/// tests carry usable trace ids instead of the no-op zeros.
pub fn init_test_tracer() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        global::set_tracer_provider(SdkTracerProvider::builder().build());
    });
}

/// Deterministic descriptor fixture; `n` keeps ids distinct and non-zero.
pub fn sample_descriptor(n: u8) -> TraceLinkDescriptor {
    let trace_id =
        TraceId::parse(&format!("{:032x}", 0x1000 + n as u128)).expect("valid trace id");
    let span_id = SpanId::parse(&format!("{:016x}", 0x2000 + n as u64)).expect("valid span id");
    TraceLinkDescriptor {
        trace_id,
        span_id,
        trace_flags: 1,
        trace_state: None,
    }
}

/// In-memory `BatchSink` that captures every persisted record and can be
/// switched into a failing mode.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<BatchRecord>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<BatchRecord> {
        self.records.lock().expect("sink mutex poisoned").clone()
    }
}

impl BatchSink for RecordingSink {
    fn persist(&self, record: &BatchRecord) -> Result<i64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TracelinkError::Store("injected sink failure".to_string()));
        }
        let mut records = self.records.lock().expect("sink mutex poisoned");
        records.push(record.clone());
        Ok(records.len() as i64)
    }
}
