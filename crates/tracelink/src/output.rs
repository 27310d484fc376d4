use chrono::SecondsFormat;
use tracelink_core::model::{PersistedBatch, StatusResponse};

pub fn print_batches_human(batches: &[PersistedBatch]) {
    for batch in batches {
        let record = &batch.record;
        println!(
            "batch={} reason={} master_trace={} links={} first_event={} released={}",
            batch.id,
            record.trigger_reason,
            record.master_trace_id,
            record.links.len(),
            record
                .first_event_ts
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            record
                .released_ts
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        for (i, link) in record.links.iter().enumerate() {
            println!("  link[{i}] traceparent={}", link.traceparent);
        }
        if !record.correlation_ids.is_empty() {
            println!("  request-ids={}", record.correlation_ids.join(","));
        }
    }
    println!("-- {} batches --", batches.len());
}

pub fn print_status_human(v: &StatusResponse) {
    println!("db={} size={}B", v.db_path, v.db_size_bytes);
    println!("batches={} links={}", v.batches_count, v.links_count);
    match (&v.oldest_released_ts, &v.newest_released_ts) {
        (Some(oldest), Some(newest)) => println!(
            "released between {} and {}",
            oldest.to_rfc3339_opts(SecondsFormat::Millis, true),
            newest.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        _ => println!("no batches released yet"),
    }
}
