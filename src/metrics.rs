use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, TextEncoder, opts, register_int_counter};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duet_messages_sent_total",
        "Total number of messages accepted by the ingestion handler"
    ))
    .unwrap()
});

pub static FAST_QUEUE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duet_fast_queue_failures_total",
        "Sends that succeeded durably but failed the fast-queue push"
    ))
    .unwrap()
});

pub static POLL_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duet_poll_requests_total",
        "Total number of poll requests resolved"
    ))
    .unwrap()
});

pub static QUEUE_ENTRIES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duet_queue_entries_dropped_total",
        "Fast-queue entries skipped because they failed to deserialize"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
