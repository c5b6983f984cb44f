//! This example demonstrates how to instrument functions with a MetricBuffer.
//!
//! A counter and a timer are stacked around a request handler, a pre-aggregated statistic set is
//! buffered by hand, and everything is published with a single call to `send`. The in-memory
//! publisher stands in for the hosted ingestion service so the requests can be printed.

use metrics_buffer::{
    DatumOptions, Instrument, MemoryPublisher, MetricBuffer, StatisticSet, Unit,
};
use std::{thread, time::Duration};

fn handle(path: &str) -> Result<usize, String> {
    thread::sleep(Duration::from_millis(3));
    if path.is_empty() {
        return Err("empty path".into());
    }
    Ok(path.len())
}

fn main() -> Result<(), metrics_buffer::MetricsError> {
    let endpoint = MemoryPublisher::new();
    let buffer = MetricBuffer::new("DemoApplication", endpoint.clone());

    let requests = buffer.count("requests")?.dimension("Service", "demo");
    let latency = buffer.timeit("latency")?.dimension("Service", "demo");
    let handler = latency.wrap(requests.wrap(handle));

    for path in ["/", "/items", ""] {
        match handler(path) {
            Ok(len) => println!("handled {path:?} ({len} bytes)"),
            Err(e) => println!("failed {path:?}: {e}"),
        }
    }

    buffer.put_statistic(
        "payload_size",
        StatisticSet::new(50, 10_000.0, 0.0, 500.0),
        DatumOptions::new().unit(Unit::Bytes),
    )?;

    println!("{} datums buffered", buffer.len());
    let sent = buffer.send()?;
    println!("{sent} datums sent in {} requests", endpoint.request_count());

    for request in endpoint.requests() {
        for datum in request.metric_data {
            println!("  {} {:?} {}", datum.name, datum.value, datum.unit);
        }
    }
    Ok(())
}
