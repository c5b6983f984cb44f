//! This example demonstrates shipping buffered metrics to a local agent over an IPC socket.
//!
//! An IngestListener plays the agent: it accepts publish requests and prints them, where a real
//! agent would forward them to the hosted ingestion service. The application side installs a
//! BufferRecorder so plain `metrics` macros end up in the buffer, then publishes through a
//! SocketPublisher.

use metrics_buffer::{BufferRecorder, IngestListener, MetricBuffer, SocketPublisherBuilder};
use std::{sync::Arc, thread, time::Duration};

const SOCKET: &str = "metrics_buffer_demo.sock";

fn main() {
    let listener = match IngestListener::bind(SOCKET) {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to start ingest listener: {e}");
            return;
        }
    };
    thread::spawn(move || {
        listener.serve(|request| {
            println!(
                "agent received {} datums for {}",
                request.metric_data.len(),
                request.namespace
            );
            true
        });
    });

    let publisher = match SocketPublisherBuilder::default().socket(SOCKET).connect() {
        Ok(publisher) => publisher,
        Err(e) => {
            eprintln!("Failed to connect to ingest listener: {e}");
            return;
        }
    };
    let buffer = Arc::new(MetricBuffer::new("SidecarDemo", publisher));
    if let Err(e) = BufferRecorder::new(buffer.clone()).install() {
        eprintln!("Failed to install recorder: {e}");
        return;
    }

    for i in 0..45 {
        metrics::counter!("requests", "Method" => "GET").increment(1);
        metrics::histogram!("latency").record(f64::from(i));
    }
    metrics::gauge!("queue_depth").set(std::f64::consts::PI);

    match buffer.send() {
        Ok(sent) => println!("published {sent} datums"),
        Err(e) => eprintln!("Failed to publish: {e}"),
    }

    // Give the agent a moment to print before the process exits.
    thread::sleep(Duration::from_millis(100));
}
