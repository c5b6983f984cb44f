#![warn(clippy::pedantic, clippy::nursery, clippy::cargo, clippy::perf)]

//! # `metrics_buffer`
//!
//! Buffers metric datums in memory and publishes them to a time-series ingestion endpoint in
//! batches, so an application pays for one request per batch instead of one per observation.
//!
//! Datums reach a [`MetricBuffer`] three ways:
//!
//! * explicitly, with [`MetricBuffer::put_value`] and [`MetricBuffer::put_statistic`];
//! * through instruments wrapped around functions, [`MetricBuffer::count`] and
//!   [`MetricBuffer::timeit`] (see [`Instrument`]);
//! * through the [`metrics`] facade, by installing a [`BufferRecorder`].
//!
//! They leave it only when the caller invokes [`MetricBuffer::send`], which splits them into
//! requests of at most [`Publisher::max_batch_size`] datums. The library never flushes on its
//! own and starts no threads or timers.
//!
//! The endpoint is anything implementing [`Publisher`]. [`MemoryPublisher`] keeps requests in
//! memory; [`SocketPublisher`] ships them over a local socket to an [`IngestListener`], for
//! instance a sidecar that forwards them to the hosted service.
//!
//! ## Delivery
//!
//! A datum counts as delivered once the endpoint accepted the request carrying it. When a request
//! fails, [`MetricBuffer::send`] returns [`MetricsError::Publish`] and keeps that request's datums,
//! and those of every request it had not attempted yet, at the front of the buffer. Nothing is
//! retried automatically, and staying under the endpoint's rate limit is the caller's business.
//!
//! ```
//! use metrics_buffer::{DatumOptions, Instrument, MemoryPublisher, MetricBuffer};
//!
//! let endpoint = MemoryPublisher::new();
//! let buffer = MetricBuffer::new("MyApplication", endpoint.clone());
//!
//! let fetch = buffer.count("fetches")?.wrap(|id: u32| format!("item {id}"));
//! fetch(1);
//! fetch(2);
//! buffer.put_value("cache_size", 128.0, DatumOptions::new().dimension("Tier", "hot"))?;
//!
//! assert_eq!(buffer.send()?, 3);
//! assert_eq!(endpoint.requests()[0].metric_data.len(), 3);
//! # Ok::<(), metrics_buffer::MetricsError>(())
//! ```

mod buffer;
mod datum;
mod error;
mod instrument;
mod ipc;
mod publisher;
mod recorder;

pub use buffer::{MetricBuffer, MetricBufferBuilder};
pub use datum::{
    DatumOptions, Dimensions, MAX_DIMENSIONS, MetricDatum, MetricValue, PublishRequest,
    StatisticSet, TimeUnit, Unit,
};
pub use error::{MetricsError, PublishError};
pub use instrument::{Count, Instrument, InvocationGuard, Timeit};
pub use ipc::{IngestListener, SocketPublisher, SocketPublisherBuilder};
pub use publisher::{MAX_DATUMS_PER_REQUEST, MemoryPublisher, Publisher};
pub use recorder::BufferRecorder;
