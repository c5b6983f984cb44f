use crate::{
    datum::{DatumOptions, MetricDatum, MetricValue, PublishRequest, StatisticSet},
    error::MetricsError,
    publisher::Publisher,
};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Accumulates metric datums for one namespace and publishes them in bounded batches.
///
/// Nothing leaves the process until [`send`](Self::send) is called: there is no background
/// flush, no timer and no thread. All methods take `&self`, so a buffer can be shared between
/// instruments, threads (behind an `Arc`) and a [`BufferRecorder`](crate::BufferRecorder).
///
/// # Example
/// ```
/// use metrics_buffer::{DatumOptions, MemoryPublisher, MetricBuffer, StatisticSet, Unit};
///
/// let endpoint = MemoryPublisher::new();
/// let buffer = MetricBuffer::new("MyApplication", endpoint.clone());
///
/// buffer.put_value("latency", 12.5, DatumOptions::new().unit(Unit::Milliseconds))?;
/// buffer.put_statistic("payload", StatisticSet::new(50, 10_000.0, 0.0, 500.0), DatumOptions::new())?;
/// assert_eq!(buffer.len(), 2);
///
/// buffer.send()?;
/// assert!(buffer.is_empty());
/// assert_eq!(endpoint.request_count(), 1);
/// # Ok::<(), metrics_buffer::MetricsError>(())
/// ```
#[derive(Debug)]
pub struct MetricBuffer<P> {
    namespace: String,
    batch_size: usize,
    datums: Mutex<Vec<MetricDatum>>,
    publisher: P,
}

impl<P: Publisher> MetricBuffer<P> {
    /// Creates an empty buffer publishing to `namespace` through `publisher`.
    pub fn new(namespace: impl Into<String>, publisher: P) -> Self {
        MetricBufferBuilder::new(namespace).build(publisher)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Largest number of datums sent per endpoint call.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size.min(self.publisher.max_batch_size()).max(1)
    }

    /// Number of datums waiting for the next [`send`](Self::send).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the pending datums, in buffer order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<MetricDatum> {
        self.lock().clone()
    }

    /// Drops every pending datum without publishing it and hands them back.
    pub fn discard(&self) -> Vec<MetricDatum> {
        std::mem::take(&mut *self.lock())
    }

    /// Buffers a single value for the next [`send`](Self::send).
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidArgument`] if `name` is empty or `value` is not finite.
    pub fn put_value(
        &self,
        name: impl Into<String>,
        value: f64,
        options: DatumOptions,
    ) -> Result<(), MetricsError> {
        self.push(MetricDatum::new(name, MetricValue::Value(value), options)?);
        Ok(())
    }

    /// Buffers a summary of data points aggregated outside the buffer.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidArgument`] if `name` is empty, the sample count is zero,
    /// a field is not finite or the minimum exceeds the maximum.
    pub fn put_statistic(
        &self,
        name: impl Into<String>,
        statistics: StatisticSet,
        options: DatumOptions,
    ) -> Result<(), MetricsError> {
        self.push(MetricDatum::new(
            name,
            MetricValue::Statistics(statistics),
            options,
        )?);
        Ok(())
    }

    pub(crate) fn push(&self, datum: MetricDatum) {
        log::trace!("buffering {} for {}", datum.name, self.namespace);
        self.lock().push(datum);
    }

    /// Publishes every pending datum, one endpoint call per batch of at most
    /// [`batch_size`](Self::batch_size) datums, in the order they were buffered.
    ///
    /// Returns how many datums were sent. An empty buffer makes no endpoint call.
    ///
    /// Batches the endpoint accepted are gone from the buffer for good. When a batch fails, that
    /// batch and every batch after it are put back at the front of the buffer, ahead of anything
    /// buffered while the send was running, so calling `send` again resumes where this one
    /// stopped. The endpoint's acceptance is the only delivery guarantee; nothing is retried here.
    ///
    /// # Errors
    /// Returns [`MetricsError::Publish`] with the endpoint's error when a batch is not accepted.
    pub fn send(&self) -> Result<usize, MetricsError> {
        let pending = std::mem::take(&mut *self.lock());
        if pending.is_empty() {
            return Ok(0);
        }

        let batch_size = self.batch_size();
        let mut sent = 0;
        let mut remaining = pending;
        let mut request = PublishRequest {
            namespace: self.namespace.clone(),
            metric_data: Vec::new(),
        };

        while !remaining.is_empty() {
            let rest = remaining.split_off(batch_size.min(remaining.len()));
            request.metric_data = std::mem::replace(&mut remaining, rest);
            let count = request.metric_data.len();
            if let Err(source) = self.publisher.publish(&request) {
                log::warn!(
                    "failed to publish {count} datums to {}: {source}",
                    self.namespace
                );
                let mut unsent = std::mem::take(&mut request.metric_data);
                unsent.append(&mut remaining);
                let retained = unsent.len();
                self.requeue(unsent);
                return Err(MetricsError::Publish {
                    namespace: self.namespace.clone(),
                    sent,
                    retained,
                    source,
                });
            }
            sent += count;
            log::debug!("published {count} datums to {}", self.namespace);
        }
        Ok(sent)
    }

    fn requeue(&self, mut unsent: Vec<MetricDatum>) {
        let mut datums = self.lock();
        unsent.append(&mut *datums);
        *datums = unsent;
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MetricDatum>> {
        self.datums.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Configures a [`MetricBuffer`] before it is created.
#[derive(Debug, Clone)]
pub struct MetricBufferBuilder {
    namespace: String,
    batch_size: usize,
}

impl MetricBufferBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            batch_size: usize::MAX,
        }
    }

    /// Caps the datums per endpoint call below what the publisher allows.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn build<P: Publisher>(self, publisher: P) -> MetricBuffer<P> {
        MetricBuffer {
            namespace: self.namespace,
            batch_size: self.batch_size,
            datums: Mutex::default(),
            publisher,
        }
    }
}
