use crate::{
    buffer::MetricBuffer,
    datum::{DatumOptions, Dimensions, Unit},
    error::MetricsError,
    publisher::Publisher,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

#[derive(Debug, Default)]
struct Registry {
    units: HashMap<String, Unit>,
    gauges: HashMap<metrics::Key, f64>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Handle<P> {
    key: metrics::Key,
    default_unit: Unit,
    buffer: Arc<MetricBuffer<P>>,
    registry: SharedRegistry,
}

impl<P: Publisher> Handle<P> {
    const fn new(
        key: metrics::Key,
        default_unit: Unit,
        buffer: Arc<MetricBuffer<P>>,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            key,
            default_unit,
            buffer,
            registry,
        }
    }

    fn push_value(&self, value: f64) {
        self.buffer_value(&lock(&self.registry), value);
    }

    /// Buffers `value` while the caller holds the registry, so datums for one key land in the
    /// order their values were computed.
    fn buffer_value(&self, registry: &Registry, value: f64) {
        let unit = registry
            .units
            .get(self.key.name())
            .copied()
            .unwrap_or(self.default_unit);
        let dimensions = self
            .key
            .labels()
            .map(|label| (label.key().to_owned(), label.value().to_owned()))
            .collect::<Dimensions>();
        let options = DatumOptions {
            unit,
            dimensions,
            timestamp: None,
        };
        if let Err(e) = self.buffer.put_value(self.key.name(), value, options) {
            log::warn!("dropping {} from metrics facade: {e}", self.key.name());
        }
    }

    fn adjust_gauge(&self, adjust: impl FnOnce(f64) -> f64) {
        let mut registry = lock(&self.registry);
        let level = registry.gauges.entry(self.key.clone()).or_insert(0.0);
        *level = adjust(*level);
        let level = *level;
        self.buffer_value(&registry, level);
    }
}

#[allow(clippy::cast_precision_loss)]
impl<P: Publisher> metrics::CounterFn for Handle<P> {
    fn increment(&self, value: u64) {
        self.push_value(value as f64);
    }

    fn absolute(&self, value: u64) {
        self.push_value(value as f64);
    }
}

impl<P: Publisher> metrics::GaugeFn for Handle<P> {
    fn increment(&self, value: f64) {
        self.adjust_gauge(|level| level + value);
    }

    fn decrement(&self, value: f64) {
        self.adjust_gauge(|level| level - value);
    }

    fn set(&self, value: f64) {
        self.adjust_gauge(|_| value);
    }
}

impl<P: Publisher> metrics::HistogramFn for Handle<P> {
    fn record(&self, value: f64) {
        self.push_value(value);
    }
}

/// A [`metrics::Recorder`] that buffers every recorded value as a datum.
///
/// Counter increments, gauge levels and histogram samples each become one value datum named
/// after the metric key, with the key's labels as dimensions. Counters default to
/// [`Unit::Count`]; a unit given through `describe_*` takes precedence. Nothing is published
/// until [`MetricBuffer::send`] is called on the shared buffer.
///
/// # Example
/// ```
/// use metrics_buffer::{BufferRecorder, MemoryPublisher, MetricBuffer};
/// use std::sync::Arc;
///
/// let buffer = Arc::new(MetricBuffer::new("MyApplication", MemoryPublisher::new()));
/// let recorder = BufferRecorder::new(buffer.clone());
///
/// metrics::with_local_recorder(&recorder, || {
///     metrics::counter!("requests", "Method" => "GET").increment(1);
/// });
/// assert_eq!(buffer.len(), 1);
/// ```
#[derive(Debug)]
pub struct BufferRecorder<P> {
    buffer: Arc<MetricBuffer<P>>,
    registry: SharedRegistry,
}

impl<P> Clone for BufferRecorder<P> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<P> BufferRecorder<P>
where
    P: Publisher + Send + Sync + 'static,
{
    pub fn new(buffer: Arc<MetricBuffer<P>>) -> Self {
        Self {
            buffer,
            registry: SharedRegistry::default(),
        }
    }

    pub const fn buffer(&self) -> &Arc<MetricBuffer<P>> {
        &self.buffer
    }

    /// Sets this recorder as the global recorder.
    /// All metrics recorded through the facade after this call end up in the buffer.
    ///
    /// # Errors
    /// Returns [`MetricsError::RecorderInstall`] if a global recorder is already installed.
    pub fn install(self) -> Result<(), MetricsError> {
        metrics::set_global_recorder(self).map_err(|_| MetricsError::RecorderInstall)
    }

    fn describe(&self, key_name: &metrics::KeyName, unit: Option<metrics::Unit>) {
        if let Some(unit) = unit.and_then(Unit::from_metrics) {
            lock(&self.registry)
                .units
                .insert(key_name.as_str().to_owned(), unit);
        }
    }

    fn handle(&self, key: &metrics::Key, default_unit: Unit) -> Arc<Handle<P>> {
        Arc::new(Handle::new(
            key.clone(),
            default_unit,
            self.buffer.clone(),
            self.registry.clone(),
        ))
    }
}

impl<P> metrics::Recorder for BufferRecorder<P>
where
    P: Publisher + Send + Sync + 'static,
{
    fn describe_counter(
        &self,
        key_name: metrics::KeyName,
        unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        self.describe(&key_name, unit);
    }

    fn describe_gauge(
        &self,
        key_name: metrics::KeyName,
        unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        self.describe(&key_name, unit);
    }

    fn describe_histogram(
        &self,
        key_name: metrics::KeyName,
        unit: Option<metrics::Unit>,
        _description: metrics::SharedString,
    ) {
        self.describe(&key_name, unit);
    }

    fn register_counter(
        &self,
        key: &metrics::Key,
        _meta: &metrics::Metadata<'_>,
    ) -> metrics::Counter {
        metrics::Counter::from_arc(self.handle(key, Unit::Count))
    }

    fn register_gauge(&self, key: &metrics::Key, _meta: &metrics::Metadata<'_>) -> metrics::Gauge {
        metrics::Gauge::from_arc(self.handle(key, Unit::None))
    }

    fn register_histogram(
        &self,
        key: &metrics::Key,
        _meta: &metrics::Metadata<'_>,
    ) -> metrics::Histogram {
        metrics::Histogram::from_arc(self.handle(key, Unit::None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryPublisher;

    fn recorder() -> BufferRecorder<MemoryPublisher> {
        BufferRecorder::new(Arc::new(MetricBuffer::new(
            "Test",
            MemoryPublisher::new(),
        )))
    }

    #[test]
    fn counters_become_count_datums_with_label_dimensions() {
        let recorder = recorder();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("requests", "Method" => "GET").increment(3);
        });

        let datums = recorder.buffer().snapshot();
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].name, "requests");
        assert_eq!(datums[0].as_value(), Some(3.0));
        assert_eq!(datums[0].unit, Unit::Count);
        assert_eq!(
            datums[0].dimensions.get("Method").map(String::as_str),
            Some("GET")
        );
    }

    #[test]
    fn gauges_report_their_level() {
        let recorder = recorder();
        metrics::with_local_recorder(&recorder, || {
            let gauge = metrics::gauge!("queue_depth");
            gauge.set(10.0);
            gauge.increment(5.0);
            gauge.decrement(3.0);
        });

        let levels: Vec<_> = recorder
            .buffer()
            .snapshot()
            .iter()
            .filter_map(crate::MetricDatum::as_value)
            .collect();
        assert_eq!(levels, [10.0, 15.0, 12.0]);
    }

    #[test]
    fn concurrent_gauge_increments_are_buffered_in_order() {
        let recorder = recorder();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    metrics::with_local_recorder(&recorder, || {
                        let gauge = metrics::gauge!("in_flight");
                        for _ in 0..200 {
                            gauge.increment(1.0);
                        }
                    });
                });
            }
        });

        let levels: Vec<_> = recorder
            .buffer()
            .snapshot()
            .iter()
            .filter_map(crate::MetricDatum::as_value)
            .collect();
        let expected: Vec<_> = (1..=1600).map(f64::from).collect();
        assert_eq!(levels, expected);
    }

    #[test]
    fn described_units_are_used_for_histograms() {
        let recorder = recorder();
        metrics::with_local_recorder(&recorder, || {
            metrics::describe_histogram!(
                "latency",
                metrics::Unit::Milliseconds,
                "time spent serving a request"
            );
            metrics::histogram!("latency").record(42.0);
        });

        let datum = &recorder.buffer().snapshot()[0];
        assert_eq!(datum.unit, Unit::Milliseconds);
        assert_eq!(datum.as_value(), Some(42.0));
    }

    #[test]
    fn non_finite_samples_are_dropped() {
        let recorder = recorder();
        metrics::with_local_recorder(&recorder, || {
            metrics::histogram!("latency").record(f64::NAN);
        });
        assert!(recorder.buffer().is_empty());
    }
}
