//! Wrappers that buffer one datum per invocation of the function they wrap.
//!
//! An instrument is created from a buffer with [`MetricBuffer::count`] or
//! [`MetricBuffer::timeit`] and then applied with [`Instrument::wrap`], [`Instrument::call`] or
//! [`Instrument::start`]. The datum is buffered when the invocation finishes, whether it returned
//! a value, returned an `Err`, or panicked; the outcome itself is handed back untouched.
//!
//! Stacked instruments record in the order their invocations finish, innermost first:
//!
//! ```
//! use metrics_buffer::{Instrument, MemoryPublisher, MetricBuffer};
//!
//! let buffer = MetricBuffer::new("Api", MemoryPublisher::new());
//! let requests = buffer.count("requests")?;
//! let api = buffer.timeit("api")?;
//!
//! let handler = api.wrap(requests.wrap(|id: u32| id * 2));
//! assert_eq!(handler(21), 42);
//!
//! let names: Vec<_> = buffer.snapshot().into_iter().map(|d| d.name).collect();
//! assert_eq!(names, ["requests", "api"]);
//! # Ok::<(), metrics_buffer::MetricsError>(())
//! ```

use crate::{
    buffer::MetricBuffer,
    datum::{DatumOptions, Dimensions, MetricDatum, MetricValue, TimeUnit, Unit},
    error::MetricsError,
    publisher::Publisher,
};
use std::time::{Duration, Instant};

/// Something that buffers a datum for every invocation it observes.
pub trait Instrument {
    /// Buffers the datum for one finished invocation that took `elapsed`.
    fn record(&self, elapsed: Duration);

    /// Starts observing an invocation. The datum is buffered when the guard is dropped.
    fn start(&self) -> InvocationGuard<'_, Self>
    where
        Self: Sized,
    {
        InvocationGuard {
            instrument: self,
            started: Instant::now(),
        }
    }

    /// Runs `f` once under this instrument and returns whatever it returned.
    fn call<T>(&self, f: impl FnOnce() -> T) -> T
    where
        Self: Sized,
    {
        let _guard = self.start();
        f()
    }

    /// Wraps `f` so that every call to the result is observed by this instrument.
    fn wrap<A, T>(self, f: impl Fn(A) -> T) -> impl Fn(A) -> T
    where
        Self: Sized,
    {
        move |arg| self.call(|| f(arg))
    }
}

/// Buffers the datum of its instrument when dropped, including while unwinding.
#[must_use = "the invocation is recorded when the guard is dropped"]
#[derive(Debug)]
pub struct InvocationGuard<'a, I: Instrument> {
    instrument: &'a I,
    started: Instant,
}

impl<I: Instrument> Drop for InvocationGuard<'_, I> {
    fn drop(&mut self) {
        self.instrument.record(self.started.elapsed());
    }
}

fn record_value<P: Publisher>(
    buffer: &MetricBuffer<P>,
    name: &str,
    value: f64,
    unit: Unit,
    dimensions: &Dimensions,
) {
    let options = DatumOptions {
        unit,
        dimensions: dimensions.clone(),
        timestamp: None,
    };
    match MetricDatum::new(name, MetricValue::Value(value), options) {
        Ok(datum) => buffer.push(datum),
        Err(e) => log::warn!("dropping datum for {name}: {e}"),
    }
}

fn check_name(name: &str) -> Result<(), MetricsError> {
    if name.is_empty() {
        return Err(MetricsError::invalid("metric name must not be empty"));
    }
    Ok(())
}

/// Counts invocations: buffers `value` (1 unless set) each time.
#[derive(Debug)]
pub struct Count<'b, P> {
    buffer: &'b MetricBuffer<P>,
    name: String,
    value: f64,
    unit: Unit,
    dimensions: Dimensions,
}

impl<P> Count<'_, P> {
    /// Amount buffered per invocation.
    #[must_use]
    pub const fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    #[must_use]
    pub const fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions.extend(dimensions);
        self
    }
}

impl<P: Publisher> Instrument for Count<'_, P> {
    fn record(&self, _elapsed: Duration) {
        record_value(
            self.buffer,
            &self.name,
            self.value,
            self.unit,
            &self.dimensions,
        );
    }
}

/// Times invocations: buffers the wall-clock time each one took.
#[derive(Debug)]
pub struct Timeit<'b, P> {
    buffer: &'b MetricBuffer<P>,
    name: String,
    unit: TimeUnit,
    dimensions: Dimensions,
}

impl<P> Timeit<'_, P> {
    /// Unit the elapsed time is reported in, milliseconds unless set.
    #[must_use]
    pub const fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    #[must_use]
    pub fn dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions.extend(dimensions);
        self
    }
}

impl<P: Publisher> Instrument for Timeit<'_, P> {
    fn record(&self, elapsed: Duration) {
        record_value(
            self.buffer,
            &self.name,
            self.unit.measure(elapsed),
            self.unit.into(),
            &self.dimensions,
        );
    }
}

impl<P: Publisher> MetricBuffer<P> {
    /// Creates an instrument counting invocations under `name`.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidArgument`] if `name` is empty.
    pub fn count(&self, name: impl Into<String>) -> Result<Count<'_, P>, MetricsError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Count {
            buffer: self,
            name,
            value: 1.0,
            unit: Unit::None,
            dimensions: Dimensions::new(),
        })
    }

    /// Creates an instrument timing invocations under `name`.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidArgument`] if `name` is empty.
    pub fn timeit(&self, name: impl Into<String>) -> Result<Timeit<'_, P>, MetricsError> {
        let name = name.into();
        check_name(&name)?;
        Ok(Timeit {
            buffer: self,
            name,
            unit: TimeUnit::Milliseconds,
            dimensions: Dimensions::new(),
        })
    }
}
