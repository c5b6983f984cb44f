use crate::error::MetricsError;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

/// Maximum number of dimensions the endpoint accepts on a single datum.
pub const MAX_DIMENSIONS: usize = 30;

/// Dimension name to dimension value.
pub type Dimensions = BTreeMap<String, String>;

/// Unit attached to a datum, named the way the ingestion endpoint names them.
///
/// Defaults to [`Unit::None`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Unit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    #[serde(rename = "Bytes/Second")]
    BytesPerSecond,
    #[serde(rename = "Kilobytes/Second")]
    KilobytesPerSecond,
    #[serde(rename = "Megabytes/Second")]
    MegabytesPerSecond,
    #[serde(rename = "Gigabytes/Second")]
    GigabytesPerSecond,
    #[serde(rename = "Terabytes/Second")]
    TerabytesPerSecond,
    #[serde(rename = "Bits/Second")]
    BitsPerSecond,
    #[serde(rename = "Kilobits/Second")]
    KilobitsPerSecond,
    #[serde(rename = "Megabits/Second")]
    MegabitsPerSecond,
    #[serde(rename = "Gigabits/Second")]
    GigabitsPerSecond,
    #[serde(rename = "Terabits/Second")]
    TerabitsPerSecond,
    #[serde(rename = "Count/Second")]
    CountPerSecond,
    #[default]
    None,
}

impl Unit {
    const ALL: [Self; 27] = [
        Self::Seconds,
        Self::Microseconds,
        Self::Milliseconds,
        Self::Bytes,
        Self::Kilobytes,
        Self::Megabytes,
        Self::Gigabytes,
        Self::Terabytes,
        Self::Bits,
        Self::Kilobits,
        Self::Megabits,
        Self::Gigabits,
        Self::Terabits,
        Self::Percent,
        Self::Count,
        Self::BytesPerSecond,
        Self::KilobytesPerSecond,
        Self::MegabytesPerSecond,
        Self::GigabytesPerSecond,
        Self::TerabytesPerSecond,
        Self::BitsPerSecond,
        Self::KilobitsPerSecond,
        Self::MegabitsPerSecond,
        Self::GigabitsPerSecond,
        Self::TerabitsPerSecond,
        Self::CountPerSecond,
        Self::None,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seconds => "Seconds",
            Self::Microseconds => "Microseconds",
            Self::Milliseconds => "Milliseconds",
            Self::Bytes => "Bytes",
            Self::Kilobytes => "Kilobytes",
            Self::Megabytes => "Megabytes",
            Self::Gigabytes => "Gigabytes",
            Self::Terabytes => "Terabytes",
            Self::Bits => "Bits",
            Self::Kilobits => "Kilobits",
            Self::Megabits => "Megabits",
            Self::Gigabits => "Gigabits",
            Self::Terabits => "Terabits",
            Self::Percent => "Percent",
            Self::Count => "Count",
            Self::BytesPerSecond => "Bytes/Second",
            Self::KilobytesPerSecond => "Kilobytes/Second",
            Self::MegabytesPerSecond => "Megabytes/Second",
            Self::GigabytesPerSecond => "Gigabytes/Second",
            Self::TerabytesPerSecond => "Terabytes/Second",
            Self::BitsPerSecond => "Bits/Second",
            Self::KilobitsPerSecond => "Kilobits/Second",
            Self::MegabitsPerSecond => "Megabits/Second",
            Self::GigabitsPerSecond => "Gigabits/Second",
            Self::TerabitsPerSecond => "Terabits/Second",
            Self::CountPerSecond => "Count/Second",
            Self::None => "None",
        }
    }

    /// Maps a unit from the `metrics` facade onto the closest endpoint unit.
    ///
    /// Returns `None` for units the endpoint has no name for (nanoseconds).
    #[must_use]
    pub fn from_metrics(unit: metrics::Unit) -> Option<Self> {
        let unit = match unit.as_str() {
            "count" => Self::Count,
            "percent" => Self::Percent,
            "seconds" => Self::Seconds,
            "milliseconds" => Self::Milliseconds,
            "microseconds" => Self::Microseconds,
            "tebibytes" => Self::Terabytes,
            "gibibytes" | "gigibytes" => Self::Gigabytes,
            "mebibytes" => Self::Megabytes,
            "kibibytes" => Self::Kilobytes,
            "bytes" => Self::Bytes,
            "terabits_per_second" => Self::TerabitsPerSecond,
            "gigabits_per_second" => Self::GigabitsPerSecond,
            "megabits_per_second" => Self::MegabitsPerSecond,
            "kilobits_per_second" => Self::KilobitsPerSecond,
            "bits_per_second" => Self::BitsPerSecond,
            "count_per_second" => Self::CountPerSecond,
            _ => return None,
        };
        Some(unit)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str() == s)
            .ok_or_else(|| MetricsError::invalid(format!("unknown unit {s:?}")))
    }
}

/// The subset of units a timer can report elapsed time in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    #[default]
    Milliseconds,
    Microseconds,
}

impl TimeUnit {
    #[must_use]
    pub fn measure(self, elapsed: Duration) -> f64 {
        match self {
            Self::Seconds => elapsed.as_secs_f64(),
            Self::Milliseconds => elapsed.as_secs_f64() * 1_000.0,
            Self::Microseconds => elapsed.as_secs_f64() * 1_000_000.0,
        }
    }
}

impl From<TimeUnit> for Unit {
    fn from(unit: TimeUnit) -> Self {
        match unit {
            TimeUnit::Seconds => Self::Seconds,
            TimeUnit::Milliseconds => Self::Milliseconds,
            TimeUnit::Microseconds => Self::Microseconds,
        }
    }
}

/// A pre-aggregated summary of data points gathered outside the buffer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticSet {
    pub sample_count: u64,
    pub sum: f64,
    pub minimum: f64,
    pub maximum: f64,
}

impl StatisticSet {
    #[must_use]
    pub const fn new(sample_count: u64, sum: f64, minimum: f64, maximum: f64) -> Self {
        Self {
            sample_count,
            sum,
            minimum,
            maximum,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), MetricsError> {
        if self.sample_count < 1 {
            return Err(MetricsError::invalid("sample count must be at least 1"));
        }
        if ![self.sum, self.minimum, self.maximum]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(MetricsError::invalid("statistic values must be finite"));
        }
        if self.minimum > self.maximum {
            return Err(MetricsError::invalid(format!(
                "minimum {} is greater than maximum {}",
                self.minimum, self.maximum
            )));
        }
        Ok(())
    }
}

/// What a datum reports: a single value or a statistic set, never both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value")]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Value(f64),
    Statistics(StatisticSet),
}

/// One buffered observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricDatum {
    pub name: String,
    #[serde(flatten)]
    pub value: MetricValue,
    pub unit: Unit,
    pub dimensions: Dimensions,
    pub timestamp: SystemTime,
}

impl MetricDatum {
    /// Builds a datum, checking the name, the value and the dimension count.
    ///
    /// # Errors
    /// Returns [`MetricsError::InvalidArgument`] when the datum could not be accepted by the
    /// endpoint.
    pub fn new(
        name: impl Into<String>,
        value: MetricValue,
        options: DatumOptions,
    ) -> Result<Self, MetricsError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MetricsError::invalid("metric name must not be empty"));
        }
        match &value {
            MetricValue::Value(v) if !v.is_finite() => {
                return Err(MetricsError::invalid(format!(
                    "value for {name} must be finite, got {v}"
                )));
            }
            MetricValue::Statistics(stats) => stats.validate()?,
            MetricValue::Value(_) => {}
        }
        if options.dimensions.len() > MAX_DIMENSIONS {
            return Err(MetricsError::invalid(format!(
                "{name} has {} dimensions, at most {MAX_DIMENSIONS} are allowed",
                options.dimensions.len()
            )));
        }
        Ok(Self {
            name,
            value,
            unit: options.unit,
            dimensions: options.dimensions,
            timestamp: options.timestamp.unwrap_or_else(SystemTime::now),
        })
    }

    #[must_use]
    pub const fn as_value(&self) -> Option<f64> {
        match self.value {
            MetricValue::Value(v) => Some(v),
            MetricValue::Statistics(_) => None,
        }
    }

    #[must_use]
    pub const fn as_statistics(&self) -> Option<&StatisticSet> {
        match &self.value {
            MetricValue::Statistics(stats) => Some(stats),
            MetricValue::Value(_) => None,
        }
    }
}

/// Per-call options shared by every way of buffering a datum.
///
/// Leaving the timestamp unset means "when the datum is buffered".
///
/// # Example
/// ```
/// use metrics_buffer::{DatumOptions, Unit};
///
/// let options = DatumOptions::new()
///     .unit(Unit::Bytes)
///     .dimension("Method", "GET");
/// assert_eq!(options.dimensions.get("Method").map(String::as_str), Some("GET"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatumOptions {
    pub unit: Unit,
    pub dimensions: Dimensions,
    pub timestamp: Option<SystemTime>,
}

impl DatumOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    #[must_use]
    pub const fn timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A single call to the publishing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishRequest {
    pub namespace: String,
    pub metric_data: Vec<MetricDatum>,
}

impl TryFrom<&[u8]> for PublishRequest {
    type Error = MetricsError;

    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        rmp_serde::from_slice(buffer).map_err(MetricsError::from)
    }
}

impl TryFrom<&PublishRequest> for Vec<u8> {
    type Error = rmp_serde::encode::Error;

    fn try_from(request: &PublishRequest) -> Result<Self, Self::Error> {
        rmp_serde::to_vec_named(request)
    }
}
