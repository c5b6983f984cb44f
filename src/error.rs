use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to publish to namespace {namespace}: {sent} datums sent, {retained} retained: {source}")]
    Publish {
        namespace: String,
        sent: usize,
        retained: usize,
        #[source]
        source: PublishError,
    },
    #[error("IO error setting up metrics transport {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize publish request: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("a global metrics recorder is already installed")]
    RecorderInstall,
}

impl MetricsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failure reported by a [`Publisher`](crate::Publisher) for a single request.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("request rejected by endpoint: {0}")]
    Rejected(String),
    #[error("request throttled by endpoint")]
    Throttled,
    #[error("endpoint unreachable: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldnt encode request: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}
