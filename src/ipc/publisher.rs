use super::{ACCEPTED, DEFAULT_SOCKET, socket_name, write_frame};
use crate::{
    datum::PublishRequest,
    error::{MetricsError, PublishError},
    publisher::{MAX_DATUMS_PER_REQUEST, Publisher},
};
use interprocess::local_socket::{Stream, prelude::*};
use std::{
    io::Read,
    sync::{Mutex, PoisonError},
};

/// A [`Publisher`] that hands each request to an [`IngestListener`](super::IngestListener)
/// over a local socket and waits for its acknowledgement.
#[derive(Debug)]
pub struct SocketPublisher {
    stream: Mutex<Stream>,
    batch_size: usize,
}

impl SocketPublisher {
    fn new(stream: Stream, batch_size: usize) -> Self {
        Self {
            stream: Mutex::new(stream),
            batch_size,
        }
    }
}

impl Publisher for SocketPublisher {
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    fn publish(&self, request: &PublishRequest) -> Result<(), PublishError> {
        let bytes = Vec::<u8>::try_from(request)?;
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        write_frame(&mut *stream, &bytes)?;

        let mut ack = [0; 1];
        stream.read_exact(&mut ack)?;
        if ack[0] == ACCEPTED {
            Ok(())
        } else {
            Err(PublishError::Rejected(format!(
                "listener refused {} datums for {}",
                request.metric_data.len(),
                request.namespace
            )))
        }
    }
}

#[derive(Debug)]
pub struct SocketPublisherBuilder {
    socket_path: String,
    batch_size: usize,
}

impl Default for SocketPublisherBuilder {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET.into(),
            batch_size: MAX_DATUMS_PER_REQUEST,
        }
    }
}

impl SocketPublisherBuilder {
    /// Sets the path for the IPC socket file.
    #[must_use]
    pub fn socket(mut self, socket_path: &str) -> Self {
        self.socket_path = socket_path.to_string();
        self
    }

    /// Sets how many datums the listener accepts per request.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Connects to the IPC socket specified by `socket_path`.
    ///
    /// # Example
    /// ```no_run
    /// use metrics_buffer::{MetricBuffer, SocketPublisherBuilder};
    ///
    /// let publisher = SocketPublisherBuilder::default()
    ///     .socket("my_metrics.sock")
    ///     .connect()?;
    /// let buffer = MetricBuffer::new("MyApplication", publisher);
    /// # Ok::<(), metrics_buffer::MetricsError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the IPC connection cannot be established.
    pub fn connect(self) -> Result<SocketPublisher, MetricsError> {
        let socket_name = socket_name(&self.socket_path)?;
        let stream = Stream::connect(socket_name)?;
        Ok(SocketPublisher::new(stream, self.batch_size))
    }
}
