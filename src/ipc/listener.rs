use super::{ACCEPTED, DEFAULT_SOCKET, REJECTED, read_frame, socket_name};
use crate::{datum::PublishRequest, error::MetricsError};
use interprocess::local_socket::{Listener, ListenerOptions, Stream, prelude::*};
use std::{
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
    thread,
};

/// The receiving end of a [`SocketPublisher`](super::SocketPublisher), typically run by an
/// agent that forwards requests to the real ingestion service.
pub struct IngestListener {
    listener: Listener,
}

impl IngestListener {
    /// Binds the listener on the default socket name.
    ///
    /// # Errors
    /// See [`IngestListener::bind`].
    pub fn bind_default() -> Result<Self, MetricsError> {
        Self::bind(DEFAULT_SOCKET)
    }

    /// Binds the listener on `socket_path`.
    /// If the socket file already exists, it will be removed first.
    ///
    /// # Errors
    /// This function will return an error if it fails to create the socket.
    pub fn bind(socket_path: &str) -> Result<Self, MetricsError> {
        let socket_file: PathBuf = format!("/tmp/{socket_path}").into();
        if socket_file.exists() {
            std::fs::remove_file(&socket_file)?;
        }

        let socket_name = socket_name(socket_path)?;
        let listener = ListenerOptions::new().name(socket_name).create_sync()?;
        Ok(Self { listener })
    }

    /// Accepts publishers until the process exits, blocking the calling thread.
    ///
    /// Each connection is served on its own thread. `handler` is called once per request and
    /// its answer is sent back as the acknowledgement; requests that cannot be decoded are
    /// refused without reaching it.
    ///
    /// # Example
    /// ```no_run
    /// use metrics_buffer::IngestListener;
    ///
    /// let listener = IngestListener::bind("my_metrics.sock")?;
    /// listener.serve(|request| {
    ///     println!("{} datums for {}", request.metric_data.len(), request.namespace);
    ///     true
    /// });
    /// # Ok::<(), metrics_buffer::MetricsError>(())
    /// ```
    pub fn serve<H>(self, handler: H)
    where
        H: Fn(PublishRequest) -> bool + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for stream in self.listener.incoming().filter_map(filter_streams) {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                if let Err(e) = handle_connection(stream, handler.as_ref()) {
                    log::error!("Metrics publisher connection error: {e}");
                }
            });
        }
    }
}

fn filter_streams(conn: io::Result<Stream>) -> Option<Stream> {
    match conn {
        Ok(c) => Some(c),
        Err(e) => {
            log::warn!("Failed to accept connection: {e}");
            None
        }
    }
}

fn handle_connection<H>(mut stream: Stream, handler: &H) -> io::Result<()>
where
    H: Fn(PublishRequest) -> bool,
{
    let mut frame = Vec::new();
    while read_frame(&mut stream, &mut frame)? {
        let accepted = match PublishRequest::try_from(frame.as_slice()) {
            Ok(request) => handler(request),
            Err(e) => {
                log::warn!("Failed to decode publish request: {e}");
                false
            }
        };
        stream.write_all(&[if accepted { ACCEPTED } else { REJECTED }])?;
        stream.flush()?;
    }
    log::debug!("Metrics publisher disconnected");
    Ok(())
}
