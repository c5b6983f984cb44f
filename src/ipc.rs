//! Shipping publish requests to a local agent over an IPC socket.
//!
//! Each request travels as one frame: a 4-byte big-endian length followed by the MessagePack
//! encoding of the [`PublishRequest`](crate::PublishRequest). The receiving side answers every
//! frame with a single byte, `1` when the request was accepted and `0` when it was not.

mod listener;
mod publisher;

pub use listener::IngestListener;
pub use publisher::{SocketPublisher, SocketPublisherBuilder};

use interprocess::local_socket::{GenericFilePath, GenericNamespaced, Name, prelude::*};
use std::io::{self, Read, Write};

pub(crate) const DEFAULT_SOCKET: &str = "metrics_buffer.sock";
const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;
const ACCEPTED: u8 = 1;
const REJECTED: u8 = 0;

fn socket_name(socket_path: &str) -> io::Result<Name<'_>> {
    if GenericNamespaced::is_supported() {
        socket_path.to_ns_name::<GenericNamespaced>()
    } else {
        format!("/tmp/{socket_path}").to_fs_name::<GenericFilePath>()
    }
}

fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Reads one frame into `frame`. Returns `false` when the peer closed the connection cleanly,
/// i.e. before sending the first byte of a frame.
fn read_frame(reader: &mut impl Read, frame: &mut Vec<u8>) -> io::Result<bool> {
    let mut len = [0; 4];
    let mut filled = 0;
    while filled < len.len() {
        match reader.read(&mut len[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("connection closed after {filled} bytes of a frame header"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_LEN}"),
        ));
    }
    frame.resize(len, 0);
    reader.read_exact(frame)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frames_are_length_prefixed() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"abc").unwrap();
        write_frame(&mut wire, b"").unwrap();
        assert_eq!(&wire[..4], &3u32.to_be_bytes());

        let mut reader = Cursor::new(wire);
        let mut frame = Vec::new();
        assert!(read_frame(&mut reader, &mut frame).unwrap());
        assert_eq!(frame, b"abc");
        assert!(read_frame(&mut reader, &mut frame).unwrap());
        assert!(frame.is_empty());
        assert!(!read_frame(&mut reader, &mut frame).unwrap());
    }

    #[test]
    fn truncated_header_is_not_a_clean_close() {
        let mut frame = Vec::new();
        let err = read_frame(&mut Cursor::new(vec![0u8, 0]), &mut frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut wire = 8u32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        let mut frame = Vec::new();
        let err = read_frame(&mut Cursor::new(wire), &mut frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_frames_are_refused() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut frame = Vec::new();
        let err = read_frame(&mut Cursor::new(wire), &mut frame).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
