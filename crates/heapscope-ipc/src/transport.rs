//! Length-prefixed bincode frames over `std::io` streams.
//!
//! The two halves are independent so that a reader thread and a writer
//! thread can each own one.

use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};

use serde::{Serialize, de::DeserializeOwned};

use crate::{BUFFER_CAPACITY, LENGTH_PREFIX_SIZE, MAX_PAYLOAD_SIZE, TransportError, TransportResult};

/// Encode `msg` as a complete frame: length prefix followed by payload.
pub(crate) fn encode_frame<T: Serialize + ?Sized>(msg: &T) -> TransportResult<Vec<u8>> {
    let payload = bincode::serde::encode_to_vec(msg, bincode::config::standard())
        .map_err(|e| TransportError::serialization_failed(e.to_string()))?;

    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TransportError::message_too_large(
            payload.len(),
            MAX_PAYLOAD_SIZE,
        ));
    }
    let length = u32::try_from(payload.len())
        .map_err(|_| TransportError::message_too_large(payload.len(), MAX_PAYLOAD_SIZE))?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writing half.
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(BUFFER_CAPACITY, writer),
        }
    }

    /// Encode and write one frame, then flush.
    pub fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> TransportResult<()> {
        let frame = encode_frame(msg)?;
        self.writer
            .write_all(&frame)
            .map_err(|e| TransportError::write_failed(&e))?;
        self.writer
            .flush()
            .map_err(|e| TransportError::write_failed(&e))
    }
}

/// Reading half.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_CAPACITY, reader),
        }
    }

    /// Read and decode exactly one frame.
    ///
    /// A stream that ends on a frame boundary yields
    /// `UnexpectedEof { bytes_read: 0, .. }`.
    pub fn recv<T: DeserializeOwned>(&mut self) -> TransportResult<T> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.reader.read_exact(&mut prefix).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                TransportError::unexpected_eof(0, LENGTH_PREFIX_SIZE)
            } else {
                TransportError::read_failed(&e)
            }
        })?;

        let length = u32::from_be_bytes(prefix);
        let payload_length = length as usize;
        if payload_length == 0 {
            return Err(TransportError::invalid_length(0, "zero-length payload"));
        }
        if payload_length > MAX_PAYLOAD_SIZE {
            return Err(TransportError::invalid_length(
                length,
                format!("exceeds maximum of {MAX_PAYLOAD_SIZE} bytes"),
            ));
        }

        let mut payload = vec![0u8; payload_length];
        self.reader.read_exact(&mut payload).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                TransportError::unexpected_eof(
                    LENGTH_PREFIX_SIZE,
                    LENGTH_PREFIX_SIZE + payload_length,
                )
            } else {
                TransportError::read_failed(&e)
            }
        })?;

        bincode::serde::decode_from_slice(&payload, bincode::config::standard())
            .map(|(value, _)| value)
            .map_err(|e| TransportError::deserialization_failed(e.to_string(), payload_length))
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffered_bytes(&self) -> usize {
        self.reader.buffer().len()
    }
}

/// Both halves over one reader/writer pair.
///
/// # Example
/// ```rust
/// use heapscope_ipc::IpcTransport;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut wire = Vec::new();
/// IpcTransport::new(std::io::empty(), &mut wire).send(&"hello".to_string())?;
/// let back: String = IpcTransport::new(wire.as_slice(), std::io::sink()).recv()?;
/// assert_eq!(back, "hello");
/// # Ok(())
/// # }
/// ```
pub struct IpcTransport<R, W: Write> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R: Read, W: Write> IpcTransport<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    pub fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> TransportResult<()> {
        self.writer.send(msg)
    }

    pub fn recv<T: DeserializeOwned>(&mut self) -> TransportResult<T> {
        self.reader.recv()
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{Payload, WorkerReply, WorkerRequest};

    fn wire_of<T: Serialize>(messages: &[T]) -> Vec<u8> {
        let mut wire = Vec::new();
        let mut writer = FrameWriter::new(&mut wire);
        for msg in messages {
            writer.send(msg).unwrap();
        }
        drop(writer);
        wire
    }

    #[test]
    fn test_frames_are_read_in_order() {
        let requests = vec![
            WorkerRequest::create(1, 1, "HeapSnapshotLoader"),
            WorkerRequest::method(2, 1, "close", Payload::unit()),
            WorkerRequest::dispose(3, 1),
        ];
        let wire = wire_of(&requests);

        let mut reader = FrameReader::new(wire.as_slice());
        for expected in &requests {
            let received: WorkerRequest = reader.recv().unwrap();
            assert_eq!(&received, expected);
        }
        let end = reader.recv::<WorkerRequest>();
        assert!(end.unwrap_err().is_clean_close());
    }

    #[test]
    fn test_length_prefix_is_big_endian() {
        let wire = wire_of(&[WorkerReply::Result {
            call_id: 9,
            result: None,
        }]);
        let length = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;
        assert_eq!(length, wire.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_zero_length_frame_rejected() {
        let wire = 0u32.to_be_bytes();
        let mut reader = FrameReader::new(wire.as_slice());
        let result = reader.recv::<WorkerReply>();
        assert!(matches!(result, Err(TransportError::InvalidLength { length: 0, .. })));
    }

    #[test]
    fn test_oversized_length_prefix_rejected() {
        let wire = u32::MAX.to_be_bytes();
        let mut reader = FrameReader::new(wire.as_slice());
        let result = reader.recv::<WorkerReply>();
        assert!(matches!(result, Err(TransportError::InvalidLength { .. })));
    }

    #[test]
    fn test_truncated_payload_reports_eof() {
        let mut wire = wire_of(&["a fairly long string".to_string()]);
        wire.truncate(wire.len() - 3);
        let mut reader = FrameReader::new(wire.as_slice());
        let result = reader.recv::<String>();
        assert!(matches!(
            result,
            Err(TransportError::UnexpectedEof { bytes_read: 4, .. })
        ));
    }

    #[test]
    fn test_oversized_message_not_written() {
        let mut wire = Vec::new();
        let mut writer = FrameWriter::new(&mut wire);
        let result = writer.send(&"x".repeat(MAX_PAYLOAD_SIZE + 1));
        assert!(matches!(result, Err(TransportError::MessageTooLarge { .. })));
        drop(writer);
        assert!(wire.is_empty());
    }
}
