//! Binary message framing.
//!
//! Every frame on the wire is a fixed 8-byte header followed by the payload:
//!
//! ```text
//! [4 bytes: sequence][4 bytes: length][length bytes: payload]
//! ```
//!
//! Both header fields are big-endian. There is no magic number, version
//! field, or checksum.
//!
//! The buffer functions (`decode`, `decode_frame`, `decode_all`) are pure and
//! expect complete, aligned frames. `read_frame` pulls a single frame off an
//! async stream for code that consumes the wire format from a socket.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the frame header (sequence + length).
pub const HEADER_LEN: usize = 8;

/// Largest payload `read_frame` accepts from a stream.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// A single framed application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sequence: u32,
    payload: Bytes,
}

impl Message {
    /// Create a message. The length field is always derived from `payload`.
    pub fn new(sequence: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of bytes this message occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Encode into a freshly allocated buffer.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the encoded frame to `dst`.
    ///
    /// Nothing is written if the payload does not fit the length field.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let length = u32::try_from(self.payload.len()).map_err(|_| EncodeError::PayloadTooLarge {
            len: self.payload.len(),
        })?;

        dst.reserve(self.encoded_len());
        dst.put_u32(self.sequence);
        dst.put_u32(length);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

/// Encoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Payload longer than the 32-bit length field can describe.
    PayloadTooLarge { len: usize },
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::PayloadTooLarge { len } => {
                write!(f, "Payload of {} bytes exceeds the frame length limit", len)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Decoding errors. Every variant means the input was truncated or corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than `HEADER_LEN` bytes available.
    ShortHeader { available: usize },
    /// The header announced more payload than the buffer holds.
    ShortPayload { expected: u32, available: usize },
    /// The header announced a payload above the reader's limit.
    PayloadTooLarge { length: u32, max: usize },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ShortHeader { available } => write!(
                f,
                "Truncated frame header: need {} bytes, have {}",
                HEADER_LEN, available
            ),
            DecodeError::ShortPayload {
                expected,
                available,
            } => write!(
                f,
                "Truncated frame payload: need {} bytes, have {}",
                expected, available
            ),
            DecodeError::PayloadTooLarge { length, max } => write!(
                f,
                "Frame payload of {} bytes exceeds limit of {}",
                length, max
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode the first frame in `input`. Trailing bytes are ignored.
pub fn decode(input: &[u8]) -> Result<Message, DecodeError> {
    decode_frame(input).map(|(message, _)| message)
}

/// Decode the first frame in `input`, returning it with the number of bytes
/// it occupied.
pub fn decode_frame(input: &[u8]) -> Result<(Message, usize), DecodeError> {
    if input.len() < HEADER_LEN {
        return Err(DecodeError::ShortHeader {
            available: input.len(),
        });
    }

    let mut header = &input[..HEADER_LEN];
    let sequence = header.get_u32();
    let length = header.get_u32();

    let body = &input[HEADER_LEN..];
    if body.len() < length as usize {
        return Err(DecodeError::ShortPayload {
            expected: length,
            available: body.len(),
        });
    }

    let payload = Bytes::copy_from_slice(&body[..length as usize]);
    Ok((
        Message { sequence, payload },
        HEADER_LEN + length as usize,
    ))
}

/// Decode every frame in `input`.
///
/// The buffer must hold only complete frames. The first malformed frame
/// aborts the scan and its error is returned; frames decoded before it are
/// discarded.
pub fn decode_all(input: &[u8]) -> Result<Vec<Message>, DecodeError> {
    let mut messages = Vec::new();
    let mut cursor = input;

    while !cursor.is_empty() {
        let (message, consumed) = decode_frame(cursor)?;
        messages.push(message);
        cursor = &cursor[consumed..];
    }

    Ok(messages)
}

/// Read exactly one frame from `reader`, accepting payloads up to
/// `MAX_PAYLOAD_LEN`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    read_frame_limited(reader, MAX_PAYLOAD_LEN).await
}

/// Read exactly one frame from `reader`.
///
/// Returns `Ok(None)` on a clean EOF before any header byte, and an
/// `UnexpectedEof` error when the stream ends inside a frame. A header
/// announcing more than `max_payload` bytes fails with `InvalidData` before
/// any payload is buffered.
pub async fn read_frame_limited<R>(
    reader: &mut R,
    max_payload: usize,
) -> io::Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                DecodeError::ShortHeader { available: filled },
            ));
        }
        filled += n;
    }

    let mut cursor = &header[..];
    let sequence = cursor.get_u32();
    let length = cursor.get_u32();

    if length as usize > max_payload {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            DecodeError::PayloadTooLarge {
                length,
                max: max_payload,
            },
        ));
    }

    let mut payload = BytesMut::zeroed(length as usize);
    reader.read_exact(&mut payload).await?;

    Ok(Some(Message {
        sequence,
        payload: payload.freeze(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let msg = Message::new(0x0102_0304, "hi");
        let encoded = msg.encode().unwrap();
        assert_eq!(&encoded[..], &[1, 2, 3, 4, 0, 0, 0, 2, b'h', b'i']);
        assert_eq!(encoded.len(), msg.encoded_len());
    }

    #[test]
    fn test_round_trip() {
        let cases: [(u32, &[u8]); 4] = [
            (0, b""),
            (1, b"welcome"),
            (u32::MAX, b"\x00\xff\x00binary"),
            (42, &[7u8; 4096]),
        ];

        for (sequence, payload) in cases {
            let msg = Message::new(sequence, Bytes::copy_from_slice(payload));
            let decoded = decode(&msg.encode().unwrap()).unwrap();
            assert_eq!(decoded, msg);
            assert_eq!(decoded.len(), payload.len());
        }
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut buf = BytesMut::new();
        Message::new(5, "first").encode_into(&mut buf).unwrap();
        buf.extend_from_slice(b"garbage");

        let (msg, consumed) = decode_frame(&buf).unwrap();
        assert_eq!(msg.sequence(), 5);
        assert_eq!(msg.payload().as_ref(), b"first");
        assert_eq!(consumed, HEADER_LEN + 5);
    }

    #[test]
    fn test_decode_short_header() {
        match decode(&[0, 0, 0, 1, 0, 0, 0]) {
            Err(DecodeError::ShortHeader { available }) => assert_eq!(available, 7),
            other => panic!("unexpected: {:?}", other),
        }

        assert_eq!(
            decode(&[]),
            Err(DecodeError::ShortHeader { available: 0 })
        );
    }

    #[test]
    fn test_decode_short_payload() {
        let encoded = Message::new(9, "truncated").encode().unwrap();
        match decode(&encoded[..encoded.len() - 1]) {
            Err(DecodeError::ShortPayload {
                expected,
                available,
            }) => {
                assert_eq!(expected, 9);
                assert_eq!(available, 8);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_all_empty() {
        assert_eq!(decode_all(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn test_decode_all_in_order() {
        let messages: Vec<Message> = (0..16)
            .map(|i| Message::new(i, format!("payload-{i}")))
            .collect();

        let mut buf = BytesMut::new();
        for msg in &messages {
            msg.encode_into(&mut buf).unwrap();
        }

        assert_eq!(decode_all(&buf).unwrap(), messages);
    }

    #[test]
    fn test_decode_all_aborts_on_bad_frame() {
        let mut buf = BytesMut::new();
        Message::new(1, "ok").encode_into(&mut buf).unwrap();
        Message::new(2, "also ok").encode_into(&mut buf).unwrap();
        // Header claims 100 bytes, only 3 follow
        buf.put_u32(3);
        buf.put_u32(100);
        buf.put_slice(b"abc");

        assert_eq!(
            decode_all(&buf),
            Err(DecodeError::ShortPayload {
                expected: 100,
                available: 3
            })
        );
    }

    #[test]
    fn test_decode_all_trailing_partial_header() {
        let mut buf = BytesMut::new();
        Message::new(1, "ok").encode_into(&mut buf).unwrap();
        buf.put_slice(&[0, 0]);

        assert_eq!(
            decode_all(&buf),
            Err(DecodeError::ShortHeader { available: 2 })
        );
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let first = Message::new(0, "welcome").encode().unwrap();
        let second = Message::new(1, "").encode().unwrap();

        // Split the first frame across reads to exercise partial headers
        let mut reader = tokio_test::io::Builder::new()
            .read(&first[..3])
            .read(&first[3..10])
            .read(&first[10..])
            .read(&second)
            .build();

        let msg = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(msg, Message::new(0, "welcome"));

        let msg = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(msg.sequence(), 1);
        assert!(msg.is_empty());

        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_eof_inside_frame() {
        let encoded = Message::new(3, "cut short").encode().unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&encoded[..HEADER_LEN + 2])
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_header() {
        let mut header = BytesMut::new();
        header.put_u32(1);
        header.put_u32(u32::MAX);
        let mut reader = tokio_test::io::Builder::new().read(&header).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let inner = err.get_ref().and_then(|e| e.downcast_ref::<DecodeError>());
        assert_eq!(
            inner,
            Some(&DecodeError::PayloadTooLarge {
                length: u32::MAX,
                max: MAX_PAYLOAD_LEN
            })
        );
    }

    #[tokio::test]
    async fn test_read_frame_limited_boundary() {
        let at_limit = Message::new(1, "1234").encode().unwrap();
        let over_limit = Message::new(2, "12345").encode().unwrap();
        let mut reader = tokio_test::io::Builder::new()
            .read(&at_limit)
            .read(&over_limit[..HEADER_LEN])
            .build();

        let msg = read_frame_limited(&mut reader, 4).await.unwrap().unwrap();
        assert_eq!(msg, Message::new(1, "1234"));

        let err = read_frame_limited(&mut reader, 4).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
