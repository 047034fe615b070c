//! Frame type combining header and payload.
//!
//! A `Frame` is the transport-layer packet: a 48-byte binary header followed
//! by the raw (already CBOR-encoded) payload bytes. It is a pure data holder;
//! for typed payloads see [`Payload::into_frame`](crate::Payload::into_frame)
//! and [`Payload::from_frame`](crate::Payload::from_frame).

use bytes::{BufMut, Bytes};

use crate::{
    FrameHeader,
    errors::{ProtocolError, Result},
};

/// Complete protocol frame.
///
/// Layout on the wire: `[FrameHeader: 48 bytes] + [payload: variable]`.
///
/// # Invariants
///
/// - `payload.len()` matches `header.payload_size()`. Enforced by
///   [`Frame::new`], verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`];
///   violations are rejected at encode and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (48 bytes).
    pub header: FrameHeader,

    /// Raw payload bytes (already CBOR-encoded).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame, setting the header's `payload_size` to match the
    /// actual payload length.
    #[must_use]
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();

        // Payload length always fits in u32: Bytes is bounded by isize::MAX
        // and the protocol limit is 1 MiB.
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        header.payload_size = payload_len.to_be_bytes();

        Self { header, payload }
    }

    /// Total encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode the frame into a buffer.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the 1 MiB
    ///   wire limit
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire bytes.
    ///
    /// Validates the header and that exactly `payload_size` bytes follow.
    /// Trailing bytes beyond the frame are ignored. Does NOT deserialize the
    /// payload.
    ///
    /// # Errors
    ///
    /// - Header validation errors from [`FrameHeader::from_bytes`]
    /// - [`ProtocolError::FrameTruncated`] if fewer payload bytes are present
    ///   than the header claims
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let payload_size = header.payload_size() as usize;
        let available = bytes.len() - FrameHeader::SIZE;

        if available < payload_size {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: available,
            });
        }

        let payload =
            Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..FrameHeader::SIZE + payload_size]);

        Ok(Self { header, payload })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::Opcode;

    #[test]
    fn encode_decode_roundtrip() {
        let mut header = FrameHeader::new(Opcode::SendMessage);
        header.set_conversation_id(7);
        header.set_correlation_id(99);
        let frame = Frame::new(header, vec![1u8, 2, 3, 4]);

        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), frame.encoded_len());

        let decoded = Frame::decode(&buf).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.header.correlation_id(), 99);
    }

    #[test]
    fn payload_size_set_on_construction() {
        let frame = Frame::new(FrameHeader::new(Opcode::Ping), vec![0u8; 17]);
        assert_eq!(frame.header.payload_size(), 17);
    }

    #[test]
    fn truncated_payload_rejected() {
        let frame = Frame::new(FrameHeader::new(Opcode::SendMessage), vec![1u8; 32]);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();

        let result = Frame::decode(&buf[..buf.len() - 8]);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTruncated { expected: 32, actual: 24 })
        ));
    }

    #[test]
    fn oversized_payload_rejected_at_encode() {
        let frame = Frame::new(
            FrameHeader::new(Opcode::SendMessage),
            vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1],
        );
        let mut buf = BytesMut::new();
        assert!(matches!(frame.encode(&mut buf), Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::Pong), Vec::<u8>::new());
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        buf.put_slice(b"junk");

        let decoded = Frame::decode(&buf).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
