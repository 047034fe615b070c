//! Frame header with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 48-byte structure serialized as raw binary
//! (Big Endian). Routing decisions (which conversation, which pending send)
//! need only the header, so the driver can dispatch frames without
//! deserializing payloads.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    ConversationId, Opcode, UserId,
    errors::{ProtocolError, Result},
};

/// Fixed 48-byte frame header (Big Endian network byte order).
///
/// Fields are stored as raw byte arrays to avoid alignment issues with the
/// packed layout. The `#[repr(C, packed)]` layout with zerocopy traits means
/// any 48-byte pattern can be cast safely; semantic validation (magic,
/// version, size limit) happens in [`FrameHeader::from_bytes`].
///
/// # Invariants
///
/// - `payload_size` MUST equal the length of the payload that follows.
///   Enforced by `Frame::new` and verified by `Frame::decode`.
/// - `correlation_id` is nonzero for `SendMessage`/`SendAck` frames; it is
///   the client-generated id that ties an optimistic send to its
///   acknowledgement and broadcast echo.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    // Protocol identification (8 bytes: 0-7)
    magic: [u8; 4],             // 0x50524C59 ("PRLY" in ASCII)
    version: u8,                // 0x01
    reserved: u8,               // must be zero
    pub(crate) opcode: [u8; 2], // u16 operation code

    // Payload metadata (8 bytes: 8-15)
    pub(crate) payload_size: [u8; 4], // u32 payload length
    reserved2: [u8; 4],               // must be zero

    // Correlation / routing context (32 bytes: 16-47)
    correlation_id: [u8; 8],   // u64 client-generated send correlation
    sender_id: [u8; 8],        // u64 sender identifier
    conversation_id: [u8; 16], // u128 conversation identifier
}

impl FrameHeader {
    /// Size of the serialized header (48 bytes).
    pub const SIZE: usize = 48;

    /// Magic number: "PRLY" in ASCII.
    pub const MAGIC: u32 = 0x5052_4C59;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB). Chat payloads are small; anything
    /// larger indicates a broken or malicious peer.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a new header with the specified opcode and all context fields
    /// zeroed.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            reserved: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            payload_size: [0; 4],
            reserved2: [0; 4],
            correlation_id: [0; 8],
            sender_id: [0; 8],
            conversation_id: [0; 16],
        }
    }

    /// Parse a header from network bytes (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::HeaderTooShort`] if the buffer holds fewer than 48
    ///   bytes
    /// - [`ProtocolError::InvalidMagic`] on magic mismatch
    /// - [`ProtocolError::UnsupportedVersion`] on version mismatch
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload size
    ///   exceeds [`Self::MAX_PAYLOAD_SIZE`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let (header, _rest) = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::HeaderTooShort { len: bytes.len(), need: Self::SIZE })?;

        let magic = u32::from_be_bytes(header.magic);
        if magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic { magic });
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let payload_size = header.payload_size();
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to its 48-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Raw opcode value.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Typed opcode. `None` for unknown values.
    #[must_use]
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Payload length claimed by this header.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Client-generated send correlation id. Zero when unset.
    #[must_use]
    pub fn correlation_id(&self) -> u64 {
        u64::from_be_bytes(self.correlation_id)
    }

    /// Set the send correlation id.
    pub fn set_correlation_id(&mut self, correlation_id: u64) {
        self.correlation_id = correlation_id.to_be_bytes();
    }

    /// Sender identifier. Zero when unset.
    #[must_use]
    pub fn sender_id(&self) -> UserId {
        u64::from_be_bytes(self.sender_id)
    }

    /// Set the sender identifier.
    pub fn set_sender_id(&mut self, sender_id: UserId) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Conversation identifier. Zero when unset.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        u128::from_be_bytes(self.conversation_id)
    }

    /// Set the conversation identifier.
    pub fn set_conversation_id(&mut self, conversation_id: ConversationId) {
        self.conversation_id = conversation_id.to_be_bytes();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_header_has_valid_magic_and_version() {
        let header = FrameHeader::new(Opcode::Ping);
        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.opcode_enum(), Some(Opcode::Ping));
        assert_eq!(parsed.payload_size(), 0);
        assert_eq!(parsed.correlation_id(), 0);
    }

    #[test]
    fn context_fields_roundtrip() {
        let mut header = FrameHeader::new(Opcode::SendMessage);
        header.set_correlation_id(0xDEAD_BEEF);
        header.set_sender_id(42);
        header.set_conversation_id(0x1234_5678_9ABC_DEF0_u128);

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.correlation_id(), 0xDEAD_BEEF);
        assert_eq!(parsed.sender_id(), 42);
        assert_eq!(parsed.conversation_id(), 0x1234_5678_9ABC_DEF0_u128);
    }

    #[test]
    fn short_buffer_rejected() {
        let result = FrameHeader::from_bytes(&[0u8; 10]);
        assert!(matches!(result, Err(ProtocolError::HeaderTooShort { len: 10, .. })));
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[0] = 0xFF;
        assert!(matches!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic { .. })));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
        bytes[4] = 0x7F;
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x7F))
        ));
    }

    #[test]
    fn oversized_payload_claim_rejected() {
        let mut header = FrameHeader::new(Opcode::SendMessage);
        header.payload_size = (FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes();
        let bytes = header.to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
