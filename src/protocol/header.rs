//! LLRP message header framing
//!
//! Handles the fixed 10-byte header every LLRP message starts with.
//! The on-the-wire length field counts the header itself; in memory we
//! track only the payload length, so encode adds the 10 bytes back and
//! decode subtracts them.

use thiserror::Error;

use super::{is_reserved_type, MessageKind, MAX_MESSAGE_TYPE, MIN_MESSAGE_TYPE};

/// Size of an LLRP message header in bytes.
pub const HEADER_SIZE: usize = 10;

/// Largest payload an LLRP message can carry (the length field is a u32
/// that includes the header).
pub const MAX_PAYLOAD_SIZE: u32 = u32::MAX - HEADER_SIZE as u32;

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("not enough data for a message header: {got} < {HEADER_SIZE}")]
    ShortHeader { got: usize },

    #[error("message length is smaller than the header minimum: {wire_len} < {HEADER_SIZE}")]
    LengthUnderflow { wire_len: u32 },

    #[error("message type {typ} is reserved")]
    ReservedType { typ: u16 },

    #[error("message type {typ} is outside the legal range {MIN_MESSAGE_TYPE}..={MAX_MESSAGE_TYPE}")]
    OversizeType { typ: u16 },

    #[error("payload length {len} exceeds the LLRP maximum {MAX_PAYLOAD_SIZE}")]
    OversizePayload { len: u64 },

    #[error("payload ended after {got} of {expected} bytes")]
    PayloadReadShort { expected: u32, got: u32 },

    #[error("parameter truncated: need {need} bytes, have {have}")]
    TruncatedParameter { need: usize, have: usize },

    #[error("TV-encoded parameter {typ} where a TLV parameter was expected")]
    UnexpectedTvParameter { typ: u8 },

    #[error("required parameter {typ} missing from payload")]
    MissingParameter { typ: u16 },

    #[error("response message type {got} does not match the request's expected response type {expected}")]
    ResponseTypeMismatch { expected: u16, got: u16 },

    #[error("message type {typ} has no registered response pairing")]
    UnknownRequestType { typ: u16 },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// An LLRP message header.
///
/// `message_type` is kept raw so callers can observe (and log) codes the
/// catalog rejects, such as the reserved band a misbehaving peer might use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version, 3 bits on the wire.
    pub version: u8,
    /// Message type code, 10 bits on the wire.
    pub message_type: u16,
    /// Payload length, excluding this header.
    pub payload_len: u32,
    /// Correlation id echoed by the reader in responses.
    pub message_id: u32,
}

impl Header {
    /// Encodes the header, validating the type and payload length.
    pub fn encode(&self) -> CodecResult<[u8; HEADER_SIZE]> {
        validate_header(self.message_type, self.payload_len)?;

        let mut buf = [0u8; HEADER_SIZE];
        let ver_type = (u16::from(self.version & 0b111) << 10) | (self.message_type & 0x3FF);
        buf[0..2].copy_from_slice(&ver_type.to_be_bytes());
        buf[2..6].copy_from_slice(&(self.payload_len + HEADER_SIZE as u32).to_be_bytes());
        buf[6..10].copy_from_slice(&self.message_id.to_be_bytes());
        Ok(buf)
    }

    /// Decodes a header from the start of `buf`.
    ///
    /// Reserved type codes are deliberately NOT rejected here so the
    /// receive path can observe and log what a malformed peer sent.
    pub fn decode(buf: &[u8]) -> CodecResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CodecError::ShortHeader { got: buf.len() });
        }

        let version = (buf[0] >> 2) & 0b111;
        let message_type = u16::from_be_bytes([buf[0], buf[1]]) & 0x3FF;
        let wire_len = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let message_id = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);

        if wire_len < HEADER_SIZE as u32 {
            return Err(CodecError::LengthUnderflow { wire_len });
        }

        Ok(Self {
            version,
            message_type,
            payload_len: wire_len - HEADER_SIZE as u32,
            message_id,
        })
    }

    /// The catalog entry for this header's type code, if it has one.
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_u16(self.message_type)
    }
}

/// Returns an error if the parameters aren't valid for an LLRP header.
pub fn validate_header(message_type: u16, payload_len: u32) -> CodecResult<()> {
    if message_type < MIN_MESSAGE_TYPE || message_type > MAX_MESSAGE_TYPE {
        return Err(CodecError::OversizeType { typ: message_type });
    }
    if is_reserved_type(message_type) {
        return Err(CodecError::ReservedType { typ: message_type });
    }
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(CodecError::OversizePayload {
            len: u64::from(payload_len),
        });
    }
    Ok(())
}
