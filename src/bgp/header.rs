//! The fixed 19-octet BGP message header (RFC 4271 §4.1).

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::error::FramingError;
use bytes::{BufMut, BytesMut};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

/// Marker octets present on every BGP message. No authentication scheme is
/// negotiated by this speaker, so the marker is always all-ones.
pub const MARKER: [u8; 16] = [0xFF; 16];

/// Smallest legal `length` field value: the header alone.
pub const MIN_MESSAGE_LENGTH: u16 = 19;
/// Largest legal `length` field value (RFC 4271 §4.1).
pub const MAX_MESSAGE_LENGTH: u16 = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
}

impl MessageType {
    /// Minimum total message length (header included) for this type.
    #[must_use]
    pub const fn min_length(self) -> u16 {
        match self {
            Self::Open => 29,
            Self::Update => 23,
            Self::Notification => 21,
            Self::Keepalive => 19,
        }
    }
}

/// A validated, but not yet body-decoded, message header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub length: u16,
    pub msg_type: MessageType,
}

/// Inspect the first 19 octets of `buf`, if present, and validate them.
///
/// Returns `Ok(None)` if fewer than 19 octets are available yet (the
/// caller should buffer more before calling again). Does not consume
/// `buf`; the caller decides when to advance past the header.
pub fn peek_header(buf: &[u8]) -> Result<Option<Header>, FramingError> {
    if buf.len() < MIN_MESSAGE_LENGTH as usize {
        return Ok(None);
    }
    if buf[..16] != MARKER {
        return Err(FramingError::ConnectionNotSynchronized);
    }
    let length = u16::from_be_bytes([buf[16], buf[17]]);
    if !(MIN_MESSAGE_LENGTH..=MAX_MESSAGE_LENGTH).contains(&length) {
        return Err(FramingError::BadMessageLength(length));
    }
    let msg_type =
        MessageType::from_u8(buf[18]).ok_or(FramingError::BadMessageType(buf[18]))?;
    if length < msg_type.min_length() {
        return Err(FramingError::BadMessageLength(length));
    }
    Ok(Some(Header { length, msg_type }))
}

/// Write the header for a message of the given type and total length.
pub fn write_header(dst: &mut BytesMut, msg_type: MessageType, length: u16) {
    dst.put_slice(&MARKER);
    dst.put_u16(length);
    dst.put_u8(msg_type as u8);
}
