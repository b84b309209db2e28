//! BGP-4 message types and their wire codec (RFC 4271).
//!
//! Structs here represent the *decoded* value, not the on-wire layout —
//! see [`component`], [`header`], [`route`] and [`path_attr`] for the
//! byte-level rules. [`Message::decode`]/[`Message::encode`] are the two
//! functions that cross the boundary; everything else in this module is
//! data.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod component;
pub mod framer;
pub mod header;
pub mod path_attr;
pub mod route;
#[cfg(test)]
pub(crate) mod tests_support;

use crate::error::{CodecError, OpenValidationError, UpdateValidationError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use component::TryGet;
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use path_attr::PathAttributes;
use route::Routes;
use std::net::Ipv4Addr;

pub use framer::Framer;
pub use header::{MessageType, MARKER, MAX_MESSAGE_LENGTH, MIN_MESSAGE_LENGTH};

/// The only BGP version this speaker implements (RFC 4271 base, no
/// four-octet-ASN negotiation, no MP-BGP).
pub const BGP_VERSION: u8 = 4;

/// A fully decoded BGP message (header stripped, body typed).
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Open(Open),
    Update(Update),
    Notification(Notification),
    Keepalive,
}

impl Message {
    /// Decode a single complete frame (the exact `header.length` octets a
    /// [`Framer`] handed back, header included).
    pub fn decode(mut frame: Bytes) -> Result<Self, CodecError> {
        let header = header::peek_header(&frame)
            .map_err(CodecError::Framing)?
            .ok_or(CodecError::NeedMore)?;
        frame.advance(19);
        let body_len = (header.length - 19) as usize;
        if frame.remaining() != body_len {
            // The Framer only ever hands us exactly `length` octets; a
            // mismatch here means the caller passed something else.
            return Err(CodecError::Framing(crate::error::FramingError::BadMessageLength(header.length)));
        }
        let msg = match header.msg_type {
            MessageType::Keepalive => Self::Keepalive,
            MessageType::Open => Self::Open(Open::decode(&mut frame)?),
            MessageType::Update => Self::Update(Update::decode(&mut frame)?),
            MessageType::Notification => Self::Notification(Notification::decode(&mut frame)?),
        };
        Ok(msg)
    }

    /// Encode this message, header included. The returned buffer's length
    /// equals the header's declared `length`.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut body = BytesMut::new();
        let msg_type = match self {
            Self::Open(open) => {
                open.encode(&mut body);
                MessageType::Open
            }
            Self::Update(update) => {
                update.encode(&mut body);
                MessageType::Update
            }
            Self::Notification(notif) => {
                notif.encode(&mut body);
                MessageType::Notification
            }
            Self::Keepalive => MessageType::Keepalive,
        };
        let length = u16::try_from(19 + body.len()).expect("BGP message too large to encode");
        let mut dst = BytesMut::with_capacity(length as usize);
        header::write_header(&mut dst, msg_type, length);
        dst.unsplit(body);
        dst
    }
}

/// BGP OPEN message body (RFC 4271 §4.2).
///
/// Decoding is purely structural: the version/hold-time/identifier/peer-AS
/// checks RFC 4271 calls out are semantic (they depend on *this peer's*
/// configuration) and live in [`crate::fsm`]'s `OpenSent` transition, not
/// here. The only decode-time rejection is a non-empty optional-parameter
/// list, since this speaker never parses capabilities (see SPEC_FULL.md's
/// Open Question on optional parameters).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Open {
    pub version: u8,
    pub my_as: u16,
    pub hold_time: u16,
    pub bgp_identifier: Ipv4Addr,
}

impl Open {
    #[must_use]
    pub const fn new(my_as: u16, hold_time: u16, bgp_identifier: Ipv4Addr) -> Self {
        Self {
            version: BGP_VERSION,
            my_as,
            hold_time,
            bgp_identifier,
        }
    }

    fn decode(src: &mut Bytes) -> Result<Self, CodecError> {
        let version = src
            .try_u8()
            .ok_or(OpenValidationError::UnsupportedVersionNumber(0))?;
        let my_as = src
            .try_u16()
            .ok_or(OpenValidationError::UnsupportedVersionNumber(version))?;
        let hold_time = src
            .try_u16()
            .ok_or(OpenValidationError::UnacceptableHoldTime(0))?;
        let bgp_identifier = Ipv4Addr::from(
            src.try_u32()
                .ok_or(OpenValidationError::BadBgpIdentifier)?,
        );
        let opt_param_len = src
            .try_u8()
            .ok_or(OpenValidationError::UnsupportedOptionalParameter)? as usize;
        if opt_param_len > 0 {
            // Parse the length, but this speaker recognizes no optional
            // parameters: any non-empty list is rejected outright rather
            // than parsed-and-ignored (see SPEC_FULL.md §3/Open Question).
            src.try_split_to(opt_param_len)
                .ok_or(OpenValidationError::UnsupportedOptionalParameter)?;
            return Err(CodecError::OpenValidation(
                OpenValidationError::UnsupportedOptionalParameter,
            ));
        }
        Ok(Self {
            version,
            my_as,
            hold_time,
            bgp_identifier,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u16(self.my_as);
        dst.put_u16(self.hold_time);
        dst.put_u32(self.bgp_identifier.into());
        dst.put_u8(0); // opt_param_len: this speaker never emits capabilities.
    }
}

/// BGP UPDATE message body (RFC 4271 §4.3).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub withdrawn_routes: Routes,
    pub path_attributes: PathAttributes,
    pub nlri: Routes,
}

impl Update {
    fn decode(src: &mut Bytes) -> Result<Self, CodecError> {
        let withdrawn_len = src
            .try_u16()
            .ok_or(UpdateValidationError::MalformedAttributeList)? as usize;
        let mut withdrawn_buf = src
            .try_split_to(withdrawn_len)
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        let withdrawn_routes = Routes::decode_segment(&mut withdrawn_buf)?;

        let path_attr_len = src
            .try_u16()
            .ok_or(UpdateValidationError::MalformedAttributeList)? as usize;
        let mut path_attr_buf = src
            .try_split_to(path_attr_len)
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        let path_attributes = PathAttributes::decode_segment(&mut path_attr_buf)?;

        // Whatever remains of the already header-scoped body is NLRI; the
        // withdrawn/path-attribute splits above guarantee the three
        // segment lengths sum exactly to the body length.
        let nlri = Routes::decode_segment(src)?;

        Ok(Self {
            withdrawn_routes,
            path_attributes,
            nlri,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        let withdrawn_len =
            u16::try_from(self.withdrawn_routes.encoded_len()).expect("withdrawn routes too long");
        dst.put_u16(withdrawn_len);
        self.withdrawn_routes.to_bytes(dst);
        let path_attr_len =
            u16::try_from(self.path_attributes.encoded_len()).expect("path attributes too long");
        dst.put_u16(path_attr_len);
        self.path_attributes.to_bytes(dst);
        self.nlri.to_bytes(dst);
    }
}

/// BGP NOTIFICATION message body (RFC 4271 §4.5, §6).
///
/// `error_code`/`error_subcode` are kept as raw octets rather than a closed
/// enum: a code outside {1..6}, or a subcode this implementation does not
/// name, must still be representable on decode (it closes the session all
/// the same) rather than rejected or coerced. [`NotificationErrorCode`] is
/// the enum used when *this* speaker constructs a NOTIFICATION to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub error_code: u8,
    pub error_subcode: u8,
    pub data: Bytes,
}

impl Notification {
    #[must_use]
    pub fn new(error_code: NotificationErrorCode, error_subcode: u8, data: Bytes) -> Self {
        Self {
            error_code: error_code as u8,
            error_subcode,
            data,
        }
    }

    /// The error code as a known [`NotificationErrorCode`], if recognized.
    #[must_use]
    pub fn known_error_code(&self) -> Option<NotificationErrorCode> {
        NotificationErrorCode::from_u8(self.error_code)
    }

    fn decode(src: &mut Bytes) -> Result<Self, CodecError> {
        // The header's min-length check for NOTIFICATION (21 octets total)
        // guarantees at least these 2 octets are present.
        let error_code = src.get_u8();
        let error_subcode = src.get_u8();
        let data = src.copy_to_bytes(src.remaining());
        Ok(Self {
            error_code,
            error_subcode,
            data,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.error_code);
        dst.put_u8(self.error_subcode);
        dst.put_slice(&self.data);
    }
}

/// RFC 4271 §6 NOTIFICATION error codes this speaker knows how to emit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum NotificationErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
}

/// RFC 4271 §6.1 subcodes for [`NotificationErrorCode::MessageHeaderError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageHeaderErrorSubcode {
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

/// RFC 4271 §6.2 subcodes for [`NotificationErrorCode::OpenMessageError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OpenMessageErrorSubcode {
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    UnacceptableHoldTime = 6,
}

/// RFC 4271 §6.3 subcodes for [`NotificationErrorCode::UpdateMessageError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum UpdateMessageErrorSubcode {
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    AsRoutingLoop = 7,
    InvalidNextHopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}

/// RFC 4271 §6.7 subcodes for [`NotificationErrorCode::Cease`] (RFC 4486).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum CeaseSubcode {
    MaximumNumberOfPrefixesReached = 1,
    AdministrativeShutdown = 2,
    PeerDeconfigured = 3,
    AdministrativeReset = 4,
    ConnectionRejected = 5,
    OtherConfigurationChange = 6,
    ConnectionCollisionResolution = 7,
    OutOfResources = 8,
}

#[cfg(feature = "tokio-endec")]
mod tokio_codec {
    use super::{header, Message};
    use crate::error::CodecError;
    use tokio_util::codec::{Decoder, Encoder};

    /// [`tokio_util::codec::Decoder`]/[`Encoder`] pair over [`Message`],
    /// for use with `tokio_util::codec::Framed` directly on a stream. The
    /// pure [`crate::bgp::Framer`] does the same reassembly without a
    /// tokio dependency, for use where that framework isn't wanted.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct BgpCodec;

    /// `Decoder::Error` must implement `From<io::Error>`, which `CodecError`
    /// deliberately does not (it is a pure protocol-error enum shared with
    /// the non-tokio [`crate::bgp::Framer`] path). This wraps the two.
    #[derive(Debug, thiserror::Error)]
    pub enum BgpCodecError {
        #[error(transparent)]
        Io(#[from] std::io::Error),
        #[error(transparent)]
        Codec(#[from] CodecError),
    }

    impl Decoder for BgpCodec {
        type Item = Message;
        type Error = BgpCodecError;

        fn decode(&mut self, src: &mut bytes::BytesMut) -> Result<Option<Message>, BgpCodecError> {
            let Some(header) = header::peek_header(src.as_ref())
                .map_err(|e| BgpCodecError::Codec(e.into()))?
            else {
                return Ok(None);
            };
            if src.len() < header.length as usize {
                return Ok(None);
            }
            let frame = src.split_to(header.length as usize).freeze();
            Message::decode(frame)
                .map(Some)
                .map_err(BgpCodecError::Codec)
        }
    }

    impl Encoder<Message> for BgpCodec {
        type Error = std::io::Error;

        fn encode(&mut self, item: Message, dst: &mut bytes::BytesMut) -> Result<(), Self::Error> {
            dst.unsplit(item.encode());
            Ok(())
        }
    }
}

#[cfg(feature = "tokio-endec")]
pub use tokio_codec::{BgpCodec, BgpCodecError};
