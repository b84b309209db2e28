//! Error taxonomy for the codec and the peer FSM.
//!
//! `CodecError` partitions cleanly into framing errors (detected while
//! reassembling/validating the 19-octet header) and per-message-type
//! validation errors (detected while interpreting an already-framed OPEN or
//! UPDATE body). Every variant maps onto exactly one RFC 4271 §6
//! (error code, error subcode) pair via [`CodecError::to_notification`], so
//! the peer FSM's NOTIFICATION synthesis is a total function over this enum.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::bgp::{Notification, NotificationErrorCode};
use bytes::Bytes;

/// Errors detected while decoding a BGP message.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    /// Not enough bytes are buffered yet to decode a complete message.
    /// Never surfaced as a NOTIFICATION; the caller should buffer more.
    #[error("need more bytes to decode a complete message")]
    NeedMore,
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("OPEN message validation error: {0}")]
    OpenValidation(#[from] OpenValidationError),
    #[error("UPDATE message validation error: {0}")]
    UpdateValidation(#[from] UpdateValidationError),
}

impl CodecError {
    /// Translate this error into the NOTIFICATION that RFC 4271 §6
    /// prescribes for it. Returns `None` for `NeedMore`, which by
    /// definition never reaches the point of sending a NOTIFICATION.
    #[must_use]
    pub fn to_notification(&self) -> Option<Notification> {
        match self {
            Self::NeedMore => None,
            Self::Framing(e) => Some(e.to_notification()),
            Self::OpenValidation(e) => Some(e.to_notification()),
            Self::UpdateValidation(e) => Some(e.to_notification()),
        }
    }
}

/// RFC 4271 §6.1 header/framing errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum FramingError {
    #[error("connection not synchronized (bad marker)")]
    ConnectionNotSynchronized,
    #[error("bad message length ({0})")]
    BadMessageLength(u16),
    #[error("bad message type ({0})")]
    BadMessageType(u8),
}

impl FramingError {
    #[must_use]
    pub fn to_notification(self) -> Notification {
        let (subcode, data): (u8, Vec<u8>) = match self {
            Self::ConnectionNotSynchronized => (1, Vec::new()),
            Self::BadMessageLength(len) => (2, len.to_be_bytes().to_vec()),
            Self::BadMessageType(ty) => (3, vec![ty]),
        };
        Notification::new(
            NotificationErrorCode::MessageHeaderError,
            subcode,
            Bytes::from(data),
        )
    }
}

/// RFC 4271 §6.2 OPEN message errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum OpenValidationError {
    #[error("unsupported version number ({0})")]
    UnsupportedVersionNumber(u8),
    #[error("bad peer AS")]
    BadPeerAs,
    #[error("bad BGP identifier")]
    BadBgpIdentifier,
    #[error("unsupported optional parameter")]
    UnsupportedOptionalParameter,
    #[error("unacceptable hold time ({0})")]
    UnacceptableHoldTime(u16),
}

impl OpenValidationError {
    #[must_use]
    pub fn to_notification(self) -> Notification {
        let (subcode, data): (u8, Vec<u8>) = match self {
            // RFC 4271 §6.2: data SHOULD carry the largest version number
            // this speaker supports.
            Self::UnsupportedVersionNumber(_) => (1, vec![crate::bgp::BGP_VERSION]),
            Self::BadPeerAs => (2, Vec::new()),
            Self::BadBgpIdentifier => (3, Vec::new()),
            Self::UnsupportedOptionalParameter => (4, Vec::new()),
            Self::UnacceptableHoldTime(ht) => (6, ht.to_be_bytes().to_vec()),
        };
        Notification::new(
            NotificationErrorCode::OpenMessageError,
            subcode,
            Bytes::from(data),
        )
    }
}

/// RFC 4271 §6.3 UPDATE message errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum UpdateValidationError {
    #[error("malformed attribute list")]
    MalformedAttributeList,
    #[error("unrecognized well-known attribute ({0})")]
    UnrecognizedWellKnownAttribute(u8),
    #[error("missing well-known attribute ({0})")]
    MissingWellKnownAttribute(u8),
    #[error("attribute flags error")]
    AttributeFlagsError,
    #[error("attribute length error")]
    AttributeLengthError,
    #[error("invalid origin attribute ({0})")]
    InvalidOriginAttribute(u8),
    #[error("AS routing loop")]
    AsRoutingLoop,
    #[error("invalid next hop attribute")]
    InvalidNextHopAttribute,
    #[error("optional attribute error")]
    OptionalAttributeError,
    #[error("invalid network field")]
    InvalidNetworkField,
    #[error("malformed AS path")]
    MalformedAsPath,
}

impl UpdateValidationError {
    #[must_use]
    pub fn to_notification(&self) -> Notification {
        let (subcode, data): (u8, Vec<u8>) = match self {
            Self::MalformedAttributeList => (1, Vec::new()),
            Self::UnrecognizedWellKnownAttribute(ty) => (2, vec![*ty]),
            Self::MissingWellKnownAttribute(ty) => (3, vec![*ty]),
            Self::AttributeFlagsError => (4, Vec::new()),
            Self::AttributeLengthError => (5, Vec::new()),
            Self::InvalidOriginAttribute(v) => (6, vec![*v]),
            Self::AsRoutingLoop => (7, Vec::new()),
            Self::InvalidNextHopAttribute => (8, Vec::new()),
            Self::OptionalAttributeError => (9, Vec::new()),
            Self::InvalidNetworkField => (10, Vec::new()),
            Self::MalformedAsPath => (11, Vec::new()),
        };
        Notification::new(
            NotificationErrorCode::UpdateMessageError,
            subcode,
            Bytes::from(data),
        )
    }
}
