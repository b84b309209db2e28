//! BGP path attributes (RFC 4271 §4.3, §5).
//!
//! Only the seven attribute types RFC 4271 itself defines are recognized;
//! MP_REACH_NLRI/MP_UNREACH_NLRI (RFC 4760) and AS4_PATH (RFC 6793) are out
//! of scope (no MP-BGP, no four-octet-ASN negotiation). Any other type
//! code is kept as an opaque [`AttributeData::Unsupported`] value rather
//! than rejected outright, per RFC 4271 §5's OPTIONAL-flag rule.

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::component::{Component, TryGet};
use crate::error::UpdateValidationError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::net::Ipv4Addr;
use std::ops::Deref;

/// Path attribute flag bits (RFC 4271 §4.3). The low 4 bits are unused and
/// MUST be ignored on parse; they are always emitted as zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    pub const OPTIONAL: u8 = 0x80;
    pub const TRANSITIVE: u8 = 0x40;
    pub const PARTIAL: u8 = 0x20;
    pub const EXTENDED_LENGTH: u8 = 0x10;

    #[must_use]
    pub const fn is_optional(self) -> bool {
        self.0 & Self::OPTIONAL != 0
    }

    #[must_use]
    pub const fn is_transitive(self) -> bool {
        self.0 & Self::TRANSITIVE != 0
    }

    #[must_use]
    pub const fn is_partial(self) -> bool {
        self.0 & Self::PARTIAL != 0
    }

    #[must_use]
    pub const fn is_extended_length(self) -> bool {
        self.0 & Self::EXTENDED_LENGTH != 0
    }
}

/// Canonical type codes this speaker recognizes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum Type {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MultiExitDisc = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
}

impl Type {
    /// The flags a canonical re-emit of this attribute always carries
    /// (before OR-ing in EXTENDED_LENGTH or PARTIAL as needed).
    const fn canonical_flags(self) -> u8 {
        match self {
            Self::Origin | Self::AsPath | Self::NextHop | Self::LocalPref | Self::AtomicAggregate => {
                Flags::TRANSITIVE
            }
            Self::MultiExitDisc => Flags::OPTIONAL,
            Self::Aggregator => Flags::OPTIONAL | Flags::TRANSITIVE,
        }
    }
}

/// A single decoded path attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct PathAttribute {
    pub flags: Flags,
    pub data: AttributeData,
}

/// RFC 4271 §5 ORIGIN values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

/// RFC 4271 §5.1.2 AS_PATH segment type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum AsSegmentType {
    AsSet = 1,
    AsSequence = 2,
}

/// A single AS_PATH segment. `asns` is always 2-octet ASNs (no
/// four-octet-ASN negotiation in this speaker).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsSegment {
    pub segment_type: AsSegmentType,
    pub asns: Vec<u16>,
}

impl AsSegment {
    fn decode(src: &mut Bytes) -> Result<Self, UpdateValidationError> {
        let raw_type = src
            .try_u8()
            .ok_or(UpdateValidationError::MalformedAsPath)?;
        let segment_type =
            AsSegmentType::from_u8(raw_type).ok_or(UpdateValidationError::MalformedAsPath)?;
        let count = src
            .try_u8()
            .ok_or(UpdateValidationError::MalformedAsPath)? as usize;
        let mut asns = Vec::with_capacity(count);
        for _ in 0..count {
            asns.push(
                src.try_u16()
                    .ok_or(UpdateValidationError::MalformedAsPath)?,
            );
        }
        Ok(Self {
            segment_type,
            asns,
        })
    }

    fn encode(&self, dst: &mut BytesMut) -> usize {
        dst.put_u8(self.segment_type as u8);
        dst.put_u8(u8::try_from(self.asns.len()).expect("AS path segment too long to encode"));
        for asn in &self.asns {
            dst.put_u16(*asn);
        }
        2 + self.asns.len() * 2
    }

    const fn encoded_len(&self) -> usize {
        2 + self.asns.len() * 2
    }
}

/// RFC 4271 §5.1.7 AGGREGATOR value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Aggregator {
    pub asn: u16,
    pub speaker: Ipv4Addr,
}

/// The decoded value of a path attribute, tagged by its recognized type
/// code (or kept opaque for any other code).
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeData {
    Origin(Origin),
    AsPath(Vec<AsSegment>),
    NextHop(Ipv4Addr),
    MultiExitDisc(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    /// An optional attribute of a type code this speaker does not
    /// interpret. The raw value octets are preserved so the attribute can
    /// be re-emitted (with PARTIAL set if it was marked transitive).
    Unsupported(u8, Bytes),
}

impl AttributeData {
    const fn type_code(&self) -> u8 {
        match self {
            Self::Origin(_) => Type::Origin as u8,
            Self::AsPath(_) => Type::AsPath as u8,
            Self::NextHop(_) => Type::NextHop as u8,
            Self::MultiExitDisc(_) => Type::MultiExitDisc as u8,
            Self::LocalPref(_) => Type::LocalPref as u8,
            Self::AtomicAggregate => Type::AtomicAggregate as u8,
            Self::Aggregator(_) => Type::Aggregator as u8,
            Self::Unsupported(ty, _) => *ty,
        }
    }
}

impl PathAttribute {
    fn decode(src: &mut Bytes) -> Result<Self, UpdateValidationError> {
        let raw_flags = src
            .try_u8()
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        let flags = Flags(raw_flags);
        let type_code = src
            .try_u8()
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        let len = if flags.is_extended_length() {
            src.try_u16()
                .ok_or(UpdateValidationError::MalformedAttributeList)? as usize
        } else {
            src.try_u8()
                .ok_or(UpdateValidationError::MalformedAttributeList)? as usize
        };
        let mut value = src
            .try_split_to(len)
            .ok_or(UpdateValidationError::MalformedAttributeList)?;

        let data = match Type::from_u8(type_code) {
            Some(Type::Origin) => {
                if value.remaining() != 1 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                let raw = value.get_u8();
                AttributeData::Origin(
                    Origin::from_u8(raw)
                        .ok_or(UpdateValidationError::InvalidOriginAttribute(raw))?,
                )
            }
            Some(Type::AsPath) => {
                let mut segments = Vec::new();
                while value.has_remaining() {
                    segments.push(AsSegment::decode(&mut value)?);
                }
                AttributeData::AsPath(segments)
            }
            Some(Type::NextHop) => {
                if value.remaining() != 4 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                AttributeData::NextHop(Ipv4Addr::from(value.get_u32()))
            }
            Some(Type::MultiExitDisc) => {
                if value.remaining() != 4 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                AttributeData::MultiExitDisc(value.get_u32())
            }
            Some(Type::LocalPref) => {
                if value.remaining() != 4 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                AttributeData::LocalPref(value.get_u32())
            }
            Some(Type::AtomicAggregate) => {
                if value.remaining() != 0 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                AttributeData::AtomicAggregate
            }
            Some(Type::Aggregator) => {
                if value.remaining() != 6 {
                    return Err(UpdateValidationError::AttributeLengthError);
                }
                let asn = value.get_u16();
                let speaker = Ipv4Addr::from(value.get_u32());
                AttributeData::Aggregator(Aggregator { asn, speaker })
            }
            None => {
                if !flags.is_optional() {
                    return Err(UpdateValidationError::UnrecognizedWellKnownAttribute(
                        type_code,
                    ));
                }
                AttributeData::Unsupported(type_code, value)
            }
        };
        Ok(Self { flags, data })
    }

    fn encode(&self, dst: &mut BytesMut) -> usize {
        let value_len = self.value_len();
        let extended = value_len > 255;
        let flags = match &self.data {
            AttributeData::Unsupported(_, _) => {
                let mut bits = self.flags.0 & (Flags::OPTIONAL | Flags::TRANSITIVE);
                if self.flags.is_transitive() {
                    bits |= Flags::PARTIAL;
                }
                if extended {
                    bits |= Flags::EXTENDED_LENGTH;
                }
                bits
            }
            _ => {
                let mut bits = Type::from_u8(self.data.type_code())
                    .map(Type::canonical_flags)
                    .unwrap_or(0);
                if extended {
                    bits |= Flags::EXTENDED_LENGTH;
                }
                bits
            }
        };
        dst.put_u8(flags);
        dst.put_u8(self.data.type_code());
        let len_pos = dst.len();
        let mut len = 2;
        if extended {
            dst.put_u16(0);
            len += 2;
        } else {
            dst.put_u8(0);
            len += 1;
        }
        let written = match &self.data {
            AttributeData::Origin(o) => {
                dst.put_u8(*o as u8);
                1
            }
            AttributeData::AsPath(segments) => {
                let mut n = 0;
                for seg in segments {
                    n += seg.encode(dst);
                }
                n
            }
            AttributeData::NextHop(ip) => {
                dst.put_u32((*ip).into());
                4
            }
            AttributeData::MultiExitDisc(v) | AttributeData::LocalPref(v) => {
                dst.put_u32(*v);
                4
            }
            AttributeData::AtomicAggregate => 0,
            AttributeData::Aggregator(agg) => {
                dst.put_u16(agg.asn);
                dst.put_u32(agg.speaker.into());
                6
            }
            AttributeData::Unsupported(_, value) => {
                dst.put_slice(value);
                value.len()
            }
        };
        debug_assert_eq!(written, value_len);
        if extended {
            dst[len_pos..len_pos + 2].copy_from_slice(&(value_len as u16).to_be_bytes());
        } else {
            dst[len_pos] = value_len as u8;
        }
        len + written
    }

    fn value_len(&self) -> usize {
        match &self.data {
            AttributeData::Origin(_) => 1,
            AttributeData::AsPath(segments) => segments.iter().map(AsSegment::encoded_len).sum(),
            AttributeData::NextHop(_) => 4,
            AttributeData::MultiExitDisc(_) | AttributeData::LocalPref(_) => 4,
            AttributeData::AtomicAggregate => 0,
            AttributeData::Aggregator(_) => 6,
            AttributeData::Unsupported(_, value) => value.len(),
        }
    }

    const fn header_len(&self) -> usize {
        2 + if self.value_len() > 255 { 2 } else { 1 }
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.header_len() + self.value_len()
    }
}

/// The full, ordered list of path attributes in an UPDATE message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathAttributes(pub Vec<PathAttribute>);

impl PathAttributes {
    pub fn decode_segment(src: &mut Bytes) -> Result<Self, UpdateValidationError> {
        let mut attrs = Vec::new();
        while src.has_remaining() {
            attrs.push(PathAttribute::decode(src)?);
        }
        Ok(Self(attrs))
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(PathAttribute::encoded_len).sum()
    }
}

impl Component for PathAttributes {
    fn from_bytes(src: &mut Bytes) -> Option<Self> {
        Self::decode_segment(src).ok()
    }

    fn to_bytes(&self, dst: &mut BytesMut) -> usize {
        self.0.iter().map(|a| a.encode(dst)).sum()
    }
}

impl Deref for PathAttributes {
    type Target = Vec<PathAttribute>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::tests_support::hex_to_bytes;

    #[test]
    fn origin_roundtrip() {
        let mut src = hex_to_bytes("40 01 01 00");
        let pa = PathAttribute::decode(&mut src).unwrap();
        assert_eq!(
            pa,
            PathAttribute {
                flags: Flags(0x40),
                data: AttributeData::Origin(Origin::Igp),
            }
        );
        let mut dst = BytesMut::new();
        pa.encode(&mut dst);
        assert_eq!(dst.freeze(), hex_to_bytes("40 01 01 00"));
    }

    #[test]
    fn as_sequence_roundtrip() {
        let mut src = hex_to_bytes("40 02 06 02 02 007b 0929");
        let pa = PathAttribute::decode(&mut src).unwrap();
        assert_eq!(
            pa,
            PathAttribute {
                flags: Flags(0x40),
                data: AttributeData::AsPath(vec![AsSegment {
                    segment_type: AsSegmentType::AsSequence,
                    asns: vec![123, 2345],
                }]),
            }
        );
    }

    #[test]
    fn next_hop_wrong_length_is_attribute_length_error() {
        let mut src = hex_to_bytes("40 03 03 7f0000");
        assert_eq!(
            PathAttribute::decode(&mut src).unwrap_err(),
            UpdateValidationError::AttributeLengthError
        );
    }

    #[test]
    fn unrecognized_well_known_attribute_rejected() {
        // Flags 0x40 = transitive only, not optional; type 99 is unknown.
        let mut src = hex_to_bytes("40 63 00");
        assert_eq!(
            PathAttribute::decode(&mut src).unwrap_err(),
            UpdateValidationError::UnrecognizedWellKnownAttribute(99)
        );
    }

    #[test]
    fn unrecognized_optional_attribute_preserved_opaque() {
        let mut src = hex_to_bytes("c0 63 02 aabb");
        let pa = PathAttribute::decode(&mut src).unwrap();
        assert_eq!(
            pa.data,
            AttributeData::Unsupported(99, bytes::Bytes::from_static(&[0xaa, 0xbb]))
        );
        let mut dst = BytesMut::new();
        pa.encode(&mut dst);
        // Optional + transitive + partial.
        assert_eq!(dst[0], 0x80 | 0x40 | 0x20);
    }

    #[test]
    fn invalid_origin_value_rejected() {
        let mut src = hex_to_bytes("40 01 01 09");
        assert_eq!(
            PathAttribute::decode(&mut src).unwrap_err(),
            UpdateValidationError::InvalidOriginAttribute(9)
        );
    }

    #[test]
    fn aggregator_roundtrip() {
        let mut src = hex_to_bytes("c0 07 06 fe4c 1e000101");
        let pa = PathAttribute::decode(&mut src).unwrap();
        assert_eq!(
            pa.data,
            AttributeData::Aggregator(Aggregator {
                asn: 0xfe4c,
                speaker: "30.0.1.1".parse().unwrap(),
            })
        );
    }
}
