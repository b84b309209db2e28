//! IP-prefix entries (RFC 4271 §4.3, the withdrawn-routes and NLRI fields).
//!
//! A prefix is the pair `(prefix_len, prefix_bytes)` where `prefix_bytes`
//! is exactly `ceil(prefix_len / 8)` octets. The trailing bits of the last
//! octet are don't-care on the wire; this implementation preserves them
//! verbatim rather than normalizing or truncating, since a peer is free to
//! send non-zero padding and `decode(encode(x)) == x` must hold for
//! whatever was actually received (see SPEC_FULL.md §3, the IP-prefix
//! Open Question).

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::component::{Component, TryGet};
use crate::error::UpdateValidationError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;
use std::ops::Deref;

/// Number of octets needed to hold `prefix_len` bits.
fn n_prefix_octets(prefix_len: u8) -> usize {
    usize::from((prefix_len + 7) / 8)
}

/// A single IPv4 prefix as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpPrefix {
    pub prefix_len: u8,
    pub prefix: Bytes,
}

impl IpPrefix {
    /// Build a prefix from a host address and length, keeping only the
    /// octets the wire format requires.
    #[must_use]
    pub fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        let n = n_prefix_octets(prefix_len);
        let prefix = Bytes::copy_from_slice(&addr.octets()[..n]);
        Self { prefix_len, prefix }
    }

    /// The prefix's address, zero-padded on the right to 4 octets.
    #[must_use]
    pub fn addr(&self) -> Ipv4Addr {
        let mut octets = [0u8; 4];
        octets[..self.prefix.len()].copy_from_slice(&self.prefix);
        Ipv4Addr::from(octets)
    }

    fn decode_one(src: &mut Bytes) -> Result<Self, UpdateValidationError> {
        let prefix_len = src
            .try_u8()
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        if prefix_len > 32 {
            // spec.md §4.1 prefix decode: bits > 32 is a malformed
            // attribute list, not the (unused-here) InvalidNetworkField.
            return Err(UpdateValidationError::MalformedAttributeList);
        }
        let n = n_prefix_octets(prefix_len);
        let prefix = src
            .try_split_to(n)
            .ok_or(UpdateValidationError::MalformedAttributeList)?;
        Ok(Self { prefix_len, prefix })
    }

    fn encode_one(&self, dst: &mut BytesMut) -> usize {
        dst.put_u8(self.prefix_len);
        dst.put_slice(&self.prefix);
        1 + self.prefix.len()
    }
}

/// An ordered list of prefixes, encoded back-to-back with no overall
/// length prefix (the caller scopes the containing buffer).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Routes(pub Vec<IpPrefix>);

impl Routes {
    /// Decode prefixes until `src` is exhausted. Any trailing partial
    /// prefix (an under- or overshoot against the caller's declared
    /// segment length) is a malformed attribute list.
    pub fn decode_segment(src: &mut Bytes) -> Result<Self, UpdateValidationError> {
        let mut routes = Vec::new();
        while src.has_remaining() {
            routes.push(IpPrefix::decode_one(src)?);
        }
        Ok(Self(routes))
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(|r| 1 + r.prefix.len()).sum()
    }
}

impl Component for Routes {
    fn from_bytes(src: &mut Bytes) -> Option<Self> {
        Self::decode_segment(src).ok()
    }

    fn to_bytes(&self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        for route in &self.0 {
            len += route.encode_one(dst);
        }
        len
    }
}

impl Deref for Routes {
    type Target = Vec<IpPrefix>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromIterator<IpPrefix> for Routes {
    fn from_iter<I: IntoIterator<Item = IpPrefix>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_roundtrip_off_octet_boundary() {
        let p = IpPrefix::new("172.24.0.0".parse().unwrap(), 12);
        assert_eq!(p.prefix.as_ref(), &[0xac, 0x18]);
        let mut dst = BytesMut::new();
        p.encode_one(&mut dst);
        let mut src = dst.freeze();
        let back = IpPrefix::decode_one(&mut src).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn prefix_zero_length_consumes_no_octets() {
        let mut src = Bytes::from_static(&[0x00]);
        let p = IpPrefix::decode_one(&mut src).unwrap();
        assert_eq!(p.prefix_len, 0);
        assert_eq!(p.prefix.len(), 0);
        assert!(!src.has_remaining());
    }

    #[test]
    fn prefix_over_32_bits_rejected() {
        let mut src = Bytes::from_static(&[33, 1, 2, 3, 4, 5]);
        assert_eq!(
            IpPrefix::decode_one(&mut src).unwrap_err(),
            UpdateValidationError::MalformedAttributeList
        );
    }

    #[test]
    fn prefix_truncated_is_malformed() {
        // Claims a /24 but only one octet follows.
        let mut src = Bytes::from_static(&[24, 10]);
        assert_eq!(
            IpPrefix::decode_one(&mut src).unwrap_err(),
            UpdateValidationError::MalformedAttributeList
        );
    }

    #[test]
    fn trailing_bits_preserved_verbatim() {
        // /23 would canonically zero the low bit of the second octet, but
        // a non-zero pad must still round-trip exactly.
        let mut src = Bytes::from_static(&[23, 0x0A, 0x01]);
        let p = IpPrefix::decode_one(&mut src).unwrap();
        assert_eq!(p.prefix.as_ref(), &[0x0A, 0x01]);
        let mut dst = BytesMut::new();
        p.encode_one(&mut dst);
        assert_eq!(dst.freeze().as_ref(), &[23, 0x0A, 0x01]);
    }

    #[test]
    fn multiple_prefixes_decode_in_order() {
        // 10.0.1.0/23 then 180.128.0/15, per spec.md S4.
        let mut src = Bytes::from_static(&[0x17, 0x0A, 0x00, 0x01, 0x0F, 0xB4, 0x80]);
        let routes = Routes::decode_segment(&mut src).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].prefix_len, 23);
        assert_eq!(routes[0].prefix.as_ref(), &[0x0A, 0x00, 0x01]);
        assert_eq!(routes[1].prefix_len, 15);
        assert_eq!(routes[1].prefix.as_ref(), &[0xB4, 0x80]);
    }
}
