//! Reusable decode/encode primitives shared by every message body and
//! nested field (path attributes, prefixes, the OPEN/UPDATE/NOTIFICATION
//! bodies).

// SPDX-License-Identifier: AGPL-3.0-or-later

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// A fixed- or length-prefixed wire component.
pub trait Component {
    /// Decode the component from the front of `src`, consuming exactly the
    /// octets that belong to it.
    fn from_bytes(src: &mut Bytes) -> Option<Self>
    where
        Self: Sized;

    /// Encode the component, returning the number of octets written.
    fn to_bytes(&self, dst: &mut BytesMut) -> usize;
}

macro_rules! impl_component_for_intn {
    ($typ:ty, $n:expr, $getter:ident, $putter:ident) => {
        impl Component for $typ {
            fn from_bytes(src: &mut Bytes) -> Option<Self> {
                if src.remaining() < $n {
                    return None;
                }
                Some(src.$getter())
            }

            fn to_bytes(&self, dst: &mut BytesMut) -> usize {
                dst.$putter(*self);
                $n
            }
        }
    };
}

impl_component_for_intn!(u8, 1, get_u8, put_u8);
impl_component_for_intn!(u16, 2, get_u16, put_u16);
impl_component_for_intn!(u32, 4, get_u32, put_u32);

impl Component for Ipv4Addr {
    fn from_bytes(src: &mut Bytes) -> Option<Self> {
        if src.remaining() < 4 {
            return None;
        }
        Some(Self::from(src.get_u32()))
    }

    fn to_bytes(&self, dst: &mut BytesMut) -> usize {
        dst.put_u32((*self).into());
        4
    }
}

/// Checked cursor helpers over [`bytes::Bytes`]. A malformed peer message
/// must never panic this process; every read that could run past the end
/// of an already length-scoped sub-buffer returns `None` instead.
pub trait TryGet {
    fn try_u8(&mut self) -> Option<u8>;
    fn try_u16(&mut self) -> Option<u16>;
    fn try_u32(&mut self) -> Option<u32>;
    fn try_split_to(&mut self, n: usize) -> Option<Bytes>;
}

impl TryGet for Bytes {
    fn try_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        Some(self.get_u8())
    }

    fn try_u16(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        Some(self.get_u16())
    }

    fn try_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        Some(self.get_u32())
    }

    fn try_split_to(&mut self, n: usize) -> Option<Bytes> {
        if self.remaining() < n {
            return None;
        }
        Some(self.split_to(n))
    }
}
