//! Transport-independent byte-stream reassembly (spec §4.2).
//!
//! A [`Framer`] owns one growing buffer per peer and turns whatever chunks
//! a transport hands it into a sequence of complete, header-length-scoped
//! frames. It knows nothing about sockets, `tokio`, or message semantics —
//! only the 19-octet header's marker/length/type rules (see
//! [`super::header`]). This is new code: the teacher (`pabgp::bgp::endec`)
//! inlines the equivalent length check directly inside its
//! `tokio_util::codec::Decoder::decode`; pulling it out into its own type
//! makes spec §8 property 4 ("any partition of a byte stream frames
//! identically to the unsplit stream") testable without `tokio` at all.

// SPDX-License-Identifier: AGPL-3.0-or-later

use super::header;
use crate::error::FramingError;
use bytes::{Bytes, BytesMut};

/// Reassembles a byte stream into complete BGP message frames.
///
/// Once [`Framer::next`] returns `Err`, the buffer is poisoned: every
/// subsequent call returns the same error. There is no resynchronization —
/// a framing error always means the FSM closes the transport (spec §4.2,
/// §4.3 default transitions).
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
    poison: Option<FramingError>,
}

impl Framer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the transport. Never blocks, never fails;
    /// framing errors only surface from [`Framer::next`].
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of octets currently buffered but not yet returned as a frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Pull the next complete frame out of the buffer, if one is ready.
    ///
    /// Returns `Ok(None)` when more bytes are needed, `Ok(Some(frame))`
    /// with the exact `header.length` octets of one message (header
    /// included), or `Err` once a marker/length/type violation is seen —
    /// after which every further call returns the same error.
    pub fn next(&mut self) -> Result<Option<Bytes>, FramingError> {
        if let Some(e) = self.poison {
            return Err(e);
        }
        let header = match header::peek_header(&self.buf) {
            Ok(Some(h)) => h,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.poison = Some(e);
                return Err(e);
            }
        };
        let length = header.length as usize;
        if self.buf.len() < length {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(length).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::tests_support::hex_to_bytes;

    fn keepalive_bytes() -> Bytes {
        hex_to_bytes("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF 0013 04")
    }

    #[test]
    fn needs_more_before_header_complete() {
        let mut framer = Framer::new();
        framer.push(&keepalive_bytes()[..10]);
        assert_eq!(framer.next().unwrap(), None);
    }

    #[test]
    fn single_message_in_one_push() {
        let mut framer = Framer::new();
        framer.push(&keepalive_bytes());
        let frame = framer.next().unwrap().unwrap();
        assert_eq!(frame, keepalive_bytes());
        assert_eq!(framer.next().unwrap(), None);
    }

    #[test]
    fn two_messages_back_to_back() {
        let mut framer = Framer::new();
        let mut both = BytesMut::new();
        both.extend_from_slice(&keepalive_bytes());
        both.extend_from_slice(&keepalive_bytes());
        framer.push(&both);
        assert_eq!(framer.next().unwrap().unwrap(), keepalive_bytes());
        assert_eq!(framer.next().unwrap().unwrap(), keepalive_bytes());
        assert_eq!(framer.next().unwrap(), None);
    }

    #[test]
    fn bad_marker_poisons_the_framer() {
        let mut framer = Framer::new();
        let mut bad = keepalive_bytes().to_vec();
        bad[0] = 0x00;
        framer.push(&bad);
        let err = framer.next().unwrap_err();
        assert_eq!(err, FramingError::ConnectionNotSynchronized);
        // Poisoned: every subsequent call repeats the same error, even if
        // more (well-formed) bytes arrive.
        framer.push(&keepalive_bytes());
        assert_eq!(framer.next().unwrap_err(), FramingError::ConnectionNotSynchronized);
    }

    #[test]
    fn arbitrary_chunking_framing_is_order_preserving() {
        // Partition a two-message stream at every possible split point;
        // the framed output must always match the unsplit case (spec §8
        // property 4).
        let mut whole = BytesMut::new();
        whole.extend_from_slice(&keepalive_bytes());
        whole.extend_from_slice(&keepalive_bytes());
        let whole = whole.freeze();

        for split in 0..=whole.len() {
            let mut framer = Framer::new();
            framer.push(&whole[..split]);
            framer.push(&whole[split..]);
            let mut frames = Vec::new();
            while let Some(frame) = framer.next().unwrap() {
                frames.push(frame);
            }
            assert_eq!(frames, vec![keepalive_bytes(), keepalive_bytes()]);
        }
    }
}
