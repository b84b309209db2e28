//! The byte-pipe collaborator a [`crate::fsm::PeerSession`] is driven
//! against (spec §6.2).
//!
//! [`Transport`] is deliberately Message-level, not byte-level: the actual
//! framing/decoding already lives in [`crate::bgp::Framer`] (sync) and
//! [`crate::bgp::BgpCodec`] (tokio), so there is no reason for a third copy
//! of that logic here. This module only needs to exist so [`crate::runtime`]
//! can be exercised without a real socket.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::bgp::Message;
use crate::error::CodecError;

/// Everything that can go wrong reading or writing a [`Message`]: either
/// the pipe itself failed, or a peer sent something that didn't decode.
/// Kept separate from `CodecError` so a transport can report I/O failures
/// (which never map to a NOTIFICATION) alongside protocol ones (which
/// always do).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// The NOTIFICATION this error implies sending, if any. I/O failures
    /// imply none: the transport is already gone.
    #[must_use]
    pub fn to_notification(&self) -> Option<crate::bgp::Notification> {
        match self {
            Self::Io(_) => None,
            Self::Codec(e) => e.to_notification(),
        }
    }
}

/// A full-duplex BGP message pipe to one peer.
///
/// Implementations own their own framing; callers only ever see whole
/// [`Message`]s. `recv` returning `Ok(None)` means the peer closed the
/// connection cleanly (spec §4.3 `TcpConnectionFails`/peer-closed paths).
pub trait Transport: Send {
    /// Wait for the next complete message, or `None` on a clean EOF.
    async fn recv(&mut self) -> Result<Option<Message>, TransportError>;
    /// Serialize and send one message.
    async fn send(&mut self, message: Message) -> Result<(), TransportError>;
    /// Tear down the underlying connection. Best-effort: the FSM has
    /// already decided to close by the time this is called, so callers
    /// should not treat an error here as anything but a log line.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(feature = "tokio-endec")]
pub mod tcp {
    //! `tokio::net::TcpStream` wrapped in [`crate::bgp::BgpCodec`] via
    //! `tokio_util::codec::Framed`, the same machinery the teacher's
    //! `Feeder` built from `FramedRead`/`FramedWrite` directly.

    use super::{Transport, TransportError};
    use crate::bgp::{BgpCodec, BgpCodecError, Message};
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio_util::codec::Framed;

    impl From<BgpCodecError> for TransportError {
        fn from(e: BgpCodecError) -> Self {
            match e {
                BgpCodecError::Io(e) => Self::Io(e),
                BgpCodecError::Codec(e) => Self::Codec(e),
            }
        }
    }

    /// A [`Transport`] backed by a live TCP connection.
    pub struct TcpTransport(Framed<TcpStream, BgpCodec>);

    impl TcpTransport {
        #[must_use]
        pub fn new(stream: TcpStream) -> Self {
            Self(Framed::new(stream, BgpCodec))
        }

        /// Dial out to `addr` (spec §4.3 `Action::OpenTcpConnection`).
        pub async fn connect(addr: std::net::SocketAddr) -> std::io::Result<Self> {
            Ok(Self::new(TcpStream::connect(addr).await?))
        }

        /// Bind `addr` and accept exactly one incoming connection (the
        /// `Active` state's half of spec §4.3: a peer dials *us*). Returns
        /// the transport plus the address that connected.
        pub async fn listen(
            addr: std::net::SocketAddr,
        ) -> std::io::Result<(Self, std::net::SocketAddr)> {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            let (stream, peer) = listener.accept().await?;
            Ok((Self::new(stream), peer))
        }
    }

    impl Transport for TcpTransport {
        async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
            match self.0.next().await {
                None => Ok(None),
                Some(Ok(message)) => Ok(Some(message)),
                Some(Err(e)) => Err(e.into()),
            }
        }

        async fn send(&mut self, message: Message) -> Result<(), TransportError> {
            self.0.send(message).await.map_err(TransportError::Io)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(self.0.get_mut().shutdown().await?)
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! An in-memory [`Transport`] for exercising [`crate::runtime`] without
    //! a socket: `recv` drains a scripted queue, `send` appends to a log
    //! the test can inspect afterwards.

    use super::{Message, Transport, TransportError};
    use std::collections::VecDeque;

    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub(crate) inbound: VecDeque<Message>,
        pub(crate) outbound: Vec<Message>,
        pub(crate) closed: bool,
    }

    impl MockTransport {
        pub(crate) fn scripted(messages: impl IntoIterator<Item = Message>) -> Self {
            Self {
                inbound: messages.into_iter().collect(),
                outbound: Vec::new(),
                closed: false,
            }
        }
    }

    impl Transport for MockTransport {
        async fn recv(&mut self) -> Result<Option<Message>, TransportError> {
            Ok(self.inbound.pop_front())
        }

        async fn send(&mut self, message: Message) -> Result<(), TransportError> {
            self.outbound.push(message);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }
}
