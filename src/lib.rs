//! `bgpcore`: a BGP-4 speaker core (RFC 4271).
//!
//! Three layers, leaves first:
//!
//! - [`bgp`]: the wire codec — fixed header, OPEN/UPDATE/NOTIFICATION/KEEPALIVE
//!   bodies, path attributes, IP prefixes — plus [`bgp::Framer`], a
//!   transport-independent byte-stream reassembler.
//! - [`fsm`]: the per-peer finite state machine. Pure: `step(&mut self, Event)
//!   -> Vec<Action>`, no I/O, no ambient clock.
//! - [`transport`] and [`rib`]: the collaborator traits the FSM's actions are
//!   meant to be driven against; [`runtime`] wires them to real `tokio` I/O.
//!
//! Out of scope here: the BGP Decision Process/RIB, capability negotiation
//! beyond an empty list, MP-BGP, four-octet ASNs, TCP-MD5/TCP-AO, graceful
//! restart.

// SPDX-License-Identifier: AGPL-3.0-or-later

pub mod bgp;
pub mod error;
pub mod fsm;
pub mod rib;
#[cfg(feature = "tokio-endec")]
pub mod runtime;
pub mod transport;

pub use bgp::{Message, Notification, Open, Update};
pub use error::CodecError;
pub use fsm::{Action, Event, PeerConfig, PeerSession, State};
