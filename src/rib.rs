//! The RIB collaborator a [`crate::fsm::Action::DeliverUpdate`] is handed
//! to (spec §6.3). Route selection, the Adjacency-RIB-In/Loc-RIB split,
//! and redistribution are out of scope here (see SPEC_FULL.md's
//! Non-goals) — this crate's job ends at decoding an UPDATE correctly and
//! handing it off.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::bgp::Update;
use std::net::SocketAddr;

/// Receives UPDATEs a peer session decoded and accepted.
pub trait RibSink: Send {
    fn on_update(&mut self, peer: SocketAddr, update: Update);
}

/// The default collaborator: logs what arrived and does nothing further,
/// mirroring the teacher's `Feeder::handle_peer_packet` UPDATE arm
/// (`delegation-feed::session`), which never had a RIB to hand updates to
/// either.
#[derive(Debug, Default)]
pub struct LoggingRib;

impl RibSink for LoggingRib {
    fn on_update(&mut self, peer: SocketAddr, update: Update) {
        log::debug!(
            "UPDATE from {peer}: {} withdrawn, {} NLRI, {} path attributes",
            update.withdrawn_routes.len(),
            update.nlri.len(),
            update.path_attributes.len(),
        );
        log::debug!("no further processing implemented");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::path_attr::PathAttributes;
    use crate::bgp::route::Routes;

    #[derive(Default)]
    struct RecordingRib {
        received: Vec<Update>,
    }

    impl RibSink for RecordingRib {
        fn on_update(&mut self, _peer: SocketAddr, update: Update) {
            self.received.push(update);
        }
    }

    #[test]
    fn recording_rib_sees_the_update_it_was_handed() {
        let mut rib = RecordingRib::default();
        let update = Update {
            withdrawn_routes: Routes::default(),
            path_attributes: PathAttributes::default(),
            nlri: Routes::default(),
        };
        rib.on_update("192.0.2.1:179".parse().unwrap(), update.clone());
        assert_eq!(rib.received, vec![update]);
    }
}
