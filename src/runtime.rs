//! Wires `tokio` timers and a [`Transport`] to the pure
//! [`PeerSession::step`] (spec §4.3, §9).
//!
//! This is the redesigned counterpart to the teacher's
//! `delegation-feed::session::Feeder`: that type mixed connection
//! handling, OPEN negotiation, and the established-session loop into one
//! hand-written sequence of `async fn`s, each implicitly a state. Here the
//! state machine is [`crate::fsm::PeerSession`] and this module's only job
//! is running its clock and shipping its [`Action`]s to a real socket.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::fsm::{Action, Event, PeerConfig, PeerSession, State, TimerKind};
use crate::rib::RibSink;
use crate::transport::Transport;
use std::future::pending;
use std::net::SocketAddr;
use std::pin::Pin;
use tokio::time::{sleep, Sleep};

/// Dial `config.remote_address` and drive the session to completion,
/// retrying (per spec §4.3's `Connect`/`Active` `ConnectRetryTimerExpires`
/// transition) until connected or manually stopped.
///
/// The teacher never dials out at all (`Feeder` only ever wraps an already
/// `TcpListener::accept`ed socket); this is the active half spec §4.3
/// requires in addition to that passive one. Unlike the post-connect loop
/// below, retries here are a plain sequential wait-then-redial rather than
/// a timer raced against anything else, since nothing else is happening
/// yet while a peer hasn't connected.
pub async fn run_active_session<R: RibSink>(
    config: PeerConfig,
    rib: &mut R,
) -> std::io::Result<()> {
    use crate::transport::tcp::TcpTransport;

    let remote = config.remote_address;
    let mut session = PeerSession::new(config);
    let mut retry_delay = crate::fsm::DEFAULT_CONNECT_RETRY_TIME;
    for action in session.step(Event::ManualStart) {
        if let Action::ArmTimer {
            kind: TimerKind::ConnectRetry,
            duration,
        } = action
        {
            retry_delay = duration;
        }
    }

    loop {
        match TcpTransport::connect(remote).await {
            Ok(transport) => {
                let actions = session.step(Event::TcpConnectionConfirmed);
                return drive(transport, &mut session, actions, rib).await;
            }
            Err(e) => {
                log::warn!("connect to {remote} failed: {e}");
                session.step(Event::TcpConnectionFails);
                if session.state() != State::Connect && session.state() != State::Active {
                    return Err(e);
                }
                let actions = session.step(Event::ConnectRetryTimerExpires);
                for action in &actions {
                    if let Action::ArmTimer {
                        kind: TimerKind::ConnectRetry,
                        duration,
                    } = action
                    {
                        retry_delay = *duration;
                    }
                }
                sleep(retry_delay).await;
            }
        }
    }
}

/// Listen on `config.remote_address`'s local counterpart and drive the
/// first accepted connection to completion (the passive half of spec
/// §4.3, left to the caller to invoke just as `delegation_feed::main`'s
/// `TcpListener::accept` loop leaves the session to `handle_session`).
pub async fn run_passive_session<R: RibSink>(
    listen_addr: SocketAddr,
    config: PeerConfig,
    rib: &mut R,
) -> std::io::Result<()> {
    use crate::transport::tcp::TcpTransport;

    let (transport, peer) = TcpTransport::listen(listen_addr).await?;
    log::info!("accepted connection from {peer}");

    let mut session = PeerSession::new(config);
    session.step(Event::ManualStart);
    let actions = session.step(Event::TcpConnectionConfirmed);
    drive(transport, &mut session, actions, rib).await
}

struct Timers {
    hold: Option<Pin<Box<Sleep>>>,
    keepalive: Option<Pin<Box<Sleep>>>,
}

impl Timers {
    const fn new() -> Self {
        Self {
            hold: None,
            keepalive: None,
        }
    }

    fn apply(&mut self, action: &Action) {
        match action {
            Action::ArmTimer {
                kind: TimerKind::Hold,
                duration,
            } => self.hold = Some(Box::pin(sleep(*duration))),
            Action::ArmTimer {
                kind: TimerKind::Keepalive,
                duration,
            } => self.keepalive = Some(Box::pin(sleep(*duration))),
            Action::CancelTimer(TimerKind::Hold) => self.hold = None,
            Action::CancelTimer(TimerKind::Keepalive) => self.keepalive = None,
            _ => {}
        }
    }

    async fn fire_hold(&mut self) {
        match &mut self.hold {
            Some(t) => t.await,
            None => pending().await,
        }
    }

    async fn fire_keepalive(&mut self) {
        match &mut self.keepalive {
            Some(t) => t.await,
            None => pending().await,
        }
    }
}

/// The post-connect loop: `OpenSent` through to a return to `Idle`, racing
/// incoming messages against the Hold and Keepalive timers (spec §4.3,
/// §5). `initial_actions` are whatever `TcpConnectionConfirmed` produced —
/// the OPEN to send and the initial (large) Hold timer.
async fn drive<T: Transport, R: RibSink>(
    mut transport: T,
    session: &mut PeerSession,
    initial_actions: Vec<Action>,
    rib: &mut R,
) -> std::io::Result<()> {
    let peer = session.config().remote_address;
    let mut timers = Timers::new();
    apply_actions(&mut transport, &mut timers, initial_actions, rib, peer).await;

    loop {
        if session.state() == State::Idle {
            return Ok(());
        }
        tokio::select! {
            received = transport.recv() => {
                match received {
                    Ok(Some(message)) => {
                        let actions = session.step(Event::BgpMessage(message));
                        apply_actions(&mut transport, &mut timers, actions, rib, peer).await;
                    }
                    Ok(None) => {
                        log::info!("transport to {peer} closed");
                        return Ok(());
                    }
                    Err(e) => {
                        log::warn!("transport error from {peer}: {e}");
                        if let Some(notification) = e.to_notification() {
                            let _ = transport.send(crate::bgp::Message::Notification(notification)).await;
                        }
                        let _ = transport.close().await;
                        return Ok(());
                    }
                }
            }
            () = timers.fire_hold() => {
                timers.hold = None;
                let actions = session.step(Event::HoldTimerExpires);
                apply_actions(&mut transport, &mut timers, actions, rib, peer).await;
            }
            () = timers.fire_keepalive() => {
                timers.keepalive = None;
                let actions = session.step(Event::KeepaliveTimerExpires);
                apply_actions(&mut transport, &mut timers, actions, rib, peer).await;
            }
        }
    }
}

async fn apply_actions<T: Transport, R: RibSink>(
    transport: &mut T,
    timers: &mut Timers,
    actions: Vec<Action>,
    rib: &mut R,
    peer: SocketAddr,
) {
    for action in actions {
        timers.apply(&action);
        match action {
            Action::SendMessage(message) => {
                if let Err(e) = transport.send(message).await {
                    log::warn!("failed to send to {peer}: {e}");
                }
            }
            Action::CloseTransport => {
                if let Err(e) = transport.close().await {
                    log::warn!("failed to close transport to {peer}: {e}");
                }
            }
            Action::DeliverUpdate(update) => rib.on_update(peer, update),
            Action::ArmTimer { .. } | Action::CancelTimer(_) | Action::OpenTcpConnection => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::{Message, Open};
    use crate::rib::LoggingRib;
    use crate::transport::mock::MockTransport;
    use std::net::Ipv4Addr;

    fn config() -> PeerConfig {
        PeerConfig::new(
            65000,
            9,
            Ipv4Addr::new(10, 0, 0, 1),
            "192.0.2.1:179".parse().unwrap(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepted_session_completes_handshake_and_returns_on_peer_close() {
        let peer_open = Message::Open(Open::new(64512, 9, Ipv4Addr::new(192, 0, 2, 99)));
        let transport = MockTransport::scripted([peer_open, Message::Keepalive]);

        let mut session = PeerSession::new(config());
        session.step(Event::ManualStart);
        let actions = session.step(Event::TcpConnectionConfirmed);

        let mut rib = LoggingRib;
        drive(transport, &mut session, actions, &mut rib)
            .await
            .unwrap();

        assert_eq!(session.state(), State::Established);
    }

    #[tokio::test]
    async fn bad_peer_open_sends_notification_and_stops_driving() {
        // BGP identifier equal to our own router ID is rejected (spec
        // §4.3 `OpenSent`), closing the transport and returning to Idle.
        let bad_open = Message::Open(Open::new(64512, 9, Ipv4Addr::new(10, 0, 0, 1)));
        let transport = MockTransport::scripted([bad_open]);

        let mut session = PeerSession::new(config());
        session.step(Event::ManualStart);
        let actions = session.step(Event::TcpConnectionConfirmed);

        let mut rib = LoggingRib;
        drive(transport, &mut session, actions, &mut rib)
            .await
            .unwrap();

        assert_eq!(session.state(), State::Idle);
    }
}
