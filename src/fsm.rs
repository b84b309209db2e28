//! The per-peer BGP finite state machine (RFC 4271 §8, spec §4.3).
//!
//! `PeerSession::step` is a pure function: `(state, event) -> actions`, with
//! no I/O and no ambient clock — the redesign direction spec.md §9 calls
//! for in place of the source's event-loop callback style
//! (`twisted.internet.protocol.Protocol`) and in place of the teacher's
//! inline async per-state methods (`delegation_feed::session::Feeder::idle`
//! / `connect` / `open_sent_confirm` / `established`, which mix transition
//! logic with `tokio` I/O). [`crate::runtime`] is where a real clock and a
//! real transport execute the actions this module returns.

// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::bgp::{Message, NotificationErrorCode, Notification, Open, Update};
use crate::error::OpenValidationError;
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// RFC 4271 §8 suggests 120s as the default ConnectRetryTime.
pub const DEFAULT_CONNECT_RETRY_TIME: Duration = Duration::from_secs(120);
/// The "large" Hold Time RFC 4271 §4.2/§8 prescribes while waiting for the
/// peer's OPEN to be validated, before a real hold time is negotiated.
pub const INITIAL_HOLD_TIME: Duration = Duration::from_secs(240);
/// KEEPALIVE transmissions must never exceed this rate (spec §4.3 timer
/// semantics), even if `negotiated_hold_time / 3` would round below it.
pub const MIN_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Per-peer configuration, supplied once at construction (spec §6.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    pub local_as: u16,
    pub configured_hold_time: u16,
    pub router_id: Ipv4Addr,
    pub remote_address: SocketAddr,
    pub remote_as: Option<u16>,
}

/// A configured hold time outside the legal set `{0} ∪ [3, 65535]`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("hold time must be 0 or >= 3 seconds, got {0}")]
pub struct InvalidHoldTime(pub u16);

impl PeerConfig {
    /// Validate `configured_hold_time` at construction so the `OpenSent`
    /// transition only ever re-checks the *peer's* advertised value.
    pub fn new(
        local_as: u16,
        configured_hold_time: u16,
        router_id: Ipv4Addr,
        remote_address: SocketAddr,
        remote_as: Option<u16>,
    ) -> Result<Self, InvalidHoldTime> {
        if configured_hold_time != 0 && configured_hold_time < 3 {
            return Err(InvalidHoldTime(configured_hold_time));
        }
        Ok(Self {
            local_as,
            configured_hold_time,
            router_id,
            remote_address,
            remote_as,
        })
    }
}

/// The six FSM states (spec §4.3). `Connect`/`Active` both mean "no TCP
/// session yet"; they differ only in whether we're dialling out
/// (`Connect`) or waiting on a passive listener (`Active`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

/// Which of a peer's (at most three) timers an action concerns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConnectRetry,
    Hold,
    Keepalive,
}

/// Events the FSM consumes (spec §4.3). `BgpMessage` carries an already
/// codec-decoded message; a message that failed to decode is never an
/// `Event` — the runtime maps the `CodecError` straight to a NOTIFICATION
/// and a close, without involving `step` at all (the FSM only sees
/// protocol-*level* errors detected after a message decoded cleanly).
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ManualStart,
    ManualStop,
    TcpConnectionConfirmed,
    TcpConnectionFails,
    BgpMessage(Message),
    ConnectRetryTimerExpires,
    HoldTimerExpires,
    KeepaliveTimerExpires,
}

/// Whether the peer turned out to share this speaker's AS (`Internal`) or
/// not (`External`); `Unknown` until an OPEN has been validated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PeerType {
    Unknown,
    Internal,
    External,
}

/// What the runtime must do in response to a [`Event`] (spec §4.3, §9). The
/// FSM never performs these itself — `step` only ever returns a list of
/// them.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Dial out to `PeerConfig::remote_address`.
    OpenTcpConnection,
    /// Serialize and send this message to the peer.
    SendMessage(Message),
    /// Arm (or rearm) a timer to fire `duration` from now.
    ArmTimer { kind: TimerKind, duration: Duration },
    /// Disarm a timer that may be running.
    CancelTimer(TimerKind),
    /// Close the transport. Always paired with a transition to `Idle`
    /// (spec §4.3 "every protocol-detected error produces one
    /// NOTIFICATION, then close, then -> Idle").
    CloseTransport,
    /// Hand a decoded UPDATE to the RIB collaborator (spec §6.3).
    DeliverUpdate(Update),
}

/// One peer's live FSM state plus the negotiated values that only exist
/// from `OpenConfirm` onward.
#[derive(Clone, Debug, PartialEq)]
pub struct PeerSession {
    config: PeerConfig,
    state: State,
    negotiated_hold_time: u16,
    peer_type: PeerType,
    connect_retry_count: u32,
}

impl PeerSession {
    #[must_use]
    pub fn new(config: PeerConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            negotiated_hold_time: 0,
            peer_type: PeerType::Unknown,
            connect_retry_count: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn config(&self) -> &PeerConfig {
        &self.config
    }

    #[must_use]
    pub const fn negotiated_hold_time(&self) -> u16 {
        self.negotiated_hold_time
    }

    #[must_use]
    pub const fn peer_type(&self) -> PeerType {
        self.peer_type
    }

    #[must_use]
    pub const fn connect_retry_count(&self) -> u32 {
        self.connect_retry_count
    }

    /// Advance the FSM by exactly one event, returning the actions the
    /// runtime must perform. Never blocks, never fails: a message that
    /// violates the protocol is reported via a `SendMessage(Notification)`
    /// + `CloseTransport` action pair, not a `Result::Err`.
    pub fn step(&mut self, event: Event) -> Vec<Action> {
        match (self.state, event) {
            (State::Idle, Event::ManualStart) => {
                self.connect_retry_count = 0;
                self.state = State::Connect;
                vec![
                    Action::ArmTimer {
                        kind: TimerKind::ConnectRetry,
                        duration: DEFAULT_CONNECT_RETRY_TIME,
                    },
                    Action::OpenTcpConnection,
                ]
            }

            (State::Connect | State::Active, Event::TcpConnectionConfirmed) => {
                self.state = State::OpenSent;
                vec![
                    Action::CancelTimer(TimerKind::ConnectRetry),
                    Action::SendMessage(self.open_message()),
                    Action::ArmTimer {
                        kind: TimerKind::Hold,
                        duration: INITIAL_HOLD_TIME,
                    },
                ]
            }
            (State::Connect | State::Active, Event::ConnectRetryTimerExpires) => {
                self.connect_retry_count += 1;
                vec![
                    Action::ArmTimer {
                        kind: TimerKind::ConnectRetry,
                        duration: DEFAULT_CONNECT_RETRY_TIME,
                    },
                    Action::OpenTcpConnection,
                ]
            }
            (State::Connect, Event::TcpConnectionFails) => {
                self.state = State::Active;
                Vec::new()
            }
            (State::Active, Event::TcpConnectionFails) => Vec::new(),
            (State::Connect | State::Active, Event::ManualStop) => {
                self.state = State::Idle;
                vec![Action::CancelTimer(TimerKind::ConnectRetry), Action::CloseTransport]
            }

            (State::OpenSent, Event::BgpMessage(Message::Open(open))) => {
                self.on_open_received(&open)
            }
            (State::OpenSent, Event::HoldTimerExpires) => self.hold_expired(),
            (State::OpenSent, Event::BgpMessage(Message::Notification(_))) => self.peer_closed(),
            (State::OpenSent, Event::ManualStop) => self.manual_stop_established_style(),
            (State::OpenSent, _) => self.fsm_error(),

            (State::OpenConfirm, Event::BgpMessage(Message::Keepalive)) => {
                self.state = State::Established;
                vec![Action::ArmTimer {
                    kind: TimerKind::Hold,
                    duration: self.hold_duration(),
                }]
            }
            (State::OpenConfirm, Event::BgpMessage(Message::Notification(_))) => {
                self.peer_closed()
            }
            (State::OpenConfirm, Event::HoldTimerExpires) => self.hold_expired(),
            (State::OpenConfirm, Event::KeepaliveTimerExpires) => self.send_keepalive(),
            (State::OpenConfirm, Event::ManualStop) => self.manual_stop_established_style(),
            (State::OpenConfirm, _) => self.fsm_error(),

            (State::Established, Event::BgpMessage(Message::Keepalive)) => {
                vec![Action::ArmTimer {
                    kind: TimerKind::Hold,
                    duration: self.hold_duration(),
                }]
            }
            (State::Established, Event::BgpMessage(Message::Update(update))) => {
                vec![
                    Action::ArmTimer {
                        kind: TimerKind::Hold,
                        duration: self.hold_duration(),
                    },
                    Action::DeliverUpdate(update),
                ]
            }
            (State::Established, Event::BgpMessage(Message::Notification(_))) => {
                self.peer_closed()
            }
            (State::Established, Event::KeepaliveTimerExpires) => self.send_keepalive(),
            (State::Established, Event::HoldTimerExpires) => self.hold_expired(),
            (State::Established, Event::ManualStop) => self.manual_stop_established_style(),
            (State::Established, _) => self.fsm_error(),

            // Any event not matched above for the current state: the
            // default transition spec §4.3 prescribes.
            (_, Event::ManualStop) => {
                self.state = State::Idle;
                Vec::new()
            }
            _ => self.fsm_error(),
        }
    }

    fn open_message(&self) -> Message {
        Message::Open(Open::new(
            self.config.local_as,
            self.config.configured_hold_time,
            self.config.router_id,
        ))
    }

    fn hold_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.negotiated_hold_time))
    }

    fn keepalive_interval(&self) -> Duration {
        let seconds = self.negotiated_hold_time / 3;
        Duration::from_secs(u64::from(seconds)).max(MIN_KEEPALIVE_INTERVAL)
    }

    /// Validate a just-received OPEN against this peer's configuration
    /// (spec §4.3 `OpenSent`): version, hold time, BGP identifier, and
    /// (if configured) the peer's AS.
    fn validate_open(&self, open: &Open) -> Result<(), OpenValidationError> {
        if open.version != crate::bgp::BGP_VERSION {
            return Err(OpenValidationError::UnsupportedVersionNumber(open.version));
        }
        if open.hold_time != 0 && open.hold_time < 3 {
            return Err(OpenValidationError::UnacceptableHoldTime(open.hold_time));
        }
        if open.bgp_identifier == self.config.router_id
            || open.bgp_identifier == Ipv4Addr::UNSPECIFIED
        {
            return Err(OpenValidationError::BadBgpIdentifier);
        }
        if let Some(expected_as) = self.config.remote_as {
            if open.my_as != expected_as {
                return Err(OpenValidationError::BadPeerAs);
            }
        }
        Ok(())
    }

    fn on_open_received(&mut self, open: &Open) -> Vec<Action> {
        if let Err(e) = self.validate_open(open) {
            self.state = State::Idle;
            return vec![
                Action::SendMessage(Message::Notification(e.to_notification())),
                Action::CloseTransport,
            ];
        }
        self.negotiated_hold_time = self.config.configured_hold_time.min(open.hold_time);
        self.peer_type = if open.my_as == self.config.local_as {
            PeerType::Internal
        } else {
            PeerType::External
        };
        self.state = State::OpenConfirm;
        let mut actions = vec![Action::SendMessage(Message::Keepalive)];
        if self.negotiated_hold_time == 0 {
            actions.push(Action::CancelTimer(TimerKind::Hold));
            actions.push(Action::CancelTimer(TimerKind::Keepalive));
        } else {
            actions.push(Action::ArmTimer {
                kind: TimerKind::Hold,
                duration: self.hold_duration(),
            });
            actions.push(Action::ArmTimer {
                kind: TimerKind::Keepalive,
                duration: self.keepalive_interval(),
            });
        }
        actions
    }

    fn send_keepalive(&self) -> Vec<Action> {
        vec![
            Action::SendMessage(Message::Keepalive),
            Action::ArmTimer {
                kind: TimerKind::Keepalive,
                duration: self.keepalive_interval(),
            },
        ]
    }

    fn hold_expired(&mut self) -> Vec<Action> {
        self.state = State::Idle;
        vec![
            Action::SendMessage(Message::Notification(Notification::new(
                NotificationErrorCode::HoldTimerExpired,
                0,
                Bytes::new(),
            ))),
            Action::CloseTransport,
        ]
    }

    fn peer_closed(&mut self) -> Vec<Action> {
        self.state = State::Idle;
        vec![Action::CloseTransport]
    }

    fn fsm_error(&mut self) -> Vec<Action> {
        self.state = State::Idle;
        vec![
            Action::SendMessage(Message::Notification(Notification::new(
                NotificationErrorCode::FiniteStateMachineError,
                0,
                Bytes::new(),
            ))),
            Action::CloseTransport,
        ]
    }

    /// `ManualStop` is the cancellation primitive (spec §5): it always
    /// emits Cease, then closes, then returns to `Idle`, from any
    /// connected state.
    fn manual_stop_established_style(&mut self) -> Vec<Action> {
        self.state = State::Idle;
        vec![
            Action::SendMessage(Message::Notification(Notification::new(
                NotificationErrorCode::Cease,
                crate::bgp::CeaseSubcode::AdministrativeShutdown as u8,
                Bytes::new(),
            ))),
            Action::CloseTransport,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgp::{MessageHeaderErrorSubcode, Open as BgpOpen};

    fn local_config(hold: u16, remote_as: Option<u16>) -> PeerConfig {
        PeerConfig::new(
            65000,
            hold,
            Ipv4Addr::new(10, 0, 0, 1),
            "192.0.2.1:179".parse().unwrap(),
            remote_as,
        )
        .unwrap()
    }

    fn peer_open(asn: u16, hold_time: u16, id: Ipv4Addr) -> Message {
        Message::Open(BgpOpen::new(asn, hold_time, id))
    }

    #[test]
    fn invalid_configured_hold_time_rejected_at_construction() {
        let err = PeerConfig::new(
            65000,
            2,
            Ipv4Addr::new(10, 0, 0, 1),
            "192.0.2.1:179".parse().unwrap(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, InvalidHoldTime(2));
    }

    #[test]
    fn full_handshake_negotiates_min_hold_and_keepalive_third() {
        // Spec §8 S6: configured 3s, peer offers 9s -> negotiated min == 3.
        let mut session = PeerSession::new(local_config(3, None));
        let actions = session.step(Event::ManualStart);
        assert_eq!(session.state(), State::Connect);
        assert!(matches!(actions[1], Action::OpenTcpConnection));

        let actions = session.step(Event::TcpConnectionConfirmed);
        assert_eq!(session.state(), State::OpenSent);
        assert!(matches!(actions[1], Action::SendMessage(Message::Open(_))));

        let actions = session.step(Event::BgpMessage(peer_open(
            64512,
            9,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        assert_eq!(session.state(), State::OpenConfirm);
        assert_eq!(session.negotiated_hold_time(), 3);
        assert_eq!(session.peer_type(), PeerType::External);
        assert!(matches!(actions[0], Action::SendMessage(Message::Keepalive)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::ArmTimer {
                kind: TimerKind::Keepalive,
                duration
            } if *duration == MIN_KEEPALIVE_INTERVAL
        )));

        let actions = session.step(Event::BgpMessage(Message::Keepalive));
        assert_eq!(session.state(), State::Established);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::ArmTimer { kind: TimerKind::Hold, duration } if duration.as_secs() == 3
        )));
    }

    #[test]
    fn spec_s6_matching_hold_times_negotiate_unchanged() {
        // spec.md S6: local configures hold=9, peer offers hold=9 -> min == 9.
        let mut session = PeerSession::new(local_config(9, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        session.step(Event::BgpMessage(peer_open(
            64512,
            9,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        assert_eq!(session.negotiated_hold_time(), 9);
        assert_eq!(session.keepalive_interval(), Duration::from_secs(3));
    }

    #[test]
    fn zero_hold_time_disables_timers() {
        let mut session = PeerSession::new(local_config(0, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        let actions = session.step(Event::BgpMessage(peer_open(
            64512,
            0,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        assert_eq!(session.negotiated_hold_time(), 0);
        assert!(actions.contains(&Action::CancelTimer(TimerKind::Hold)));
        assert!(actions.contains(&Action::CancelTimer(TimerKind::Keepalive)));
    }

    #[test]
    fn internal_peer_classified_when_as_matches() {
        let mut session = PeerSession::new(local_config(90, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        session.step(Event::BgpMessage(peer_open(
            65000,
            90,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        assert_eq!(session.peer_type(), PeerType::Internal);
    }

    #[test]
    fn bad_peer_as_when_configured_mismatches_rejected() {
        let mut session = PeerSession::new(local_config(90, Some(64512)));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        let actions = session.step(Event::BgpMessage(peer_open(
            64513,
            90,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        assert_eq!(session.state(), State::Idle);
        let Action::SendMessage(Message::Notification(n)) = &actions[0] else {
            panic!("expected a NOTIFICATION action");
        };
        assert_eq!(
            n.known_error_code(),
            Some(NotificationErrorCode::OpenMessageError)
        );
        assert_eq!(n.error_subcode, 2);
    }

    #[test]
    fn bgp_identifier_equal_to_local_is_rejected() {
        let mut session = PeerSession::new(local_config(90, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        let actions = session.step(Event::BgpMessage(peer_open(
            64512,
            90,
            Ipv4Addr::new(10, 0, 0, 1),
        )));
        assert_eq!(session.state(), State::Idle);
        assert!(matches!(actions[1], Action::CloseTransport));
    }

    #[test]
    fn hold_timer_expiry_in_open_sent_sends_hold_timer_expired_and_closes() {
        let mut session = PeerSession::new(local_config(90, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        let actions = session.step(Event::HoldTimerExpires);
        assert_eq!(session.state(), State::Idle);
        let Action::SendMessage(Message::Notification(n)) = &actions[0] else {
            panic!("expected a NOTIFICATION action");
        };
        assert_eq!(
            n.known_error_code(),
            Some(NotificationErrorCode::HoldTimerExpired)
        );
        assert!(matches!(actions[1], Action::CloseTransport));
    }

    #[test]
    fn unexpected_message_in_open_sent_is_fsm_error() {
        let mut session = PeerSession::new(local_config(90, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        let actions = session.step(Event::BgpMessage(Message::Keepalive));
        assert_eq!(session.state(), State::Idle);
        let Action::SendMessage(Message::Notification(n)) = &actions[0] else {
            panic!("expected a NOTIFICATION action");
        };
        assert_eq!(
            n.known_error_code(),
            Some(NotificationErrorCode::FiniteStateMachineError)
        );
    }

    #[test]
    fn keepalive_resets_hold_timer_in_established() {
        let mut session = PeerSession::new(local_config(9, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        session.step(Event::BgpMessage(peer_open(
            64512,
            9,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        session.step(Event::BgpMessage(Message::Keepalive));
        assert_eq!(session.state(), State::Established);
        let actions = session.step(Event::BgpMessage(Message::Keepalive));
        assert!(actions.contains(&Action::ArmTimer {
            kind: TimerKind::Hold,
            duration: Duration::from_secs(9),
        }));
    }

    #[test]
    fn manual_stop_from_established_sends_cease() {
        let mut session = PeerSession::new(local_config(9, None));
        session.step(Event::ManualStart);
        session.step(Event::TcpConnectionConfirmed);
        session.step(Event::BgpMessage(peer_open(
            64512,
            9,
            Ipv4Addr::new(192, 0, 2, 99),
        )));
        session.step(Event::BgpMessage(Message::Keepalive));
        let actions = session.step(Event::ManualStop);
        assert_eq!(session.state(), State::Idle);
        let Action::SendMessage(Message::Notification(n)) = &actions[0] else {
            panic!("expected a NOTIFICATION action");
        };
        assert_eq!(n.known_error_code(), Some(NotificationErrorCode::Cease));
    }

    #[test]
    fn tcp_connection_fails_in_connect_falls_back_to_active() {
        let mut session = PeerSession::new(local_config(90, None));
        session.step(Event::ManualStart);
        assert_eq!(session.state(), State::Connect);
        session.step(Event::TcpConnectionFails);
        assert_eq!(session.state(), State::Active);
    }

    #[test]
    fn notification_header_error_subcode_constant_matches_rfc() {
        assert_eq!(MessageHeaderErrorSubcode::BadMessageType as u8, 3);
    }
}
