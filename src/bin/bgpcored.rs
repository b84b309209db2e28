//! A minimal BGP-4 speaker daemon: one peer, dialed out or accepted, run
//! to completion against the library's FSM and codec.

// SPDX-License-Identifier: AGPL-3.0-or-later

use bgpcore::fsm::PeerConfig;
use bgpcore::rib::LoggingRib;
use bgpcore::runtime;
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};

/// Command line arguments.
#[derive(Parser, Debug)]
struct BgpCored {
    /// Our AS number.
    #[arg(long)]
    local_as: u16,
    /// Our BGP router ID.
    #[arg(long)]
    local_id: Ipv4Addr,
    /// Hold time we advertise in our OPEN, in seconds (0 disables the
    /// hold/keepalive timers entirely).
    #[arg(long, default_value = "180")]
    hold_time: u16,
    /// The peer's address. In passive mode this is only used to validate
    /// which connections to accept is out of scope here; the daemon
    /// accepts whoever connects to `--listen-addr`.
    #[arg(long)]
    peer_addr: SocketAddr,
    /// The peer's AS number, if known in advance. Leave unset to accept
    /// any AS (this speaker never iBGP/eBGP-gates on it beyond logging).
    #[arg(long)]
    peer_as: Option<u16>,
    /// Listen for an incoming connection instead of dialing out.
    #[arg(short = 'p', long)]
    passive: bool,
    /// Local address to listen on, in passive mode.
    #[arg(short = 'l', long, default_value = "0.0.0.0:179")]
    listen_addr: SocketAddr,
    /// Verbose (debug-level) logging.
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn setup_logger(level: log::LevelFilter) {
    let config = simplelog::ConfigBuilder::new()
        .set_time_format_rfc3339()
        .build();
    simplelog::TermLogger::init(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("failed to initialize logger");
}

#[tokio::main]
async fn main() {
    let args = BgpCored::parse();
    setup_logger(if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let config = PeerConfig::new(
        args.local_as,
        args.hold_time,
        args.local_id,
        args.peer_addr,
        args.peer_as,
    )
    .expect("invalid hold time");

    let mut rib = LoggingRib;
    let result = if args.passive {
        log::info!("listening on {}", args.listen_addr);
        runtime::run_passive_session(args.listen_addr, config, &mut rib).await
    } else {
        log::info!("connecting to {}", args.peer_addr);
        runtime::run_active_session(config, &mut rib).await
    };
    if let Err(e) = result {
        log::error!("session with {} ended: {e}", args.peer_addr);
    }
}
