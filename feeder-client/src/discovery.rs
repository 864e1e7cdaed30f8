//! One-shot beacon discovery. The feeder periodically multicasts its
//! TCP port as an ASCII decimal string; the first datagram received
//! resolves the endpoint and the listener leaves the group again.

use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;

use feeder_proto::protocol::{BEACON_PORT, MULTICAST_GROUP};

/// Resolved device address. Created once per client lifetime and
/// read-only thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub host: IpAddr,
    pub port: u16,
}

/// Discovery progress as observed by the session client. `Failed` is
/// terminal; discovery is attempted exactly once, with no retry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    #[default]
    Pending,
    Ready(Endpoint),
    Failed(String),
}

/// Block until exactly one beacon arrives on the well-known port.
pub async fn listen_for_beacon() -> Result<Endpoint> {
    listen_on(BEACON_PORT).await
}

/// Port-parameterised variant, also used by tests.
pub async fn listen_on(port: u16) -> Result<Endpoint> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("failed to bind beacon socket on port {port}"))?;
    socket
        .join_multicast_v4(MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED)
        .with_context(|| format!("failed to join multicast group {MULTICAST_GROUP}"))?;

    tracing::info!("Listening for beacon on {}:{}", MULTICAST_GROUP, port);

    let mut buf = [0u8; 2048];
    let (len, from) = socket
        .recv_from(&mut buf)
        .await
        .context("beacon receive failed")?;

    // One-shot: leave the group as soon as the beacon is in hand.
    if let Err(e) = socket.leave_multicast_v4(MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED) {
        tracing::warn!("Failed to leave multicast group: {}", e);
    }

    let payload = std::str::from_utf8(&buf[..len]).context("beacon payload is not UTF-8")?;
    let device_port: u16 = payload
        .trim()
        .parse()
        .with_context(|| format!("beacon payload is not a port number: {payload:?}"))?;

    tracing::info!("Feeder announced itself at {}:{}", from.ip(), device_port);

    Ok(Endpoint {
        host: from.ip(),
        port: device_port,
    })
}
