//! Multicast listener for published events

use crate::config::MulticastGroup;
use anyhow::{Context, Result};
use dashd_types::{decode_event, ReceivedEvent};
use log::{debug, warn};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Largest datagram accepted
const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// Joins a multicast group and yields the events published on it
pub struct Receiver {
    socket: UdpSocket,
    group: MulticastGroup,
    buffer: Vec<u8>,
}

impl Receiver {
    pub async fn bind(group: MulticastGroup, port: u16) -> Result<Self> {
        let socket = match group {
            MulticastGroup::V4(addr) => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
                    .await
                    .with_context(|| format!("Failed to bind UDP port {}", port))?;
                socket
                    .join_multicast_v4(addr, Ipv4Addr::UNSPECIFIED)
                    .with_context(|| format!("Failed to join {}", group))?;
                socket
            }
            MulticastGroup::V6(addr) => {
                let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port))
                    .await
                    .with_context(|| format!("Failed to bind UDP port {}", port))?;
                socket
                    .join_multicast_v6(&addr, 0)
                    .with_context(|| format!("Failed to join {}", group))?;
                socket
            }
        };

        Ok(Self::from_socket(socket, group))
    }

    /// Receiver over a socket that is already bound (and joined)
    pub(crate) fn from_socket(socket: UdpSocket, group: MulticastGroup) -> Self {
        Self {
            socket,
            group,
            buffer: vec![0; MAX_DATAGRAM_SIZE],
        }
    }

    pub fn group(&self) -> MulticastGroup {
        self.group
    }

    /// Wait for the next event that decodes cleanly
    ///
    /// Undecodable datagrams and unknown message types are skipped.
    pub async fn recv(&mut self) -> Result<(ReceivedEvent, SocketAddr)> {
        loop {
            let (len, from) = self.socket.recv_from(&mut self.buffer).await?;
            match decode_event(&self.buffer[..len]) {
                Ok(Some(event)) => return Ok((event, from)),
                Ok(None) => debug!("Ignoring datagram with unknown type from {}", from),
                Err(e) => warn!("Undecodable datagram from {}: {}", from, e),
            }
        }
    }
}
