//! Fire-and-forget multicast publisher

use crate::config::MulticastGroup;
use anyhow::{Context, Result};
use dashd_core::Publisher;
use dashd_types::{encode_event, Domain, Event};
use log::{trace, warn};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

/// Sends encoded events to one multicast group
///
/// Delivery is best-effort: a failed send is logged and the event dropped.
pub struct MulticastSender {
    socket: UdpSocket,
    target: SocketAddr,
    domain: Domain,
}

impl MulticastSender {
    pub fn new(group: MulticastGroup, port: u16, domain: Domain) -> Result<Self> {
        let socket = match group {
            MulticastGroup::V4(_) => {
                let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
                    .context("Failed to create IPv4 sender socket")?;
                socket.set_multicast_loop_v4(true)?;
                socket
            }
            MulticastGroup::V6(_) => {
                let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))
                    .context("Failed to create IPv6 sender socket")?;
                socket.set_multicast_loop_v6(true)?;
                socket
            }
        };

        Ok(Self::from_socket(socket, group.socket_addr(port), domain))
    }

    /// Sender over an already configured socket
    pub(crate) fn from_socket(socket: UdpSocket, target: SocketAddr, domain: Domain) -> Self {
        Self { socket, target, domain }
    }

    /// Address every datagram is sent to
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Transmit one raw datagram
    fn send_datagram(&self, datagram: &[u8]) {
        match self.socket.send_to(datagram, self.target) {
            Ok(sent) => trace!("Sent {} byte datagram to {}", sent, self.target),
            Err(e) => warn!("Failed to send datagram to {}: {}", self.target, e),
        }
    }
}

impl Publisher for MulticastSender {
    fn publish(&mut self, event: &Event) {
        match encode_event(&self.domain, event) {
            Ok(datagram) => self.send_datagram(&datagram),
            Err(e) => warn!("Failed to encode {} event for \"{}\": {}", event.message_type(), event.sensor_name(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashd_types::{decode_event, MessageType, OfflineReason, SensorState};
    use std::time::Duration;

    fn loopback_pair() -> (MulticastSender, UdpSocket) {
        let listener = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let target = listener.local_addr().unwrap();
        let sender = MulticastSender::from_socket(socket, target, Domain::new(9001, "lab host"));
        (sender, listener)
    }

    fn receive(listener: &UdpSocket) -> Vec<u8> {
        let mut buffer = [0u8; 2048];
        let (len, _) = listener.recv_from(&mut buffer).unwrap();
        buffer[..len].to_vec()
    }

    #[test]
    fn test_published_event_arrives_decodable() {
        let (mut sender, listener) = loopback_pair();
        assert_eq!(sender.target(), listener.local_addr().unwrap());

        sender.publish(&Event::Sensor {
            sensor_name: "raid/md0".to_string(),
            state: SensorState::Critical,
            message: "disk sdb failed: 1 of 2".to_string(),
        });

        let received = decode_event(&receive(&listener)).unwrap().unwrap();
        assert_eq!(received.domain, Domain::new(9001, "lab host"));
        assert_eq!(received.kind, MessageType::Sensor);
        assert_eq!(received.sensor_name.as_deref(), Some("raid/md0"));
        assert_eq!(received.sensor_state, Some(SensorState::Critical));
        assert_eq!(received.sensor_message.as_deref(), Some("disk sdb failed: 1 of 2"));
    }

    #[test]
    fn test_offline_event_carries_only_the_name() {
        let (mut sender, listener) = loopback_pair();

        sender.publish(&Event::Offline {
            sensor_name: "cpu".to_string(),
            reason: OfflineReason::Overdue,
        });

        let payload = receive(&listener);
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["type"], "offline");
        assert_eq!(json["domain_id"], "9001");
        assert!(json.get("sensor_state").is_none());

        let received = decode_event(&payload).unwrap().unwrap();
        assert_eq!(received.kind, MessageType::Offline);
        assert_eq!(received.sensor_name.as_deref(), Some("cpu"));
    }
}
