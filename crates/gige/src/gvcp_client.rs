//! GVCP-C: the control client side of the protocol, including UDP broadcast
//! discovery.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use gige_proto::{AckHeader, AckStatus, CommandFlags, CommandHeader, GvcpCommand};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::GigeError;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 4;
const DISCOVERY_PORT: u16 = 3956;

/// A device found by broadcast discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub ip: Ipv4Addr,
    pub mac: [u8; 6],
    pub manufacturer: String,
    pub model: String,
}

/// Broadcast a GVCP discovery request on every non-loopback IPv4 interface
/// and collect replies for `wait` before returning.
pub async fn discover(wait: Duration) -> Result<Vec<DeviceInfo>, GigeError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;

    let header = CommandHeader {
        flags: CommandFlags::ACK_REQUIRED,
        command: GvcpCommand::Discovery,
        length: 0,
        request_id: 0xFFFF,
    };
    let packet = header.encode(&[]);
    socket
        .send_to(&packet, (Ipv4Addr::BROADCAST, DISCOVERY_PORT))
        .await?;

    let mut found = Vec::new();
    let mut buf = [0u8; 2048];
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, src))) => {
                if let Ok((ack, payload)) = AckHeader::parse(&buf[..len]) {
                    if ack.command == GvcpCommand::Discovery && ack.status == AckStatus::Success {
                        if let Some(info) = parse_discovery_payload(payload, src) {
                            if !found.contains(&info) {
                                found.push(info);
                            }
                        }
                    }
                }
            }
            Ok(Err(err)) => {
                warn!(?err, "discovery: recv error");
                break;
            }
            Err(_) => break,
        }
    }
    Ok(found)
}

fn parse_discovery_payload(payload: &[u8], src: SocketAddr) -> Option<DeviceInfo> {
    if payload.len() < 248 {
        return None;
    }
    let ip = match src.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => return None,
    };
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&payload[10..16]);
    let manufacturer = read_cstr(&payload[72..104]);
    let model = read_cstr(&payload[104..136]);
    Some(DeviceInfo {
        ip,
        mac,
        manufacturer,
        model,
    })
}

fn read_cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// A connected GVCP control client.
pub struct GvcpClient {
    socket: UdpSocket,
    remote: SocketAddr,
    request_id: u16,
}

impl GvcpClient {
    /// Connect to a device's control port.
    pub async fn connect(remote: SocketAddr) -> Result<Self, GigeError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect(remote).await?;
        Ok(GvcpClient {
            socket,
            remote,
            request_id: 1,
        })
    }

    fn next_request_id(&mut self) -> u16 {
        let id = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);
        id
    }

    async fn transact(&mut self, command: GvcpCommand, payload: &[u8]) -> Result<bytes::Bytes, GigeError> {
        let request_id = self.next_request_id();
        let header = CommandHeader {
            flags: CommandFlags::ACK_REQUIRED,
            command,
            length: payload.len() as u16,
            request_id,
        };
        let packet = header.encode(payload);

        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            self.socket.send(&packet).await?;
            let mut buf = [0u8; 2048];
            match timeout(CONTROL_TIMEOUT, self.socket.recv(&mut buf)).await {
                Ok(Ok(len)) => match AckHeader::parse(&buf[..len]) {
                    Ok((ack, ack_payload)) if ack.request_id == request_id => {
                        debug!(?command, attempt, "gvcp-c: transaction complete");
                        if ack.status != AckStatus::Success {
                            return Err(GigeError::Status(ack.status));
                        }
                        return Ok(bytes::Bytes::copy_from_slice(ack_payload));
                    }
                    Ok(_) => continue,
                    Err(err) => last_err = Some(GigeError::from(err)),
                },
                Ok(Err(err)) => last_err = Some(GigeError::from(err)),
                Err(_) => last_err = Some(GigeError::Timeout(attempt)),
            }
        }
        Err(last_err.unwrap_or(GigeError::Timeout(MAX_RETRIES)))
    }

    /// Read a single 32-bit register.
    pub async fn read_register(&mut self, address: u32) -> Result<u32, GigeError> {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(address);
        let reply = self.transact(GvcpCommand::ReadRegister, &payload).await?;
        if reply.len() < 4 {
            return Err(GigeError::NoResponse);
        }
        Ok((&reply[..4]).get_u32())
    }

    /// Write a single 32-bit register.
    pub async fn write_register(&mut self, address: u32, value: u32) -> Result<(), GigeError> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32(address);
        payload.put_u32(value);
        self.transact(GvcpCommand::WriteRegister, &payload).await?;
        Ok(())
    }

    /// Read raw memory (used for string registers).
    pub async fn read_memory(&mut self, address: u32, length: u32) -> Result<bytes::Bytes, GigeError> {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32(address);
        payload.put_u32(length);
        self.transact(GvcpCommand::ReadMemory, &payload).await
    }

    /// Address of the remote device.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_payload_parses_manufacturer_and_mac() {
        let mut payload = vec![0u8; 256];
        payload[10..16].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        payload[72..84].copy_from_slice(b"Acme Vision\0");
        let src: SocketAddr = "192.168.1.50:3956".parse().unwrap();
        let info = parse_discovery_payload(&payload, src).expect("parsed");
        assert_eq!(info.mac, [1, 2, 3, 4, 5, 6]);
        assert_eq!(info.manufacturer, "Acme Vision");
        assert_eq!(info.ip, Ipv4Addr::new(192, 168, 1, 50));
    }
}
