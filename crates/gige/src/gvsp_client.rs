//! GVSP-C: the stream receiver side of the protocol.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gige_proto::gvsp::{LeaderBody, TrailerBody};
use gige_proto::{GvspHeader, PacketFormat, PixelFormat};
use tokio::net::UdpSocket;
use tracing::{trace, warn};

use crate::stats::ReceiveStats;
use crate::GigeError;

/// A fully assembled image delivered to the caller.
#[derive(Debug, Clone)]
pub struct AssembledFrame {
    pub block_id: u16,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub timestamp_ns: u64,
    pub data: Vec<u8>,
}

struct InFlightBlock {
    block_id: u16,
    leader: LeaderBody,
    packets: BTreeMap<u32, Vec<u8>>,
}

/// Receives and reassembles a GVSP stream.
pub struct GvspReceiver {
    socket: UdpSocket,
    current: Option<InFlightBlock>,
    stats: Arc<ReceiveStats>,
}

impl GvspReceiver {
    /// Bind a receiver socket to the given local port (0 for an ephemeral port).
    pub async fn bind(bind_ip: std::net::Ipv4Addr, port: u16) -> Result<Self, GigeError> {
        let socket = UdpSocket::bind((bind_ip, port)).await?;
        Ok(GvspReceiver {
            socket,
            current: None,
            stats: Arc::new(ReceiveStats::default()),
        })
    }

    /// Local address this receiver is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Stats handle for diagnostics.
    pub fn stats(&self) -> Arc<ReceiveStats> {
        Arc::clone(&self.stats)
    }

    /// Block until a full frame is assembled or `timeout` elapses.
    pub async fn recv_frame(&mut self, timeout: Duration) -> Result<AssembledFrame, GigeError> {
        tokio::time::timeout(timeout, self.recv_frame_inner())
            .await
            .map_err(|_| GigeError::NoResponse)?
    }

    async fn recv_frame_inner(&mut self) -> Result<AssembledFrame, GigeError> {
        let mut buf = [0u8; 65536];
        loop {
            let (len, _src) = self.socket.recv_from(&mut buf).await?;
            self.stats.record_packet();
            let (header, body) = match GvspHeader::parse(&buf[..len]) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(?err, "gvsp: malformed packet");
                    continue;
                }
            };
            trace!(block_id = header.block_id, format = ?header.format, "gvsp: packet");

            match header.format {
                PacketFormat::Leader => {
                    let leader = match LeaderBody::decode(body) {
                        Ok(l) => l,
                        Err(err) => {
                            warn!(?err, "gvsp: bad leader body");
                            continue;
                        }
                    };
                    self.current = Some(InFlightBlock {
                        block_id: header.block_id,
                        leader,
                        packets: BTreeMap::new(),
                    });
                }
                PacketFormat::Payload => {
                    if let Some(block) = self.current.as_mut() {
                        if block.block_id == header.block_id {
                            block.packets.insert(header.packet_id, body.to_vec());
                        }
                    }
                }
                PacketFormat::Trailer => {
                    let Some(block) = self.current.take() else {
                        continue;
                    };
                    if block.block_id != header.block_id {
                        self.stats.record_dropped();
                        continue;
                    }
                    let _trailer = TrailerBody::decode(body).ok();
                    let data: Vec<u8> = block
                        .packets
                        .into_values()
                        .flat_map(|p| p.into_iter())
                        .collect();
                    self.stats.record_assembled();
                    return Ok(AssembledFrame {
                        block_id: block.block_id,
                        width: block.leader.width,
                        height: block.leader.height,
                        pixel_format: block.leader.pixel_format,
                        timestamp_ns: block.leader.timestamp_ns,
                        data,
                    });
                }
                PacketFormat::AllIn => {
                    warn!("gvsp: ALL_IN packets are not supported");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gvsp_server::GvspServer;
    use crate::image_source::TestPatternSource;

    #[tokio::test]
    async fn receives_and_reassembles_one_frame() {
        let mut server = GvspServer::bind(
            std::net::Ipv4Addr::LOCALHOST,
            Box::new(TestPatternSource::new(64, 48)),
            1000.0,
        )
        .await
        .unwrap();
        let mut receiver = GvspReceiver::bind(std::net::Ipv4Addr::LOCALHOST, 0)
            .await
            .unwrap();
        let dest = receiver.local_addr().unwrap();

        let send_task = tokio::spawn(async move {
            server.send_frame(dest, 1500).await.unwrap();
        });

        let frame = receiver
            .recv_frame(Duration::from_secs(2))
            .await
            .expect("frame");
        send_task.await.unwrap();

        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.data.len(), 64 * 48 * 3);
    }
}
