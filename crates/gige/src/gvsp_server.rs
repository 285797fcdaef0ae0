//! GVSP-S: the streaming server side of the protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use gige_proto::gvsp::{encode_leader, encode_payload, encode_trailer, LeaderBody, TrailerBody};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::gvcp_server::StreamCommand;
use crate::image_source::ImageSource;
use crate::stats::StreamStats;
use crate::GigeError;

/// GVSP streaming server: paces frames from an [`ImageSource`] and
/// packetises them as Leader / Payload* / Trailer.
pub struct GvspServer {
    socket: UdpSocket,
    source: Box<dyn ImageSource>,
    frame_interval: Duration,
    block_id: u16,
    stats: Arc<StreamStats>,
    running: Arc<AtomicBool>,
}

impl GvspServer {
    /// Bind a new streaming server socket.
    pub async fn bind(
        bind_ip: std::net::Ipv4Addr,
        source: Box<dyn ImageSource>,
        frame_rate: f64,
    ) -> Result<Self, GigeError> {
        let socket = UdpSocket::bind((bind_ip, 0)).await?;
        Ok(GvspServer {
            socket,
            source,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate.max(0.001)),
            block_id: 0,
            stats: Arc::new(StreamStats::default()),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared stats handle for diagnostics.
    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    /// Consume start/stop commands from the control server and stream while
    /// acquisition is active.
    pub async fn drive(&mut self, mut commands: mpsc::Receiver<StreamCommand>) -> Result<(), GigeError> {
        let mut dest: Option<(SocketAddr, u16)> = None;
        loop {
            if self.running.load(Ordering::Relaxed) {
                match tokio::time::timeout(self.frame_interval, commands.recv()).await {
                    Ok(Some(StreamCommand::Start { dest: d, packet_size })) => {
                        dest = Some((d, packet_size));
                        self.running.store(true, Ordering::Relaxed);
                    }
                    Ok(Some(StreamCommand::Stop)) => {
                        self.running.store(false, Ordering::Relaxed);
                    }
                    Ok(None) => return Ok(()),
                    Err(_timeout) => {
                        if let Some((addr, packet_size)) = dest {
                            self.send_frame(addr, packet_size).await?;
                        }
                    }
                }
            } else {
                match commands.recv().await {
                    Some(StreamCommand::Start { dest: d, packet_size }) => {
                        dest = Some((d, packet_size));
                        self.running.store(true, Ordering::Relaxed);
                        info!(%d, "gvsp: acquisition started");
                    }
                    Some(StreamCommand::Stop) => {}
                    None => return Ok(()),
                }
            }
        }
    }

    /// Send a single frame immediately, bypassing pacing. Used by tests and
    /// by `drive`'s internal loop.
    pub(crate) async fn send_frame(&mut self, dest: SocketAddr, packet_size: u16) -> Result<(), GigeError> {
        let start = Instant::now();
        let frame = self.source.next_frame();
        let block_id = self.block_id;
        self.block_id = self.block_id.wrapping_add(1);

        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        let leader = LeaderBody {
            payload_type: 1,
            timestamp_ns,
            pixel_format: frame.pixel_format,
            width: frame.width,
            height: frame.height,
            offset_x: 0,
            offset_y: 0,
            padding_x: 0,
            padding_y: 0,
        };
        self.socket
            .send_to(&encode_leader(block_id, &leader), dest)
            .await?;

        let chunk_size = (packet_size as usize).saturating_sub(8).max(1);
        let mut packet_id: u32 = 1;
        let mut sent_packets = 0u64;
        for chunk in frame.data.chunks(chunk_size) {
            self.socket
                .send_to(&encode_payload(block_id, packet_id, chunk), dest)
                .await?;
            packet_id += 1;
            sent_packets += 1;
        }

        let trailer = TrailerBody {
            payload_type: 1,
            size_y: frame.height,
        };
        self.socket
            .send_to(&encode_trailer(block_id, &trailer), dest)
            .await?;

        self.stats.record_frame(block_id, sent_packets);
        debug!(block_id, sent_packets, "gvsp: frame sent");

        let elapsed = start.elapsed();
        if elapsed < self.frame_interval {
            tokio::time::sleep(self.frame_interval - elapsed).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::TestPatternSource;

    #[tokio::test]
    async fn sends_leader_payloads_and_trailer_for_one_frame() {
        let mut server = GvspServer::bind(
            std::net::Ipv4Addr::LOCALHOST,
            Box::new(TestPatternSource::new(64, 48)),
            1000.0,
        )
        .await
        .unwrap();

        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        server.send_frame(dest, 1500).await.unwrap();

        let mut seen_leader = false;
        let mut seen_trailer = false;
        let mut payload_count = 0;
        let mut buf = [0u8; 2048];
        loop {
            let (len, _) =
                tokio::time::timeout(Duration::from_millis(200), receiver.recv_from(&mut buf))
                    .await
                    .expect("recv")
                    .unwrap();
            let (header, _) = gige_proto::GvspHeader::parse(&buf[..len]).unwrap();
            match header.format {
                gige_proto::PacketFormat::Leader => seen_leader = true,
                gige_proto::PacketFormat::Trailer => {
                    seen_trailer = true;
                    break;
                }
                gige_proto::PacketFormat::Payload => payload_count += 1,
                gige_proto::PacketFormat::AllIn => unreachable!(),
            }
        }
        assert!(seen_leader);
        assert!(seen_trailer);
        assert_eq!(payload_count, (64 * 48 * 3_usize).div_ceil(1500 - 8));
    }
}
