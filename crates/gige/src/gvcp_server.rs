//! GVCP-S: the discovery/control server side of the protocol.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use gige_proto::{AckHeader, AckStatus, CommandHeader, GvcpCommand};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

use crate::config::GigeServerConfig;
use crate::register::{addr, RegisterEffect, RegisterStore};
use crate::GigeError;

/// Discovery payload size, per the GigE Vision bootstrap layout.
const DISCOVERY_PAYLOAD_SIZE: usize = 256;

/// Instruction sent from the control server to the streaming server.
#[derive(Debug, Clone, Copy)]
pub enum StreamCommand {
    Start { dest: SocketAddr, packet_size: u16 },
    Stop,
}

/// GVCP discovery/control server.
pub struct GvcpServer {
    socket: UdpSocket,
    store: Arc<Mutex<RegisterStore>>,
    stream_tx: mpsc::Sender<StreamCommand>,
    mac: [u8; 6],
    current_ip: Ipv4Addr,
}

impl GvcpServer {
    /// Bind a new control server and return it along with the receiving end
    /// the streaming server should poll for start/stop commands.
    pub async fn bind(
        config: &GigeServerConfig,
    ) -> Result<(Self, mpsc::Receiver<StreamCommand>), GigeError> {
        let bind_addr = SocketAddr::new(config.bind_ip.into(), config.gvcp_port);
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;

        let current_ip = if config.bind_ip.is_unspecified() {
            Ipv4Addr::new(192, 168, 1, 100)
        } else {
            config.bind_ip
        };

        let store = RegisterStore::new(
            config.mac,
            current_ip,
            &config.manufacturer,
            &config.model,
            "1.0",
            &config.serial,
            &config.user_name,
            config.heartbeat_timeout_ms,
        );

        let (stream_tx, stream_rx) = mpsc::channel(8);

        Ok((
            GvcpServer {
                socket,
                store: Arc::new(Mutex::new(store)),
                stream_tx,
                mac: config.mac,
                current_ip,
            },
            stream_rx,
        ))
    }

    /// Address this server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// A handle to the shared register store, for inspection/testing.
    pub fn store(&self) -> Arc<Mutex<RegisterStore>> {
        Arc::clone(&self.store)
    }

    /// Run the request/response loop until the socket is closed or an IO
    /// error occurs.
    pub async fn run(&self) -> Result<(), GigeError> {
        let mut buf = [0u8; 2048];
        loop {
            let (len, src) = self.socket.recv_from(&mut buf).await?;
            if let Err(err) = self.handle_packet(&buf[..len], src).await {
                warn!(?err, %src, "gvcp: failed to handle packet");
            }
        }
    }

    async fn handle_packet(&self, packet: &[u8], src: SocketAddr) -> Result<(), GigeError> {
        let (header, payload) = match CommandHeader::parse(packet) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(?err, %src, "gvcp: malformed packet");
                return Ok(());
            }
        };
        trace!(command = ?header.command, %src, "gvcp: request");

        {
            let mut store = self.store.lock().await;
            store.note_request(Instant::now());
        }

        match header.command {
            GvcpCommand::Discovery => self.handle_discovery(&header, src).await,
            GvcpCommand::ReadRegister => self.handle_read_register(&header, payload, src).await,
            GvcpCommand::WriteRegister => self.handle_write_register(&header, payload, src).await,
            GvcpCommand::ReadMemory => self.handle_read_memory(&header, payload, src).await,
            GvcpCommand::WriteMemory => {
                self.ack(&header, AckStatus::NotImplemented, &[], src).await
            }
        }
    }

    async fn handle_discovery(&self, header: &CommandHeader, src: SocketAddr) -> Result<(), GigeError> {
        let store = self.store.lock().await;
        let payload = build_discovery_payload(&store, self.mac, self.current_ip);
        drop(store);
        info!(%src, "gvcp: discovery");
        self.ack(header, AckStatus::Success, &payload, src).await
    }

    async fn handle_read_register(
        &self,
        header: &CommandHeader,
        payload: &[u8],
        src: SocketAddr,
    ) -> Result<(), GigeError> {
        if payload.len() % 4 != 0 {
            return self.ack(header, AckStatus::InvalidParameter, &[], src).await;
        }
        let store = self.store.lock().await;
        let mut out = BytesMut::with_capacity(payload.len());
        let mut cursor = payload;
        while cursor.has_remaining() {
            let address = cursor.get_u32();
            out.put_u32(store.read(address));
        }
        drop(store);
        self.ack(header, AckStatus::Success, &out, src).await
    }

    async fn handle_write_register(
        &self,
        header: &CommandHeader,
        payload: &[u8],
        src: SocketAddr,
    ) -> Result<(), GigeError> {
        if payload.len() % 8 != 0 {
            return self.ack(header, AckStatus::InvalidParameter, &[], src).await;
        }
        let mut effects = Vec::new();
        let written;
        {
            let mut store = self.store.lock().await;
            let mut cursor = payload;
            let mut count = 0u32;
            while cursor.has_remaining() {
                let address = cursor.get_u32();
                let value = cursor.get_u32();
                effects.push(store.write(address, value));
                count += 1;
            }
            written = count;
        }
        self.apply_effects(&effects).await;
        let mut out = BytesMut::with_capacity(4);
        out.put_u32(written);
        self.ack(header, AckStatus::Success, &out, src).await
    }

    async fn handle_read_memory(
        &self,
        header: &CommandHeader,
        payload: &[u8],
        src: SocketAddr,
    ) -> Result<(), GigeError> {
        if payload.len() != 8 {
            return self.ack(header, AckStatus::InvalidParameter, &[], src).await;
        }
        let mut cursor = payload;
        let address = cursor.get_u32();
        let length = cursor.get_u32() as usize;
        let store = self.store.lock().await;
        let bytes = store.read_string(address, length);
        drop(store);
        self.ack(header, AckStatus::Success, &bytes, src).await
    }

    async fn apply_effects(&self, effects: &[RegisterEffect]) {
        for effect in effects {
            let cmd = match effect {
                RegisterEffect::AcquisitionStart => {
                    let store = self.store.lock().await;
                    let dest = SocketAddr::new(
                        store.stream_dest_ip().into(),
                        store.stream_dest_port(),
                    );
                    let packet_size = store.stream_packet_size();
                    drop(store);
                    info!(%dest, "gvcp: acquisition start");
                    Some(StreamCommand::Start { dest, packet_size })
                }
                RegisterEffect::AcquisitionStop => {
                    info!("gvcp: acquisition stop");
                    Some(StreamCommand::Stop)
                }
                RegisterEffect::None => None,
            };
            if let Some(cmd) = cmd {
                let _ = self.stream_tx.send(cmd).await;
            }
        }
    }

    async fn ack(
        &self,
        header: &CommandHeader,
        status: AckStatus,
        payload: &[u8],
        src: SocketAddr,
    ) -> Result<(), GigeError> {
        let ack = AckHeader {
            status,
            command: header.command,
            length: payload.len() as u16,
            request_id: header.request_id,
        };
        let encoded = ack.encode(payload);
        self.socket.send_to(&encoded, src).await?;
        debug!(?status, %src, "gvcp: ack sent");
        Ok(())
    }

    /// Poll the register store and auto-clear control privilege on
    /// heartbeat timeout. Intended to be driven by a periodic tick.
    pub async fn check_heartbeat(&self) {
        let mut store = self.store.lock().await;
        if store.heartbeat_expired(Instant::now()) {
            store.clear_privilege();
        }
    }

    /// Sleep for the given duration, checking the heartbeat periodically.
    /// Exposed so callers can drive the heartbeat loop alongside `run`.
    pub async fn heartbeat_tick_interval(&self) -> Duration {
        Duration::from_millis(250)
    }
}

fn build_discovery_payload(
    store: &RegisterStore,
    mac: [u8; 6],
    current_ip: Ipv4Addr,
) -> [u8; DISCOVERY_PAYLOAD_SIZE] {
    let mut payload = [0u8; DISCOVERY_PAYLOAD_SIZE];
    payload[0..4].copy_from_slice(&0x0002_0000u32.to_be_bytes());
    // device mode left at zero
    payload[10..16].copy_from_slice(&mac);
    payload[16..20].copy_from_slice(&0x0000_0003u32.to_be_bytes());
    payload[36..40].copy_from_slice(&current_ip.octets());
    payload[72..104].copy_from_slice(&store.read_string(addr::MANUFACTURER, 32));
    payload[104..136].copy_from_slice(&store.read_string(addr::MODEL, 32));
    payload[136..168].copy_from_slice(&store.read_string(addr::DEVICE_VERSION, 32));
    // manufacturer-info@168..216 left blank; not tracked separately from
    // manufacturer name in this implementation.
    payload[216..232].copy_from_slice(&store.read_string(addr::SERIAL, 16));
    payload[232..248].copy_from_slice(&store.read_string(addr::USER_NAME, 16));
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use gige_proto::{CommandFlags, GvcpCommand};

    async fn spawn_server() -> (GvcpServer, mpsc::Receiver<StreamCommand>) {
        let config = GigeServerConfig {
            bind_ip: Ipv4Addr::new(127, 0, 0, 1),
            gvcp_port: 0,
            ..GigeServerConfig::default()
        };
        GvcpServer::bind(&config).await.expect("bind")
    }

    #[tokio::test]
    async fn discovery_reply_has_current_ip_at_offset_36() {
        let (server, _rx) = spawn_server().await;
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let header = CommandHeader {
            flags: CommandFlags::ACK_REQUIRED,
            command: GvcpCommand::Discovery,
            length: 0,
            request_id: 0xFFFF,
        };
        let req = header.encode(&[]);
        client.send_to(&req, addr).await.unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 8 + DISCOVERY_PAYLOAD_SIZE);
        let ip_bytes = &buf[8 + 36..8 + 40];
        assert_eq!(ip_bytes, &[127, 0, 0, 1]);
    }

    #[tokio::test]
    async fn write_then_read_register_round_trips() {
        let (server, _rx) = spawn_server().await;
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let mut payload = BytesMut::new();
        payload.put_u32(addr::SC0_PORT);
        payload.put_u32(50123);
        let header = CommandHeader {
            flags: CommandFlags::ACK_REQUIRED,
            command: GvcpCommand::WriteRegister,
            length: payload.len() as u16,
            request_id: 1,
        };
        client
            .send_to(&header.encode(&payload), addr)
            .await
            .unwrap();
        let mut buf = [0u8; 256];
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let (ack, _) = AckHeader::parse(&buf[..len]).unwrap();
        assert_eq!(ack.status, AckStatus::Success);

        let mut read_payload = BytesMut::new();
        read_payload.put_u32(addr::SC0_PORT);
        let header = CommandHeader {
            flags: CommandFlags::ACK_REQUIRED,
            command: GvcpCommand::ReadRegister,
            length: read_payload.len() as u16,
            request_id: 2,
        };
        client
            .send_to(&header.encode(&read_payload), addr)
            .await
            .unwrap();
        let (len, _) = client.recv_from(&mut buf).await.unwrap();
        let (_, payload) = AckHeader::parse(&buf[..len]).unwrap();
        assert_eq!(&payload[..4], &50123u32.to_be_bytes());
    }
}
