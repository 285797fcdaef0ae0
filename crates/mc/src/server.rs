//! MC TCP server: accepts one client at a time, dispatches requests against
//! a shared device store, and drives the ladder engine on its own thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mc_proto::{build_response, parse_request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::McServerConfig;
use crate::device_store::DeviceStore;
use crate::dispatcher::dispatch;
use crate::engine::LadderEngine;
use crate::ladder::Instruction;
use crate::remote_state::RemoteState;

/// A running MC server: owns the device store, remote run/stop state, and
/// the ladder engine thread, and accepts TCP client connections.
pub struct McServer {
    listener: TcpListener,
    store: Arc<DeviceStore>,
    remote: Arc<RemoteState>,
    programs: Arc<Mutex<Vec<Vec<Instruction>>>>,
    cpu_model: String,
    scan_interval: Duration,
    running: Arc<AtomicBool>,
}

impl McServer {
    pub async fn bind(config: McServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind((config.bind_ip, config.port)).await?;
        Ok(McServer {
            listener,
            store: Arc::new(DeviceStore::new(config.series.into())),
            remote: Arc::new(RemoteState::new()),
            programs: Arc::new(Mutex::new(Vec::new())),
            cpu_model: config.cpu_model,
            scan_interval: Duration::from_millis(config.scan_interval_ms),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn store(&self) -> Arc<DeviceStore> {
        self.store.clone()
    }

    pub fn remote(&self) -> Arc<RemoteState> {
        self.remote.clone()
    }

    /// Replace the loaded ladder programs.
    pub fn load_programs(&self, programs: Vec<Vec<Instruction>>) {
        *self.programs.lock().unwrap() = programs;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Accept and serve clients one at a time until [`McServer::stop`] is called.
    pub async fn run(&self) {
        let engine = LadderEngine::spawn(
            self.store.clone(),
            self.remote.clone(),
            self.programs.clone(),
            self.scan_interval,
        );
        while self.running.load(Ordering::Relaxed) {
            let accept = tokio::time::timeout(Duration::from_millis(200), self.listener.accept()).await;
            let (socket, peer) = match accept {
                Ok(Ok(pair)) => pair,
                Ok(Err(err)) => {
                    warn!(%err, "accept failed");
                    continue;
                }
                Err(_) => continue,
            };
            info!(%peer, "mc client connected");
            self.serve_client(socket).await;
        }
        engine.stop();
    }

    async fn serve_client(&self, mut socket: TcpStream) {
        let mut buf = vec![0u8; 4096];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    warn!(%err, "mc read failed");
                    break;
                }
            };
            let request = match parse_request(&buf[..n]) {
                Ok(request) => request,
                Err(err) => {
                    debug!(%err, "malformed mc request");
                    continue;
                }
            };
            let result = dispatch(&request, &self.store, &self.remote, &self.cpu_model);
            let response = build_response(&request, result.end_code, &result.payload);
            if let Err(err) = socket.write_all(&response).await {
                warn!(%err, "mc write failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_proto::{command, sub_command, FrameKind};

    #[tokio::test]
    async fn write_then_read_round_trips_over_tcp() {
        let mut config = McServerConfig::default();
        config.bind_ip = std::net::Ipv4Addr::LOCALHOST;
        config.port = 0;
        let server = Arc::new(McServer::bind(config).await.unwrap());
        let addr = server.local_addr().unwrap();
        let server_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        let mut socket = TcpStream::connect(addr).await.unwrap();
        let write_data = crate::dispatcher::encode_batch_write_words(mc_proto::DeviceType::D, 0, &[7, 8, 9]);
        let write_req = mc_proto::build_request(
            FrameKind::ThreeEBinary,
            command::BATCH_WRITE,
            sub_command::WORD,
            0,
            0xFF,
            0,
            &write_data,
        );
        socket.write_all(&write_req).await.unwrap();
        let mut resp_buf = vec![0u8; 256];
        let n = socket.read(&mut resp_buf).await.unwrap();
        let (end_code, _) = mc_proto::parse_response(FrameKind::ThreeEBinary, &resp_buf[..n]).unwrap();
        assert!(end_code.is_success());

        let read_data = crate::dispatcher::encode_batch_read_data(mc_proto::DeviceType::D, 0, 3);
        let read_req = mc_proto::build_request(
            FrameKind::ThreeEBinary,
            command::BATCH_READ,
            sub_command::WORD,
            0,
            0xFF,
            0,
            &read_data,
        );
        socket.write_all(&read_req).await.unwrap();
        let n = socket.read(&mut resp_buf).await.unwrap();
        let (end_code, payload) = mc_proto::parse_response(FrameKind::ThreeEBinary, &resp_buf[..n]).unwrap();
        assert!(end_code.is_success());
        assert_eq!(payload.as_ref(), &[7, 0, 8, 0, 9, 0]);

        server.stop();
        server_task.abort();
    }

    #[tokio::test]
    async fn one_e_write_then_read_round_trips_over_tcp() {
        let mut config = McServerConfig::default();
        config.bind_ip = std::net::Ipv4Addr::LOCALHOST;
        config.port = 0;
        let server = Arc::new(McServer::bind(config).await.unwrap());
        let addr = server.local_addr().unwrap();
        let server_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        let mut socket = TcpStream::connect(addr).await.unwrap();

        // 1E has no device-code byte: command, pc_no, timer(2 LE), address(4 LE), count(1)[, values].
        let mut write_req = vec![0x03u8, 0xFF, 10, 0]; // word write, pc_no 0xFF, timer 10
        write_req.extend_from_slice(&0u32.to_le_bytes()); // address D0
        write_req.push(3); // count
        for value in [7u16, 8, 9] {
            write_req.extend_from_slice(&value.to_le_bytes());
        }
        socket.write_all(&write_req).await.unwrap();
        let mut resp_buf = vec![0u8; 256];
        let n = socket.read(&mut resp_buf).await.unwrap();
        let (end_code, _) = mc_proto::parse_response(FrameKind::OneE, &resp_buf[..n]).unwrap();
        assert!(end_code.is_success());

        let mut read_req = vec![0x01u8, 0xFF, 10, 0]; // word read
        read_req.extend_from_slice(&0u32.to_le_bytes());
        read_req.push(3);
        socket.write_all(&read_req).await.unwrap();
        let n = socket.read(&mut resp_buf).await.unwrap();
        let (end_code, payload) = mc_proto::parse_response(FrameKind::OneE, &resp_buf[..n]).unwrap();
        assert!(end_code.is_success());
        assert_eq!(payload.as_ref(), &[7, 0, 8, 0, 9, 0]);

        server.stop();
        server_task.abort();
    }
}
