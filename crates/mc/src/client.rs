//! Thin async TCP wrapper around the MC frame codec, offering a typed
//! read/write/remote-control surface.

use std::net::SocketAddr;
use std::time::Duration;

use mc_proto::{build_request, command, parse_response, sub_command, DeviceType, FrameKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::dispatcher::{encode_batch_read_data, encode_batch_write_words};
use crate::error::McClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// A connected MC client using 3E binary framing.
pub struct McClient {
    socket: TcpStream,
    serial_no: u16,
}

impl McClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, McClientError> {
        let socket = TcpStream::connect(addr).await?;
        Ok(McClient { socket, serial_no: 0 })
    }

    fn next_serial(&mut self) -> u16 {
        self.serial_no = self.serial_no.wrapping_add(1);
        self.serial_no
    }

    async fn transact(&mut self, command: u16, sub_command: u16, data: &[u8]) -> Result<bytes::Bytes, McClientError> {
        let serial_no = self.next_serial();
        let request = build_request(FrameKind::ThreeEBinary, command, sub_command, 0, 0xFF, serial_no, data);
        self.socket.write_all(&request).await?;
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(REQUEST_TIMEOUT, self.socket.read(&mut buf))
            .await
            .map_err(|_| McClientError::Timeout)??;
        if n == 0 {
            return Err(McClientError::NotConnected);
        }
        let (end_code, payload) = parse_response(FrameKind::ThreeEBinary, &buf[..n])?;
        if !end_code.is_success() {
            return Err(McClientError::ProtocolError {
                code: end_code.raw(),
                message: format!("{end_code:?}"),
            });
        }
        Ok(payload)
    }

    pub async fn read_words(&mut self, device: DeviceType, start: u32, count: u16) -> Result<Vec<u16>, McClientError> {
        let data = encode_batch_read_data(device, start, count);
        let payload = self.transact(command::BATCH_READ, sub_command::WORD, &data).await?;
        Ok(payload.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect())
    }

    pub async fn read_bits(&mut self, device: DeviceType, start: u32, count: u16) -> Result<Vec<bool>, McClientError> {
        let data = encode_batch_read_data(device, start, count);
        let payload = self.transact(command::BATCH_READ, sub_command::BIT, &data).await?;
        let mut bits = Vec::with_capacity(count as usize);
        for i in 0..count {
            let byte = payload[(i / 2) as usize];
            let nibble = if i % 2 == 0 { byte & 0x0F } else { byte >> 4 };
            bits.push(nibble != 0);
        }
        Ok(bits)
    }

    pub async fn write_words(&mut self, device: DeviceType, start: u32, values: &[u16]) -> Result<(), McClientError> {
        let data = encode_batch_write_words(device, start, values);
        self.transact(command::BATCH_WRITE, sub_command::WORD, &data).await?;
        Ok(())
    }

    pub async fn write_bits(&mut self, device: DeviceType, start: u32, values: &[bool]) -> Result<(), McClientError> {
        let mut data = mc_proto::encode_device_field(device, start).to_vec();
        data.extend_from_slice(&(values.len() as u16).to_le_bytes());
        for pair in values.chunks(2) {
            let lo = pair[0] as u8;
            let hi = pair.get(1).copied().unwrap_or(false) as u8;
            data.push(lo | (hi << 4));
        }
        self.transact(command::BATCH_WRITE, sub_command::BIT, &data).await?;
        Ok(())
    }

    pub async fn remote_run(&mut self) -> Result<(), McClientError> {
        self.transact(command::REMOTE_RUN, 0, &[]).await?;
        Ok(())
    }

    pub async fn remote_stop(&mut self) -> Result<(), McClientError> {
        self.transact(command::REMOTE_STOP, 0, &[]).await?;
        Ok(())
    }

    pub async fn remote_pause(&mut self) -> Result<(), McClientError> {
        self.transact(command::REMOTE_PAUSE, 0, &[]).await?;
        Ok(())
    }

    pub async fn remote_reset(&mut self) -> Result<(), McClientError> {
        self.transact(command::REMOTE_RESET, 0, &[]).await?;
        Ok(())
    }

    pub async fn read_cpu_model(&mut self) -> Result<String, McClientError> {
        let payload = self.transact(command::CPU_MODEL_READ, 0, &[]).await?;
        let name_bytes = &payload[..payload.len().min(16)];
        Ok(String::from_utf8_lossy(name_bytes).trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McServerConfig;
    use crate::server::McServer;
    use std::sync::Arc;

    #[tokio::test]
    async fn client_round_trips_words_against_live_server() {
        let mut config = McServerConfig::default();
        config.bind_ip = std::net::Ipv4Addr::LOCALHOST;
        config.port = 0;
        let server = Arc::new(McServer::bind(config).await.unwrap());
        let addr = server.local_addr().unwrap();
        let server_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        let mut client = McClient::connect(addr).await.unwrap();
        client.write_words(DeviceType::D, 0, &[1, 2, 3]).await.unwrap();
        let values = client.read_words(DeviceType::D, 0, 3).await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        client.remote_run().await.unwrap();
        assert!(server.remote().is_running());

        server.stop();
        server_task.abort();
    }

    #[tokio::test]
    async fn malformed_device_reports_protocol_error() {
        let mut config = McServerConfig::default();
        config.bind_ip = std::net::Ipv4Addr::LOCALHOST;
        config.port = 0;
        let server = Arc::new(McServer::bind(config).await.unwrap());
        let addr = server.local_addr().unwrap();
        let server_task = {
            let server = server.clone();
            tokio::spawn(async move { server.run().await })
        };

        let mut client = McClient::connect(addr).await.unwrap();
        let err = client.read_words(DeviceType::D, 99999, 1).await.unwrap_err();
        assert!(matches!(err, McClientError::ProtocolError { .. }));

        server.stop();
        server_task.abort();
    }
}
