//! High level GigE Vision facade: discovery, a connected camera handle, and
//! an event-driven streaming surface built on top of the `gige` transport
//! crate.

pub mod error;
pub mod events;
pub mod stream;

pub use error::FacadeError;
pub use events::{Event, EventChannel};
pub use stream::{StreamBuilder, StreamHandle};

use std::net::SocketAddr;

use gige::gvcp_client::{discover, DeviceInfo, GvcpClient};
use gige::register::addr;

/// A connected camera's control surface.
pub struct Camera {
    client: GvcpClient,
}

impl Camera {
    /// Broadcast discovery and collect replies for `wait`.
    pub async fn discover(wait: std::time::Duration) -> Result<Vec<DeviceInfo>, FacadeError> {
        Ok(discover(wait).await?)
    }

    /// Connect a control client to a device's GVCP endpoint.
    pub async fn connect(remote: SocketAddr) -> Result<Self, FacadeError> {
        let client = GvcpClient::connect(remote).await?;
        Ok(Camera { client })
    }

    /// Read a bootstrap register.
    pub async fn read_register(&mut self, address: u32) -> Result<u32, FacadeError> {
        Ok(self.client.read_register(address).await?)
    }

    /// Write a bootstrap register.
    pub async fn write_register(&mut self, address: u32, value: u32) -> Result<(), FacadeError> {
        Ok(self.client.write_register(address, value).await?)
    }

    /// Tell the device to stream to `dest` with the given packet size, then
    /// begin acquisition.
    pub async fn start_acquisition(
        &mut self,
        dest: SocketAddr,
        packet_size: u16,
    ) -> Result<(), FacadeError> {
        let ip: std::net::Ipv4Addr = match dest.ip() {
            std::net::IpAddr::V4(v4) => v4,
            std::net::IpAddr::V6(_) => return Err(FacadeError::Ipv6Unsupported),
        };
        self.write_register(addr::SC0_DEST_IP, u32::from(ip)).await?;
        self.write_register(addr::SC0_PORT, u32::from(dest.port()))
            .await?;
        self.write_register(addr::SC0_PACKET_SIZE, u32::from(packet_size))
            .await?;
        self.write_register(addr::ACQUISITION_START, 1).await?;
        Ok(())
    }

    /// Tell the device to stop acquisition.
    pub async fn stop_acquisition(&mut self) -> Result<(), FacadeError> {
        self.write_register(addr::ACQUISITION_STOP, 1).await?;
        Ok(())
    }
}
