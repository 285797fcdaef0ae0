//! Server and client configuration structures.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::image_source::ImageSourceConfig;

/// Configuration for a [`crate::gvcp_server::GvcpServer`] plus the
/// [`crate::gvsp_server::GvspServer`] it controls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GigeServerConfig {
    /// IPv4 address to bind the GVCP control socket to.
    pub bind_ip: Ipv4Addr,
    /// UDP port for GVCP (3956 per the specification).
    pub gvcp_port: u16,
    /// Manufacturer string reported on discovery.
    pub manufacturer: String,
    /// Model string reported on discovery.
    pub model: String,
    /// Device serial number string.
    pub serial: String,
    /// User-assigned device name.
    pub user_name: String,
    /// MAC address reported on discovery.
    pub mac: [u8; 6],
    /// Heartbeat timeout in milliseconds before control privilege lapses.
    pub heartbeat_timeout_ms: u32,
    /// Target frame rate for streaming, in frames per second.
    pub frame_rate: f64,
    /// Image source used to produce frames.
    pub image_source: ImageSourceConfig,
}

impl Default for GigeServerConfig {
    fn default() -> Self {
        GigeServerConfig {
            bind_ip: Ipv4Addr::new(0, 0, 0, 0),
            gvcp_port: 3956,
            manufacturer: "MockCam Corp".to_string(),
            model: "VirtualCam-1".to_string(),
            serial: "MOCK001".to_string(),
            user_name: "TestCamera_1".to_string(),
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            heartbeat_timeout_ms: 3_000,
            frame_rate: 30.0,
            image_source: ImageSourceConfig::TestPattern {
                width: 640,
                height: 480,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = GigeServerConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: GigeServerConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.model, cfg.model);
        assert_eq!(back.gvcp_port, cfg.gvcp_port);
    }
}
