//! Server configuration.

use serde::{Deserialize, Serialize};

use crate::device_store::Series;

/// Configuration for an [`crate::server::McServer`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McServerConfig {
    pub bind_ip: std::net::Ipv4Addr,
    pub port: u16,
    pub series: SeriesConfig,
    pub cpu_model: String,
    pub scan_interval_ms: u64,
}

/// Serde-friendly mirror of [`Series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesConfig {
    Q,
    IqR,
}

impl From<SeriesConfig> for Series {
    fn from(value: SeriesConfig) -> Self {
        match value {
            SeriesConfig::Q => Series::Q,
            SeriesConfig::IqR => Series::IqR,
        }
    }
}

impl Default for McServerConfig {
    fn default() -> Self {
        McServerConfig {
            bind_ip: std::net::Ipv4Addr::UNSPECIFIED,
            port: 5007,
            series: SeriesConfig::Q,
            cpu_model: "Q06UDVCPU".to_string(),
            scan_interval_ms: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = McServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: McServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.port, config.port);
    }
}
