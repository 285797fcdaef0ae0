//! Bootstrap register map.
//!
//! A GigE Vision device exposes its control surface as a sparse space of
//! 32-bit registers plus a handful of fixed-width string registers. This
//! store holds both, and records the side effects a handful of well-known
//! addresses trigger on write (stream destination, acquisition start/stop,
//! control privilege).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

/// Well-known bootstrap register addresses.
pub mod addr {
    pub const VERSION: u32 = 0x0000;
    pub const MAC_HIGH: u32 = 0x0008;
    pub const MAC_LOW: u32 = 0x000C;
    pub const CURRENT_IP: u32 = 0x0024;
    pub const MANUFACTURER: u32 = 0x0048;
    pub const MODEL: u32 = 0x0068;
    pub const DEVICE_VERSION: u32 = 0x0088;
    pub const SERIAL: u32 = 0x00D8;
    pub const USER_NAME: u32 = 0x00E8;
    pub const ACQUISITION_START: u32 = 0x0124;
    pub const ACQUISITION_STOP: u32 = 0x0128;
    pub const HEARTBEAT_TIMEOUT: u32 = 0x0938;
    pub const CONTROL_CHANNEL_PRIVILEGE: u32 = 0x0A00;
    pub const SC0_PORT: u32 = 0x0D00;
    pub const SC0_PACKET_SIZE: u32 = 0x0D04;
    pub const SC0_PACKET_DELAY: u32 = 0x0D08;
    pub const SC0_DEST_IP: u32 = 0x0D18;
}

/// Side effect produced by writing a register, for the caller (the GVCP
/// server) to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterEffect {
    /// Acquisition should start.
    AcquisitionStart,
    /// Acquisition should stop.
    AcquisitionStop,
    /// No side effect beyond storing the value.
    None,
}

/// Sparse bootstrap register store.
pub struct RegisterStore {
    registers: HashMap<u32, u32>,
    strings: HashMap<u32, Vec<u8>>,
    last_request_at: Option<Instant>,
}

impl RegisterStore {
    /// Build a store pre-populated from server identity fields.
    pub fn new(
        mac: [u8; 6],
        current_ip: Ipv4Addr,
        manufacturer: &str,
        model: &str,
        device_version: &str,
        serial: &str,
        user_name: &str,
        heartbeat_timeout_ms: u32,
    ) -> Self {
        let mut registers = HashMap::new();
        registers.insert(addr::VERSION, 0x0002_0000);
        registers.insert(
            addr::MAC_HIGH,
            u32::from(mac[0]) << 8 | u32::from(mac[1]),
        );
        registers.insert(
            addr::MAC_LOW,
            u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]),
        );
        registers.insert(addr::CURRENT_IP, u32::from(current_ip));
        registers.insert(addr::ACQUISITION_START, 0);
        registers.insert(addr::ACQUISITION_STOP, 0);
        registers.insert(addr::HEARTBEAT_TIMEOUT, heartbeat_timeout_ms);
        registers.insert(addr::CONTROL_CHANNEL_PRIVILEGE, 0);
        registers.insert(addr::SC0_PORT, 0);
        registers.insert(addr::SC0_PACKET_SIZE, 1500);
        registers.insert(addr::SC0_PACKET_DELAY, 0);
        registers.insert(addr::SC0_DEST_IP, 0);

        let mut strings = HashMap::new();
        strings.insert(addr::MANUFACTURER, fixed_string(manufacturer, 32));
        strings.insert(addr::MODEL, fixed_string(model, 32));
        strings.insert(addr::DEVICE_VERSION, fixed_string(device_version, 32));
        strings.insert(addr::SERIAL, fixed_string(serial, 16));
        strings.insert(addr::USER_NAME, fixed_string(user_name, 16));

        RegisterStore {
            registers,
            strings,
            last_request_at: None,
        }
    }

    /// Read a 32-bit register. Unknown addresses read as zero (lenient).
    pub fn read(&self, address: u32) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    /// Write a 32-bit register, returning any side effect it triggers.
    pub fn write(&mut self, address: u32, value: u32) -> RegisterEffect {
        self.registers.insert(address, value);
        match address {
            addr::ACQUISITION_START if value != 0 => RegisterEffect::AcquisitionStart,
            addr::ACQUISITION_STOP if value != 0 => RegisterEffect::AcquisitionStop,
            _ => RegisterEffect::None,
        }
    }

    /// Read a fixed-width string register's raw bytes, zero-padded.
    pub fn read_string(&self, address: u32, length: usize) -> Vec<u8> {
        match self.strings.get(&address) {
            Some(bytes) => {
                let mut out = bytes.clone();
                out.resize(length, 0);
                out
            }
            None => vec![0u8; length],
        }
    }

    /// Record that a request was just handled, for heartbeat tracking.
    pub fn note_request(&mut self, now: Instant) {
        self.last_request_at = Some(now);
    }

    /// Whether control privilege should be considered expired given `now`.
    pub fn heartbeat_expired(&self, now: Instant) -> bool {
        let timeout_ms = self.read(addr::HEARTBEAT_TIMEOUT);
        match self.last_request_at {
            Some(last) => now.duration_since(last).as_millis() > u128::from(timeout_ms),
            None => false,
        }
    }

    /// Clear control channel privilege (called on heartbeat timeout).
    pub fn clear_privilege(&mut self) {
        self.registers.insert(addr::CONTROL_CHANNEL_PRIVILEGE, 0);
    }

    /// Stream destination IP recorded via register writes.
    pub fn stream_dest_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.read(addr::SC0_DEST_IP))
    }

    /// Stream destination UDP port recorded via register writes.
    pub fn stream_dest_port(&self) -> u16 {
        self.read(addr::SC0_PORT) as u16
    }

    /// Configured GVSP packet size.
    pub fn stream_packet_size(&self) -> u16 {
        self.read(addr::SC0_PACKET_SIZE) as u16
    }
}

fn fixed_string(value: &str, length: usize) -> Vec<u8> {
    let mut out = value.as_bytes().to_vec();
    out.truncate(length);
    out.resize(length, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_registers_are_null_padded() {
        let store = RegisterStore::new(
            [0, 1, 2, 3, 4, 5],
            Ipv4Addr::new(192, 168, 1, 100),
            "MockCam Corp",
            "VirtualCam-1",
            "1.0",
            "MOCK001",
            "TestCamera_1",
            3000,
        );
        let model = store.read_string(addr::MODEL, 32);
        assert_eq!(model.len(), 32);
        assert_eq!(&model[..12], b"VirtualCam-1");
        assert!(model[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn acquisition_start_write_reports_effect() {
        let mut store = RegisterStore::new(
            [0; 6],
            Ipv4Addr::UNSPECIFIED,
            "m",
            "m",
            "1",
            "s",
            "u",
            3000,
        );
        assert_eq!(
            store.write(addr::ACQUISITION_START, 1),
            RegisterEffect::AcquisitionStart
        );
        assert_eq!(store.write(addr::ACQUISITION_START, 0), RegisterEffect::None);
    }

    #[test]
    fn current_ip_round_trips() {
        let ip = Ipv4Addr::new(192, 168, 1, 100);
        let store = RegisterStore::new([0; 6], ip, "m", "m", "1", "s", "u", 3000);
        assert_eq!(store.read(addr::CURRENT_IP).to_be_bytes(), ip.octets());
    }
}
