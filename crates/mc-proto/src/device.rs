//! Device type and address-field encoding shared by all MC frame formats.

/// Whether a device type stores single bits or 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Bit,
    Word,
}

/// A MELSEC device type. Covers the set with a defined address range in the
/// reference device manager (`D, M, Y, X, B, W, L, F, V, S, R, ZR, TN, TC,
/// TS, CN, CC, CS, SM, SD, SB, SW, Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    D,
    M,
    Y,
    X,
    B,
    W,
    L,
    F,
    V,
    S,
    R,
    ZR,
    TN,
    TC,
    TS,
    CN,
    CC,
    CS,
    SM,
    SD,
    SB,
    SW,
    Z,
}

impl DeviceType {
    /// All device types, in a stable order.
    pub const ALL: [DeviceType; 23] = [
        DeviceType::D,
        DeviceType::M,
        DeviceType::Y,
        DeviceType::X,
        DeviceType::B,
        DeviceType::W,
        DeviceType::L,
        DeviceType::F,
        DeviceType::V,
        DeviceType::S,
        DeviceType::R,
        DeviceType::ZR,
        DeviceType::TN,
        DeviceType::TC,
        DeviceType::TS,
        DeviceType::CN,
        DeviceType::CC,
        DeviceType::CS,
        DeviceType::SM,
        DeviceType::SD,
        DeviceType::SB,
        DeviceType::SW,
        DeviceType::Z,
    ];

    /// Textual device code, as used in client APIs and the ladder text grammar.
    pub const fn code(self) -> &'static str {
        match self {
            DeviceType::D => "D",
            DeviceType::M => "M",
            DeviceType::Y => "Y",
            DeviceType::X => "X",
            DeviceType::B => "B",
            DeviceType::W => "W",
            DeviceType::L => "L",
            DeviceType::F => "F",
            DeviceType::V => "V",
            DeviceType::S => "S",
            DeviceType::R => "R",
            DeviceType::ZR => "ZR",
            DeviceType::TN => "TN",
            DeviceType::TC => "TC",
            DeviceType::TS => "TS",
            DeviceType::CN => "CN",
            DeviceType::CC => "CC",
            DeviceType::CS => "CS",
            DeviceType::SM => "SM",
            DeviceType::SD => "SD",
            DeviceType::SB => "SB",
            DeviceType::SW => "SW",
            DeviceType::Z => "Z",
        }
    }

    /// One-byte device code used on the wire.
    pub const fn wire_code(self) -> u8 {
        match self {
            DeviceType::M => 0x90,
            DeviceType::SM => 0x91,
            DeviceType::L => 0x92,
            DeviceType::F => 0x93,
            DeviceType::V => 0x94,
            DeviceType::S => 0x98,
            DeviceType::B => 0xA0,
            DeviceType::SB => 0xA1,
            DeviceType::D => 0xA8,
            DeviceType::SD => 0xA9,
            DeviceType::R => 0xAF,
            DeviceType::ZR => 0xB0,
            DeviceType::W => 0xB4,
            DeviceType::SW => 0xB5,
            DeviceType::TC => 0xC0,
            DeviceType::TS => 0xC1,
            DeviceType::TN => 0xC2,
            DeviceType::CC => 0xC3,
            DeviceType::CS => 0xC4,
            DeviceType::CN => 0xC5,
            DeviceType::X => 0x9C,
            DeviceType::Y => 0x9D,
            DeviceType::Z => 0xCC,
        }
    }

    /// Decode a device type from its wire code byte.
    pub fn from_wire_code(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.wire_code() == raw)
    }

    /// Decode a device type from its textual code (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        let upper = code.to_ascii_uppercase();
        Self::ALL.into_iter().find(|d| d.code() == upper)
    }

    /// Whether this is a bit device (`M`, `X`, `Y`, ...) or a word device
    /// (`D`, `W`, ...).
    pub const fn kind(self) -> DeviceKind {
        match self {
            DeviceType::M
            | DeviceType::SM
            | DeviceType::L
            | DeviceType::F
            | DeviceType::V
            | DeviceType::S
            | DeviceType::B
            | DeviceType::SB
            | DeviceType::TC
            | DeviceType::TS
            | DeviceType::CC
            | DeviceType::CS
            | DeviceType::X
            | DeviceType::Y => DeviceKind::Bit,
            DeviceType::D
            | DeviceType::SD
            | DeviceType::R
            | DeviceType::ZR
            | DeviceType::W
            | DeviceType::SW
            | DeviceType::TN
            | DeviceType::CN
            | DeviceType::Z => DeviceKind::Word,
        }
    }

    pub const fn is_bit_device(self) -> bool {
        matches!(self.kind(), DeviceKind::Bit)
    }

    /// Whether addresses of this device are conventionally written in hex
    /// (`X`, `Y`, `B`, `W`) rather than decimal.
    pub const fn hex_addressed(self) -> bool {
        matches!(self, DeviceType::X | DeviceType::Y | DeviceType::B | DeviceType::W)
    }

    /// Parse a user-facing address string, honouring this device's
    /// conventional numbering base.
    pub fn parse_address(self, s: &str) -> Option<u32> {
        if self.hex_addressed() {
            u32::from_str_radix(s.trim_start_matches("0x"), 16).ok()
        } else {
            s.parse().ok()
        }
    }
}

/// Encode a device reference as the 4-byte MC wire field: a 3-byte
/// little-endian address followed by a 1-byte device code.
pub fn encode_device_field(device: DeviceType, address: u32) -> [u8; 4] {
    let addr_bytes = address.to_le_bytes();
    [addr_bytes[0], addr_bytes[1], addr_bytes[2], device.wire_code()]
}

/// Decode a 4-byte MC device reference field.
pub fn decode_device_field(bytes: &[u8; 4]) -> Option<(DeviceType, u32)> {
    let address = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    let device = DeviceType::from_wire_code(bytes[3])?;
    Some((device, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_field_roundtrip() {
        let field = encode_device_field(DeviceType::D, 100);
        let (device, address) = decode_device_field(&field).unwrap();
        assert_eq!(device, DeviceType::D);
        assert_eq!(address, 100);
    }

    #[test]
    fn hex_addressed_devices_parse_hex() {
        assert_eq!(DeviceType::X.parse_address("1A"), Some(0x1A));
        assert_eq!(DeviceType::D.parse_address("100"), Some(100));
    }

    #[test]
    fn wire_codes_are_unique() {
        let mut codes: Vec<u8> = DeviceType::ALL.iter().map(|d| d.wire_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), DeviceType::ALL.len());
    }
}
