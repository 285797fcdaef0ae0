use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Serialize;

pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(":")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}

pub fn encode_pgm(width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
    let w: usize = width.try_into().context("width doesn't fit in usize")?;
    let h: usize = height.try_into().context("height doesn't fit in usize")?;
    let expected = w.checked_mul(h).context("image area overflow")?;
    if expected != data.len() {
        bail!("PGM payload length mismatch: expected {expected}, got {}", data.len());
    }
    let header = format!("P5\n{width} {height}\n255\n");
    let mut buf = Vec::with_capacity(header.len() + data.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(data);
    Ok(buf)
}

pub fn save_image(buffer: &[u8], path: &PathBuf) -> Result<()> {
    std::fs::write(path, buffer).with_context(|| format!("write {}", path.display()))
}

/// Parse a `DEVICE<address>` token like `D100` or `X1A` into its type and
/// numeric address, honouring hex-addressed devices.
pub fn parse_device_ref(token: &str) -> Result<(mc_proto::DeviceType, u32)> {
    let split_at = token
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| anyhow::anyhow!("expected DEVICE<address>, got {token:?}"))?;
    let (code, addr) = token.split_at(split_at);
    let device = mc_proto::DeviceType::from_code(code)
        .ok_or_else(|| anyhow::anyhow!("unknown device code {code:?}"))?;
    let address = device
        .parse_address(addr)
        .ok_or_else(|| anyhow::anyhow!("bad address {addr:?} for device {code}"))?;
    Ok((device, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pgm_header_is_correct() {
        let data = vec![0u8; 4];
        let encoded = encode_pgm(2, 2, &data).expect("encode");
        assert!(encoded.starts_with(b"P5\n2 2\n255\n"));
    }

    #[test]
    fn parses_decimal_and_hex_device_refs() {
        let (device, addr) = parse_device_ref("D100").unwrap();
        assert_eq!(device, mc_proto::DeviceType::D);
        assert_eq!(addr, 100);

        let (device, addr) = parse_device_ref("X1A").unwrap();
        assert_eq!(device, mc_proto::DeviceType::X);
        assert_eq!(addr, 0x1A);
    }
}
