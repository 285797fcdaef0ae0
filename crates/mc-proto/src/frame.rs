//! MELSEC-MC frame detection, parsing, and encoding across the five
//! supported wire formats (1E, 3E binary, 3E ASCII, 4E binary, 4E ASCII).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::end_code::EndCode;

/// MC command codes (3E/4E numbering; 1E commands are normalised to these).
pub mod command {
    pub const BATCH_READ: u16 = 0x0401;
    pub const BATCH_WRITE: u16 = 0x1401;
    pub const RANDOM_READ: u16 = 0x0403;
    pub const RANDOM_WRITE: u16 = 0x1402;
    pub const REMOTE_RUN: u16 = 0x1001;
    pub const REMOTE_STOP: u16 = 0x1002;
    pub const REMOTE_PAUSE: u16 = 0x1003;
    pub const REMOTE_RESET: u16 = 0x1006;
    pub const CPU_MODEL_READ: u16 = 0x0101;
}

/// MC sub-command codes distinguishing bit vs. word access.
pub mod sub_command {
    pub const WORD: u16 = 0x0000;
    pub const BIT: u16 = 0x0001;
}

/// Which of the five wire formats a frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    OneE,
    ThreeEBinary,
    ThreeEAscii,
    FourEBinary,
    FourEAscii,
}

impl FrameKind {
    fn is_ascii(self) -> bool {
        matches!(self, FrameKind::ThreeEAscii | FrameKind::FourEAscii)
    }

    fn is_4e(self) -> bool {
        matches!(self, FrameKind::FourEBinary | FrameKind::FourEAscii)
    }
}

/// A request decoded from any of the five wire formats, normalised to a
/// uniform 3E-style record.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub frame: FrameKind,
    pub command: u16,
    pub sub_command: u16,
    pub command_data: Bytes,
    pub network_no: u8,
    pub pc_no: u8,
    pub serial_no: u16,
}

/// Errors produced while parsing or building MC frames.
#[derive(Debug, Error)]
pub enum McError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("unrecognised frame header")]
    UnknownFrame,
    #[error("invalid ascii hex field")]
    InvalidAscii,
}

/// Binary subheaders are transmitted as ordinary little-endian `u16`s, like
/// every other MC integer field: `0x5000`/`0x5400` encode to wire bytes
/// `[0x00, 0x50]`/`[0x00, 0x54]`.
const SUBHEADER_3E_REQUEST: u16 = 0x5000;
const SUBHEADER_3E_RESPONSE: u16 = 0xD000;
const SUBHEADER_4E_REQUEST: u16 = 0x5400;
const SUBHEADER_4E_RESPONSE: u16 = 0xD400;

/// Detect and parse a request buffer into a [`ParsedRequest`].
pub fn parse_request(buf: &[u8]) -> Result<ParsedRequest, McError> {
    if buf.len() < 2 {
        return Err(McError::TooShort(buf.len()));
    }
    let subheader = u16::from_le_bytes([buf[0], buf[1]]);
    if subheader == SUBHEADER_3E_REQUEST {
        parse_binary(buf, FrameKind::ThreeEBinary)
    } else if subheader == SUBHEADER_4E_REQUEST {
        parse_binary(buf, FrameKind::FourEBinary)
    } else if buf.starts_with(b"5000") {
        parse_ascii(buf, FrameKind::ThreeEAscii)
    } else if buf.starts_with(b"5400") {
        parse_ascii(buf, FrameKind::FourEAscii)
    } else if buf[0] <= 0x0F {
        parse_1e(buf)
    } else {
        Err(McError::UnknownFrame)
    }
}

fn parse_binary(buf: &[u8], frame: FrameKind) -> Result<ParsedRequest, McError> {
    let mut cursor = &buf[2..];
    // fixed header through command+sub_command: 3E = 15 bytes, 4E = 19 bytes.
    let min_len = if frame.is_4e() { 19 } else { 15 };
    if buf.len() < min_len {
        return Err(McError::TooShort(buf.len()));
    }
    let serial_no = if frame.is_4e() {
        let s = cursor.get_u16_le();
        cursor.advance(2); // reserved
        s
    } else {
        0
    };
    let network_no = cursor.get_u8();
    let pc_no = cursor.get_u8();
    let _dest_io = cursor.get_u16_le();
    let _dest_station = cursor.get_u8();
    let _length = cursor.get_u16_le();
    let _timer = cursor.get_u16_le();
    let command = cursor.get_u16_le();
    let sub_command = cursor.get_u16_le();
    let command_data = Bytes::copy_from_slice(cursor);
    Ok(ParsedRequest {
        frame,
        command,
        sub_command,
        command_data,
        network_no,
        pc_no,
        serial_no,
    })
}

fn hex2(bytes: &[u8]) -> Result<u8, McError> {
    let s = std::str::from_utf8(bytes).map_err(|_| McError::InvalidAscii)?;
    u8::from_str_radix(s, 16).map_err(|_| McError::InvalidAscii)
}

fn hex4(bytes: &[u8]) -> Result<u16, McError> {
    let s = std::str::from_utf8(bytes).map_err(|_| McError::InvalidAscii)?;
    u16::from_str_radix(s, 16).map_err(|_| McError::InvalidAscii)
}

fn parse_ascii(buf: &[u8], frame: FrameKind) -> Result<ParsedRequest, McError> {
    let header_len = if frame.is_4e() { 4 } else { 4 };
    let mut pos = header_len;
    let serial_no = if frame.is_4e() {
        let v = hex4(&buf[pos..pos + 4])?;
        pos += 4;
        pos += 4; // reserved text
        v
    } else {
        0
    };
    let network_no = hex2(&buf[pos..pos + 2])?;
    pos += 2;
    let pc_no = hex2(&buf[pos..pos + 2])?;
    pos += 2;
    pos += 4; // dest_io
    pos += 2; // dest_station
    pos += 4; // length (ascii char count of remainder)
    pos += 4; // timer
    let command = hex4(&buf[pos..pos + 4])?;
    pos += 4;
    let sub_command = hex4(&buf[pos..pos + 4])?;
    pos += 4;
    let data_hex = &buf[pos..];
    let command_data = ascii_to_bytes(data_hex)?;
    Ok(ParsedRequest {
        frame,
        command,
        sub_command,
        command_data,
        network_no,
        pc_no,
        serial_no,
    })
}

fn ascii_to_bytes(hex: &[u8]) -> Result<Bytes, McError> {
    if hex.len() % 2 != 0 {
        return Err(McError::InvalidAscii);
    }
    let s = std::str::from_utf8(hex).map_err(|_| McError::InvalidAscii)?;
    let mut out = Vec::with_capacity(hex.len() / 2);
    for i in (0..s.len()).step_by(2) {
        out.push(u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| McError::InvalidAscii)?);
    }
    Ok(Bytes::from(out))
}

fn bytes_to_ascii(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

fn parse_1e(buf: &[u8]) -> Result<ParsedRequest, McError> {
    if buf.len() < 9 {
        return Err(McError::TooShort(buf.len()));
    }
    let raw_command = buf[0];
    let pc_no = buf[1];
    let (command, sub_command) = match raw_command {
        0x00 => (command::BATCH_READ, sub_command::BIT),
        0x01 => (command::BATCH_READ, sub_command::WORD),
        0x02 => (command::BATCH_WRITE, sub_command::BIT),
        0x03 => (command::BATCH_WRITE, sub_command::WORD),
        _ => return Err(McError::UnknownFrame),
    };
    // The 1E frame carries no device-code byte: the address is implicitly D.
    // `command, pc_no, timer(2), address(4 LE), count(1)[, values]`.
    let address = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let count = buf[8];
    let mut command_data = BytesMut::with_capacity(6 + buf.len().saturating_sub(9));
    command_data.extend_from_slice(&crate::device::encode_device_field(crate::device::DeviceType::D, address));
    command_data.put_u16_le(count as u16);
    command_data.extend_from_slice(&buf[9..]);
    Ok(ParsedRequest {
        frame: FrameKind::OneE,
        command,
        sub_command,
        command_data: command_data.freeze(),
        network_no: 0,
        pc_no,
        serial_no: 0,
    })
}

/// Build a response for `request`, carrying `end_code` and, on success, `payload`.
pub fn build_response(request: &ParsedRequest, end_code: EndCode, payload: &[u8]) -> Bytes {
    match request.frame {
        FrameKind::ThreeEBinary | FrameKind::FourEBinary => {
            build_binary_response(request, end_code, payload)
        }
        FrameKind::ThreeEAscii | FrameKind::FourEAscii => {
            build_ascii_response(request, end_code, payload)
        }
        FrameKind::OneE => build_1e_response(request, end_code, payload),
    }
}

fn build_binary_response(request: &ParsedRequest, end_code: EndCode, payload: &[u8]) -> Bytes {
    let is_4e = request.frame.is_4e();
    let mut buf = BytesMut::new();
    if is_4e {
        buf.put_u16_le(SUBHEADER_4E_RESPONSE);
        buf.put_u16_le(request.serial_no);
        buf.put_u16_le(0); // reserved
    } else {
        buf.put_u16_le(SUBHEADER_3E_RESPONSE);
    }
    buf.put_u8(request.network_no);
    buf.put_u8(request.pc_no);
    buf.put_u16_le(0x03FF); // dest_io echoed as PC-internal
    buf.put_u8(0x00);
    let body_len = 2 + payload.len(); // end_code + payload
    buf.put_u16_le(body_len as u16);
    buf.put_u16_le(end_code.raw());
    buf.extend_from_slice(payload);
    buf.freeze()
}

fn build_ascii_response(request: &ParsedRequest, end_code: EndCode, payload: &[u8]) -> Bytes {
    let is_4e = request.frame.is_4e();
    let mut s = String::new();
    if is_4e {
        s.push_str("D400");
        s.push_str(&format!("{:04X}", request.serial_no));
        s.push_str("0000");
    } else {
        s.push_str("D000");
    }
    s.push_str(&format!("{:02X}", request.network_no));
    s.push_str(&format!("{:02X}", request.pc_no));
    s.push_str("03FF");
    s.push_str("00");
    let payload_hex = bytes_to_ascii(payload);
    let body_len_chars = 4 + payload_hex.len(); // end code (4 chars) + data
    s.push_str(&format!("{body_len_chars:04X}"));
    s.push_str(&format!("{:04X}", end_code.raw()));
    s.push_str(&payload_hex);
    Bytes::from(s.into_bytes())
}

fn build_1e_response(request: &ParsedRequest, end_code: EndCode, payload: &[u8]) -> Bytes {
    let raw_command = match (request.command, request.sub_command) {
        (cmd, sub) if cmd == command::BATCH_READ && sub == sub_command::BIT => 0x00,
        (cmd, sub) if cmd == command::BATCH_READ && sub == sub_command::WORD => 0x01,
        (cmd, sub) if cmd == command::BATCH_WRITE && sub == sub_command::BIT => 0x02,
        (cmd, sub) if cmd == command::BATCH_WRITE && sub == sub_command::WORD => 0x03,
        _ => 0x00,
    };
    let mut buf = BytesMut::with_capacity(2 + payload.len());
    buf.put_u8(raw_command | 0x80);
    buf.put_u8((end_code.raw() & 0xFF) as u8);
    if end_code.is_success() {
        buf.extend_from_slice(payload);
    }
    buf.freeze()
}

/// Build a request packet for `kind` from normalised fields (client side).
#[allow(clippy::too_many_arguments)]
pub fn build_request(
    kind: FrameKind,
    command: u16,
    sub_command: u16,
    network_no: u8,
    pc_no: u8,
    serial_no: u16,
    command_data: &[u8],
) -> Bytes {
    match kind {
        FrameKind::ThreeEBinary | FrameKind::FourEBinary => {
            let mut buf = BytesMut::new();
            if kind.is_4e() {
                buf.put_u16_le(SUBHEADER_4E_REQUEST);
                buf.put_u16_le(serial_no);
                buf.put_u16_le(0);
            } else {
                buf.put_u16_le(SUBHEADER_3E_REQUEST);
            }
            buf.put_u8(network_no);
            buf.put_u8(pc_no);
            buf.put_u16_le(0x03FF);
            buf.put_u8(0x00);
            let body_len = 2 + 2 + 2 + command_data.len(); // timer + command + sub_command + data
            buf.put_u16_le(body_len as u16);
            buf.put_u16_le(10); // timer (1s units), arbitrary default
            buf.put_u16_le(command);
            buf.put_u16_le(sub_command);
            buf.extend_from_slice(command_data);
            buf.freeze()
        }
        FrameKind::ThreeEAscii | FrameKind::FourEAscii => {
            let mut s = String::new();
            if kind.is_4e() {
                s.push_str("5400");
                s.push_str(&format!("{serial_no:04X}"));
                s.push_str("0000");
            } else {
                s.push_str("5000");
            }
            s.push_str(&format!("{network_no:02X}"));
            s.push_str(&format!("{pc_no:02X}"));
            s.push_str("03FF");
            s.push_str("00");
            let data_hex = bytes_to_ascii(command_data);
            let body_len_chars = 4 + 4 + 4 + data_hex.len();
            s.push_str(&format!("{body_len_chars:04X}"));
            s.push_str("0010");
            s.push_str(&format!("{command:04X}"));
            s.push_str(&format!("{sub_command:04X}"));
            s.push_str(&data_hex);
            Bytes::from(s.into_bytes())
        }
        FrameKind::OneE => {
            let raw_command: u8 = match (command, sub_command) {
                (c, s) if c == self::command::BATCH_READ && s == self::sub_command::BIT => 0x00,
                (c, s) if c == self::command::BATCH_READ && s == self::sub_command::WORD => 0x01,
                (c, s) if c == self::command::BATCH_WRITE && s == self::sub_command::BIT => 0x02,
                (c, s) if c == self::command::BATCH_WRITE && s == self::sub_command::WORD => 0x03,
                _ => 0x01,
            };
            // `command_data` is the normalised 3E-style encoding (device field +
            // count); unpack the address and count to rebuild the real 1E wire
            // layout, which carries neither a device-code byte nor a 2-byte count.
            let (address, count, body): (u32, u8, &[u8]) = if command_data.len() >= 6 {
                let field = [command_data[0], command_data[1], command_data[2], command_data[3]];
                let address = crate::device::decode_device_field(&field).map_or(0, |(_, a)| a);
                let count = u16::from_le_bytes([command_data[4], command_data[5]]) as u8;
                (address, count, &command_data[6..])
            } else {
                (0, 0, command_data)
            };
            let mut buf = BytesMut::with_capacity(9 + body.len());
            buf.put_u8(raw_command);
            buf.put_u8(pc_no);
            buf.put_u16_le(10);
            buf.put_u32_le(address);
            buf.put_u8(count);
            buf.extend_from_slice(body);
            buf.freeze()
        }
    }
}

/// Parse a response buffer for `kind`, returning the end code and payload.
pub fn parse_response(kind: FrameKind, buf: &[u8]) -> Result<(EndCode, Bytes), McError> {
    match kind {
        FrameKind::ThreeEBinary | FrameKind::FourEBinary => {
            // fixed header through data-length: 3E = 9 bytes, 4E = 13 bytes.
            let header_len = if kind.is_4e() { 13 } else { 9 };
            if buf.len() < header_len + 2 {
                return Err(McError::TooShort(buf.len()));
            }
            let end_code_offset = header_len;
            let end_code = EndCode::from_raw(u16::from_le_bytes([
                buf[end_code_offset],
                buf[end_code_offset + 1],
            ]));
            let payload = Bytes::copy_from_slice(&buf[end_code_offset + 2..]);
            Ok((end_code, payload))
        }
        FrameKind::ThreeEAscii | FrameKind::FourEAscii => {
            // fixed header through data-length text: 3E = 18 chars, 4E = 26 chars.
            let header_len = if kind.is_4e() { 26 } else { 18 };
            if buf.len() < header_len + 4 {
                return Err(McError::TooShort(buf.len()));
            }
            let end_code = EndCode::from_raw(hex4(&buf[header_len..header_len + 4])?);
            let payload = ascii_to_bytes(&buf[header_len + 4..])?;
            Ok((end_code, payload))
        }
        FrameKind::OneE => {
            if buf.len() < 2 {
                return Err(McError::TooShort(buf.len()));
            }
            let end_code = EndCode::from_raw(u16::from(buf[1]));
            let payload = Bytes::copy_from_slice(&buf[2..]);
            Ok((end_code, payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_frame_kind() {
        let bin3e = build_request(FrameKind::ThreeEBinary, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 0, &[]);
        assert_eq!(parse_request(&bin3e).unwrap().frame, FrameKind::ThreeEBinary);

        let bin4e = build_request(FrameKind::FourEBinary, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 7, &[]);
        assert_eq!(parse_request(&bin4e).unwrap().frame, FrameKind::FourEBinary);

        let ascii3e = build_request(FrameKind::ThreeEAscii, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 0, &[]);
        assert_eq!(parse_request(&ascii3e).unwrap().frame, FrameKind::ThreeEAscii);

        let ascii4e = build_request(FrameKind::FourEAscii, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 3, &[]);
        assert_eq!(parse_request(&ascii4e).unwrap().frame, FrameKind::FourEAscii);

        let one_e = build_request(FrameKind::OneE, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 0, &[]);
        assert_eq!(parse_request(&one_e).unwrap().frame, FrameKind::OneE);
    }

    #[test]
    fn binary_request_roundtrip_preserves_command_data() {
        let data = [1u8, 2, 3, 4];
        let req = build_request(FrameKind::ThreeEBinary, command::BATCH_WRITE, sub_command::WORD, 0, 0xFF, 0, &data);
        let parsed = parse_request(&req).unwrap();
        assert_eq!(parsed.command, command::BATCH_WRITE);
        assert_eq!(&parsed.command_data[..], &data);
    }

    #[test]
    fn ascii_request_roundtrip_preserves_command_data() {
        let data = [0xAB, 0xCD];
        let req = build_request(FrameKind::ThreeEAscii, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 0, &data);
        let parsed = parse_request(&req).unwrap();
        assert_eq!(&parsed.command_data[..], &data);
    }

    #[test]
    fn binary_response_carries_end_code_and_payload() {
        let req = parse_request(&build_request(
            FrameKind::ThreeEBinary,
            command::BATCH_READ,
            sub_command::WORD,
            0,
            0xFF,
            0,
            &[],
        ))
        .unwrap();
        let resp = build_response(&req, EndCode::Success, &[1, 0, 2, 0]);
        let (end_code, payload) = parse_response(FrameKind::ThreeEBinary, &resp).unwrap();
        assert_eq!(end_code, EndCode::Success);
        assert_eq!(&payload[..], &[1, 0, 2, 0]);
    }

    #[test]
    fn malformed_request_reports_command_error() {
        let req = ParsedRequest {
            frame: FrameKind::ThreeEBinary,
            command: 0x1234,
            sub_command: 0,
            command_data: Bytes::new(),
            network_no: 0,
            pc_no: 0xFF,
            serial_no: 0,
        };
        let resp = build_response(&req, EndCode::CommandError, &[]);
        let (end_code, _) = parse_response(FrameKind::ThreeEBinary, &resp).unwrap();
        assert_eq!(end_code, EndCode::CommandError);
    }

    #[test]
    fn one_e_response_omits_payload_on_failure() {
        let req = parse_request(&build_request(
            FrameKind::OneE,
            command::BATCH_READ,
            sub_command::WORD,
            0,
            0xFF,
            0,
            &[],
        ))
        .unwrap();
        let resp = build_response(&req, EndCode::CommandError, &[9, 9]);
        assert_eq!(resp.len(), 2);
    }

    #[test]
    fn one_e_request_normalises_address_and_count_into_device_field() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x01); // word read
        buf.put_u8(0xFF); // pc_no
        buf.put_u16_le(10); // timer
        buf.put_u32_le(5); // address D5
        buf.put_u8(3); // count
        let req = parse_request(&buf).unwrap();
        assert_eq!(req.frame, FrameKind::OneE);
        assert_eq!(req.command, command::BATCH_READ);
        assert_eq!(req.sub_command, sub_command::WORD);
        let field = [req.command_data[0], req.command_data[1], req.command_data[2], req.command_data[3]];
        let (device, address) = crate::device::decode_device_field(&field).unwrap();
        assert_eq!(device, crate::device::DeviceType::D);
        assert_eq!(address, 5);
        let count = u16::from_le_bytes([req.command_data[4], req.command_data[5]]);
        assert_eq!(count, 3);
    }

    #[test]
    fn one_e_request_count_byte_zero_passes_through_unconverted() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x01);
        buf.put_u8(0xFF);
        buf.put_u16_le(10);
        buf.put_u32_le(0);
        buf.put_u8(0);
        let req = parse_request(&buf).unwrap();
        let count = u16::from_le_bytes([req.command_data[4], req.command_data[5]]);
        assert_eq!(count, 0);
    }

    #[test]
    fn one_e_build_and_parse_round_trips_through_device_field() {
        let command_data = {
            let mut d = BytesMut::new();
            d.extend_from_slice(&crate::device::encode_device_field(crate::device::DeviceType::D, 2));
            d.put_u16_le(4);
            d.freeze()
        };
        let wire = build_request(FrameKind::OneE, command::BATCH_READ, sub_command::WORD, 0, 0xFF, 0, &command_data);
        let req = parse_request(&wire).unwrap();
        assert_eq!(&req.command_data[..], &command_data[..]);
    }
}
