//! GVSP (GigE Vision Streaming Protocol) packet framing.
//!
//! Every GVSP packet carries an 8 byte header followed by a packet-format
//! specific body. All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of a GVSP packet header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Packet format discriminant carried in the GVSP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    /// First packet of a block, carries image metadata.
    Leader,
    /// Final packet of a block, carries the trailing line count.
    Trailer,
    /// Image data chunk.
    Payload,
    /// Single packet carrying an entire block (unused by this implementation).
    AllIn,
}

impl PacketFormat {
    const fn raw(self) -> u8 {
        match self {
            PacketFormat::Leader => 1,
            PacketFormat::Trailer => 2,
            PacketFormat::Payload => 3,
            PacketFormat::AllIn => 4,
        }
    }

    fn from_raw(raw: u8) -> Result<Self, GvspError> {
        match raw {
            1 => Ok(PacketFormat::Leader),
            2 => Ok(PacketFormat::Trailer),
            3 => Ok(PacketFormat::Payload),
            4 => Ok(PacketFormat::AllIn),
            other => Err(GvspError::Unsupported(other)),
        }
    }
}

/// Pixel format codes understood by this implementation.
///
/// `Bgr8` and `Rgb8` share the same wire code in the reference camera; this
/// implementation resolves that code to `Bgr8` by convention (see Open
/// Questions in the design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    Mono16,
    Bgr8,
    Rgb8,
    Other(u32),
}

impl PixelFormat {
    /// Raw GVSP pixel format code.
    pub const fn raw(self) -> u32 {
        match self {
            PixelFormat::Mono8 => 0x0101_0101,
            PixelFormat::Mono16 => 0x0101_0102,
            PixelFormat::Bgr8 => 0x0202_0105,
            PixelFormat::Rgb8 => 0x0202_0105,
            PixelFormat::Other(code) => code,
        }
    }

    /// Decode a pixel format code, defaulting ambiguous codes to `Bgr8`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x0101_0101 => PixelFormat::Mono8,
            0x0101_0102 => PixelFormat::Mono16,
            0x0202_0105 => PixelFormat::Bgr8,
            other => PixelFormat::Other(other),
        }
    }

    /// Number of bytes occupied by a single pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Mono16 => 2,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Other(_) => 1,
        }
    }
}

/// Errors produced while framing or parsing GVSP packets.
#[derive(Debug, Error)]
pub enum GvspError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported packet format: {0:#04x}")]
    Unsupported(u8),
}

/// GVSP packet header common to every packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GvspHeader {
    /// Status code (0 for a healthy stream).
    pub status: u16,
    /// Block (frame) identifier.
    pub block_id: u16,
    /// Packet format discriminant.
    pub format: PacketFormat,
    /// 24-bit packet identifier within the block.
    pub packet_id: u32,
}

impl GvspHeader {
    /// Encode the header into a fresh buffer with `capacity_hint` extra bytes reserved.
    pub fn encode(&self, capacity_hint: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + capacity_hint);
        buf.put_u16(self.status);
        buf.put_u16(self.block_id);
        buf.put_u8(self.format.raw());
        buf.put_uint(self.packet_id as u64, 3);
        buf
    }

    /// Parse a header and return it with the remaining body bytes.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8]), GvspError> {
        if buf.len() < HEADER_SIZE {
            return Err(GvspError::TooShort(buf.len()));
        }
        let mut cursor = buf;
        let status = cursor.get_u16();
        let block_id = cursor.get_u16();
        let format_raw = cursor.get_u8();
        let packet_id = cursor.get_uint(3) as u32;
        Ok((
            GvspHeader {
                status,
                block_id,
                format: PacketFormat::from_raw(format_raw)?,
                packet_id,
            },
            &buf[HEADER_SIZE..],
        ))
    }
}

/// Body of a Leader packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderBody {
    pub payload_type: u16,
    pub timestamp_ns: u64,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub offset_x: u16,
    pub offset_y: u16,
    pub padding_x: u32,
    pub padding_y: u32,
}

impl LeaderBody {
    /// Size of an encoded leader body, in bytes.
    pub const WIRE_SIZE: usize = 2 + 8 + 4 + 4 + 4 + 2 + 2 + 4 + 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.payload_type);
        buf.put_u64(self.timestamp_ns);
        buf.put_u32(self.pixel_format.raw());
        buf.put_u32(self.width);
        buf.put_u32(self.height);
        buf.put_u16(self.offset_x);
        buf.put_u16(self.offset_y);
        buf.put_u32(self.padding_x);
        buf.put_u32(self.padding_y);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, GvspError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(GvspError::TooShort(buf.len()));
        }
        let payload_type = buf.get_u16();
        let timestamp_ns = buf.get_u64();
        let pixel_format = PixelFormat::from_raw(buf.get_u32());
        let width = buf.get_u32();
        let height = buf.get_u32();
        let offset_x = buf.get_u16();
        let offset_y = buf.get_u16();
        let padding_x = buf.get_u32();
        let padding_y = buf.get_u32();
        Ok(LeaderBody {
            payload_type,
            timestamp_ns,
            pixel_format,
            width,
            height,
            offset_x,
            offset_y,
            padding_x,
            padding_y,
        })
    }
}

/// Body of a Trailer packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerBody {
    pub payload_type: u16,
    pub size_y: u32,
}

impl TrailerBody {
    /// Size of an encoded trailer body, in bytes.
    pub const WIRE_SIZE: usize = 2 + 2 + 4;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.payload_type);
        buf.put_u16(0); // reserved
        buf.put_u32(self.size_y);
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, GvspError> {
        if buf.len() < Self::WIRE_SIZE {
            return Err(GvspError::TooShort(buf.len()));
        }
        let payload_type = buf.get_u16();
        let _reserved = buf.get_u16();
        let size_y = buf.get_u32();
        Ok(TrailerBody {
            payload_type,
            size_y,
        })
    }
}

/// Build a complete Leader packet.
pub fn encode_leader(block_id: u16, body: &LeaderBody) -> Bytes {
    let header = GvspHeader {
        status: 0,
        block_id,
        format: PacketFormat::Leader,
        packet_id: 0,
    };
    let mut buf = header.encode(LeaderBody::WIRE_SIZE);
    body.encode(&mut buf);
    buf.freeze()
}

/// Build a complete Trailer packet.
pub fn encode_trailer(block_id: u16, body: &TrailerBody) -> Bytes {
    let header = GvspHeader {
        status: 0,
        block_id,
        format: PacketFormat::Trailer,
        packet_id: 0,
    };
    let mut buf = header.encode(TrailerBody::WIRE_SIZE);
    body.encode(&mut buf);
    buf.freeze()
}

/// Build a complete Payload packet.
pub fn encode_payload(block_id: u16, packet_id: u32, data: &[u8]) -> Bytes {
    let header = GvspHeader {
        status: 0,
        block_id,
        format: PacketFormat::Payload,
        packet_id,
    };
    let mut buf = header.encode(data.len());
    buf.extend_from_slice(data);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = GvspHeader {
            status: 0,
            block_id: 7,
            format: PacketFormat::Payload,
            packet_id: 0x00AB_CDEF & 0x00FF_FFFF,
        };
        let buf = header.encode(0);
        let (parsed, rest) = GvspHeader::parse(&buf).expect("parse");
        assert_eq!(parsed, header);
        assert!(rest.is_empty());
    }

    #[test]
    fn leader_roundtrip() {
        let body = LeaderBody {
            payload_type: 1,
            timestamp_ns: 123_456_789,
            pixel_format: PixelFormat::Mono8,
            width: 64,
            height: 48,
            offset_x: 0,
            offset_y: 0,
            padding_x: 0,
            padding_y: 0,
        };
        let packet = encode_leader(3, &body);
        let (header, rest) = GvspHeader::parse(&packet).expect("parse header");
        assert_eq!(header.format, PacketFormat::Leader);
        assert_eq!(header.block_id, 3);
        let decoded = LeaderBody::decode(rest).expect("decode body");
        assert_eq!(decoded, body);
    }

    #[test]
    fn trailer_roundtrip() {
        let body = TrailerBody {
            payload_type: 1,
            size_y: 48,
        };
        let packet = encode_trailer(3, &body);
        let (header, rest) = GvspHeader::parse(&packet).expect("parse header");
        assert_eq!(header.format, PacketFormat::Trailer);
        let decoded = TrailerBody::decode(rest).expect("decode body");
        assert_eq!(decoded, body);
    }

    #[test]
    fn rejects_unsupported_format() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u8(0x7F);
        buf.put_uint(0, 3);
        assert!(matches!(
            GvspHeader::parse(&buf),
            Err(GvspError::Unsupported(0x7F))
        ));
    }
}
