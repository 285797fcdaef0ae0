//! GVCP (GigE Vision Control Protocol) packet framing.
//!
//! Requests and acknowledgements share an 8 byte header. All integers are
//! big-endian, per the GigE Vision specification.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of a GVCP header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Fixed key byte that marks the start of every GVCP packet.
pub const PACKET_KEY: u8 = 0x42;

bitflags! {
    /// Flags carried in the second header byte of a GVCP request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CommandFlags: u8 {
        /// Request an acknowledgement for this command.
        const ACK_REQUIRED = 0x01;
    }
}

/// GVCP commands implemented by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GvcpCommand {
    /// Broadcast discovery request.
    Discovery,
    /// Read one or more bootstrap registers.
    ReadRegister,
    /// Write one or more bootstrap registers.
    WriteRegister,
    /// Read a block of device memory (e.g. a string register).
    ReadMemory,
    /// Write a block of device memory.
    WriteMemory,
}

impl GvcpCommand {
    /// Raw command code as defined by the GigE Vision specification.
    pub const fn command_code(self) -> u16 {
        match self {
            GvcpCommand::Discovery => 0x0002,
            GvcpCommand::ReadRegister => 0x0080,
            GvcpCommand::WriteRegister => 0x0082,
            GvcpCommand::ReadMemory => 0x0084,
            GvcpCommand::WriteMemory => 0x0086,
        }
    }

    /// Raw acknowledgement code for this command.
    pub const fn ack_code(self) -> u16 {
        match self {
            GvcpCommand::Discovery => 0x0003,
            GvcpCommand::ReadRegister => 0x0081,
            GvcpCommand::WriteRegister => 0x0083,
            GvcpCommand::ReadMemory => 0x0085,
            GvcpCommand::WriteMemory => 0x0087,
        }
    }

    /// Decode a command from its raw wire value.
    pub fn from_command_code(code: u16) -> Option<Self> {
        match code {
            0x0002 => Some(GvcpCommand::Discovery),
            0x0080 => Some(GvcpCommand::ReadRegister),
            0x0082 => Some(GvcpCommand::WriteRegister),
            0x0084 => Some(GvcpCommand::ReadMemory),
            0x0086 => Some(GvcpCommand::WriteMemory),
            _ => None,
        }
    }
}

/// Status codes returned in a GVCP acknowledgement header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Command completed successfully.
    Success,
    /// The requested command is not implemented by this device.
    NotImplemented,
    /// One of the command parameters was invalid.
    InvalidParameter,
    /// A status value not known to this implementation.
    Unknown(u16),
}

impl AckStatus {
    /// Convert from the raw status field of an acknowledgement.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x0000 => AckStatus::Success,
            0x8001 => AckStatus::NotImplemented,
            0x8002 => AckStatus::InvalidParameter,
            other => AckStatus::Unknown(other),
        }
    }

    /// Convert to the raw value stored on the wire.
    pub const fn to_raw(self) -> u16 {
        match self {
            AckStatus::Success => 0x0000,
            AckStatus::NotImplemented => 0x8001,
            AckStatus::InvalidParameter => 0x8002,
            AckStatus::Unknown(code) => code,
        }
    }
}

/// Errors produced while framing or parsing GVCP packets.
#[derive(Debug, Error)]
pub enum GvcpError {
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),
    #[error("unknown command: {0:#06x}")]
    UnknownCommand(u16),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Header for a GVCP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Request flags.
    pub flags: CommandFlags,
    /// Command being issued.
    pub command: GvcpCommand,
    /// Length of the payload in bytes.
    pub length: u16,
    /// Request identifier chosen by the client.
    pub request_id: u16,
}

impl CommandHeader {
    /// Encode this header followed by `payload` into a single buffer.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        debug_assert_eq!(self.length as usize, payload.len());
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u8(PACKET_KEY);
        buf.put_u8(self.flags.bits());
        buf.put_u16(self.command.command_code());
        buf.put_u16(self.length);
        buf.put_u16(self.request_id);
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    /// Parse a request header and return it together with the remaining payload.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8]), GvcpError> {
        if buf.len() < HEADER_SIZE {
            return Err(GvcpError::InvalidPacket("too short"));
        }
        if buf[0] != PACKET_KEY {
            return Err(GvcpError::InvalidPacket("bad key"));
        }
        let mut cursor = &buf[1..];
        let flags = CommandFlags::from_bits_truncate(cursor.get_u8());
        let command_code = cursor.get_u16();
        let length = cursor.get_u16();
        let request_id = cursor.get_u16();
        let command = GvcpCommand::from_command_code(command_code)
            .ok_or(GvcpError::UnknownCommand(command_code))?;
        let payload = &buf[HEADER_SIZE..];
        Ok((
            CommandHeader {
                flags,
                command,
                length,
                request_id,
            },
            payload,
        ))
    }
}

/// Header for a GVCP acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckHeader {
    /// Status reported by the device.
    pub status: AckStatus,
    /// Command this acknowledgement answers.
    pub command: GvcpCommand,
    /// Length of the payload in bytes.
    pub length: u16,
    /// Request identifier that this acknowledgement answers.
    pub request_id: u16,
}

impl AckHeader {
    /// Encode this header followed by `payload`.
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u16(self.status.to_raw());
        buf.put_u16(self.command.ack_code());
        buf.put_u16(payload.len() as u16);
        buf.put_u16(self.request_id);
        buf.extend_from_slice(payload);
        buf.freeze()
    }

    /// Parse an acknowledgement header and return it with the remaining payload.
    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8]), GvcpError> {
        if buf.len() < HEADER_SIZE {
            return Err(GvcpError::InvalidPacket("too short"));
        }
        let mut cursor = buf;
        let status = AckStatus::from_raw(cursor.get_u16());
        let ack_code = cursor.get_u16();
        let length = cursor.get_u16();
        let request_id = cursor.get_u16();

        let expected = HEADER_SIZE + length as usize;
        if buf.len() != expected {
            return Err(GvcpError::InvalidPacket("length mismatch"));
        }

        let command = command_from_ack_code(ack_code).ok_or(GvcpError::UnknownCommand(ack_code))?;
        Ok((
            AckHeader {
                status,
                command,
                length,
                request_id,
            },
            &buf[HEADER_SIZE..],
        ))
    }
}

fn command_from_ack_code(code: u16) -> Option<GvcpCommand> {
    [
        GvcpCommand::Discovery,
        GvcpCommand::ReadRegister,
        GvcpCommand::WriteRegister,
        GvcpCommand::ReadMemory,
        GvcpCommand::WriteMemory,
    ]
    .into_iter()
    .find(|c| c.ack_code() == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_header_roundtrip() {
        let header = CommandHeader {
            flags: CommandFlags::ACK_REQUIRED,
            command: GvcpCommand::ReadRegister,
            length: 4,
            request_id: 0x0102,
        };
        let encoded = header.encode(&[1, 2, 3, 4]);
        let (parsed, payload) = CommandHeader::parse(&encoded).expect("parse");
        assert_eq!(parsed, header);
        assert_eq!(payload, &[1, 2, 3, 4]);
    }

    #[test]
    fn ack_header_roundtrip() {
        let header = AckHeader {
            status: AckStatus::Success,
            command: GvcpCommand::Discovery,
            length: 0,
            request_id: 0xFFFF,
        };
        let encoded = header.encode(&[]);
        let (parsed, payload) = AckHeader::parse(&encoded).expect("parse");
        assert_eq!(parsed, header);
        assert!(payload.is_empty());
    }

    #[test]
    fn rejects_bad_key() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0] = 0x00;
        assert!(matches!(
            CommandHeader::parse(&buf),
            Err(GvcpError::InvalidPacket("bad key"))
        ));
    }
}
