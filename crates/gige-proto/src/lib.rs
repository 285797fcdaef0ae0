//! GigE Vision wire protocol: GVCP (control) and GVSP (streaming) header
//! encode/decode, transport-agnostic.

pub mod gvcp;
pub mod gvsp;

pub use gvcp::{
    AckHeader, AckStatus, CommandFlags, CommandHeader, GvcpCommand, GvcpError, HEADER_SIZE,
};
pub use gvsp::{GvspError, GvspHeader, LeaderBody, PacketFormat, PixelFormat, TrailerBody};
