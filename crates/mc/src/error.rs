//! Error types for the MC server and client.

use mc_proto::McError;
use thiserror::Error;

/// Errors surfaced by the MC TCP client.
#[derive(Debug, Error)]
pub enum McClientError {
    #[error("not connected")]
    NotConnected,
    #[error("request timed out")]
    Timeout,
    #[error("protocol error {code:#06x}: {message}")]
    ProtocolError { code: u16, message: String },
    #[error("frame codec error: {0}")]
    Codec(#[from] McError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
