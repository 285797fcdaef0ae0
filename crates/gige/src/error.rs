use thiserror::Error;

/// Errors raised by the GigE Vision client and server implementations.
#[derive(Debug, Error)]
pub enum GigeError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(#[from] gige_proto::GvcpError),
    #[error("stream protocol: {0}")]
    Stream(#[from] gige_proto::GvspError),
    #[error("request timed out after {0} retries")]
    Timeout(u32),
    #[error("device reported status {0:?}")]
    Status(gige_proto::AckStatus),
    #[error("no response received")]
    NoResponse,
}
