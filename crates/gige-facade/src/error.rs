use thiserror::Error;

/// Errors surfaced by the high level camera facade.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("transport: {0}")]
    Transport(#[from] gige::GigeError),
    #[error("IPv6 stream destinations are not supported")]
    Ipv6Unsupported,
}
