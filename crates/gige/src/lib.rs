//! GigE Vision transport: GVCP discovery/control server and client, and GVSP
//! streaming server and receiver.

pub mod config;
pub mod error;
pub mod gvcp_client;
pub mod gvcp_server;
pub mod gvsp_client;
pub mod gvsp_server;
pub mod image_source;
pub mod register;
pub mod stats;

pub use error::GigeError;
pub use gige_proto as proto;
