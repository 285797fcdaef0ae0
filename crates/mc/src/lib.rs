//! Device store, command dispatcher, ladder engine, TCP server and client
//! for the Mitsubishi MELSEC-MC core.

pub mod client;
pub mod config;
pub mod device_store;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod ladder;
pub mod ladder_builder;
pub mod ladder_text;
pub mod remote_state;
pub mod server;

pub use client::McClient;
pub use config::McServerConfig;
pub use device_store::{DeviceStore, Series};
pub use error::McClientError;
pub use mc_proto as proto;
pub use remote_state::RemoteState;
pub use server::McServer;
