//! `protoctl mc` subcommands: running the emulator and driving it as a
//! client.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use mc::config::{McServerConfig, SeriesConfig};
use mc::{McClient, McServer};
use mc_proto::DeviceType;

use crate::common::{parse_device_ref, print_json};

#[derive(Subcommand, Debug)]
pub enum McCmd {
    /// Run an MC emulator (device store, command dispatcher, ladder engine)
    /// in the foreground until interrupted.
    Serve {
        #[arg(long, default_value_t = 5007)]
        port: u16,
        #[arg(long, value_enum, default_value = "q")]
        series: SeriesArg,
        #[arg(long)]
        ladder: Option<PathBuf>,
        #[arg(long, default_value_t = 10)]
        scan_interval_ms: u64,
    },
    /// Read word or bit devices from a running emulator.
    Read {
        device: SocketAddr,
        #[arg(long)]
        start: String,
        #[arg(long, default_value_t = 1)]
        count: u16,
        #[arg(long)]
        bit: bool,
    },
    /// Write word or bit devices on a running emulator.
    Write {
        device: SocketAddr,
        #[arg(long)]
        start: String,
        /// Values to write: decimal words, or `0`/`1` for bit devices.
        values: Vec<u16>,
        #[arg(long)]
        bit: bool,
    },
    /// Put a running emulator into RUN, STOP, PAUSE, or RESET.
    Remote {
        device: SocketAddr,
        #[arg(value_enum)]
        action: RemoteAction,
    },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum SeriesArg {
    Q,
    IqR,
}

impl From<SeriesArg> for SeriesConfig {
    fn from(value: SeriesArg) -> Self {
        match value {
            SeriesArg::Q => SeriesConfig::Q,
            SeriesArg::IqR => SeriesConfig::IqR,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum RemoteAction {
    Run,
    Stop,
    Pause,
    Reset,
}

#[derive(Serialize)]
struct ReadResult {
    device: String,
    start: String,
    words: Option<Vec<u16>>,
    bits: Option<Vec<bool>>,
}

pub async fn run(cmd: McCmd) -> Result<()> {
    match cmd {
        McCmd::Serve { port, series, ladder, scan_interval_ms } => serve(port, series, ladder, scan_interval_ms).await,
        McCmd::Read { device, start, count, bit } => read(device, &start, count, bit).await,
        McCmd::Write { device, start, values, bit } => write(device, &start, values, bit).await,
        McCmd::Remote { device, action } => remote(device, action).await,
    }
}

async fn serve(port: u16, series: SeriesArg, ladder: Option<PathBuf>, scan_interval_ms: u64) -> Result<()> {
    let config = McServerConfig {
        bind_ip: Ipv4Addr::UNSPECIFIED,
        port,
        series: series.into(),
        scan_interval_ms,
        ..McServerConfig::default()
    };
    let server = McServer::bind(config).await.context("bind MC server")?;

    if let Some(path) = ladder {
        let text = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let program = mc::ladder_text::parse_program(&text).with_context(|| format!("parse {}", path.display()))?;
        server.load_programs(vec![program]);
    }

    println!("serving MC emulator on port {port} (ctrl-c to stop)");
    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => server.stop(),
    }
    Ok(())
}

async fn read(addr: SocketAddr, start: &str, count: u16, bit: bool) -> Result<()> {
    let (device, address) = parse_device_ref(start)?;
    let mut client = McClient::connect(addr).await.context("connect")?;
    let result = if bit || device.is_bit_device() {
        let bits = client.read_bits(device, address, count).await.context("read bits")?;
        ReadResult { device: device_label(device, address), start: start.to_string(), words: None, bits: Some(bits) }
    } else {
        let words = client.read_words(device, address, count).await.context("read words")?;
        ReadResult { device: device_label(device, address), start: start.to_string(), words: Some(words), bits: None }
    };
    print_json(&result)
}

async fn write(addr: SocketAddr, start: &str, values: Vec<u16>, bit: bool) -> Result<()> {
    let (device, address) = parse_device_ref(start)?;
    let mut client = McClient::connect(addr).await.context("connect")?;
    if bit || device.is_bit_device() {
        let bits: Vec<bool> = values.iter().map(|v| *v != 0).collect();
        client.write_bits(device, address, &bits).await.context("write bits")?;
    } else {
        client.write_words(device, address, &values).await.context("write words")?;
    }
    println!("wrote {} value(s) to {}", values.len(), device_label(device, address));
    Ok(())
}

async fn remote(addr: SocketAddr, action: RemoteAction) -> Result<()> {
    let mut client = McClient::connect(addr).await.context("connect")?;
    match action {
        RemoteAction::Run => client.remote_run().await.context("remote run")?,
        RemoteAction::Stop => client.remote_stop().await.context("remote stop")?,
        RemoteAction::Pause => client.remote_pause().await.context("remote pause")?,
        RemoteAction::Reset => client.remote_reset().await.context("remote reset")?,
    }
    Ok(())
}

fn device_label(device: DeviceType, address: u32) -> String {
    if device.hex_addressed() {
        format!("{}{:X}", device.code(), address)
    } else {
        format!("{}{}", device.code(), address)
    }
}
