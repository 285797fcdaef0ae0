//! `protoctl gige` subcommands: discovery, one-shot frame grab, and running
//! the emulator.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde::Serialize;

use gige::config::GigeServerConfig;
use gige::gvcp_server::GvcpServer;
use gige::gvsp_server::GvspServer;
use gige::image_source::{ImageSourceConfig, TestPatternSource};
use gige_facade::stream::StreamBuilder;
use gige_facade::Camera;

use crate::common::{print_json, save_image};

#[derive(Subcommand, Debug)]
pub enum GigeCmd {
    /// Broadcast a discovery request and list the devices that answer.
    Discover {
        #[arg(long, default_value_t = 500)]
        wait_ms: u64,
    },
    /// Connect to a device, acquire one frame, and save it as a PGM/PPM file.
    Grab {
        /// Device IPv4 address (control port 3956 is assumed).
        device: Ipv4Addr,
        #[arg(long, default_value = "frame.pgm")]
        out: PathBuf,
        #[arg(long, default_value_t = 1400)]
        packet_size: u16,
    },
    /// Run a GVCP/GVSP emulator in the foreground, serving a procedural
    /// test-pattern gallery until interrupted.
    Serve {
        #[arg(long, default_value_t = 3956)]
        port: u16,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 30.0)]
        frame_rate: f64,
    },
}

#[derive(Serialize)]
struct DiscoveredDevice {
    ip: Ipv4Addr,
    mac: String,
    model: String,
    serial: String,
}

pub async fn run(cmd: GigeCmd) -> Result<()> {
    match cmd {
        GigeCmd::Discover { wait_ms } => discover(wait_ms).await,
        GigeCmd::Grab { device, out, packet_size } => grab(device, out, packet_size).await,
        GigeCmd::Serve { port, width, height, frame_rate } => serve(port, width, height, frame_rate).await,
    }
}

async fn discover(wait_ms: u64) -> Result<()> {
    let devices = Camera::discover(Duration::from_millis(wait_ms)).await.context("discovery failed")?;
    let rows: Vec<DiscoveredDevice> = devices
        .iter()
        .map(|d| DiscoveredDevice {
            ip: d.ip,
            mac: crate::common::format_mac(&d.mac),
            model: d.model.clone(),
            serial: d.serial.clone(),
        })
        .collect();
    print_json(&rows)
}

async fn grab(device: Ipv4Addr, out: PathBuf, packet_size: u16) -> Result<()> {
    let remote = SocketAddr::from((device, 3956));
    let mut camera = Camera::connect(remote).await.with_context(|| format!("connect to {device}"))?;
    let mut stream = StreamBuilder::new(Ipv4Addr::UNSPECIFIED).build().await.context("bind stream socket")?;
    camera.start_acquisition(stream.local_addr(), packet_size).await.context("start acquisition")?;

    let deadline = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(deadline);
    let frame = loop {
        tokio::select! {
            event = stream.next() => {
                if let Some(gige_facade::Event::FrameReceived(frame)) = event {
                    break Some(frame);
                }
            }
            _ = &mut deadline => break None,
        }
    };
    camera.stop_acquisition().await.ok();

    let Some(frame) = frame else {
        bail!("no complete frame received within 5s");
    };
    let encoded = crate::common::encode_pgm(frame.width, frame.height, &frame.data)?;
    save_image(&encoded, &out)?;
    println!("saved {}x{} frame to {}", frame.width, frame.height, out.display());
    Ok(())
}

async fn serve(port: u16, width: u32, height: u32, frame_rate: f64) -> Result<()> {
    let mut config = GigeServerConfig::default();
    config.gvcp_port = port;
    config.image_source = ImageSourceConfig::TestPattern { width, height };

    let (gvcp, stream_rx) = GvcpServer::bind(&config).await.context("bind GVCP server")?;
    let source = Box::new(TestPatternSource::new(width, height));
    let mut gvsp = GvspServer::bind(config.bind_ip, source, frame_rate)
        .await
        .context("bind GVSP server")?;

    println!("serving GigE Vision emulator on port {port} (ctrl-c to stop)");
    tokio::select! {
        result = gvcp.run() => result.context("gvcp server exited")?,
        result = gvsp.drive(stream_rx) => result.context("gvsp server exited")?,
        _ = tokio::signal::ctrl_c() => {}
    }
    Ok(())
}
