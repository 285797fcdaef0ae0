//! Discover a GigE Vision device, start acquisition, and print the first
//! few assembled frames.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use gige_facade::stream::StreamBuilder;
use gige_facade::Camera;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let devices = Camera::discover(Duration::from_millis(500)).await?;
    let Some(device) = devices.first() else {
        println!("no GigE Vision devices found");
        return Ok(());
    };
    println!("found {} at {}", device.model, device.ip);

    let remote = SocketAddr::from((device.ip, 3956));
    let mut camera = Camera::connect(remote).await?;
    let mut stream = StreamBuilder::new(Ipv4Addr::UNSPECIFIED).build().await?;
    camera.start_acquisition(stream.local_addr(), 1400).await?;

    for _ in 0..5 {
        if let Some(event) = stream.next().await {
            println!("{event:?}");
        }
    }

    camera.stop_acquisition().await?;
    Ok(())
}
