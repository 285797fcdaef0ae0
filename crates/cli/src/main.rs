use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd_gige;
mod cmd_mc;
mod common;

use cmd_gige::GigeCmd;
use cmd_mc::McCmd;

#[derive(Parser, Debug)]
#[command(name = "protoctl", version, about = "GigE Vision and Mitsubishi MC protocol CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// GigE Vision discovery, streaming, and emulation.
    #[command(subcommand)]
    Gige(GigeCmd),
    /// Mitsubishi MELSEC-MC device emulation and client operations.
    #[command(subcommand)]
    Mc(McCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { verbose, cmd } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| level.into())))
        .with_target(false)
        .init();

    match cmd {
        Cmd::Gige(gige_cmd) => cmd_gige::run(gige_cmd).await?,
        Cmd::Mc(mc_cmd) => cmd_mc::run(mc_cmd).await?,
    }
    Ok(())
}
