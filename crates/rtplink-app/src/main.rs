use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;

use app::{Failure, Overrides};

/// Two-way RTP audio/video link over UDP.
///
/// On one machine:   rtplink --base-source-port 12345   and   rtplink --base-sink-port 12345
/// On a network:     rtplink --address <peer address>   on both hosts
#[derive(Parser, Debug)]
#[command(name = "rtplink", version, about, long_about = None)]
struct Cli {
    /// Peer host address [default: 0.0.0.0]
    #[arg(short, long)]
    address: Option<String>,

    /// Receive datagrams on ports starting with this one [default: 5000]
    #[arg(short = 's', long, value_parser = clap::value_parser!(u16).range(1..))]
    base_source_port: Option<u16>,

    /// Send datagrams to ports starting with this one [default: 5000]
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u16).range(1..))]
    base_sink_port: Option<u16>,

    /// JSON configuration file; flags above take precedence over it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // RUST_LOG=debug for more detail, GST_DEBUG=3 for GStreamer's own logs
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(Failure::Usage as u8),
            };
        }
    };

    info!("rtplink v{}", env!("CARGO_PKG_VERSION"));

    let overrides = Overrides {
        peer_address: cli.address,
        base_source_port: cli.base_source_port,
        base_sink_port: cli.base_sink_port,
    };

    match app::run(cli.config.as_deref(), overrides).await {
        Ok(()) => {
            info!("rtplink exited cleanly.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
