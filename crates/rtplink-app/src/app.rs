use std::path::Path;

use anyhow::Context;
use rtplink_core::{RtpLinkConfig, StartupError, TransportEndpointConfig};
use rtplink_gst::RtpBinGraph;
use rtplink_wiring::{
    control_channel, ControlEvent, PortEventDispatcher, RunOutcome, SessionMultiplexer, ShutdownHandle,
    ShutdownReason, StaticLinkEstablisher,
};
use tracing::{info, warn};

// MARK: - Exit codes

/// Failure classes, each with its own process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Structural = 1,
    PortAllocation = 2,
    Usage = 3,
    Playing = 4,
    /// The run was cancelled by a format mismatch or a transport error.
    Cancelled = 5,
}

#[derive(Debug)]
pub struct AppError {
    pub failure: Failure,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn new(failure: Failure, error: impl Into<anyhow::Error>) -> Self {
        Self { failure, error: error.into() }
    }

    pub fn exit_code(&self) -> u8 {
        self.failure as u8
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

fn startup_failure(err: StartupError) -> AppError {
    let failure = match err {
        StartupError::PortAllocationFailure { .. } => Failure::PortAllocation,
        StartupError::StructuralError { .. } => Failure::Structural,
    };
    AppError::new(failure, anyhow::Error::new(err).context("static wiring"))
}

fn run_result(outcome: RunOutcome) -> Result<(), AppError> {
    let reason = match outcome {
        RunOutcome::Drained | RunOutcome::Stopped(ShutdownReason::Interrupted) => return Ok(()),
        RunOutcome::Stopped(reason) => reason,
    };
    let failure = match reason {
        ShutdownReason::StructuralError { .. } => Failure::Structural,
        _ => Failure::Cancelled,
    };
    Err(AppError::new(failure, anyhow::anyhow!("run cancelled: {reason}")))
}

// MARK: - Configuration

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub peer_address: Option<String>,
    pub base_source_port: Option<u16>,
    pub base_sink_port: Option<u16>,
}

impl Overrides {
    fn apply(self, endpoint: &mut TransportEndpointConfig) {
        if let Some(address) = self.peer_address {
            endpoint.peer_address = address;
        }
        if let Some(port) = self.base_source_port {
            endpoint.source_base = port;
        }
        if let Some(port) = self.base_sink_port {
            endpoint.sink_base = port;
        }
    }
}

pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<RtpLinkConfig, AppError> {
    let usage = |err| AppError::new(Failure::Usage, err);

    let mut config = match path {
        Some(path) => RtpLinkConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))
            .map_err(usage)?,
        None => RtpLinkConfig::default(),
    };
    overrides.apply(&mut config.endpoint);
    config.validate().context("invalid configuration").map_err(usage)?;
    Ok(config)
}

// MARK: - Run

/// Build the graph, wire it, start it and serve port events until shutdown.
///
/// # Flow
/// 1. Create the `rtpbin` pipeline with its six UDP sockets
/// 2. Subscribe to dynamic ports; events queue until the loop runs
/// 3. Establish the static links
/// 4. Set the pipeline to PLAYING
/// 5. Dispatch port events until a shutdown request, then tear down
pub async fn run(config_path: Option<&Path>, overrides: Overrides) -> Result<(), AppError> {
    let config = load_config(config_path, overrides)?;

    let mut graph = RtpBinGraph::new(&config)
        .context("creating the media graph")
        .map_err(|e| AppError::new(Failure::Structural, e))?;

    // The multiplexer announces send ports as soon as they are requested,
    // so subscribe first. Nothing is dispatched before static wiring is done.
    let (events, receiver) = control_channel();
    graph.subscribe_port_added(events.clone());

    let mut state = StaticLinkEstablisher::new(graph).establish().map_err(startup_failure)?;
    state
        .start()
        .context("Couldn't set the pipeline to PLAYING")
        .map_err(|e| AppError::new(Failure::Playing, e))?;

    let interrupt = events.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                let _ = interrupt.send(ControlEvent::Shutdown(ShutdownReason::Interrupted));
            }
            Err(e) => warn!("Ctrl-C handler unavailable: {e}"),
        }
    });

    let dispatcher = PortEventDispatcher::new(state, ShutdownHandle::new(events));
    info!("Waiting for the peer. Press Ctrl-C to stop.");
    run_result(rtplink_wiring::run(dispatcher, receiver).await)
}
