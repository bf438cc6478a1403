//! Control plane: the event channel, cooperative shutdown and the run loop.
//!
//! All structural graph mutation happens on the task that drives [`run`].
//! Other threads (multiplexer signal handlers, the bus watcher, Ctrl-C) only
//! post [`ControlEvent`]s. A shutdown request is just another event, so
//! teardown always happens after the current handler has returned.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::PortEventDispatcher;
use crate::graph::MediaGraph;

// MARK: - Events

#[derive(Debug)]
pub enum ControlEvent<P> {
    /// The multiplexer created a port on its own.
    PortAdded { name: String, port: P },
    /// The multiplexer removed a port, e.g. after a sender timed out.
    PortRemoved { name: String },
    /// Error surfaced by the transport layer or any graph element.
    TransportError {
        source_name: String,
        message: String,
        debug: Option<String>,
    },
    EndOfStream,
    Shutdown(ShutdownReason),
}

pub type ControlSender<P> = mpsc::UnboundedSender<ControlEvent<P>>;
pub type ControlReceiver<P> = mpsc::UnboundedReceiver<ControlEvent<P>>;

pub fn control_channel<P>() -> (ControlSender<P>, ControlReceiver<P>) {
    mpsc::unbounded_channel()
}

// MARK: - Shutdown

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    FormatMismatch { port: String },
    StructuralError { port: String, reason: String },
    TransportError { source_name: String, message: String },
    Interrupted,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormatMismatch { port } => write!(f, "format mismatch on '{port}'"),
            Self::StructuralError { port, reason } => write!(f, "structural error on '{port}': {reason}"),
            Self::TransportError { source_name, message } => {
                write!(f, "transport error from {source_name}: {message}")
            }
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Posts a shutdown request to the run loop, at most once.
#[derive(Debug)]
pub struct ShutdownHandle<P> {
    events: ControlSender<P>,
    posted: bool,
}

impl<P> ShutdownHandle<P> {
    pub fn new(events: ControlSender<P>) -> Self {
        Self { events, posted: false }
    }

    /// Returns `true` if this call posted the request.
    pub fn request(&mut self, reason: ShutdownReason) -> bool {
        if self.posted {
            debug!("Shutdown already requested, ignoring: {}", reason);
            return false;
        }
        self.posted = true;
        info!("Requesting shutdown: {}", reason);
        if self.events.send(ControlEvent::Shutdown(reason)).is_err() {
            warn!("Control loop is gone; shutdown request dropped");
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.posted
    }
}

// MARK: - Run loop

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped(ShutdownReason),
    /// The channel closed. The dispatcher's own [`ShutdownHandle`] holds a
    /// sender, so `run` cannot observe this while it owns the dispatcher; the
    /// variant only gives the closed-channel branch an outcome.
    Drained,
}

/// Drive the dispatcher until a shutdown request arrives, then tear the
/// session down in reverse acquisition order.
pub async fn run<G: MediaGraph>(
    mut dispatcher: PortEventDispatcher<G>,
    mut events: ControlReceiver<G::Port>,
) -> RunOutcome {
    let outcome = loop {
        let Some(event) = events.recv().await else {
            break RunOutcome::Drained;
        };

        match event {
            ControlEvent::PortAdded { name, port } => {
                dispatcher.on_port_added(&name, port);
            }
            ControlEvent::PortRemoved { name } => {
                dispatcher.on_port_removed(&name);
            }
            ControlEvent::TransportError { source_name, message, debug: debug_info } => {
                error!("Error received from element {}: {}", source_name, message);
                error!("Debugging information: {}", debug_info.as_deref().unwrap_or("none"));
                dispatcher.request_shutdown(ShutdownReason::TransportError { source_name, message });
            }
            ControlEvent::EndOfStream => {
                info!("End-Of-Stream reached");
            }
            ControlEvent::Shutdown(reason) => {
                break RunOutcome::Stopped(reason);
            }
        }
    };

    match &outcome {
        RunOutcome::Stopped(reason) => info!("Run loop stopped: {}", reason),
        RunOutcome::Drained => info!("Run loop stopped: no event sources left"),
    }
    dispatcher.into_state().teardown();
    outcome
}
