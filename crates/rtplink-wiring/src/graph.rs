//! Seams between the wiring engine and the media graph it drives.
//!
//! The engine never touches a media framework directly. It sees ports,
//! chains, a session multiplexer and the network sockets through the traits
//! below. Implementations:
//! - `rtplink_gst::RtpBinGraph`: GStreamer `rtpbin` + `udpsrc`/`udpsink`
//! - `testing::MemoryGraph`: in-memory graph used by the unit tests

use rtplink_core::{
    CapabilityDescriptor, MediaKind, NetworkSocket, PortDirection, PortRequest, WiringError,
};

use crate::control::ControlSender;

// MARK: - Release

/// A graph resource that must be handed back exactly once on shutdown.
pub trait Release {
    fn release(&self);
}

// MARK: - Port

/// Why the graph refused a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFailure {
    AlreadyLinked,
    WrongDirection,
    /// The two ports share no format.
    NoFormat,
    Refused(String),
}

impl std::fmt::Display for LinkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLinked => write!(f, "port already linked"),
            Self::WrongDirection => write!(f, "ports have incompatible directions"),
            Self::NoFormat => write!(f, "no common format"),
            Self::Refused(reason) => write!(f, "link refused: {reason}"),
        }
    }
}

/// Handle to an endpoint of a chain, socket, or the multiplexer.
///
/// Handles are cheap clones of one underlying port.
pub trait Port: Clone + std::fmt::Debug + Release + 'static {
    fn name(&self) -> String;

    fn direction(&self) -> PortDirection;

    /// `None` when the port accepts or produces anything.
    fn capabilities(&self) -> Option<CapabilityDescriptor>;

    fn is_linked(&self) -> bool;

    /// One link attempt from `self` (a source) into `sink`.
    fn link(&self, sink: &Self) -> Result<(), LinkFailure>;

    /// Let data through a port that was held back until its link attempt
    /// was over. Ports that are never held ignore this.
    fn unblock(&self) {}
}

// MARK: - MediaChain

/// A processing sub-graph with exactly one externally visible port: the
/// source port of a send chain or the sink port of a receive chain.
pub trait MediaChain: Clone + Release + 'static {
    type Port: Port;

    fn name(&self) -> String;

    fn port(&self) -> Self::Port;

    /// Bring the chain to the running state of its parent graph.
    fn activate(&self) -> Result<(), WiringError>;
}

// MARK: - Graph

/// Types shared by every graph-facing trait.
pub trait PortGraph {
    type Port: Port;
    type Chain: MediaChain<Port = Self::Port>;
}

/// The component that multiplexes media and control sessions over one
/// transport association.
pub trait SessionMultiplexer: PortGraph {
    fn request_port(&mut self, request: PortRequest) -> Result<Self::Port, WiringError>;

    /// Forward every port the multiplexer creates on its own (and every port
    /// it removes) into `events`. Delivery order is whatever the multiplexer
    /// emits.
    fn subscribe_port_added(&mut self, events: ControlSender<Self::Port>);
}

pub trait MediaChainFactory: PortGraph {
    fn build_send_chain(&mut self, kind: MediaKind) -> Result<Self::Chain, WiringError>;

    fn build_receive_chain(&mut self, kind: MediaKind) -> Result<Self::Chain, WiringError>;
}

/// UDP sockets facing the peer. They exist from construction, whether or not
/// the peer is sending.
pub trait NetworkSockets: PortGraph {
    fn socket_port(&mut self, socket: NetworkSocket) -> Result<Self::Port, WiringError>;

    /// Deliver without waiting on the media clock and without asynchronous
    /// state changes.
    fn disable_clock_sync(&mut self, socket: NetworkSocket) -> Result<(), WiringError>;
}

/// Everything the engine needs from a media graph. Dropping the graph tears
/// down the multiplexer itself.
pub trait MediaGraph: SessionMultiplexer + MediaChainFactory + NetworkSockets {
    /// Start data flow through the whole graph.
    fn start(&mut self) -> Result<(), WiringError>;
}
