//! Startup wiring that does not depend on what the peer does.
//!
//! ```text
//! send chain (video) ──► send_rtp_sink_0 ┐
//! send chain (audio) ──► send_rtp_sink_1 │
//! video_udp_src ───────► recv_rtp_sink_0 ├─ multiplexer
//! audio_udp_src ───────► recv_rtp_sink_1 │
//! rtcp_udp_src ────────► recv_rtcp_sink_0│
//! rtcp_udp_sink ◄─────── send_rtcp_src_0 ┘
//! ```
//!
//! Every port is requested by explicit session id, so correctness never
//! depends on the multiplexer's allocation order. The control pair is pinned
//! to session 0 and shared by both media kinds, matching the single control
//! socket pair.

use rtplink_core::{
    describe_capabilities, Direction, LinkResult, MediaKind, NetworkSocket, PerKind, PortRequest, PortTemplate,
    SessionKey, StartupError, WiringError,
};
use tracing::{error, info};

use crate::graph::{MediaChain, MediaGraph, Port};
use crate::link::PortLinkExecutor;
use crate::session::{ReleaseStack, SessionState, StaticTopology};

/// Session id the shared control ports are requested for.
pub const CONTROL_SESSION: u32 = 0;

pub struct StaticLinkEstablisher<G: MediaGraph> {
    graph: G,
    executor: PortLinkExecutor,
}

impl<G: MediaGraph> StaticLinkEstablisher<G> {
    pub fn new(graph: G) -> Self {
        Self { graph, executor: PortLinkExecutor }
    }

    /// Build the static topology and hand back the session state that owns it.
    ///
    /// Resources acquired before a failure are released in reverse order
    /// before the error is returned.
    pub fn establish(self) -> Result<SessionState<G>, StartupError> {
        let Self { mut graph, executor } = self;
        // declared before `chains` so an early return drops chains first
        let mut ports = ReleaseStack::default();
        let mut chains = ReleaseStack::default();
        let mut topology = StaticTopology::default();

        // 1. multiplexer media ports, one per direction and kind
        let send_ports = PerKind::new(
            request(&mut graph, &mut ports, PortRequest::media(PortTemplate::SendRtpSink, MediaKind::Video))?,
            request(&mut graph, &mut ports, PortRequest::media(PortTemplate::SendRtpSink, MediaKind::Audio))?,
        );
        let receive_ports = PerKind::new(
            request(&mut graph, &mut ports, PortRequest::media(PortTemplate::RecvRtpSink, MediaKind::Video))?,
            request(&mut graph, &mut ports, PortRequest::media(PortTemplate::RecvRtpSink, MediaKind::Audio))?,
        );

        // 2. send chains are built eagerly, never on demand
        let mut build_send = |graph: &mut G, kind: MediaKind| -> Result<G::Chain, StartupError> {
            let chain = graph.build_send_chain(kind)?;
            chains.push(format!("chain:{}", SessionKey::new(Direction::Send, kind)), chain.clone());
            Ok(chain)
        };
        let send_chains = PerKind::new(
            build_send(&mut graph, MediaKind::Video)?,
            build_send(&mut graph, MediaKind::Audio)?,
        );

        for kind in MediaKind::ALL {
            let source = send_chains.get(kind).port();
            link(&executor, &source, send_ports.get(kind))?;
            topology.media_links += 1;
        }

        // 3. receive sockets are open whether or not the peer sends yet
        for kind in MediaKind::ALL {
            let socket = graph.socket_port(NetworkSocket::MediaSource(kind))?;
            link(&executor, &socket, receive_ports.get(kind))?;
            ports.push(socket.name(), socket);
            topology.media_links += 1;
        }

        let media_sinks = PerKind::new(
            graph.socket_port(NetworkSocket::MediaSink(MediaKind::Video))?,
            graph.socket_port(NetworkSocket::MediaSink(MediaKind::Audio))?,
        );

        // 4. control pair; reports must not wait on the media clock
        let control_send = request(&mut graph, &mut ports, PortRequest::new(PortTemplate::SendRtcpSrc, CONTROL_SESSION))?;
        let control_receive = request(&mut graph, &mut ports, PortRequest::new(PortTemplate::RecvRtcpSink, CONTROL_SESSION))?;

        graph.disable_clock_sync(NetworkSocket::ControlSink)?;
        let control_sink = graph.socket_port(NetworkSocket::ControlSink)?;
        let control_source = graph.socket_port(NetworkSocket::ControlSource)?;

        link(&executor, &control_send, &control_sink)?;
        ports.push(control_sink.name(), control_sink);
        topology.control_links += 1;

        link(&executor, &control_source, &control_receive)?;
        ports.push(control_source.name(), control_source);
        topology.control_links += 1;

        info!(
            "Static wiring complete: {} media link(s), {} control link(s)",
            topology.media_links, topology.control_links
        );
        Ok(SessionState::new(graph, chains, ports, send_chains, media_sinks, topology))
    }
}

fn request<G: MediaGraph>(
    graph: &mut G,
    ports: &mut ReleaseStack,
    request: PortRequest,
) -> Result<G::Port, StartupError> {
    let port = graph.request_port(request).map_err(|err| {
        error!("Multiplexer failed to allocate {}: {}", request, err);
        StartupError::from(err)
    })?;
    ports.push(request.name(), port.clone());
    Ok(port)
}

/// At startup every link is under local control, so any failure is a defect.
fn link<P: Port>(executor: &PortLinkExecutor, src: &P, sink: &P) -> Result<(), StartupError> {
    match executor.link(src, sink) {
        LinkResult::Success => Ok(()),
        LinkResult::FormatMismatch { src_caps, sink_caps } => {
            let reason = format!(
                "'{}' -> '{}' share no format ({} vs {})",
                src.name(),
                sink.name(),
                describe_capabilities(src_caps.as_ref()),
                describe_capabilities(sink_caps.as_ref()),
            );
            error!("Static link failed: {}", reason);
            Err(WiringError::structural(reason).into())
        }
        LinkResult::StructuralError { reason } => {
            error!("Static link failed: {}", reason);
            Err(WiringError::structural(reason).into())
        }
    }
}
