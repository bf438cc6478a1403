//! `rtpbin` pipeline implementing the engine's graph traits.
//!
//! ```text
//! ┌────────── pipeline "rtplink" ──────────────────────────────────┐
//! │ video_udp_src ┐                          ┌ video_udp_sink      │
//! │ audio_udp_src ├──► rtpbin (sessions 0,1) ├ audio_udp_sink      │
//! │ rtcp_udp_src  ┘     ▲             │      └ rtcp_udp_sink       │
//! │              send chains    receive chains (on demand)         │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use gstreamer as gst;
use gstreamer::prelude::*;
use rtplink_core::{
    ChainProfile, Direction, MediaKind, NetworkSocket, PortRequest, RtpLinkConfig, SessionKey, WiringError,
};
use rtplink_wiring::{
    ControlEvent, ControlSender, MediaChainFactory, MediaGraph, NetworkSockets, Port, PortGraph,
    SessionMultiplexer,
};
use tracing::{debug, info, warn};

use crate::bus::BusWatcher;
use crate::caps::caps_from_descriptor;
use crate::error::GraphError;
use crate::port::{GstChain, GstPort};

const SOCKETS: [NetworkSocket; 6] = [
    NetworkSocket::MediaSource(MediaKind::Video),
    NetworkSocket::MediaSource(MediaKind::Audio),
    NetworkSocket::ControlSource,
    NetworkSocket::MediaSink(MediaKind::Video),
    NetworkSocket::MediaSink(MediaKind::Audio),
    NetworkSocket::ControlSink,
];

pub struct RtpBinGraph {
    pipeline: gst::Pipeline,
    rtpbin: gst::Element,
    sockets: HashMap<NetworkSocket, gst::Element>,
    chains: ChainProfile,
    watcher: Option<BusWatcher>,
}

impl RtpBinGraph {
    /// Create the pipeline with the multiplexer and all six sockets.
    ///
    /// Nothing is linked yet and the peer address is never resolved here.
    pub fn new(config: &RtpLinkConfig) -> Result<Self, GraphError> {
        gst::init()?;

        let pipeline = gst::Pipeline::with_name("rtplink");
        let rtpbin = make("rtpbin", "rtpbin")?;
        pipeline.add(&rtpbin)?;

        let endpoint = &config.endpoint;
        let mut sockets = HashMap::new();
        for socket in SOCKETS {
            let name = socket.to_string();
            let port = i32::from(endpoint.socket_port(socket));
            let element = match socket {
                NetworkSocket::MediaSource(kind) => gst::ElementFactory::make("udpsrc")
                    .name(name.as_str())
                    .property("port", port)
                    .property("caps", caps_from_descriptor(config.chains.receive_caps(kind)))
                    .build(),
                NetworkSocket::ControlSource => gst::ElementFactory::make("udpsrc")
                    .name(name.as_str())
                    .property("port", port)
                    .build(),
                NetworkSocket::MediaSink(_) | NetworkSocket::ControlSink => gst::ElementFactory::make("udpsink")
                    .name(name.as_str())
                    .property("host", endpoint.peer_address.as_str())
                    .property("port", port)
                    .build(),
            }
            .map_err(|err| GraphError::Element { factory: name.clone(), reason: err.to_string() })?;
            pipeline.add(&element)?;
            sockets.insert(socket, element);
        }

        info!("Port map: {}", endpoint.port_map());
        Ok(Self {
            pipeline,
            rtpbin,
            sockets,
            chains: config.chains.clone(),
            watcher: None,
        })
    }

    fn socket(&self, socket: NetworkSocket) -> Result<&gst::Element, WiringError> {
        self.sockets
            .get(&socket)
            .ok_or_else(|| WiringError::structural(format!("socket {socket} was never created")))
    }

    fn build_chain(&mut self, key: SessionKey) -> Result<GstChain, WiringError> {
        let chain_error = |reason: String| WiringError::ChainBuild {
            direction: key.direction,
            kind: key.kind,
            reason,
        };

        let description = self.chains.description(key.direction, key.kind);
        // unlinked pads become ghost pads named "src" / "sink"
        let bin = gst::parse::bin_from_description(description, true).map_err(|err| chain_error(err.to_string()))?;
        let pad_name = match key.direction {
            Direction::Send => "src",
            Direction::Receive => "sink",
        };
        let pad = bin
            .static_pad(pad_name)
            .ok_or_else(|| chain_error(format!("'{description}' has no free {pad_name} pad")))?;
        self.pipeline.add(&bin).map_err(|err| chain_error(err.to_string()))?;

        let name = key.to_string();
        debug!("Built {} chain: {}", name, description);
        let port = GstPort::owned_by(format!("{name}:{pad_name}"), pad);
        Ok(GstChain::new(name, bin, port, self.pipeline.clone()))
    }
}

fn make(factory: &str, name: &str) -> Result<gst::Element, GraphError> {
    gst::ElementFactory::make(factory)
        .name(name)
        .build()
        .map_err(|err| GraphError::Element { factory: factory.into(), reason: err.to_string() })
}

impl Drop for RtpBinGraph {
    fn drop(&mut self) {
        drop(self.watcher.take());
        if self.pipeline.set_state(gst::State::Null).is_err() {
            warn!("Pipeline did not reach the NULL state");
        }
    }
}

impl PortGraph for RtpBinGraph {
    type Port = GstPort;
    type Chain = GstChain;
}

impl SessionMultiplexer for RtpBinGraph {
    fn request_port(&mut self, request: PortRequest) -> Result<GstPort, WiringError> {
        let pad = self
            .rtpbin
            .request_pad_simple(&request.name())
            .ok_or_else(|| WiringError::PortAllocation { request: request.to_string() })?;
        debug!("Obtained request port {}", pad.name());
        Ok(GstPort::requested(pad))
    }

    fn subscribe_port_added(&mut self, events: ControlSender<GstPort>) {
        let added = events.clone();
        self.rtpbin.connect_pad_added(move |_, pad| {
            let event = ControlEvent::PortAdded {
                name: pad.name().to_string(),
                port: GstPort::dynamic(pad.clone()),
            };
            if let Err(unsent) = added.send(event) {
                debug!("Control loop gone, dropping port {}", pad.name());
                if let ControlEvent::PortAdded { port, .. } = unsent.0 {
                    port.unblock();
                }
            }
        });

        let removed = events.clone();
        self.rtpbin.connect_pad_removed(move |_, pad| {
            let _ = removed.send(ControlEvent::PortRemoved { name: pad.name().to_string() });
        });

        let Some(bus) = self.pipeline.bus() else {
            warn!("Pipeline has no bus; errors will not be reported");
            return;
        };
        match BusWatcher::spawn(bus, events) {
            Ok(watcher) => self.watcher = Some(watcher),
            Err(err) => warn!("Bus watcher unavailable: {}", err),
        }
    }
}

impl MediaChainFactory for RtpBinGraph {
    fn build_send_chain(&mut self, kind: MediaKind) -> Result<GstChain, WiringError> {
        self.build_chain(SessionKey::new(Direction::Send, kind))
    }

    fn build_receive_chain(&mut self, kind: MediaKind) -> Result<GstChain, WiringError> {
        self.build_chain(SessionKey::new(Direction::Receive, kind))
    }
}

impl NetworkSockets for RtpBinGraph {
    fn socket_port(&mut self, socket: NetworkSocket) -> Result<GstPort, WiringError> {
        let pad_name = match socket {
            NetworkSocket::MediaSource(_) | NetworkSocket::ControlSource => "src",
            NetworkSocket::MediaSink(_) | NetworkSocket::ControlSink => "sink",
        };
        let pad = self
            .socket(socket)?
            .static_pad(pad_name)
            .ok_or_else(|| WiringError::structural(format!("{socket} has no {pad_name} pad")))?;
        Ok(GstPort::owned_by(socket.to_string(), pad))
    }

    fn disable_clock_sync(&mut self, socket: NetworkSocket) -> Result<(), WiringError> {
        if !matches!(socket, NetworkSocket::MediaSink(_) | NetworkSocket::ControlSink) {
            return Err(WiringError::structural(format!("{socket} is not a network sink")));
        }
        let element = self.socket(socket)?;
        element.set_property("sync", false);
        element.set_property("async", false);
        Ok(())
    }
}

impl MediaGraph for RtpBinGraph {
    fn start(&mut self) -> Result<(), WiringError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| WiringError::structural("Unable to set the pipeline to the playing state"))?;
        info!("Pipeline playing");
        Ok(())
    }
}
