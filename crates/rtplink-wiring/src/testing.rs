//! In-memory media graph for the engine's tests.
//!
//! Every port, chain and socket writes what happens to it into a shared
//! [`Ledger`], so tests can assert on link attempts, chain builds,
//! activations and the order resources were released in.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rtplink_core::{
    CapabilityDescriptor, ChainProfile, Direction, MediaKind, NetworkSocket, PortDirection,
    PortRequest, PortTemplate, SessionKey, TransportEndpointConfig, WiringError,
};

use crate::control::{ControlEvent, ControlSender};
use crate::graph::{
    LinkFailure, MediaChain, MediaChainFactory, MediaGraph, NetworkSockets, Port, PortGraph,
    Release, SessionMultiplexer,
};

// MARK: - Ledger

#[derive(Debug, Default)]
pub struct Ledger {
    pub requests: Vec<String>,
    /// Every call to `Port::link`, successful or not, as (src, sink).
    pub link_attempts: Vec<(String, String)>,
    /// Pairs currently linked.
    pub links: Vec<(String, String)>,
    links_made: usize,
    pub chains_built: Vec<SessionKey>,
    pub activations: Vec<String>,
    pub releases: Vec<String>,
    /// Ports let through by `Port::unblock`, with the link attempts made by then.
    pub unblocked: Vec<(String, usize)>,
    pub unsynced: Vec<NetworkSocket>,
    pub socket_ports: HashMap<String, u16>,
    pub started: bool,

    pub refuse_request: Option<String>,
    pub refuse_chain: Option<SessionKey>,
    pub refuse_activation: bool,
    refuse_next_format: bool,
    /// Caps override for one multiplexer send port.
    pub send_port_caps: Option<(MediaKind, CapabilityDescriptor)>,

    peers: HashMap<u64, u64>,
}

impl Ledger {
    pub fn successful_links(&self) -> usize {
        self.links_made
    }

    pub fn is_linked(&self, src: &str, sink: &str) -> bool {
        self.links.iter().any(|(s, k)| s == src && k == sink)
    }
}

pub type SharedLedger = Rc<RefCell<Ledger>>;

// MARK: - MemPort

#[derive(Clone)]
pub struct MemPort {
    id: u64,
    name: String,
    direction: PortDirection,
    caps: Option<CapabilityDescriptor>,
    ledger: SharedLedger,
}

impl MemPort {
    fn unlink(&self) {
        let mut ledger = self.ledger.borrow_mut();
        if let Some(peer) = ledger.peers.remove(&self.id) {
            ledger.peers.remove(&peer);
            let name = &self.name;
            ledger.links.retain(|(src, sink)| src != name && sink != name);
        }
    }
}

impl std::fmt::Debug for MemPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPort")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .finish()
    }
}

impl Release for MemPort {
    fn release(&self) {
        self.unlink();
        self.ledger.borrow_mut().releases.push(self.name.clone());
    }
}

impl Port for MemPort {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn direction(&self) -> PortDirection {
        self.direction
    }

    fn capabilities(&self) -> Option<CapabilityDescriptor> {
        self.caps.clone()
    }

    fn is_linked(&self) -> bool {
        self.ledger.borrow().peers.contains_key(&self.id)
    }

    fn link(&self, sink: &Self) -> Result<(), LinkFailure> {
        let mut ledger = self.ledger.borrow_mut();
        ledger.link_attempts.push((self.name.clone(), sink.name.clone()));

        if self.direction != PortDirection::Src || sink.direction != PortDirection::Sink {
            return Err(LinkFailure::WrongDirection);
        }
        if ledger.peers.contains_key(&self.id) || ledger.peers.contains_key(&sink.id) {
            return Err(LinkFailure::AlreadyLinked);
        }
        if std::mem::take(&mut ledger.refuse_next_format) {
            return Err(LinkFailure::NoFormat);
        }
        if let (Some(a), Some(b)) = (&self.caps, &sink.caps) {
            if !a.is_compatible_with(b) {
                return Err(LinkFailure::NoFormat);
            }
        }

        ledger.peers.insert(self.id, sink.id);
        ledger.peers.insert(sink.id, self.id);
        ledger.links.push((self.name.clone(), sink.name.clone()));
        ledger.links_made += 1;
        Ok(())
    }

    fn unblock(&self) {
        let mut ledger = self.ledger.borrow_mut();
        let attempts = ledger.link_attempts.len();
        ledger.unblocked.push((self.name.clone(), attempts));
    }
}

// MARK: - MemChain

#[derive(Clone, Debug)]
pub struct MemChain {
    id: u64,
    key: SessionKey,
    port: MemPort,
}

impl MemChain {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Release for MemChain {
    fn release(&self) {
        self.port.unlink();
        self.port.ledger.borrow_mut().releases.push(format!("chain:{}", self.key));
    }
}

impl MediaChain for MemChain {
    type Port = MemPort;

    fn name(&self) -> String {
        self.key.to_string()
    }

    fn port(&self) -> MemPort {
        self.port.clone()
    }

    fn activate(&self) -> Result<(), WiringError> {
        let mut ledger = self.port.ledger.borrow_mut();
        if ledger.refuse_activation {
            return Err(WiringError::structural(format!("{} refused to start", self.key)));
        }
        ledger.activations.push(self.key.to_string());
        Ok(())
    }
}

// MARK: - MemoryGraph

pub struct MemoryGraph {
    ledger: SharedLedger,
    next_id: Cell<u64>,
    endpoint: TransportEndpointConfig,
    profile: ChainProfile,
    sockets: HashMap<NetworkSocket, MemPort>,
    subscriber: Option<ControlSender<MemPort>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::with_endpoint(TransportEndpointConfig::default())
    }

    pub fn with_endpoint(endpoint: TransportEndpointConfig) -> Self {
        Self {
            ledger: SharedLedger::default(),
            next_id: Cell::new(0),
            endpoint,
            profile: ChainProfile::default(),
            sockets: HashMap::new(),
            subscriber: None,
        }
    }

    pub fn ledger(&self) -> SharedLedger {
        self.ledger.clone()
    }

    /// A port with no owner, for exercising the link primitive directly.
    pub fn free_port(
        &self,
        name: &str,
        direction: PortDirection,
        caps: Option<CapabilityDescriptor>,
    ) -> MemPort {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        MemPort {
            id,
            name: name.to_owned(),
            direction,
            caps,
            ledger: self.ledger.clone(),
        }
    }

    /// A source port the multiplexer created on its own.
    pub fn dynamic_port(&self, name: &str, caps: Option<CapabilityDescriptor>) -> MemPort {
        self.free_port(name, PortDirection::Src, caps)
    }

    /// Create a dynamic port and deliver it to the subscriber.
    pub fn announce(&self, name: &str, caps: Option<CapabilityDescriptor>) {
        let port = self.dynamic_port(name, caps);
        if let Some(events) = &self.subscriber {
            let _ = events.send(ControlEvent::PortAdded { name: name.to_owned(), port });
        }
    }

    /// The multiplexer dropped a dynamic port; its link goes with it.
    pub fn remove(&self, port: &MemPort) {
        port.unlink();
    }

    /// Make the next link attempt fail format negotiation.
    pub fn refuse_next_link_format(&self) {
        self.ledger.borrow_mut().refuse_next_format = true;
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryGraph {
    fn drop(&mut self) {
        self.ledger.borrow_mut().releases.push("multiplexer".into());
    }
}

impl PortGraph for MemoryGraph {
    type Port = MemPort;
    type Chain = MemChain;
}

impl SessionMultiplexer for MemoryGraph {
    fn request_port(&mut self, request: PortRequest) -> Result<MemPort, WiringError> {
        let name = request.name();
        if self.ledger.borrow().refuse_request.as_deref() == Some(name.as_str()) {
            return Err(WiringError::PortAllocation { request: request.to_string() });
        }
        self.ledger.borrow_mut().requests.push(name.clone());

        let direction = match request.template {
            PortTemplate::SendRtcpSrc => PortDirection::Src,
            _ => PortDirection::Sink,
        };
        let caps = match (request.template, self.ledger.borrow().send_port_caps.clone()) {
            (PortTemplate::SendRtpSink, Some((kind, caps))) if kind.session_id() == request.session => {
                Some(caps)
            }
            _ => None,
        };
        Ok(self.free_port(&name, direction, caps))
    }

    fn subscribe_port_added(&mut self, events: ControlSender<MemPort>) {
        self.subscriber = Some(events);
    }
}

impl MediaChainFactory for MemoryGraph {
    fn build_send_chain(&mut self, kind: MediaKind) -> Result<MemChain, WiringError> {
        self.build(SessionKey::new(Direction::Send, kind))
    }

    fn build_receive_chain(&mut self, kind: MediaKind) -> Result<MemChain, WiringError> {
        self.build(SessionKey::new(Direction::Receive, kind))
    }
}

impl MemoryGraph {
    fn build(&mut self, key: SessionKey) -> Result<MemChain, WiringError> {
        if self.ledger.borrow().refuse_chain == Some(key) {
            return Err(WiringError::ChainBuild {
                direction: key.direction,
                kind: key.kind,
                reason: "no such element".into(),
            });
        }
        self.ledger.borrow_mut().chains_built.push(key);

        let caps = Some(self.profile.receive_caps(key.kind).clone());
        let port = match key.direction {
            Direction::Send => self.free_port(&format!("{key}:src"), PortDirection::Src, caps),
            Direction::Receive => self.free_port(&format!("{key}:sink"), PortDirection::Sink, caps),
        };
        Ok(MemChain { id: port.id, key, port })
    }
}

impl NetworkSockets for MemoryGraph {
    fn socket_port(&mut self, socket: NetworkSocket) -> Result<MemPort, WiringError> {
        if let Some(port) = self.sockets.get(&socket) {
            return Ok(port.clone());
        }

        let (direction, caps) = match socket {
            NetworkSocket::MediaSource(kind) => {
                (PortDirection::Src, Some(self.profile.receive_caps(kind).clone()))
            }
            NetworkSocket::ControlSource => (PortDirection::Src, None),
            NetworkSocket::MediaSink(_) | NetworkSocket::ControlSink => (PortDirection::Sink, None),
        };
        let name = socket.to_string();
        self.ledger
            .borrow_mut()
            .socket_ports
            .insert(name.clone(), self.endpoint.socket_port(socket));

        let port = self.free_port(&name, direction, caps);
        self.sockets.insert(socket, port.clone());
        Ok(port)
    }

    fn disable_clock_sync(&mut self, socket: NetworkSocket) -> Result<(), WiringError> {
        self.ledger.borrow_mut().unsynced.push(socket);
        Ok(())
    }
}

impl MediaGraph for MemoryGraph {
    fn start(&mut self) -> Result<(), WiringError> {
        self.ledger.borrow_mut().started = true;
        Ok(())
    }
}
