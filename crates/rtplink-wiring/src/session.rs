//! Per-run session state and the release guards that own graph resources.

use rtplink_core::{Direction, MediaKind, PerKind, SessionKey, WiringError};
use tracing::{debug, info};

use crate::graph::{MediaGraph, Port, Release};

// MARK: - Release guards

/// Owns one acquired resource and releases it when dropped.
pub struct ReleaseGuard {
    label: String,
    resource: Box<dyn Release>,
}

impl ReleaseGuard {
    pub fn new(label: impl Into<String>, resource: impl Release + 'static) -> Self {
        Self { label: label.into(), resource: Box::new(resource) }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        debug!("Releasing {}", self.label);
        self.resource.release();
    }
}

/// Guards released newest-first, on drop or on [`release_all`](Self::release_all).
#[derive(Default)]
pub struct ReleaseStack {
    guards: Vec<ReleaseGuard>,
}

impl ReleaseStack {
    pub fn push(&mut self, label: impl Into<String>, resource: impl Release + 'static) {
        self.guards.push(ReleaseGuard::new(label, resource));
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release the newest guard labelled `label` right away. Returns `false`
    /// when no guard carries that label.
    pub fn release_one(&mut self, label: &str) -> bool {
        match self.guards.iter().rposition(|guard| guard.label() == label) {
            Some(index) => {
                drop(self.guards.remove(index));
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

impl Drop for ReleaseStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

// MARK: - Topology

/// Links made before any dynamic event is processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticTopology {
    /// Send chains into the multiplexer plus receive sockets into the multiplexer.
    pub media_links: usize,
    pub control_links: usize,
}

// MARK: - SessionState

/// Everything one run owns: the graph, the chains of every session, and the
/// ports acquired for them.
///
/// Field order is teardown order: chains, then ports, then the multiplexer.
pub struct SessionState<G: MediaGraph> {
    chains: ReleaseStack,
    ports: ReleaseStack,
    send_chains: PerKind<G::Chain>,
    receive_chains: PerKind<Option<G::Chain>>,
    /// Network sinks the multiplexer's send-side ports are wired to.
    media_sinks: PerKind<G::Port>,
    topology: StaticTopology,
    graph: G,
}

impl<G: MediaGraph> SessionState<G> {
    pub(crate) fn new(
        graph: G,
        chains: ReleaseStack,
        ports: ReleaseStack,
        send_chains: PerKind<G::Chain>,
        media_sinks: PerKind<G::Port>,
        topology: StaticTopology,
    ) -> Self {
        Self {
            chains,
            ports,
            send_chains,
            receive_chains: PerKind::new(None, None),
            media_sinks,
            topology,
            graph,
        }
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn topology(&self) -> StaticTopology {
        self.topology
    }

    /// Start data flow once static wiring is in place.
    pub fn start(&mut self) -> Result<(), WiringError> {
        self.graph.start()
    }

    pub fn send_chain(&self, kind: MediaKind) -> &G::Chain {
        self.send_chains.get(kind)
    }

    pub fn receive_chain(&self, kind: MediaKind) -> Option<&G::Chain> {
        self.receive_chains.get(kind).as_ref()
    }

    pub fn media_sink(&self, kind: MediaKind) -> &G::Port {
        self.media_sinks.get(kind)
    }

    /// Record the receive chain of `kind`, built on the first matching event.
    pub(crate) fn record_receive_chain(&mut self, kind: MediaKind, chain: G::Chain) {
        let key = SessionKey::new(Direction::Receive, kind);
        self.chains.push(format!("chain:{key}"), chain.clone());
        *self.receive_chains.get_mut(kind) = Some(chain);
    }

    /// Take ownership of a dynamic port that was linked successfully.
    pub(crate) fn adopt_port(&mut self, port: G::Port) {
        self.ports.push(port.name(), port);
    }

    /// Give back an adopted port the multiplexer has since removed.
    pub(crate) fn forget_port(&mut self, name: &str) -> bool {
        self.ports.release_one(name)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Release everything exactly once: chains (newest first), ports (newest
    /// first), then the multiplexer.
    pub fn teardown(mut self) {
        info!(
            "Tearing down session: {} chain(s), {} port(s)",
            self.chains.len(),
            self.ports.len()
        );
        self.chains.release_all();
        self.ports.release_all();
        // graph dropped last
    }
}
