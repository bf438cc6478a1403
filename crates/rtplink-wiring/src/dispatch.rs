//! Reaction to ports the multiplexer creates while the run is live.
//!
//! ```text
//! (name, port) ─► decode_port_name ─► SessionKey ─┬─ Send    ─► network sink of kind
//!                                                 └─ Receive ─► receive chain of kind
//!                                                               (built on first event)
//!              ─► PortLinkExecutor ─► Success | FormatMismatch | StructuralError
//! ```

use rtplink_core::{decode_port_name, DecodeError, Direction, LinkResult, SessionKey};
use tracing::{debug, error, info, warn};

use crate::control::{ShutdownHandle, ShutdownReason};
use crate::diagnostics::{DiagnosticReporter, FormatDiagnostic};
use crate::graph::{MediaChain, MediaChainFactory, MediaGraph, Port};
use crate::link::PortLinkExecutor;
use crate::session::SessionState;

/// What one `on_port_added` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a port this engine wires, or an unrecognized session. Nothing was linked.
    Ignored,
    Linked {
        key: SessionKey,
        chain_built: bool,
    },
    /// The link failed and a shutdown was requested.
    Cancelled {
        key: SessionKey,
        result: LinkResult,
        diagnostic: Option<FormatDiagnostic>,
    },
}

pub struct PortEventDispatcher<G: MediaGraph> {
    state: SessionState<G>,
    executor: PortLinkExecutor,
    reporter: DiagnosticReporter,
    shutdown: ShutdownHandle<G::Port>,
}

impl<G: MediaGraph> PortEventDispatcher<G> {
    pub fn new(state: SessionState<G>, shutdown: ShutdownHandle<G::Port>) -> Self {
        Self {
            state,
            executor: PortLinkExecutor,
            reporter: DiagnosticReporter,
            shutdown,
        }
    }

    pub fn state(&self) -> &SessionState<G> {
        &self.state
    }

    pub fn graph(&self) -> &G {
        self.state.graph()
    }

    pub fn into_state(self) -> SessionState<G> {
        self.state
    }

    pub fn request_shutdown(&mut self, reason: ShutdownReason) -> bool {
        self.shutdown.request(reason)
    }

    /// Wire a port the multiplexer just created.
    ///
    /// Runs on the control loop and never blocks. Failures never unwind into
    /// the caller; a failed link posts a shutdown request instead. The port
    /// is unblocked afterwards on every path, linked or not.
    pub fn on_port_added(&mut self, name: &str, port: G::Port) -> DispatchOutcome {
        let held = port.clone();
        let outcome = self.wire(name, port);
        held.unblock();
        outcome
    }

    /// The multiplexer removed a dynamic port, e.g. after its sender timed
    /// out. An adopted port is released now rather than at teardown.
    pub fn on_port_removed(&mut self, name: &str) -> bool {
        if decode_port_name(name).is_err() {
            debug!("Port '{}' removed, not one of ours", name);
            return false;
        }
        let released = self.state.forget_port(name);
        info!(released, "Port '{}' removed by the multiplexer", name);
        released
    }

    fn wire(&mut self, name: &str, port: G::Port) -> DispatchOutcome {
        let decoded = match decode_port_name(name) {
            Ok(decoded) => decoded,
            Err(DecodeError::UnknownPrefix { .. }) => {
                info!("Got a port '{}'", name);
                return DispatchOutcome::Ignored;
            }
            Err(err) => {
                warn!("Ignoring port: {}", err);
                return DispatchOutcome::Ignored;
            }
        };
        let key = decoded.key;

        let (target, new_chain) = match key.direction {
            Direction::Send => {
                info!("RTP SENDER: got a src port '{}' for {}", name, key.kind);
                (self.state.media_sink(key.kind).clone(), None)
            }
            Direction::Receive => {
                info!(
                    ssrc = ?decoded.ssrc,
                    payload_type = ?decoded.payload_type,
                    "RTP RECEIVER: got a src port '{}' for {}",
                    name,
                    key.kind
                );
                match self.state.receive_chain(key.kind) {
                    Some(chain) => (chain.port(), None),
                    None => match self.state.graph_mut().build_receive_chain(key.kind) {
                        Ok(chain) => {
                            self.state.record_receive_chain(key.kind, chain.clone());
                            (chain.port(), Some(chain))
                        }
                        Err(err) => {
                            error!("Failed to build receive chain for '{}': {}", name, err);
                            let reason = err.to_string();
                            self.shutdown.request(ShutdownReason::StructuralError {
                                port: name.to_owned(),
                                reason: reason.clone(),
                            });
                            return DispatchOutcome::Cancelled {
                                key,
                                result: LinkResult::StructuralError { reason },
                                diagnostic: None,
                            };
                        }
                    },
                }
            }
        };

        let result = self.executor.link(&port, &target);
        let reason = match &result {
            LinkResult::Success => {
                self.state.adopt_port(port);
                let chain_built = new_chain.is_some();
                if let Some(chain) = new_chain {
                    // a chain that fails to start is logged, the run goes on
                    if let Err(err) = chain.activate() {
                        error!("Failed to change the state of '{}' to PLAYING: {}", chain.name(), err);
                    }
                }
                return DispatchOutcome::Linked { key, chain_built };
            }
            LinkResult::FormatMismatch { .. } => {
                error!("Linking source port '{}' failed: no common format", name);
                ShutdownReason::FormatMismatch { port: name.to_owned() }
            }
            LinkResult::StructuralError { reason } => {
                error!("Linking source port '{}' failed: {}", name, reason);
                ShutdownReason::StructuralError { port: name.to_owned(), reason: reason.clone() }
            }
        };

        let diagnostic = self.reporter.report(name, &result);
        self.shutdown.request(reason);
        DispatchOutcome::Cancelled { key, result, diagnostic }
    }
}

#[cfg(test)]
mod tests {
    use rtplink_core::{CapabilityDescriptor, MediaKind};

    use super::*;
    use crate::control::{control_channel, ControlEvent, ControlReceiver};
    use crate::graph::Port;
    use crate::static_links::StaticLinkEstablisher;
    use crate::testing::{MemPort, MemoryGraph};

    fn dispatcher() -> (PortEventDispatcher<MemoryGraph>, ControlReceiver<MemPort>) {
        let (tx, rx) = control_channel();
        let state = StaticLinkEstablisher::new(MemoryGraph::new()).establish().expect("ready");
        (PortEventDispatcher::new(state, ShutdownHandle::new(tx)), rx)
    }

    fn caps_for(kind: MediaKind) -> Option<CapabilityDescriptor> {
        match kind {
            MediaKind::Video => Some(CapabilityDescriptor::theora()),
            MediaKind::Audio => Some(CapabilityDescriptor::opus()),
        }
    }

    fn shutdowns(rx: &mut ControlReceiver<MemPort>) -> Vec<ShutdownReason> {
        let mut reasons = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ControlEvent::Shutdown(reason) = event {
                reasons.push(reason);
            }
        }
        reasons
    }

    #[test]
    fn every_matching_event_makes_exactly_one_link_attempt() {
        let cases = [
            ("send_rtp_src_0", Direction::Send, MediaKind::Video),
            ("send_rtp_src_1", Direction::Send, MediaKind::Audio),
            ("recv_rtp_src_0_1111_96", Direction::Receive, MediaKind::Video),
            ("recv_rtp_src_1_2222_97", Direction::Receive, MediaKind::Audio),
        ];

        for (name, direction, kind) in cases {
            let (mut dispatcher, mut rx) = dispatcher();
            let before = dispatcher.graph().ledger().borrow().link_attempts.len();

            let port = dispatcher.graph().dynamic_port(name, caps_for(kind));
            let outcome = dispatcher.on_port_added(name, port);

            assert_eq!(
                outcome,
                DispatchOutcome::Linked {
                    key: SessionKey::new(direction, kind),
                    chain_built: direction == Direction::Receive,
                },
                "{name}"
            );
            let ledger = dispatcher.graph().ledger();
            let ledger = ledger.borrow();
            assert_eq!(ledger.link_attempts.len(), before + 1, "{name}");
            assert_eq!(ledger.link_attempts.last().map(|(src, _)| src.as_str()), Some(name));
            assert!(shutdowns(&mut rx).is_empty());
        }
    }

    #[test]
    fn send_ports_go_to_the_network_sink_of_their_kind() {
        let (mut dispatcher, _rx) = dispatcher();
        let port = dispatcher.graph().dynamic_port("send_rtp_src_1", caps_for(MediaKind::Audio));
        dispatcher.on_port_added("send_rtp_src_1", port);

        let ledger = dispatcher.graph().ledger();
        assert!(ledger.borrow().is_linked("send_rtp_src_1", "audio_udp_sink"));
        assert_eq!(ledger.borrow().chains_built.len(), 2, "no chain is built for send ports");
    }

    #[test]
    fn unrecognized_sessions_are_ignored_without_side_effects() {
        for name in ["send_rtp_src_2", "recv_rtp_src_7_1_96", "recv_rtp_src_x", "send_rtp_src_", "rtcp_src_0", "recv_rtp_sink_0"] {
            let (mut dispatcher, mut rx) = dispatcher();
            let ledger = dispatcher.graph().ledger();
            let (attempts, chains) = {
                let l = ledger.borrow();
                (l.link_attempts.len(), l.chains_built.len())
            };

            let port = dispatcher.graph().dynamic_port(name, None);
            assert_eq!(dispatcher.on_port_added(name, port), DispatchOutcome::Ignored, "{name}");

            assert_eq!(ledger.borrow().link_attempts.len(), attempts, "{name}");
            assert_eq!(ledger.borrow().chains_built.len(), chains, "{name}");
            assert!(shutdowns(&mut rx).is_empty(), "{name}");
        }
    }

    #[test]
    fn second_receive_event_reuses_the_existing_chain() {
        let (mut dispatcher, mut rx) = dispatcher();

        let first = dispatcher.graph().dynamic_port("recv_rtp_src_0_1_96", caps_for(MediaKind::Video));
        dispatcher.on_port_added("recv_rtp_src_0_1_96", first.clone());
        let chain_id = dispatcher.state().receive_chain(MediaKind::Video).map(|c| c.id());

        // the first sender times out and its port goes away
        dispatcher.graph().remove(&first);

        let second = dispatcher.graph().dynamic_port("recv_rtp_src_0_2_96", caps_for(MediaKind::Video));
        let outcome = dispatcher.on_port_added("recv_rtp_src_0_2_96", second);

        assert_eq!(
            outcome,
            DispatchOutcome::Linked {
                key: SessionKey::new(Direction::Receive, MediaKind::Video),
                chain_built: false,
            }
        );
        assert_eq!(dispatcher.state().receive_chain(MediaKind::Video).map(|c| c.id()), chain_id);

        let ledger = dispatcher.graph().ledger();
        let ledger = ledger.borrow();
        let receive_builds = ledger
            .chains_built
            .iter()
            .filter(|key| key.direction == Direction::Receive)
            .count();
        assert_eq!(receive_builds, 1);
        assert!(ledger.is_linked("recv_rtp_src_0_2_96", "receive/video:sink"));
        assert_eq!(ledger.activations, vec!["receive/video"]);
        assert!(shutdowns(&mut rx).is_empty());
    }

    #[test]
    fn disjoint_formats_report_and_cancel_exactly_once() {
        let (mut dispatcher, mut rx) = dispatcher();
        let name = "recv_rtp_src_0_99_96";
        let port = dispatcher.graph().dynamic_port(name, caps_for(MediaKind::Audio));
        let src_caps = port.capabilities();

        let outcome = dispatcher.on_port_added(name, port);

        let DispatchOutcome::Cancelled { key, result, diagnostic } = outcome else {
            panic!("expected cancellation, got {outcome:?}");
        };
        assert_eq!(key, SessionKey::new(Direction::Receive, MediaKind::Video));
        assert!(matches!(result, LinkResult::FormatMismatch { .. }));
        let diagnostic = diagnostic.expect("diagnostic emitted");
        assert_eq!(diagnostic.port_name, name);
        assert_eq!(Some(diagnostic.src_caps), src_caps.map(|c| c.to_string()));
        assert_eq!(diagnostic.sink_caps, CapabilityDescriptor::theora().to_string());

        // a second failure while the shutdown is pending is not posted again
        let other = dispatcher.graph().dynamic_port("send_rtp_src_0", caps_for(MediaKind::Audio));
        dispatcher.graph().refuse_next_link_format();
        assert!(matches!(dispatcher.on_port_added("send_rtp_src_0", other), DispatchOutcome::Cancelled { .. }));

        assert_eq!(
            shutdowns(&mut rx),
            vec![ShutdownReason::FormatMismatch { port: name.into() }]
        );
        assert!(dispatcher.graph().ledger().borrow().activations.is_empty());
    }

    #[test]
    fn compatible_receive_link_activates_the_new_chain_only() {
        let (mut dispatcher, _rx) = dispatcher();
        let port = dispatcher.graph().dynamic_port("recv_rtp_src_1_5_96", caps_for(MediaKind::Audio));
        let outcome = dispatcher.on_port_added("recv_rtp_src_1_5_96", port);

        assert!(matches!(outcome, DispatchOutcome::Linked { chain_built: true, .. }));
        assert_eq!(dispatcher.graph().ledger().borrow().activations, vec!["receive/audio"]);
    }

    #[test]
    fn activation_failure_is_logged_not_fatal() {
        let (mut dispatcher, mut rx) = dispatcher();
        dispatcher.graph().ledger().borrow_mut().refuse_activation = true;

        let port = dispatcher.graph().dynamic_port("recv_rtp_src_0_5_96", caps_for(MediaKind::Video));
        let outcome = dispatcher.on_port_added("recv_rtp_src_0_5_96", port);

        assert!(matches!(outcome, DispatchOutcome::Linked { chain_built: true, .. }));
        assert!(shutdowns(&mut rx).is_empty());
    }

    #[test]
    fn chain_build_failure_cancels_the_run() {
        let (mut dispatcher, mut rx) = dispatcher();
        dispatcher.graph().ledger().borrow_mut().refuse_chain =
            Some(SessionKey::new(Direction::Receive, MediaKind::Audio));

        let port = dispatcher.graph().dynamic_port("recv_rtp_src_1_5_96", caps_for(MediaKind::Audio));
        let outcome = dispatcher.on_port_added("recv_rtp_src_1_5_96", port);

        assert!(matches!(
            outcome,
            DispatchOutcome::Cancelled { result: LinkResult::StructuralError { .. }, .. }
        ));
        assert!(dispatcher.state().receive_chain(MediaKind::Audio).is_none());
        assert!(matches!(
            shutdowns(&mut rx).as_slice(),
            [ShutdownReason::StructuralError { .. }]
        ));
    }

    #[test]
    fn linking_an_already_wired_sink_is_structural() {
        let (mut dispatcher, mut rx) = dispatcher();
        let first = dispatcher.graph().dynamic_port("send_rtp_src_0", caps_for(MediaKind::Video));
        dispatcher.on_port_added("send_rtp_src_0", first);

        let again = dispatcher.graph().dynamic_port("send_rtp_src_0", caps_for(MediaKind::Video));
        let outcome = dispatcher.on_port_added("send_rtp_src_0", again);

        assert!(matches!(
            outcome,
            DispatchOutcome::Cancelled { result: LinkResult::StructuralError { .. }, diagnostic: None, .. }
        ));
        assert_eq!(shutdowns(&mut rx).len(), 1);
    }

    #[test]
    fn every_event_is_unblocked_once_after_its_link_attempt() {
        let cases = [
            ("send_rtp_src_0", caps_for(MediaKind::Video), 1),
            ("recv_rtp_src_0_7_96", caps_for(MediaKind::Audio), 1),
            ("send_rtp_src_2", None, 0),
        ];

        for (name, caps, attempts) in cases {
            let (mut dispatcher, _rx) = dispatcher();
            let ledger = dispatcher.graph().ledger();
            let before = ledger.borrow().link_attempts.len();

            let port = dispatcher.graph().dynamic_port(name, caps);
            dispatcher.on_port_added(name, port);

            assert_eq!(ledger.borrow().unblocked, vec![(name.to_owned(), before + attempts)], "{name}");
        }
    }

    #[test]
    fn chain_build_failure_still_unblocks_the_port() {
        let (mut dispatcher, _rx) = dispatcher();
        dispatcher.graph().ledger().borrow_mut().refuse_chain =
            Some(SessionKey::new(Direction::Receive, MediaKind::Video));

        let port = dispatcher.graph().dynamic_port("recv_rtp_src_0_5_96", caps_for(MediaKind::Video));
        dispatcher.on_port_added("recv_rtp_src_0_5_96", port);

        let ledger = dispatcher.graph().ledger();
        let unblocked: Vec<_> = ledger.borrow().unblocked.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(unblocked, vec!["recv_rtp_src_0_5_96"]);
    }

    #[test]
    fn removed_port_is_released_once_and_not_again_at_teardown() {
        let (mut dispatcher, _rx) = dispatcher();
        let adopted = dispatcher.state().port_count();

        let name = "recv_rtp_src_0_1_96";
        let port = dispatcher.graph().dynamic_port(name, caps_for(MediaKind::Video));
        dispatcher.on_port_added(name, port.clone());
        assert_eq!(dispatcher.state().port_count(), adopted + 1);

        dispatcher.graph().remove(&port);
        assert!(dispatcher.on_port_removed(name));
        assert_eq!(dispatcher.state().port_count(), adopted);
        assert!(!dispatcher.on_port_removed(name), "already forgotten");
        assert!(!dispatcher.on_port_removed("rtcp_src_0"));

        let ledger = dispatcher.graph().ledger();
        let count = |ledger: &crate::testing::SharedLedger| {
            ledger.borrow().releases.iter().filter(|r| r.as_str() == name).count()
        };
        assert_eq!(count(&ledger), 1);

        dispatcher.into_state().teardown();
        assert_eq!(count(&ledger), 1);
    }
}
