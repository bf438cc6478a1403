use std::sync::{Arc, Mutex};

use gstreamer as gst;
use gstreamer::prelude::*;
use rtplink_core::{CapabilityDescriptor, PortDirection, WiringError};
use rtplink_wiring::{LinkFailure, MediaChain, Port, Release};
use tracing::{debug, warn};

use crate::caps::descriptor_from_caps;

// MARK: - GstPort

/// A pad plus the name the engine knows it by.
#[derive(Debug, Clone)]
pub struct GstPort {
    pad: gst::Pad,
    label: String,
    /// Handed out by `request_pad_simple`; must be given back to its element.
    requested: bool,
    /// Blocks downstream data until the first link attempt is over. Shared by
    /// every clone of the port.
    hold: Arc<Mutex<Option<gst::PadProbeId>>>,
}

impl GstPort {
    pub(crate) fn requested(pad: gst::Pad) -> Self {
        let label = pad.name().to_string();
        Self { pad, label, requested: true, hold: Arc::default() }
    }

    /// A pad the multiplexer created on its own.
    ///
    /// It is created from a streaming thread that pushes into it right away,
    /// so data is held on the pad until [`Port::unblock`] once it has a peer.
    pub(crate) fn dynamic(pad: gst::Pad) -> Self {
        let label = pad.name().to_string();
        let block = pad.add_probe(gst::PadProbeType::BLOCK_DOWNSTREAM, |_, _| gst::PadProbeReturn::Ok);
        if block.is_none() {
            warn!("Could not hold data on '{}' until it is linked", label);
        }
        Self { pad, label, requested: false, hold: Arc::new(Mutex::new(block)) }
    }

    pub(crate) fn owned_by(label: impl Into<String>, pad: gst::Pad) -> Self {
        Self { pad, label: label.into(), requested: false, hold: Arc::default() }
    }

    #[cfg(test)]
    fn is_held(&self) -> bool {
        self.hold.lock().map(|hold| hold.is_some()).unwrap_or(false)
    }

    fn unlink(&self) {
        let Some(peer) = self.pad.peer() else {
            return;
        };
        let result = match self.pad.direction() {
            gst::PadDirection::Src => self.pad.unlink(&peer),
            _ => peer.unlink(&self.pad),
        };
        if let Err(err) = result {
            debug!("Unlinking '{}' failed: {}", self.label, err);
        }
    }
}

impl Release for GstPort {
    fn release(&self) {
        if !self.requested {
            self.unlink();
            return;
        }
        match self.pad.parent_element() {
            Some(element) => element.release_request_pad(&self.pad),
            None => warn!("Request pad '{}' has no parent, nothing to release", self.label),
        }
    }
}

impl Port for GstPort {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn direction(&self) -> PortDirection {
        match self.pad.direction() {
            gst::PadDirection::Src => PortDirection::Src,
            _ => PortDirection::Sink,
        }
    }

    fn capabilities(&self) -> Option<CapabilityDescriptor> {
        let caps = self.pad.current_caps().unwrap_or_else(|| self.pad.query_caps(None));
        descriptor_from_caps(&caps)
    }

    fn is_linked(&self) -> bool {
        self.pad.is_linked()
    }

    fn link(&self, sink: &Self) -> Result<(), LinkFailure> {
        self.pad.link(&sink.pad).map(|_| ()).map_err(|err| match err {
            gst::PadLinkError::WasLinked => LinkFailure::AlreadyLinked,
            gst::PadLinkError::WrongDirection => LinkFailure::WrongDirection,
            gst::PadLinkError::Noformat => LinkFailure::NoFormat,
            other => LinkFailure::Refused(format!("{other:?}")),
        })
    }

    fn unblock(&self) {
        let block = match self.hold.lock() {
            Ok(mut hold) => hold.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(block) = block {
            debug!("Letting data through '{}'", self.label);
            self.pad.remove_probe(block);
        }
    }
}

// MARK: - GstChain

/// A bin parsed from a launch description, living inside the pipeline.
#[derive(Debug, Clone)]
pub struct GstChain {
    name: String,
    bin: gst::Bin,
    port: GstPort,
    pipeline: gst::Pipeline,
}

impl GstChain {
    pub(crate) fn new(name: String, bin: gst::Bin, port: GstPort, pipeline: gst::Pipeline) -> Self {
        Self { name, bin, port, pipeline }
    }
}

impl Release for GstChain {
    fn release(&self) {
        if self.bin.set_state(gst::State::Null).is_err() {
            warn!("Chain '{}' did not stop cleanly", self.name);
        }
        if let Err(err) = self.pipeline.remove(&self.bin) {
            warn!("Removing chain '{}' failed: {}", self.name, err);
        }
    }
}

impl MediaChain for GstChain {
    type Port = GstPort;

    fn name(&self) -> String {
        self.name.clone()
    }

    fn port(&self) -> GstPort {
        self.port.clone()
    }

    fn activate(&self) -> Result<(), WiringError> {
        self.bin
            .sync_state_with_parent()
            .map_err(|err| WiringError::structural(format!("{}: {}", self.name, err)))
    }
}
