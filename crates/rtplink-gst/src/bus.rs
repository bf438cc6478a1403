use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use gstreamer as gst;
use gstreamer::prelude::*;
use rtplink_wiring::{ControlEvent, ControlSender};
use tracing::{debug, warn};

use crate::port::GstPort;

/// Forwards pipeline errors and end-of-stream into the control channel.
///
/// Runs on its own thread so the control task never blocks on the bus.
pub(crate) struct BusWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BusWatcher {
    pub(crate) fn spawn(bus: gst::Bus, events: ControlSender<GstPort>) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("rtplink-bus".into())
            .spawn(move || watch(bus, events, flag))?;
        Ok(Self { stop, handle: Some(handle) })
    }
}

impl Drop for BusWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Bus watcher thread panicked");
            }
        }
    }
}

fn watch(bus: gst::Bus, events: ControlSender<GstPort>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        // poll timeout, keeps the stop flag responsive
        let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(100)) else {
            continue;
        };
        let event = match msg.view() {
            gst::MessageView::Error(err) => ControlEvent::TransportError {
                source_name: err
                    .src()
                    .map(|s| s.path_string().to_string())
                    .unwrap_or_else(|| "unknown".into()),
                message: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            },
            gst::MessageView::Eos(_) => ControlEvent::EndOfStream,
            _ => continue,
        };
        if events.send(event).is_err() {
            debug!("Control loop gone, bus watcher exiting");
            break;
        }
    }
}
