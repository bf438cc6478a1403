use rtplink_core::LinkResult;
use tracing::debug;

use crate::graph::{LinkFailure, Port};

/// The one primitive static and dynamic wiring use to connect two ports.
///
/// Every call makes exactly one link attempt; retrying is left to callers,
/// and none of them do.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortLinkExecutor;

impl PortLinkExecutor {
    pub fn link<P: Port>(&self, src: &P, sink: &P) -> LinkResult {
        match src.link(sink) {
            Ok(()) => {
                debug!("Linked '{}' -> '{}'", src.name(), sink.name());
                LinkResult::Success
            }
            Err(LinkFailure::NoFormat) => LinkResult::FormatMismatch {
                src_caps: src.capabilities(),
                sink_caps: sink.capabilities(),
            },
            Err(failure) => LinkResult::StructuralError {
                reason: format!("linking '{}' -> '{}': {}", src.name(), sink.name(), failure),
            },
        }
    }
}
