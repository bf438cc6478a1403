pub mod control;
pub mod diagnostics;
pub mod dispatch;
pub mod graph;
pub mod link;
pub mod session;
pub mod static_links;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{
    control_channel, run, ControlEvent, ControlReceiver, ControlSender, RunOutcome, ShutdownHandle,
    ShutdownReason,
};
pub use diagnostics::{DiagnosticReporter, FormatDiagnostic};
pub use dispatch::{DispatchOutcome, PortEventDispatcher};
pub use graph::{
    LinkFailure, MediaChain, MediaChainFactory, MediaGraph, NetworkSockets, Port, PortGraph, Release,
    SessionMultiplexer,
};
pub use link::PortLinkExecutor;
pub use session::{ReleaseGuard, ReleaseStack, SessionState, StaticTopology};
pub use static_links::{StaticLinkEstablisher, CONTROL_SESSION};
