//! rtplink-gst: the GStreamer side of rtplink.
//!
//! `rtpbin` is the session multiplexer, `udpsrc`/`udpsink` face the peer and
//! each media chain is a bin parsed from a launch description.

mod bus;
pub mod caps;
pub mod error;
pub mod graph;
pub mod port;

pub use error::GraphError;
pub use graph::RtpBinGraph;
pub use port::{GstChain, GstPort};
