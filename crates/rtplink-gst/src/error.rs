use gstreamer as gst;
use rtplink_core::WiringError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("GStreamer initialization failed: {0}")]
    Init(#[from] gst::glib::Error),

    #[error("Failed to create element '{factory}': {reason}")]
    Element { factory: String, reason: String },

    #[error("Failed to assemble pipeline: {0}")]
    Assemble(#[from] gst::glib::BoolError),
}

impl From<GraphError> for WiringError {
    fn from(err: GraphError) -> Self {
        WiringError::structural(err.to_string())
    }
}
