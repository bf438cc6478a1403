//! Conversion between GStreamer caps and [`CapabilityDescriptor`].

use gstreamer as gst;
use rtplink_core::CapabilityDescriptor;

/// First structure of `caps` as a descriptor. `ANY` and empty caps map to
/// `None`, the same as a port with no constraint.
pub fn descriptor_from_caps(caps: &gst::CapsRef) -> Option<CapabilityDescriptor> {
    if caps.is_any() || caps.is_empty() {
        return None;
    }
    let s = caps.structure(0)?;
    Some(CapabilityDescriptor {
        media_type: s.name().to_string(),
        media: s.get::<&str>("media").ok().map(str::to_owned),
        encoding_name: s.get::<&str>("encoding-name").ok().map(str::to_owned),
        clock_rate: s.get::<i32>("clock-rate").ok(),
    })
}

/// Caps a receive socket stamps on its packets. Requires `gst::init()`.
pub fn caps_from_descriptor(descriptor: &CapabilityDescriptor) -> gst::Caps {
    let mut builder = gst::Caps::builder(descriptor.media_type.as_str());
    if let Some(media) = &descriptor.media {
        builder = builder.field("media", media.as_str());
    }
    if let Some(clock_rate) = descriptor.clock_rate {
        builder = builder.field("clock-rate", clock_rate);
    }
    if let Some(encoding_name) = &descriptor.encoding_name {
        builder = builder.field("encoding-name", encoding_name.as_str());
    }
    builder.build()
}
