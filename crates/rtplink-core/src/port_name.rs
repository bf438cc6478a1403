//! Port naming used by the session multiplexer.
//!
//! Requested ports follow the `<template>_<session>` scheme
//! (`send_rtp_sink_0`, `recv_rtcp_sink_0`). Ports the multiplexer creates on
//! its own are reported by name only:
//!
//! ```text
//! send_rtp_src_<session>
//! recv_rtp_src_<session>_<ssrc>_<payload type>
//! ```
//!
//! [`decode_port_name`] turns such a name into a [`SessionKey`] in one step.

use crate::errors::DecodeError;
use crate::types::{Direction, MediaKind, SessionKey};

pub const SEND_RTP_SRC_PREFIX: &str = "send_rtp_src_";
pub const RECV_RTP_SRC_PREFIX: &str = "recv_rtp_src_";

// MARK: - Requests

/// Templates of the ports the multiplexer hands out on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortTemplate {
    SendRtpSink,
    RecvRtpSink,
    SendRtcpSrc,
    RecvRtcpSink,
}

impl PortTemplate {
    pub fn pattern(self) -> &'static str {
        match self {
            Self::SendRtpSink => "send_rtp_sink_%u",
            Self::RecvRtpSink => "recv_rtp_sink_%u",
            Self::SendRtcpSrc => "send_rtcp_src_%u",
            Self::RecvRtcpSink => "recv_rtcp_sink_%u",
        }
    }

    fn stem(self) -> &'static str {
        let pattern = self.pattern();
        &pattern[..pattern.len() - "%u".len()]
    }
}

/// A request for one port of a given template, pinned to a session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRequest {
    pub template: PortTemplate,
    pub session: u32,
}

impl PortRequest {
    pub fn new(template: PortTemplate, session: u32) -> Self {
        Self { template, session }
    }

    pub fn media(template: PortTemplate, kind: MediaKind) -> Self {
        Self::new(template, kind.session_id())
    }

    /// Concrete port name, e.g. `send_rtp_sink_1`.
    pub fn name(&self) -> String {
        format!("{}{}", self.template.stem(), self.session)
    }
}

impl std::fmt::Display for PortRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.template.pattern())
    }
}

// MARK: - Decoding

/// A dynamic port name resolved to its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPortName {
    pub key: SessionKey,
    /// Sender SSRC, present on receive-side ports.
    pub ssrc: Option<u32>,
    pub payload_type: Option<u8>,
}

/// Decode a multiplexer port name into the session it belongs to.
///
/// Never panics: names without a known prefix yield
/// [`DecodeError::UnknownPrefix`], a missing or non-numeric session yields
/// [`DecodeError::MalformedSession`], and a session other than 0 or 1 yields
/// [`DecodeError::UnknownSession`].
pub fn decode_port_name(name: &str) -> Result<DecodedPortName, DecodeError> {
    let (direction, rest) = if let Some(rest) = name.strip_prefix(SEND_RTP_SRC_PREFIX) {
        (Direction::Send, rest)
    } else if let Some(rest) = name.strip_prefix(RECV_RTP_SRC_PREFIX) {
        (Direction::Receive, rest)
    } else {
        return Err(DecodeError::UnknownPrefix { name: name.to_owned() });
    };

    let malformed = || DecodeError::MalformedSession { name: name.to_owned() };

    let mut fields = rest.split('_');
    let id = fields
        .next()
        .filter(|field| !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(malformed)?
        .parse::<u64>()
        // all digits, so only overflow can fail here
        .map_err(|_| DecodeError::UnknownSession { name: name.to_owned(), id: u64::MAX })?;

    let kind = MediaKind::from_session_id(id)
        .ok_or_else(|| DecodeError::UnknownSession { name: name.to_owned(), id })?;

    // Trailing ssrc / payload type are informational; tolerate their absence.
    let ssrc = fields.next().and_then(|s| s.parse().ok());
    let payload_type = fields.next().and_then(|s| s.parse().ok());

    Ok(DecodedPortName {
        key: SessionKey::new(direction, kind),
        ssrc,
        payload_type,
    })
}
