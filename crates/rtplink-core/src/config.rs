use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::types::{CapabilityDescriptor, Direction, MediaKind, NetworkSocket};

pub const DEFAULT_PEER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_BASE_PORT: u16 = 5000;

/// Offset of the shared control (RTCP) socket from a base port.
pub const CONTROL_PORT_OFFSET: u16 = 1;

// MARK: - TransportEndpointConfig

/// Peer address plus the two base ports every socket is derived from.
///
/// Local sockets listen on `source_base + offset`, outgoing sockets target
/// `peer_address:sink_base + offset`. Offsets: video +0, control +1, audio +2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportEndpointConfig {
    #[serde(alias = "peerAddress")]
    pub peer_address: String,
    #[serde(alias = "baseSourcePort")]
    pub source_base: u16,
    #[serde(alias = "baseSinkPort")]
    pub sink_base: u16,
}

impl Default for TransportEndpointConfig {
    fn default() -> Self {
        Self {
            peer_address: DEFAULT_PEER_ADDRESS.to_owned(),
            source_base: DEFAULT_BASE_PORT,
            sink_base: DEFAULT_BASE_PORT,
        }
    }
}

impl TransportEndpointConfig {
    /// The peer address is not resolved here; an unreachable peer only fails
    /// once data is actually sent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, base) in [("source", self.source_base), ("sink", self.sink_base)] {
            if base == 0 {
                return Err(ConfigError::Invalid {
                    reason: format!("{label} base port must be non-zero"),
                });
            }
            if base.checked_add(MediaKind::Audio.port_offset()).is_none() {
                return Err(ConfigError::Invalid {
                    reason: format!("{label} base port {base} leaves no room for the audio socket"),
                });
            }
        }
        if self.peer_address.trim().is_empty() {
            return Err(ConfigError::Invalid { reason: "peer address is empty".into() });
        }
        Ok(())
    }

    /// Port number of one network socket. Assumes [`validate`](Self::validate) passed.
    pub fn socket_port(&self, socket: NetworkSocket) -> u16 {
        match socket {
            NetworkSocket::MediaSource(kind) => self.source_base.saturating_add(kind.port_offset()),
            NetworkSocket::MediaSink(kind) => self.sink_base.saturating_add(kind.port_offset()),
            NetworkSocket::ControlSource => self.source_base.saturating_add(CONTROL_PORT_OFFSET),
            NetworkSocket::ControlSink => self.sink_base.saturating_add(CONTROL_PORT_OFFSET),
        }
    }

    pub fn port_map(&self) -> PortMap {
        PortMap {
            video_source: self.socket_port(NetworkSocket::MediaSource(MediaKind::Video)),
            video_sink: self.socket_port(NetworkSocket::MediaSink(MediaKind::Video)),
            audio_source: self.socket_port(NetworkSocket::MediaSource(MediaKind::Audio)),
            audio_sink: self.socket_port(NetworkSocket::MediaSink(MediaKind::Audio)),
            control_source: self.socket_port(NetworkSocket::ControlSource),
            control_sink: self.socket_port(NetworkSocket::ControlSink),
        }
    }
}

// MARK: - PortMap

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub video_source: u16,
    pub video_sink: u16,
    pub audio_source: u16,
    pub audio_sink: u16,
    pub control_source: u16,
    pub control_sink: u16,
}

impl std::fmt::Display for PortMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video src={} sink={} | audio src={} sink={} | rtcp src={} sink={}",
            self.video_source,
            self.video_sink,
            self.audio_source,
            self.audio_sink,
            self.control_source,
            self.control_sink
        )
    }
}

// MARK: - ChainProfile

/// Descriptions of the four media chains plus the RTP caps each receive
/// socket announces. Chain descriptions use the GStreamer launch syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainProfile {
    #[serde(alias = "videoSend")]
    pub video_send: String,
    #[serde(alias = "videoReceive")]
    pub video_receive: String,
    #[serde(alias = "audioSend")]
    pub audio_send: String,
    #[serde(alias = "audioReceive")]
    pub audio_receive: String,
    #[serde(alias = "videoCaps")]
    pub video_caps: CapabilityDescriptor,
    #[serde(alias = "audioCaps")]
    pub audio_caps: CapabilityDescriptor,
}

impl Default for ChainProfile {
    fn default() -> Self {
        Self {
            // theora only decodes after a config packet, so send one every second
            video_send: "videotestsrc is-live=true ! videoconvert ! theoraenc ! rtptheorapay config-interval=1".into(),
            video_receive: "rtptheoradepay ! theoradec ! videoconvert ! autovideosink".into(),
            audio_send: "audiotestsrc is-live=true ! audioconvert ! opusenc ! rtpopuspay".into(),
            audio_receive: "rtpopusdepay ! opusdec ! audioconvert ! autoaudiosink".into(),
            video_caps: CapabilityDescriptor::theora(),
            audio_caps: CapabilityDescriptor::opus(),
        }
    }
}

impl ChainProfile {
    pub fn description(&self, direction: Direction, kind: MediaKind) -> &str {
        match (direction, kind) {
            (Direction::Send, MediaKind::Video) => &self.video_send,
            (Direction::Send, MediaKind::Audio) => &self.audio_send,
            (Direction::Receive, MediaKind::Video) => &self.video_receive,
            (Direction::Receive, MediaKind::Audio) => &self.audio_receive,
        }
    }

    /// Caps a receive socket stamps on incoming packets; without them the
    /// multiplexer cannot build a receive session and drops the data.
    pub fn receive_caps(&self, kind: MediaKind) -> &CapabilityDescriptor {
        match kind {
            MediaKind::Video => &self.video_caps,
            MediaKind::Audio => &self.audio_caps,
        }
    }
}

// MARK: - RtpLinkConfig

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpLinkConfig {
    pub endpoint: TransportEndpointConfig,
    pub chains: ChainProfile,
}

impl RtpLinkConfig {
    /// Parse a JSON file. Not validated: command-line overrides still apply,
    /// so call [`validate`](Self::validate) once they have been merged.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()?;
        for direction in [Direction::Send, Direction::Receive] {
            for kind in MediaKind::ALL {
                if self.chains.description(direction, kind).trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        reason: format!("{direction} chain for {kind} is empty"),
                    });
                }
            }
        }
        Ok(())
    }
}
