use serde::{Deserialize, Serialize};

// MARK: - MediaKind

/// Logical media carried by an RTP session.
///
/// The session multiplexer numbers sessions; session 0 carries video and
/// session 1 carries audio. Any other number is not a session this engine
/// knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Video, MediaKind::Audio];

    pub fn session_id(self) -> u32 {
        match self {
            Self::Video => 0,
            Self::Audio => 1,
        }
    }

    pub fn from_session_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(Self::Video),
            1 => Some(Self::Audio),
            _ => None,
        }
    }

    /// Offset of this kind's media socket from a base port.
    pub fn port_offset(self) -> u16 {
        match self {
            Self::Video => 0,
            Self::Audio => 2,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// MARK: - Direction

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Send,
    Receive,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

// MARK: - SessionKey

/// A (direction, media kind) pairing. At most one session exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub direction: Direction,
    pub kind: MediaKind,
}

impl SessionKey {
    pub fn new(direction: Direction, kind: MediaKind) -> Self {
        Self { direction, kind }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.direction, self.kind)
    }
}

// MARK: - PerKind

/// One value per media kind. The set of kinds is closed, so lookups never miss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerKind<T> {
    pub video: T,
    pub audio: T,
}

impl<T> PerKind<T> {
    pub fn new(video: T, audio: T) -> Self {
        Self { video, audio }
    }

    pub fn get(&self, kind: MediaKind) -> &T {
        match kind {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        }
    }

    pub fn get_mut(&mut self, kind: MediaKind) -> &mut T {
        match kind {
            MediaKind::Video => &mut self.video,
            MediaKind::Audio => &mut self.audio,
        }
    }
}

// MARK: - PortDirection

/// Data-flow direction of a port: a `Src` port produces, a `Sink` port accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Src,
    Sink,
}

// MARK: - NetworkSocket

/// The six UDP sockets facing the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkSocket {
    /// Local receive socket for a media stream.
    MediaSource(MediaKind),
    /// Send socket directed at the peer for a media stream.
    MediaSink(MediaKind),
    ControlSource,
    ControlSink,
}

impl std::fmt::Display for NetworkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MediaSource(kind) => write!(f, "{kind}_udp_src"),
            Self::MediaSink(kind) => write!(f, "{kind}_udp_sink"),
            Self::ControlSource => write!(f, "rtcp_udp_src"),
            Self::ControlSink => write!(f, "rtcp_udp_sink"),
        }
    }
}

// MARK: - CapabilityDescriptor

/// The media / encoding / clock-rate a port can produce or accept.
///
/// Optional fields are wildcards: a field absent on either side never causes a
/// mismatch. The `Display` form follows the GStreamer caps syntax and is what
/// diagnostics print.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityDescriptor {
    #[serde(alias = "mediaType")]
    pub media_type: String,
    pub media: Option<String>,
    #[serde(alias = "encodingName")]
    pub encoding_name: Option<String>,
    #[serde(alias = "clockRate")]
    pub clock_rate: Option<i32>,
}

impl Default for CapabilityDescriptor {
    fn default() -> Self {
        Self {
            media_type: Self::RTP_MEDIA_TYPE.to_owned(),
            media: None,
            encoding_name: None,
            clock_rate: None,
        }
    }
}

impl CapabilityDescriptor {
    pub const RTP_MEDIA_TYPE: &'static str = "application/x-rtp";

    pub fn rtp(media: &str, encoding_name: &str, clock_rate: i32) -> Self {
        Self {
            media_type: Self::RTP_MEDIA_TYPE.to_owned(),
            media: Some(media.to_owned()),
            encoding_name: Some(encoding_name.to_owned()),
            clock_rate: Some(clock_rate),
        }
    }

    /// Theora video at the RTP video clock.
    pub fn theora() -> Self {
        Self::rtp("video", "THEORA", 90_000)
    }

    /// Opus audio at 48 kHz.
    pub fn opus() -> Self {
        Self::rtp("audio", "OPUS", 48_000)
    }

    pub fn is_compatible_with(&self, other: &Self) -> bool {
        fn agree<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        self.media_type == other.media_type
            && agree(&self.media, &other.media)
            && agree(&self.encoding_name, &other.encoding_name)
            && agree(&self.clock_rate, &other.clock_rate)
    }
}

impl std::fmt::Display for CapabilityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.media_type)?;
        if let Some(media) = &self.media {
            write!(f, ", media=(string){media}")?;
        }
        if let Some(rate) = self.clock_rate {
            write!(f, ", clock-rate=(int){rate}")?;
        }
        if let Some(encoding) = &self.encoding_name {
            write!(f, ", encoding-name=(string){encoding}")?;
        }
        Ok(())
    }
}

/// Stable text for an optional descriptor; an unconstrained port prints `ANY`.
pub fn describe_capabilities(caps: Option<&CapabilityDescriptor>) -> String {
    caps.map_or_else(|| "ANY".to_owned(), ToString::to_string)
}

// MARK: - LinkResult

/// Outcome of one attempt to connect a source port to a sink port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    Success,
    FormatMismatch {
        src_caps: Option<CapabilityDescriptor>,
        sink_caps: Option<CapabilityDescriptor>,
    },
    StructuralError {
        reason: String,
    },
}

impl LinkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
