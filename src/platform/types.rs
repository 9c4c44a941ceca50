//! Platform value types
//!
//! Plain data exchanged with the capture, negotiation and encoder adapters.

use serde::{Deserialize, Serialize};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Live state of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// Detailed per-track capture settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_cancellation: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_suppression: Option<bool>,
}

/// Constraint for one track kind: a plain switch or detailed settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackConstraint {
    Enabled(bool),
    Settings(TrackSettings),
}

impl TrackConstraint {
    /// Whether this kind is requested at all
    pub fn is_requested(&self) -> bool {
        match self {
            TrackConstraint::Enabled(enabled) => *enabled,
            TrackConstraint::Settings(_) => true,
        }
    }
}

impl Default for TrackConstraint {
    fn default() -> Self {
        TrackConstraint::Enabled(true)
    }
}

impl From<bool> for TrackConstraint {
    fn from(enabled: bool) -> Self {
        TrackConstraint::Enabled(enabled)
    }
}

/// Capture request for camera/microphone or display capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConstraints {
    #[serde(default)]
    pub audio: TrackConstraint,

    #[serde(default)]
    pub video: TrackConstraint,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: TrackConstraint::Enabled(true),
            video: TrackConstraint::Enabled(true),
        }
    }
}

impl MediaConstraints {
    pub fn new(audio: impl Into<TrackConstraint>, video: impl Into<TrackConstraint>) -> Self {
        Self {
            audio: audio.into(),
            video: video.into(),
        }
    }

    /// Default request for display capture: video only
    pub fn display() -> Self {
        Self::new(false, true)
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// SDP payload produced or consumed during offer/answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate as exchanged over signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,

    #[serde(default)]
    pub sdp_mid: Option<String>,

    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,

    #[serde(default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Configuration handed to the negotiation primitive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcConfiguration {
    pub ice_servers: Vec<IceServer>,
}

/// Overall connection state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE transport state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

/// Ready state of a data channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Message carried on a data channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMessage {
    Text(String),
    Binary(bytes::Bytes),
}

/// State of an ICE candidate pair in a stats report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidatePairState {
    Frozen,
    Waiting,
    InProgress,
    Failed,
    Succeeded,
}

/// One entry of a platform statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StatsEntry {
    #[serde(rename_all = "camelCase")]
    OutboundRtp {
        id: String,
        timestamp: f64,
        kind: TrackKind,
        bytes_sent: u64,
        packets_sent: u64,
    },
    #[serde(rename_all = "camelCase")]
    InboundRtp {
        id: String,
        timestamp: f64,
        kind: TrackKind,
        bytes_received: u64,
        packets_lost: i64,
        jitter: f64,
    },
    #[serde(rename_all = "camelCase")]
    CandidatePair {
        id: String,
        timestamp: f64,
        state: CandidatePairState,
        nominated: bool,
        current_round_trip_time: Option<f64>,
        available_outgoing_bitrate: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Other {
        id: String,
        timestamp: f64,
    },
}

/// Raw statistics report as returned by the platform
pub type StatsReport = Vec<StatsEntry>;

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderOptions {
    pub mime_type: String,
    pub audio_bits_per_second: u32,
    pub video_bits_per_second: u32,
}

/// Lifecycle state reported by an encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}
