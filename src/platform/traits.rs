//! Platform adapter traits
//!
//! Capture, negotiation and encoder primitives are injected through these
//! traits so the coordinators never touch platform globals directly.

use super::types::{
    DataChannelState, DataMessage, EncoderOptions, EncoderState, IceCandidate,
    IceConnectionState, MediaConstraints, PeerConnectionState, RtcConfiguration,
    SessionDescription, StatsReport, TrackKind, TrackState,
};
use crate::utils::error::PlatformError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a platform track
pub type TrackRef = Arc<dyn MediaTrack>;

/// One-shot callback fired when a track ends outside our control
pub type EndedCallback = Box<dyn FnOnce() + Send>;

/// Registration handle for an ended listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A single audio or video track
pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// Device or surface label
    fn label(&self) -> &str;

    fn enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    fn ready_state(&self) -> TrackState;

    /// Stop the track. Does not fire ended listeners.
    fn stop(&self);

    /// Register a listener fired at most once when the track ends externally
    fn on_ended(&self, callback: EndedCallback) -> ListenerId;

    fn remove_ended_listener(&self, id: ListenerId);
}

/// Two handles refer to the same platform track
pub fn same_track(a: &TrackRef, b: &TrackRef) -> bool {
    a.id() == b.id()
}

/// Handle to a set of tracks returned by capture
#[derive(Clone, Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<TrackRef>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<TrackRef>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &TrackRef> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn first_video_track(&self) -> Option<TrackRef> {
        self.tracks_of(TrackKind::Video).next().cloned()
    }

    pub fn first_audio_track(&self) -> Option<TrackRef> {
        self.tracks_of(TrackKind::Audio).next().cloned()
    }

    /// Stop every track of the stream
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Camera/microphone and display capture primitive
#[async_trait]
pub trait CaptureDevices: Send + Sync {
    /// Whether display capture is available at all
    fn supports_display_capture(&self) -> bool {
        true
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformError>;

    async fn get_display_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformError>;
}

/// Notification emitted by a peer connection
#[derive(Clone)]
pub enum ConnectionEvent {
    /// A local candidate was produced; `None` marks end of gathering
    IceCandidate(Option<IceCandidate>),
    ConnectionStateChanged(PeerConnectionState),
    IceConnectionStateChanged(IceConnectionState),
    /// A remote track arrived along with the streams it belongs to
    Track {
        track: TrackRef,
        streams: Vec<MediaStream>,
    },
    /// The remote side opened a data channel
    DataChannel(Arc<dyn DataChannel>),
    DataChannelStateChanged {
        label: String,
        state: DataChannelState,
    },
    DataChannelMessage {
        label: String,
        message: DataMessage,
    },
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::IceCandidate(c) => f.debug_tuple("IceCandidate").field(c).finish(),
            ConnectionEvent::ConnectionStateChanged(s) => {
                f.debug_tuple("ConnectionStateChanged").field(s).finish()
            }
            ConnectionEvent::IceConnectionStateChanged(s) => {
                f.debug_tuple("IceConnectionStateChanged").field(s).finish()
            }
            ConnectionEvent::Track { track, streams } => f
                .debug_struct("Track")
                .field("track", &track.id())
                .field("streams", &streams.len())
                .finish(),
            ConnectionEvent::DataChannel(channel) => {
                f.debug_tuple("DataChannel").field(&channel.label()).finish()
            }
            ConnectionEvent::DataChannelStateChanged { label, state } => f
                .debug_struct("DataChannelStateChanged")
                .field("label", label)
                .field("state", state)
                .finish(),
            ConnectionEvent::DataChannelMessage { label, message } => f
                .debug_struct("DataChannelMessage")
                .field("label", label)
                .field("message", message)
                .finish(),
        }
    }
}

/// Callback receiving every notification of one connection
pub type ConnectionEventSink = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// Creates peer connections
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &RtcConfiguration,
        events: ConnectionEventSink,
    ) -> Result<Arc<dyn PeerConnection>, PlatformError>;
}

/// Negotiation primitive for one remote participant
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(
        &self,
        track: TrackRef,
        stream: &MediaStream,
    ) -> Result<Arc<dyn RtpSender>, PlatformError>;

    fn create_data_channel(
        &self,
        label: &str,
        ordered: bool,
    ) -> Result<Arc<dyn DataChannel>, PlatformError>;

    async fn create_offer(&self) -> Result<SessionDescription, PlatformError>;

    async fn create_answer(&self) -> Result<SessionDescription, PlatformError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PlatformError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PlatformError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PlatformError>;

    fn senders(&self) -> Vec<Arc<dyn RtpSender>>;

    fn receivers(&self) -> Vec<Arc<dyn RtpReceiver>>;

    async fn get_stats(&self) -> Result<StatsReport, PlatformError>;

    fn connection_state(&self) -> PeerConnectionState;

    fn ice_connection_state(&self) -> IceConnectionState;

    fn close(&self);
}

/// Outgoing side of one media track
#[async_trait]
pub trait RtpSender: Send + Sync {
    fn track(&self) -> Option<TrackRef>;

    async fn replace_track(&self, track: Option<TrackRef>) -> Result<(), PlatformError>;
}

/// Incoming side of one media track
pub trait RtpReceiver: Send + Sync {
    fn track(&self) -> TrackRef;
}

/// Ancillary message channel over a peer connection
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn ready_state(&self) -> DataChannelState;

    fn send_text(&self, text: &str) -> Result<(), PlatformError>;

    fn send_binary(&self, data: &[u8]) -> Result<(), PlatformError>;

    fn close(&self);
}

/// Notification emitted by an encoder
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    DataAvailable(bytes::Bytes),
    Started,
    Paused,
    Resumed,
    Stopped,
    Error(PlatformError),
}

/// Callback receiving encoder notifications
pub type EncoderEventSink = Arc<dyn Fn(EncoderEvent) + Send + Sync>;

/// Creates encoders and answers format-support queries
pub trait MediaEncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EncoderEventSink,
    ) -> Result<Box<dyn MediaEncoder>, PlatformError>;
}

/// A running encoder bound to one stream
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Start encoding, flushing a chunk every `timeslice`
    fn start(&mut self, timeslice: Duration) -> Result<(), PlatformError>;

    fn pause(&mut self) -> Result<(), PlatformError>;

    fn resume(&mut self) -> Result<(), PlatformError>;

    /// Stop encoding. Resolves after the final chunk has been delivered.
    async fn stop(&mut self) -> Result<(), PlatformError>;

    fn state(&self) -> EncoderState;
}
