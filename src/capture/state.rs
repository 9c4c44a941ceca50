//! Local capture state
//!
//! Defines the local session owned by the capture coordinator and the
//! events it publishes.

use crate::platform::{ListenerId, MediaStream, TrackRef};
use serde::Serialize;

/// Local capture session: at most one camera/microphone stream and at most
/// one screen stream
#[derive(Debug, Default)]
pub struct LocalSession {
    pub(crate) local_stream: Option<MediaStream>,
    pub(crate) screen_stream: Option<MediaStream>,
    pub(crate) audio_enabled: bool,
    pub(crate) video_enabled: bool,
    pub(crate) screen_listener: Option<ScreenEndListener>,
}

/// Ended listener registered on the screen stream's video track
#[derive(Debug)]
pub(crate) struct ScreenEndListener {
    pub(crate) track: TrackRef,
    pub(crate) listener: ListenerId,
}

impl ScreenEndListener {
    pub(crate) fn detach(self) {
        self.track.remove_ended_listener(self.listener);
    }
}

/// Snapshot of the local session for UI layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub local_stream_id: Option<String>,
    pub screen_stream_id: Option<String>,
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl From<&LocalSession> for CaptureStatus {
    fn from(session: &LocalSession) -> Self {
        Self {
            local_stream_id: session.local_stream.as_ref().map(|s| s.id().to_string()),
            screen_stream_id: session.screen_stream.as_ref().map(|s| s.id().to_string()),
            audio_enabled: session.audio_enabled,
            video_enabled: session.video_enabled,
        }
    }
}

/// Events emitted by the capture coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CaptureEvent {
    LocalCaptureStarted { stream_id: String },
    LocalCaptureStopped { stream_id: String },
    ScreenCaptureStarted { stream_id: String },
    ScreenCaptureStopped { stream_id: String },
    /// The platform ended screen capture (e.g. the user pressed its native stop button)
    ScreenCaptureEnded { stream_id: String },
    AudioToggled { enabled: bool },
    VideoToggled { enabled: bool },
}
