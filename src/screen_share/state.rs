//! Screen-share state
//!
//! Defines the share lifecycle, start options and the events published by the
//! screen-share coordinator.

use crate::platform::{MediaConstraints, MediaStream, MediaTrack, TrackRef};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Options for starting a screen share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareOptions {
    /// Constraints passed to display capture
    #[serde(default = "MediaConstraints::display")]
    pub constraints: MediaConstraints,
}

impl Default for ScreenShareOptions {
    fn default() -> Self {
        Self {
            constraints: MediaConstraints::display(),
        }
    }
}

impl ScreenShareOptions {
    /// Also capture system audio, where the platform offers it
    pub fn with_audio(mut self) -> Self {
        self.constraints.audio = true.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SharePhase {
    #[default]
    Idle,
    Starting,
    Sharing,
    Stopping,
}

/// Live screen-share state
#[derive(Debug, Default)]
pub struct ScreenShareState {
    pub(crate) phase: SharePhase,

    pub(crate) screen_stream: Option<MediaStream>,

    /// Local camera track to put back on stop. Never stopped by screen share.
    pub(crate) original_track: Option<TrackRef>,

    /// Task waiting for the platform to end the screen capture
    pub(crate) watcher: Option<JoinHandle<()>>,
}

/// Everything a stop needs, taken out of the state in one step
pub(crate) struct ActiveShare {
    pub(crate) screen_stream: Option<MediaStream>,
    pub(crate) original_track: Option<TrackRef>,
    pub(crate) watcher: Option<JoinHandle<()>>,
}

/// Snapshot for UI layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareStatus {
    pub is_sharing: bool,
    pub screen_stream_id: Option<String>,
    pub original_track_id: Option<String>,
}

impl From<&ScreenShareState> for ScreenShareStatus {
    fn from(state: &ScreenShareState) -> Self {
        Self {
            is_sharing: state.phase == SharePhase::Sharing,
            screen_stream_id: state.screen_stream.as_ref().map(|s| s.id().to_string()),
            original_track_id: state.original_track.as_ref().map(|t| t.id().to_string()),
        }
    }
}

/// Why a share ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// `stop` or `toggle` was called
    Requested,
    /// The platform ended the screen capture
    CaptureEnded,
    /// The screen capture was released or replaced through the capture
    /// coordinator
    CaptureReleased,
}

/// Events emitted by the screen-share coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ScreenShareEvent {
    Started {
        stream_id: String,
        peer_count: usize,
    },
    Stopped {
        stream_id: Option<String>,
        reason: StopReason,
        restored_peers: usize,
        /// Peers whose original track could not be restored
        failed_peers: Vec<String>,
    },
}
