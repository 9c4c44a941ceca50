//! Session configuration schema
//!
//! All fields are optional in the JSON form and fall back to the defaults below.

use crate::platform::types::{IceServer, RtcConfiguration};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Top Level
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServer>,

    #[serde(default)]
    pub data_channel: DataChannelConfig,

    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Broadcast buffer size of each coordinator's event dispatcher
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            data_channel: DataChannelConfig::default(),
            recorder: RecorderConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SessionConfig {
    /// Configuration handed to every new peer connection
    pub fn rtc_configuration(&self) -> RtcConfiguration {
        RtcConfiguration {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

fn default_ice_servers() -> Vec<IceServer> {
    vec![
        IceServer::new("stun:stun.l.google.com:19302"),
        IceServer::new("stun:stun1.l.google.com:19302"),
    ]
}

fn default_event_capacity() -> usize {
    64
}

// =============================================================================
// Data Channel
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChannelConfig {
    #[serde(default = "default_channel_label")]
    pub label: String,

    #[serde(default = "default_true")]
    pub ordered: bool,
}

impl Default for DataChannelConfig {
    fn default() -> Self {
        Self {
            label: default_channel_label(),
            ordered: true,
        }
    }
}

fn default_channel_label() -> String {
    "data".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Recorder
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Formats tried in order when the caller does not request one
    #[serde(default = "default_mime_preferences")]
    pub mime_preferences: Vec<String>,

    #[serde(default = "default_audio_bits")]
    pub audio_bits_per_second: u32,

    #[serde(default = "default_video_bits")]
    pub video_bits_per_second: u32,

    /// Encoder flush interval in milliseconds
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            mime_preferences: default_mime_preferences(),
            audio_bits_per_second: default_audio_bits(),
            video_bits_per_second: default_video_bits(),
            timeslice_ms: default_timeslice_ms(),
        }
    }
}

impl RecorderConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }
}

fn default_mime_preferences() -> Vec<String> {
    [
        "video/webm;codecs=vp9,opus",
        "video/webm;codecs=vp8,opus",
        "video/webm",
        "video/mp4",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_audio_bits() -> u32 {
    128_000
}

fn default_video_bits() -> u32 {
    2_500_000
}

fn default_timeslice_ms() -> u64 {
    1000
}
