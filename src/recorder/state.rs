//! Recording state management
//!
//! Defines the recording state machine, pause-aware duration accounting and
//! the finished output.

use super::format;
use crate::utils::error::MediaResult;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Encoder running
    Recording,
    /// Encoder paused; time spent here is not counted
    Paused,
}

/// Options for starting a recording. Unset fields use the session config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOptions {
    /// Preferred format; ignored if the encoder does not support it
    pub mime_type: Option<String>,

    pub audio_bits_per_second: Option<u32>,

    pub video_bits_per_second: Option<u32>,

    /// Flush interval override in milliseconds
    pub timeslice_ms: Option<u64>,
}

impl RecordingOptions {
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Pause-aware recording clock.
///
/// Every paused interval is subtracted exactly once, including one still open
/// when the clock is stopped.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    started: Option<Instant>,
    paused_total: Duration,
    pause_started: Option<Instant>,
    last: Duration,
}

impl Timeline {
    pub fn start(&mut self, now: Instant) {
        *self = Self {
            started: Some(now),
            ..Self::default()
        };
    }

    pub fn pause(&mut self, now: Instant) {
        if self.started.is_some() && self.pause_started.is_none() {
            self.pause_started = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.pause_started.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
    }

    /// Freeze the clock and return the final duration
    pub fn stop(&mut self, now: Instant) -> Duration {
        self.resume(now);
        self.last = self.elapsed(now);
        self.started = None;
        self.last
    }

    /// Recorded time so far, or the final value once stopped
    pub fn elapsed(&self, now: Instant) -> Duration {
        let Some(started) = self.started else {
            return self.last;
        };
        let open_pause = self
            .pause_started
            .map(|paused_at| now.saturating_duration_since(paused_at))
            .unwrap_or_default();
        now.saturating_duration_since(started)
            .saturating_sub(self.paused_total + open_pause)
    }
}

/// Chunks delivered by the encoder of one recording
#[derive(Debug, Default)]
pub(crate) struct ChunkBuffer {
    chunks: Mutex<Vec<Bytes>>,
    detached: AtomicBool,
}

impl ChunkBuffer {
    /// Append a chunk. Empty chunks and chunks after detach are dropped.
    pub(crate) fn push(&self, chunk: Bytes) -> bool {
        if chunk.is_empty() || self.detached.load(Ordering::SeqCst) {
            return false;
        }
        self.chunks.lock().push(chunk);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Take every chunk and refuse later ones
    pub(crate) fn detach(&self) -> Vec<Bytes> {
        self.detached.store(true, Ordering::SeqCst);
        std::mem::take(&mut *self.chunks.lock())
    }
}

/// A finished recording
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingOutput {
    /// Every chunk concatenated in delivery order
    #[serde(skip)]
    pub data: Bytes,

    pub mime_type: String,

    /// Recorded time excluding pauses
    pub duration_ms: u64,

    pub size_bytes: usize,

    pub chunk_count: usize,

    pub started_at: DateTime<Utc>,

    pub stopped_at: DateTime<Utc>,
}

impl RecordingOutput {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn file_extension(&self) -> &'static str {
        format::extension_for(&self.mime_type)
    }

    /// Write the recording to `path`, creating parent directories
    pub fn write_to(&self, path: &Path) -> MediaResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.data)?;
        tracing::info!(
            "Wrote recording ({} bytes) to {}",
            self.size_bytes,
            path.display()
        );
        Ok(())
    }
}

/// Events emitted by the recording coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RecordingEvent {
    Started {
        mime_type: String,
    },
    Paused {
        duration_ms: u64,
    },
    Resumed {
        duration_ms: u64,
    },
    Stopped {
        duration_ms: u64,
        size_bytes: usize,
        chunk_count: usize,
    },
    /// Reported by the encoder; the recording keeps its state
    Error {
        code: String,
        message: String,
    },
}
