//! Capture coordinator
//!
//! Acquires and releases the local camera/microphone stream and the screen
//! stream, and keeps the enable flags in sync with the tracks.

use super::state::{CaptureEvent, CaptureStatus, LocalSession, ScreenEndListener};
use crate::platform::{
    EndedCallback, MediaConstraints, MediaStream, Platform, TrackKind, TrackRef,
};
use crate::utils::error::{MediaError, MediaResult};
use crate::utils::events::EventDispatcher;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};

/// Owns the local capture session. Cloning yields another handle to the
/// same session.
#[derive(Clone)]
pub struct CaptureCoordinator {
    platform: Platform,
    state: Arc<RwLock<LocalSession>>,
    events: EventDispatcher<CaptureEvent>,
}

impl CaptureCoordinator {
    pub fn new(platform: Platform, event_capacity: usize) -> Self {
        Self {
            platform,
            state: Arc::new(RwLock::new(LocalSession::default())),
            events: EventDispatcher::new(event_capacity),
        }
    }

    pub fn events(&self) -> &EventDispatcher<CaptureEvent> {
        &self.events
    }

    /// Acquire camera and/or microphone, replacing any existing local stream
    pub async fn acquire_local_capture(
        &self,
        constraints: &MediaConstraints,
    ) -> MediaResult<MediaStream> {
        let capture = self.platform.capture()?;

        // Devices may be exclusive, so let go of the old stream first
        self.release_local_capture();

        tracing::info!(
            "Acquiring local capture (audio={}, video={})",
            constraints.audio.is_requested(),
            constraints.video.is_requested()
        );

        let stream = capture
            .get_user_media(constraints)
            .await
            .map_err(|e| MediaError::from(e).with_context("getUserMedia", None))?;

        let replaced = {
            let mut state = self.state.write();
            let replaced = state.local_stream.replace(stream.clone());
            state.audio_enabled = stream
                .first_audio_track()
                .map(|t| t.enabled())
                .unwrap_or(false);
            state.video_enabled = stream
                .first_video_track()
                .map(|t| t.enabled())
                .unwrap_or(false);
            replaced
        };

        // Another acquisition completed while we were waiting
        if let Some(previous) = replaced {
            tracing::debug!("Releasing superseded local stream {}", previous.id());
            previous.stop_all();
        }

        tracing::info!(
            "Local capture started: stream={}, tracks={}",
            stream.id(),
            stream.tracks().len()
        );
        self.events.emit(CaptureEvent::LocalCaptureStarted {
            stream_id: stream.id().to_string(),
        });
        Ok(stream)
    }

    /// Acquire a screen/window stream, replacing any existing one
    pub async fn acquire_screen_capture(
        &self,
        constraints: &MediaConstraints,
    ) -> MediaResult<MediaStream> {
        let capture = self.platform.capture()?;
        if !capture.supports_display_capture() {
            return Err(MediaError::UnsupportedCapability(
                "display capture is not available".to_string(),
            ));
        }

        self.release_screen_capture();

        tracing::info!("Acquiring screen capture");
        let stream = capture
            .get_display_media(constraints)
            .await
            .map_err(|e| MediaError::from(e).with_context("getDisplayMedia", None))?;

        let replaced = {
            let mut state = self.state.write();
            let listener = state.screen_listener.take();
            let replaced = state.screen_stream.replace(stream.clone());
            replaced.map(|previous| (previous, listener))
        };
        if let Some((previous, listener)) = replaced {
            if let Some(listener) = listener {
                listener.detach();
            }
            previous.stop_all();
        }

        // Registered without holding the lock: a track that already ended
        // may fire the callback immediately.
        if let Some(track) = stream.first_video_track() {
            let listener = track.on_ended(self.screen_ended_callback(stream.id()));
            let mut state = self.state.write();
            let still_current = state
                .screen_stream
                .as_ref()
                .map(|s| s.id() == stream.id())
                .unwrap_or(false);
            if still_current {
                state.screen_listener = Some(ScreenEndListener { track, listener });
            } else {
                drop(state);
                track.remove_ended_listener(listener);
            }
        }

        tracing::info!("Screen capture started: stream={}", stream.id());
        self.events.emit(CaptureEvent::ScreenCaptureStarted {
            stream_id: stream.id().to_string(),
        });
        Ok(stream)
    }

    /// One-shot callback clearing the screen stream when the platform ends it
    fn screen_ended_callback(&self, stream_id: &str) -> EndedCallback {
        let state: Weak<RwLock<LocalSession>> = Arc::downgrade(&self.state);
        let events = self.events.clone();
        let stream_id = stream_id.to_string();

        Box::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };

            let ended = {
                let mut state = state.write();
                let is_current = state
                    .screen_stream
                    .as_ref()
                    .map(|s| s.id() == stream_id)
                    .unwrap_or(false);
                if is_current {
                    state.screen_listener = None;
                    state.screen_stream.take()
                } else {
                    None
                }
            };

            match ended {
                Some(stream) => {
                    tracing::info!("Screen capture {} ended by the platform", stream_id);
                    stream.stop_all();
                    events.emit(CaptureEvent::ScreenCaptureEnded { stream_id });
                }
                None => {
                    tracing::debug!("Ignoring end of stale screen stream {}", stream_id);
                }
            }
        })
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> MediaResult<()> {
        self.set_kind_enabled(TrackKind::Audio, enabled)?;
        self.events.emit(CaptureEvent::AudioToggled { enabled });
        Ok(())
    }

    pub fn set_video_enabled(&self, enabled: bool) -> MediaResult<()> {
        self.set_kind_enabled(TrackKind::Video, enabled)?;
        self.events.emit(CaptureEvent::VideoToggled { enabled });
        Ok(())
    }

    fn set_kind_enabled(&self, kind: TrackKind, enabled: bool) -> MediaResult<()> {
        let mut state = self.state.write();
        let stream = state
            .local_stream
            .as_ref()
            .ok_or_else(|| MediaError::NotActive("no local capture stream".to_string()))?;

        let mut toggled = 0;
        for track in stream.tracks_of(kind) {
            track.set_enabled(enabled);
            toggled += 1;
        }
        if toggled == 0 {
            tracing::warn!("Local stream has no {:?} track to toggle", kind);
        }

        match kind {
            TrackKind::Audio => state.audio_enabled = enabled,
            TrackKind::Video => state.video_enabled = enabled,
        }
        Ok(())
    }

    /// Stop the local stream. No-op if there is none.
    pub fn release_local_capture(&self) {
        let stream = {
            let mut state = self.state.write();
            state.audio_enabled = false;
            state.video_enabled = false;
            state.local_stream.take()
        };

        if let Some(stream) = stream {
            stream.stop_all();
            tracing::info!("Local capture released: stream={}", stream.id());
            self.events.emit(CaptureEvent::LocalCaptureStopped {
                stream_id: stream.id().to_string(),
            });
        }
    }

    /// Stop the screen stream. No-op if there is none.
    pub fn release_screen_capture(&self) {
        let (stream, listener) = {
            let mut state = self.state.write();
            (state.screen_stream.take(), state.screen_listener.take())
        };

        // Deregister first so stopping cannot be reported as an external end
        if let Some(listener) = listener {
            listener.detach();
        }

        if let Some(stream) = stream {
            stream.stop_all();
            tracing::info!("Screen capture released: stream={}", stream.id());
            self.events.emit(CaptureEvent::ScreenCaptureStopped {
                stream_id: stream.id().to_string(),
            });
        }
    }

    pub fn release_all(&self) {
        self.release_screen_capture();
        self.release_local_capture();
    }

    pub fn local_stream(&self) -> Option<MediaStream> {
        self.state.read().local_stream.clone()
    }

    pub fn screen_stream(&self) -> Option<MediaStream> {
        self.state.read().screen_stream.clone()
    }

    /// First video track of the local stream, if any
    pub fn local_video_track(&self) -> Option<TrackRef> {
        self.state
            .read()
            .local_stream
            .as_ref()
            .and_then(|s| s.first_video_track())
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.state.read().audio_enabled
    }

    pub fn is_video_enabled(&self) -> bool {
        self.state.read().video_enabled
    }

    pub fn is_screen_capturing(&self) -> bool {
        self.state.read().screen_stream.is_some()
    }

    pub fn status(&self) -> CaptureStatus {
        CaptureStatus::from(&*self.state.read())
    }
}
