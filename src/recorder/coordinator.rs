//! Recording coordinator
//!
//! Wraps one encoder lifecycle per recording and produces a single timed
//! output blob. The input stream is borrowed, never stopped.

use super::format::select_mime_type;
use super::state::{
    ChunkBuffer, RecordingEvent, RecordingOptions, RecordingOutput, RecordingState, Timeline,
};
use crate::config::RecorderConfig;
use crate::platform::{EncoderEvent, EncoderEventSink, EncoderOptions, MediaEncoder, MediaStream, Platform};
use crate::utils::error::{MediaError, MediaResult};
use crate::utils::events::EventDispatcher;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Encoder and buffer of the recording in progress
struct ActiveRecording {
    encoder: Box<dyn MediaEncoder>,
    buffer: Arc<ChunkBuffer>,
    mime_type: String,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderInner {
    state: RecordingState,
    /// Set while a start or stop is between its first and last step
    transitioning: bool,
    timeline: Timeline,
    active: Option<ActiveRecording>,
}

/// Manages the recording lifecycle. Cloning yields another handle to the same
/// recorder.
#[derive(Clone)]
pub struct RecordingCoordinator {
    platform: Platform,
    config: RecorderConfig,
    inner: Arc<Mutex<RecorderInner>>,
    events: EventDispatcher<RecordingEvent>,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl RecordingCoordinator {
    pub fn new(platform: Platform, config: RecorderConfig, event_capacity: usize) -> Self {
        Self {
            platform,
            config,
            inner: Arc::new(Mutex::new(RecorderInner::default())),
            events: EventDispatcher::new(event_capacity),
        }
    }

    pub fn events(&self) -> &EventDispatcher<RecordingEvent> {
        &self.events
    }

    /// Start recording `stream`. Returns the chosen mime type.
    pub fn start(&self, stream: &MediaStream, options: &RecordingOptions) -> MediaResult<String> {
        {
            let mut inner = self.inner.lock();
            if inner.state != RecordingState::Idle || inner.transitioning {
                return Err(MediaError::AlreadyActive(
                    "a recording is already in progress".to_string(),
                ));
            }
            inner.transitioning = true;
        }

        let result = self.open_encoder(stream, options);

        let mut inner = self.inner.lock();
        inner.transitioning = false;
        let active = result?;
        let mime_type = active.mime_type.clone();

        inner.timeline.start(Instant::now());
        inner.state = RecordingState::Recording;
        inner.active = Some(active);
        drop(inner);

        tracing::info!("Recording started: stream={}, format={}", stream.id(), mime_type);
        self.events.emit(RecordingEvent::Started {
            mime_type: mime_type.clone(),
        });
        Ok(mime_type)
    }

    fn open_encoder(
        &self,
        stream: &MediaStream,
        options: &RecordingOptions,
    ) -> MediaResult<ActiveRecording> {
        if !stream.has_tracks() {
            return Err(MediaError::InvalidInput(format!(
                "stream {} has no tracks to record",
                stream.id()
            )));
        }
        let factory = self.platform.encoder()?;

        let mime_type = select_mime_type(
            factory.as_ref(),
            options.mime_type.as_deref(),
            &self.config.mime_preferences,
        )?;
        let encoder_options = EncoderOptions {
            mime_type: mime_type.clone(),
            audio_bits_per_second: options
                .audio_bits_per_second
                .unwrap_or(self.config.audio_bits_per_second),
            video_bits_per_second: options
                .video_bits_per_second
                .unwrap_or(self.config.video_bits_per_second),
        };
        let timeslice = options
            .timeslice_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.timeslice());

        let buffer = Arc::new(ChunkBuffer::default());
        let mut encoder = factory
            .create(stream, &encoder_options, self.encoder_sink(buffer.clone()))
            .map_err(|e| MediaError::from(e).with_context("createEncoder", None))?;

        encoder
            .start(timeslice)
            .map_err(|e| MediaError::from(e).with_context("startEncoder", None))?;

        tracing::debug!(
            "Encoder started: audio={}bps, video={}bps, timeslice={}ms",
            encoder_options.audio_bits_per_second,
            encoder_options.video_bits_per_second,
            millis(timeslice)
        );

        Ok(ActiveRecording {
            encoder,
            buffer,
            mime_type,
            started_at: Utc::now(),
        })
    }

    /// Sink for one encoder. Only touches that recording's buffer.
    fn encoder_sink(&self, buffer: Arc<ChunkBuffer>) -> EncoderEventSink {
        let events = self.events.clone();

        Arc::new(move |event| match event {
            EncoderEvent::DataAvailable(chunk) => {
                let size = chunk.len();
                if buffer.push(chunk) {
                    tracing::trace!("Buffered {} byte chunk", size);
                }
            }
            EncoderEvent::Error(error) => {
                tracing::error!("Encoder error: {}", error);
                events.emit(RecordingEvent::Error {
                    code: error.name.clone(),
                    message: error.message.clone(),
                });
            }
            other => tracing::debug!("Encoder event: {:?}", other),
        })
    }

    pub fn pause(&self) -> MediaResult<()> {
        let duration = {
            let mut inner = self.inner.lock();
            if inner.transitioning {
                return Err(MediaError::NotActive("recording is stopping".to_string()));
            }
            match inner.state {
                RecordingState::Recording => {}
                RecordingState::Paused => {
                    return Err(MediaError::AlreadyActive(
                        "recording is already paused".to_string(),
                    ))
                }
                RecordingState::Idle => {
                    return Err(MediaError::NotActive("no recording in progress".to_string()))
                }
            }

            if let Some(active) = inner.active.as_mut() {
                active
                    .encoder
                    .pause()
                    .map_err(|e| MediaError::from(e).with_context("pauseEncoder", None))?;
            }

            let now = Instant::now();
            inner.timeline.pause(now);
            inner.state = RecordingState::Paused;
            inner.timeline.elapsed(now)
        };

        tracing::info!("Recording paused at {}ms", millis(duration));
        self.events.emit(RecordingEvent::Paused {
            duration_ms: millis(duration),
        });
        Ok(())
    }

    pub fn resume(&self) -> MediaResult<()> {
        let duration = {
            let mut inner = self.inner.lock();
            if inner.transitioning || inner.state != RecordingState::Paused {
                return Err(MediaError::NotActive("recording is not paused".to_string()));
            }

            if let Some(active) = inner.active.as_mut() {
                active
                    .encoder
                    .resume()
                    .map_err(|e| MediaError::from(e).with_context("resumeEncoder", None))?;
            }

            let now = Instant::now();
            inner.timeline.resume(now);
            inner.state = RecordingState::Recording;
            inner.timeline.elapsed(now)
        };

        tracing::info!("Recording resumed at {}ms", millis(duration));
        self.events.emit(RecordingEvent::Resumed {
            duration_ms: millis(duration),
        });
        Ok(())
    }

    /// Stop the encoder and return everything it produced.
    ///
    /// Stopping while paused closes the open paused interval first. An
    /// encoder that fails to stop cleanly still yields the chunks buffered so
    /// far.
    pub async fn stop(&self) -> MediaResult<RecordingOutput> {
        let (active, duration) = {
            let mut inner = self.inner.lock();
            if inner.state == RecordingState::Idle || inner.transitioning {
                return Err(MediaError::NotActive("no recording in progress".to_string()));
            }
            let duration = inner.timeline.stop(Instant::now());
            let Some(active) = inner.active.take() else {
                inner.state = RecordingState::Idle;
                return Err(MediaError::NotActive("recording has no encoder".to_string()));
            };
            inner.transitioning = true;
            (active, duration)
        };

        let ActiveRecording {
            mut encoder,
            buffer,
            mime_type,
            started_at,
        } = active;

        // Resolves after the final chunk has been delivered
        if let Err(e) = encoder.stop().await {
            tracing::warn!("Encoder did not stop cleanly: {}", e);
        }
        drop(encoder);
        let chunks = buffer.detach();

        {
            let mut inner = self.inner.lock();
            inner.state = RecordingState::Idle;
            inner.transitioning = false;
        }

        let size_bytes: usize = chunks.iter().map(|c| c.len()).sum();
        let mut data = BytesMut::with_capacity(size_bytes);
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }

        let output = RecordingOutput {
            data: data.freeze(),
            mime_type,
            duration_ms: millis(duration),
            size_bytes,
            chunk_count: chunks.len(),
            started_at,
            stopped_at: Utc::now(),
        };

        tracing::info!(
            "Recording stopped. Duration: {}ms, {} bytes in {} chunk(s)",
            output.duration_ms,
            output.size_bytes,
            output.chunk_count
        );
        self.events.emit(RecordingEvent::Stopped {
            duration_ms: output.duration_ms,
            size_bytes: output.size_bytes,
            chunk_count: output.chunk_count,
        });
        Ok(output)
    }

    pub fn state(&self) -> RecordingState {
        self.inner.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() != RecordingState::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.state() == RecordingState::Paused
    }

    /// Recorded time excluding pauses; the last value once stopped
    pub fn duration(&self) -> Duration {
        self.inner.lock().timeline.elapsed(Instant::now())
    }

    pub fn duration_ms(&self) -> u64 {
        millis(self.duration())
    }

    /// Format of the recording in progress
    pub fn mime_type(&self) -> Option<String> {
        self.inner.lock().active.as_ref().map(|a| a.mime_type.clone())
    }

    /// Chunks buffered by the recording in progress
    pub fn chunk_count(&self) -> usize {
        self.inner
            .lock()
            .active
            .as_ref()
            .map(|a| a.buffer.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::{HeadlessEncoderFactory, HeadlessTrack};
    use crate::platform::{EncoderState, MediaTrack, TrackKind, TrackRef, TrackState};
    use crate::utils::error::PlatformError;
    use tokio::time::advance;

    fn recorder() -> (RecordingCoordinator, Arc<HeadlessEncoderFactory>) {
        let factory = Arc::new(HeadlessEncoderFactory::default());
        let platform = Platform::builder().encoder(factory.clone()).build();
        (
            RecordingCoordinator::new(platform, RecorderConfig::default(), 16),
            factory,
        )
    }

    fn stream() -> MediaStream {
        let video: TrackRef = HeadlessTrack::new(TrackKind::Video, "camera");
        let audio: TrackRef = HeadlessTrack::new(TrackKind::Audio, "microphone");
        MediaStream::new("local", vec![video, audio])
    }

    #[tokio::test]
    async fn test_start_without_encoder() {
        let recorder = RecordingCoordinator::new(Platform::default(), RecorderConfig::default(), 16);
        let result = recorder.start(&stream(), &RecordingOptions::default());
        assert!(matches!(result, Err(MediaError::UnsupportedCapability(_))));
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_start_rejects_empty_stream() {
        let (recorder, _) = recorder();
        let empty = MediaStream::new("empty", Vec::new());
        let result = recorder.start(&empty, &RecordingOptions::default());
        assert!(matches!(result, Err(MediaError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_start_uses_config_defaults() {
        let (recorder, factory) = recorder();
        let mime = recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        // vp9 is preferred but unsupported by the headless encoder
        assert_eq!(mime, "video/webm;codecs=vp8,opus");
        let control = factory.last_encoder().unwrap();
        assert_eq!(control.timeslice(), Some(Duration::from_millis(1000)));
        assert_eq!(control.options().audio_bits_per_second, 128_000);
        assert_eq!(control.options().video_bits_per_second, 2_500_000);
        assert_eq!(control.stream_id(), "local");
        assert_eq!(recorder.mime_type().as_deref(), Some(mime.as_str()));
    }

    #[tokio::test]
    async fn test_start_twice() {
        let (recorder, factory) = recorder();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        let result = recorder.start(&stream(), &RecordingOptions::default());
        assert!(matches!(result, Err(MediaError::AlreadyActive(_))));
        assert_eq!(factory.encoder_count(), 1);
    }

    #[tokio::test]
    async fn test_encoder_start_failure_leaves_idle() {
        let (recorder, factory) = recorder();
        factory.fail_next_start(PlatformError::new("SecurityError", "blocked"));

        let result = recorder.start(&stream(), &RecordingOptions::default());
        assert!(matches!(
            result,
            Err(MediaError::PlatformOperationFailed { .. })
        ));
        assert_eq!(recorder.state(), RecordingState::Idle);

        recorder.start(&stream(), &RecordingOptions::default()).unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
    }

    #[tokio::test]
    async fn test_pause_resume_state_checks() {
        let (recorder, factory) = recorder();
        assert!(matches!(recorder.pause(), Err(MediaError::NotActive(_))));
        assert!(matches!(recorder.resume(), Err(MediaError::NotActive(_))));

        recorder.start(&stream(), &RecordingOptions::default()).unwrap();
        assert!(matches!(recorder.resume(), Err(MediaError::NotActive(_))));

        recorder.pause().unwrap();
        assert!(recorder.is_paused());
        assert_eq!(factory.last_encoder().unwrap().state(), EncoderState::Paused);
        assert!(matches!(recorder.pause(), Err(MediaError::AlreadyActive(_))));

        recorder.resume().unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let (recorder, _) = recorder();
        assert!(matches!(
            recorder.stop().await,
            Err(MediaError::NotActive(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_excludes_paused_interval() {
        let (recorder, _) = recorder();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        advance(Duration::from_millis(5000)).await;
        recorder.pause().unwrap();
        advance(Duration::from_millis(3000)).await;
        assert_eq!(recorder.duration_ms(), 5000);
        recorder.resume().unwrap();
        advance(Duration::from_millis(5000)).await;

        let output = recorder.stop().await.unwrap();
        assert_eq!(output.duration_ms, 10_000);
        assert_eq!(recorder.duration_ms(), 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_paused() {
        let (recorder, _) = recorder();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        advance(Duration::from_millis(2000)).await;
        recorder.pause().unwrap();
        advance(Duration::from_millis(4000)).await;

        let output = recorder.stop().await.unwrap();
        assert_eq!(output.duration_ms, 2000);
        assert_eq!(recorder.state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn test_stop_concatenates_chunks() {
        let (recorder, factory) = recorder();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        let control = factory.last_encoder().unwrap();
        control.emit_chunk(b"head");
        control.emit_chunk(b"");
        control.emit_chunk(b"-body");
        control.set_final_chunk(b"-tail");
        assert_eq!(recorder.chunk_count(), 2);

        let output = recorder.stop().await.unwrap();
        assert_eq!(&output.data[..], b"head-body-tail");
        assert_eq!(output.chunk_count, 3);
        assert_eq!(output.size_bytes, 14);
        assert_eq!(output.file_extension(), "webm");
        assert_eq!(control.state(), EncoderState::Inactive);
    }

    #[tokio::test]
    async fn test_late_chunk_is_ignored() {
        let (recorder, factory) = recorder();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();
        let first = factory.last_encoder().unwrap();
        first.emit_chunk(b"one");
        recorder.stop().await.unwrap();

        recorder.start(&stream(), &RecordingOptions::default()).unwrap();
        first.emit_raw(EncoderEvent::DataAvailable(bytes::Bytes::from_static(b"late")));
        factory.last_encoder().unwrap().emit_chunk(b"two");

        let output = recorder.stop().await.unwrap();
        assert_eq!(&output.data[..], b"two");
    }

    #[tokio::test]
    async fn test_stop_keeps_input_stream_live() {
        let (recorder, _) = recorder();
        let input = stream();
        recorder.start(&input, &RecordingOptions::default()).unwrap();
        recorder.stop().await.unwrap();

        for track in input.tracks() {
            assert_eq!(track.ready_state(), TrackState::Live);
        }
    }

    #[tokio::test]
    async fn test_encoder_error_is_published() {
        let (recorder, factory) = recorder();
        let mut rx = recorder.events().receiver();
        recorder.start(&stream(), &RecordingOptions::default()).unwrap();

        factory
            .last_encoder()
            .unwrap()
            .emit_error(PlatformError::new("EncodingError", "disk full"));

        assert!(matches!(rx.recv().await.unwrap(), RecordingEvent::Started { .. }));
        assert_eq!(
            rx.recv().await.unwrap(),
            RecordingEvent::Error {
                code: "EncodingError".to_string(),
                message: "disk full".to_string(),
            }
        );
        assert_eq!(recorder.state(), RecordingState::Recording);
    }
}
