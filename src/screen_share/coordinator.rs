//! Screen-share coordinator
//!
//! Swaps the outgoing video of every registered peer to a screen capture and
//! back. Starting is all-or-nothing; stopping always reaches the idle state.

use super::state::{
    ActiveShare, ScreenShareEvent, ScreenShareOptions, ScreenShareState, ScreenShareStatus,
    SharePhase, StopReason,
};
use crate::capture::{CaptureCoordinator, CaptureEvent};
use crate::connection::ConnectionRegistry;
use crate::platform::{MediaStream, MediaTrack, TrackRef};
use crate::utils::error::{MediaError, MediaResult};
use crate::utils::events::EventDispatcher;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Coordinates screen sharing across all peers. Cloning yields another handle
/// to the same share.
#[derive(Clone)]
pub struct ScreenShareCoordinator {
    capture: CaptureCoordinator,
    registry: ConnectionRegistry,
    state: Arc<Mutex<ScreenShareState>>,
    events: EventDispatcher<ScreenShareEvent>,
}

impl ScreenShareCoordinator {
    pub fn new(
        capture: CaptureCoordinator,
        registry: ConnectionRegistry,
        event_capacity: usize,
    ) -> Self {
        Self {
            capture,
            registry,
            state: Arc::new(Mutex::new(ScreenShareState::default())),
            events: EventDispatcher::new(event_capacity),
        }
    }

    pub fn events(&self) -> &EventDispatcher<ScreenShareEvent> {
        &self.events
    }

    /// Start sharing the screen with every registered peer.
    ///
    /// On any failure the screen capture is released and the coordinator is
    /// left idle. Peers already switched before a failing peer keep the screen
    /// track; the error tells the caller which operation failed.
    pub async fn start(&self, options: &ScreenShareOptions) -> MediaResult<MediaStream> {
        {
            let mut state = self.state.lock();
            match state.phase {
                SharePhase::Idle => state.phase = SharePhase::Starting,
                SharePhase::Sharing => {
                    return Err(MediaError::AlreadyActive(
                        "screen share is already active".to_string(),
                    ))
                }
                SharePhase::Starting | SharePhase::Stopping => {
                    return Err(MediaError::AlreadyActive(
                        "screen share is changing state".to_string(),
                    ))
                }
            }
        }

        match self.try_start(options).await {
            Ok(stream) => Ok(stream),
            Err(e) => {
                self.state.lock().phase = SharePhase::Idle;
                Err(e)
            }
        }
    }

    async fn try_start(&self, options: &ScreenShareOptions) -> MediaResult<MediaStream> {
        let original = self.capture.local_video_track();
        match &original {
            Some(track) => tracing::debug!("Saving local video track {} for restore", track.id()),
            None => tracing::debug!("No local video track to restore after screen share"),
        }

        // Subscribed before acquiring so an early end cannot be missed
        let capture_events = self.capture.events().receiver();

        let stream = self
            .capture
            .acquire_screen_capture(&options.constraints)
            .await?;

        let Some(screen_track) = stream.first_video_track() else {
            self.capture.release_screen_capture();
            return Err(MediaError::InvalidInput(
                "screen capture returned no video track".to_string(),
            ));
        };

        if let Err(e) = self
            .registry
            .replace_video_track_for_all(screen_track.clone())
            .await
        {
            tracing::warn!("Screen share aborted, track replacement failed: {}", e);
            self.capture.release_screen_capture();
            return Err(e);
        }

        {
            let mut state = self.state.lock();
            state.phase = SharePhase::Sharing;
            state.screen_stream = Some(stream.clone());
            state.original_track = original;
            state.watcher = Some(self.spawn_end_watcher(stream.id().to_string(), capture_events));
        }

        let peer_count = self.registry.peer_count();
        tracing::info!(
            "Screen share started: stream={}, peers={}",
            stream.id(),
            peer_count
        );
        self.events.emit(ScreenShareEvent::Started {
            stream_id: stream.id().to_string(),
            peer_count,
        });
        Ok(stream)
    }

    /// Stop sharing and put the original track back on every peer.
    ///
    /// No-op when not sharing. Restore failures are logged per peer and never
    /// keep the coordinator in the sharing state.
    pub async fn stop(&self) {
        let Some(mut share) = self.begin_stop() else {
            tracing::debug!("Screen share stop requested while not sharing");
            return;
        };
        if let Some(watcher) = share.watcher.take() {
            watcher.abort();
        }
        self.finish_stop(share, StopReason::Requested).await;
    }

    /// Start when idle, stop when sharing. Returns whether sharing afterwards.
    pub async fn toggle(&self, options: &ScreenShareOptions) -> MediaResult<bool> {
        if self.is_sharing() {
            self.stop().await;
            Ok(false)
        } else {
            self.start(options).await?;
            Ok(true)
        }
    }

    pub fn is_sharing(&self) -> bool {
        self.state.lock().phase == SharePhase::Sharing
    }

    pub fn screen_stream(&self) -> Option<MediaStream> {
        self.state.lock().screen_stream.clone()
    }

    /// Track that will be restored on stop
    pub fn original_track(&self) -> Option<TrackRef> {
        self.state.lock().original_track.clone()
    }

    pub fn status(&self) -> ScreenShareStatus {
        ScreenShareStatus::from(&*self.state.lock())
    }

    fn begin_stop(&self) -> Option<ActiveShare> {
        let mut state = self.state.lock();
        if state.phase != SharePhase::Sharing {
            return None;
        }
        state.phase = SharePhase::Stopping;
        Some(ActiveShare {
            screen_stream: state.screen_stream.take(),
            original_track: state.original_track.take(),
            watcher: state.watcher.take(),
        })
    }

    async fn finish_stop(&self, share: ActiveShare, reason: StopReason) {
        let stream_id = share.screen_stream.as_ref().map(|s| s.id().to_string());
        tracing::info!("Stopping screen share ({:?})", reason);

        let mut restored_peers = 0;
        let mut failed_peers = Vec::new();

        match share.original_track {
            Some(original) => {
                let peer_ids = self.registry.peer_ids();
                let restores = peer_ids.iter().map(|peer_id| {
                    let track = original.clone();
                    async move {
                        let result = self.registry.replace_video_track(peer_id, Some(track)).await;
                        (peer_id, result)
                    }
                });

                for (peer_id, result) in futures::future::join_all(restores).await {
                    match result {
                        Ok(true) => restored_peers += 1,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::warn!("Failed to restore video for peer {}: {}", peer_id, e);
                            failed_peers.push(peer_id.clone());
                        }
                    }
                }
            }
            None => tracing::debug!("No original track saved, skipping restore"),
        }

        // Only release the capture this share owns
        let owns_capture = match (&stream_id, self.capture.screen_stream()) {
            (Some(ours), Some(current)) => current.id() == ours,
            _ => false,
        };
        if owns_capture {
            self.capture.release_screen_capture();
        }

        self.state.lock().phase = SharePhase::Idle;

        tracing::info!(
            "Screen share stopped: restored={}, failed={}",
            restored_peers,
            failed_peers.len()
        );
        self.events.emit(ScreenShareEvent::Stopped {
            stream_id,
            reason,
            restored_peers,
            failed_peers,
        });
    }

    /// Wait for `stream_id` to go away, then stop the share.
    ///
    /// The stream goes away when the platform ends it, when the capture is
    /// released directly, or when a new screen capture replaces it.
    fn spawn_end_watcher(
        &self,
        stream_id: String,
        mut capture_events: broadcast::Receiver<CaptureEvent>,
    ) -> JoinHandle<()> {
        let state: Weak<Mutex<ScreenShareState>> = Arc::downgrade(&self.state);
        let capture = self.capture.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let reason = loop {
                match capture_events.recv().await {
                    Ok(CaptureEvent::ScreenCaptureEnded { stream_id: ended }) if ended == stream_id => {
                        break StopReason::CaptureEnded
                    }
                    Ok(CaptureEvent::ScreenCaptureStopped { stream_id: stopped })
                        if stopped == stream_id =>
                    {
                        break StopReason::CaptureReleased
                    }
                    Ok(CaptureEvent::ScreenCaptureStarted { stream_id: started })
                        if started != stream_id =>
                    {
                        break StopReason::CaptureReleased
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Screen share watcher lagged by {} event(s)", skipped);
                        let still_live = capture
                            .screen_stream()
                            .map(|s| s.id() == stream_id)
                            .unwrap_or(false);
                        if !still_live {
                            break StopReason::CaptureReleased;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            };

            let Some(state) = state.upgrade() else {
                return;
            };
            let coordinator = ScreenShareCoordinator {
                capture,
                registry,
                state,
                events,
            };

            tracing::info!("Screen capture {} went away ({:?})", stream_id, reason);
            if let Some(mut share) = coordinator.begin_stop() {
                // Our own handle; dropping it detaches the task
                share.watcher = None;
                coordinator.finish_stop(share, reason).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::platform::headless::{HeadlessCapture, HeadlessPeerConnectionFactory};
    use crate::platform::{same_track, MediaConstraints, Platform, TrackState};
    use crate::utils::error::PlatformError;
    use std::time::Duration;

    struct Fixture {
        share: ScreenShareCoordinator,
        capture: CaptureCoordinator,
        registry: ConnectionRegistry,
        devices: Arc<HeadlessCapture>,
        factory: Arc<HeadlessPeerConnectionFactory>,
    }

    fn fixture() -> Fixture {
        let devices = Arc::new(HeadlessCapture::new());
        let factory = Arc::new(HeadlessPeerConnectionFactory::new());
        let platform = Platform::builder()
            .capture(devices.clone())
            .connections(factory.clone())
            .build();
        let capture = CaptureCoordinator::new(platform.clone(), 16);
        let registry = ConnectionRegistry::new(platform, &SessionConfig::default());
        Fixture {
            share: ScreenShareCoordinator::new(capture.clone(), registry.clone(), 16),
            capture,
            registry,
            devices,
            factory,
        }
    }

    /// Local camera stream attached to `peers`
    async fn with_peers(f: &Fixture, peers: &[&str]) -> TrackRef {
        let local = f
            .capture
            .acquire_local_capture(&MediaConstraints::default())
            .await
            .unwrap();
        for peer in peers {
            f.registry
                .create_connection(peer, Some(&local), false)
                .await
                .unwrap();
        }
        local.first_video_track().unwrap()
    }

    async fn next_stopped(
        rx: &mut broadcast::Receiver<ScreenShareEvent>,
    ) -> (StopReason, Vec<String>) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timed out waiting for screen share event")
                .unwrap();
            if let ScreenShareEvent::Stopped {
                reason,
                failed_peers,
                ..
            } = event
            {
                return (reason, failed_peers);
            }
        }
    }

    #[tokio::test]
    async fn test_start_switches_every_peer() {
        let f = fixture();
        with_peers(&f, &["a", "b", "c"]).await;

        let stream = f.share.start(&ScreenShareOptions::default()).await.unwrap();
        let screen = stream.first_video_track().unwrap();

        assert!(f.share.is_sharing());
        for connection in f.factory.connections() {
            assert!(same_track(&connection.video_sender_track().unwrap(), &screen));
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let f = fixture();
        f.share.start(&ScreenShareOptions::default()).await.unwrap();

        let result = f.share.start(&ScreenShareOptions::default()).await;
        assert!(matches!(result, Err(MediaError::AlreadyActive(_))));
        assert!(f.share.is_sharing());
    }

    #[tokio::test]
    async fn test_failing_peer_aborts_start() {
        let f = fixture();
        with_peers(&f, &["a", "b"]).await;
        f.factory.connections()[1]
            .set_replace_error(Some(PlatformError::new("InvalidModificationError", "busy")));

        let result = f.share.start(&ScreenShareOptions::default()).await;
        assert!(matches!(
            result,
            Err(MediaError::PlatformOperationFailed { .. })
        ));

        assert!(!f.share.is_sharing());
        assert!(f.share.screen_stream().is_none());
        assert!(!f.capture.is_screen_capturing());
        let screen = f
            .devices
            .issued_tracks()
            .into_iter()
            .find(|t| t.label() == "headless screen")
            .unwrap();
        assert_eq!(screen.ready_state(), TrackState::Ended);
    }

    #[tokio::test]
    async fn test_missing_video_track_is_invalid() {
        let f = fixture();
        f.devices.set_display_has_video(false);

        let result = f
            .share
            .start(&ScreenShareOptions::default().with_audio())
            .await;
        assert!(matches!(result, Err(MediaError::InvalidInput(_))));
        assert!(!f.share.is_sharing());
        assert!(!f.capture.is_screen_capturing());
    }

    #[tokio::test]
    async fn test_capture_denied_leaves_idle() {
        let f = fixture();
        f.devices
            .fail_next_display_media(PlatformError::new("NotAllowedError", "denied"));

        assert!(f.share.start(&ScreenShareOptions::default()).await.is_err());
        assert!(!f.share.is_sharing());

        // A later attempt is not blocked by the failed one
        f.share.start(&ScreenShareOptions::default()).await.unwrap();
        assert!(f.share.is_sharing());
    }

    #[tokio::test]
    async fn test_stop_restores_original_track() {
        let f = fixture();
        let camera = with_peers(&f, &["a", "b"]).await;

        f.share.start(&ScreenShareOptions::default()).await.unwrap();
        assert!(same_track(&f.share.original_track().unwrap(), &camera));

        f.share.stop().await;

        assert!(!f.share.is_sharing());
        assert!(!f.capture.is_screen_capturing());
        for connection in f.factory.connections() {
            assert!(same_track(&connection.video_sender_track().unwrap(), &camera));
        }
        // The camera belongs to the capture coordinator and stays live
        assert_eq!(camera.ready_state(), TrackState::Live);
    }

    #[tokio::test]
    async fn test_share_without_local_stream() {
        let f = fixture();
        f.share.start(&ScreenShareOptions::default()).await.unwrap();
        assert!(f.share.original_track().is_none());

        f.share.stop().await;
        assert!(!f.share.is_sharing());
        assert_eq!(f.share.status().screen_stream_id, None);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let f = fixture();
        let mut rx = f.share.events().receiver();
        f.share.stop().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restore_failure_still_stops() {
        let f = fixture();
        with_peers(&f, &["a", "b"]).await;
        f.share.start(&ScreenShareOptions::default()).await.unwrap();
        f.factory.connections()[0]
            .set_replace_error(Some(PlatformError::new("InvalidStateError", "closed")));

        let mut rx = f.share.events().receiver();
        f.share.stop().await;

        assert!(!f.share.is_sharing());
        assert!(!f.capture.is_screen_capturing());
        let (reason, failed) = next_stopped(&mut rx).await;
        assert_eq!(reason, StopReason::Requested);
        assert_eq!(failed, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_external_end_stops_share() {
        let f = fixture();
        let camera = with_peers(&f, &["a"]).await;
        let stream = f.share.start(&ScreenShareOptions::default()).await.unwrap();
        let mut rx = f.share.events().receiver();

        let screen = stream.first_video_track().unwrap();
        assert!(f.devices.end_track(screen.id()));

        let (reason, failed) = next_stopped(&mut rx).await;
        assert_eq!(reason, StopReason::CaptureEnded);
        assert!(failed.is_empty());
        assert!(!f.share.is_sharing());
        assert!(same_track(
            &f.factory.connections()[0].video_sender_track().unwrap(),
            &camera
        ));
    }

    #[tokio::test]
    async fn test_direct_capture_release_stops_share() {
        let f = fixture();
        let camera = with_peers(&f, &["a"]).await;
        let stream = f.share.start(&ScreenShareOptions::default()).await.unwrap();
        let screen = stream.first_video_track().unwrap();
        let mut rx = f.share.events().receiver();

        f.capture.release_screen_capture();

        let (reason, failed) = next_stopped(&mut rx).await;
        assert_eq!(reason, StopReason::CaptureReleased);
        assert!(failed.is_empty());
        assert!(!f.share.is_sharing());
        assert!(f.share.screen_stream().is_none());
        assert_eq!(screen.ready_state(), TrackState::Ended);
        assert!(same_track(
            &f.factory.connections()[0].video_sender_track().unwrap(),
            &camera
        ));
    }

    #[tokio::test]
    async fn test_replaced_screen_capture_stops_share() {
        let f = fixture();
        let camera = with_peers(&f, &["a"]).await;
        f.share.start(&ScreenShareOptions::default()).await.unwrap();
        let mut rx = f.share.events().receiver();

        let replacement = f
            .capture
            .acquire_screen_capture(&MediaConstraints::display())
            .await
            .unwrap();

        let (reason, _) = next_stopped(&mut rx).await;
        assert_eq!(reason, StopReason::CaptureReleased);
        assert!(!f.share.is_sharing());
        // The new capture belongs to whoever acquired it
        assert_eq!(f.capture.screen_stream().unwrap().id(), replacement.id());
        assert_eq!(
            replacement.first_video_track().unwrap().ready_state(),
            TrackState::Live
        );
        assert!(same_track(
            &f.factory.connections()[0].video_sender_track().unwrap(),
            &camera
        ));
    }

    #[tokio::test]
    async fn test_toggle() {
        let f = fixture();
        with_peers(&f, &["a"]).await;

        assert!(f.share.toggle(&ScreenShareOptions::default()).await.unwrap());
        assert!(f.share.is_sharing());
        assert!(!f.share.toggle(&ScreenShareOptions::default()).await.unwrap());
        assert!(!f.share.is_sharing());
    }

    #[tokio::test]
    async fn test_peer_added_during_share_is_not_switched_back() {
        let f = fixture();
        let camera = with_peers(&f, &["a"]).await;
        f.share.start(&ScreenShareOptions::default()).await.unwrap();

        // Joins while sharing with the camera attached
        let local = f.capture.local_stream().unwrap();
        f.registry
            .create_connection("late", Some(&local), false)
            .await
            .unwrap();

        f.share.stop().await;
        for connection in f.factory.connections() {
            assert!(same_track(&connection.video_sender_track().unwrap(), &camera));
        }
    }
}
