//! Media session
//!
//! Wires the four coordinators to one platform and one configuration, sharing
//! a single capture coordinator and connection registry.

use crate::capture::CaptureCoordinator;
use crate::config::SessionConfig;
use crate::connection::ConnectionRegistry;
use crate::platform::{Capability, CapabilityProvider, Platform};
use crate::recorder::{RecordingCoordinator, RecordingOutput};
use crate::screen_share::ScreenShareCoordinator;
use crate::utils::error::MediaResult;

/// Entry point for an application layer
#[derive(Clone)]
pub struct MediaSession {
    platform: Platform,
    config: SessionConfig,
    capture: CaptureCoordinator,
    connections: ConnectionRegistry,
    screen_share: ScreenShareCoordinator,
    recorder: RecordingCoordinator,
}

impl MediaSession {
    /// Build a session. Fails if the configuration is invalid.
    pub fn new(platform: Platform, config: SessionConfig) -> MediaResult<Self> {
        config.validate()?;

        let capacity = config.event_capacity;
        let capture = CaptureCoordinator::new(platform.clone(), capacity);
        let connections = ConnectionRegistry::new(platform.clone(), &config);
        let screen_share = ScreenShareCoordinator::new(capture.clone(), connections.clone(), capacity);
        let recorder = RecordingCoordinator::new(platform.clone(), config.recorder.clone(), capacity);

        tracing::info!(
            "Media session created (iceServers={}, recording={})",
            config.ice_servers.len(),
            platform.is_supported(Capability::MediaEncoder)
        );

        Ok(Self {
            platform,
            config,
            capture,
            connections,
            screen_share,
            recorder,
        })
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn capture(&self) -> &CaptureCoordinator {
        &self.capture
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn screen_share(&self) -> &ScreenShareCoordinator {
        &self.screen_share
    }

    pub fn recorder(&self) -> &RecordingCoordinator {
        &self.recorder
    }

    /// Shut everything down.
    ///
    /// Returns the output of a recording that was still running. A recorder
    /// that fails to stop is logged and does not block the rest.
    pub async fn teardown(&self) -> Option<RecordingOutput> {
        tracing::info!("Tearing down media session");

        self.screen_share.stop().await;

        let output = if self.recorder.is_recording() {
            match self.recorder.stop().await {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::warn!("Failed to stop recording during teardown: {}", e);
                    None
                }
            }
        } else {
            None
        };

        self.connections.close_all();
        self.capture.release_all();

        tracing::info!("Media session torn down");
        output
    }
}
