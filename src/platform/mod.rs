//! Platform primitives
//!
//! This module defines the injected adapters for capture, negotiation and
//! encoding, plus a headless implementation for tests and non-interactive hosts.

pub mod headless;
pub mod traits;
pub mod types;

use crate::utils::error::{MediaError, MediaResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use traits::{
    same_track, CaptureDevices, ConnectionEvent, ConnectionEventSink, DataChannel,
    EncoderEvent, EncoderEventSink, EndedCallback, ListenerId, MediaEncoder,
    MediaEncoderFactory, MediaStream, MediaTrack, PeerConnection, PeerConnectionFactory,
    RtpReceiver, RtpSender, TrackRef,
};
pub use types::*;
pub use crate::utils::error::PlatformError;

/// A platform primitive the coordinators may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    UserMedia,
    DisplayMedia,
    PeerConnection,
    MediaEncoder,
}

/// Answers whether a primitive is available on this host
pub trait CapabilityProvider {
    fn is_supported(&self, capability: Capability) -> bool;
}

/// Bundle of the adapters available on this host
///
/// Missing adapters surface as `UnsupportedCapability` when a coordinator
/// first needs them.
#[derive(Clone, Default)]
pub struct Platform {
    capture: Option<Arc<dyn CaptureDevices>>,
    connections: Option<Arc<dyn PeerConnectionFactory>>,
    encoder: Option<Arc<dyn MediaEncoderFactory>>,
}

impl Platform {
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::default()
    }

    pub fn capture(&self) -> MediaResult<Arc<dyn CaptureDevices>> {
        self.capture.clone().ok_or_else(|| {
            MediaError::UnsupportedCapability("media capture is not available".to_string())
        })
    }

    pub fn connections(&self) -> MediaResult<Arc<dyn PeerConnectionFactory>> {
        self.connections.clone().ok_or_else(|| {
            MediaError::UnsupportedCapability("peer connections are not available".to_string())
        })
    }

    pub fn encoder(&self) -> MediaResult<Arc<dyn MediaEncoderFactory>> {
        self.encoder.clone().ok_or_else(|| {
            MediaError::UnsupportedCapability("media encoding is not available".to_string())
        })
    }
}

impl CapabilityProvider for Platform {
    fn is_supported(&self, capability: Capability) -> bool {
        match capability {
            Capability::UserMedia => self.capture.is_some(),
            Capability::DisplayMedia => self
                .capture
                .as_ref()
                .map(|c| c.supports_display_capture())
                .unwrap_or(false),
            Capability::PeerConnection => self.connections.is_some(),
            Capability::MediaEncoder => self.encoder.is_some(),
        }
    }
}

/// Builder for [`Platform`]
#[derive(Default)]
pub struct PlatformBuilder {
    capture: Option<Arc<dyn CaptureDevices>>,
    connections: Option<Arc<dyn PeerConnectionFactory>>,
    encoder: Option<Arc<dyn MediaEncoderFactory>>,
}

impl PlatformBuilder {
    pub fn capture(mut self, capture: Arc<dyn CaptureDevices>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn connections(mut self, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        self.connections = Some(factory);
        self
    }

    pub fn encoder(mut self, factory: Arc<dyn MediaEncoderFactory>) -> Self {
        self.encoder = Some(factory);
        self
    }

    pub fn build(self) -> Platform {
        let platform = Platform {
            capture: self.capture,
            connections: self.connections,
            encoder: self.encoder,
        };

        tracing::debug!(
            "Platform capabilities: userMedia={}, displayMedia={}, peerConnection={}, mediaEncoder={}",
            platform.is_supported(Capability::UserMedia),
            platform.is_supported(Capability::DisplayMedia),
            platform.is_supported(Capability::PeerConnection),
            platform.is_supported(Capability::MediaEncoder),
        );

        platform
    }
}
