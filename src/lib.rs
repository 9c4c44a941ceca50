//! Media Session - real-time capture, peer connections, screen sharing and
//! recording.
//!
//! This is the main library crate. It provides the session coordinators and
//! the platform adapter traits they run on.

pub mod capture;
pub mod config;
pub mod connection;
pub mod platform;
pub mod recorder;
pub mod screen_share;
pub mod session;
pub mod utils;

pub use capture::CaptureCoordinator;
pub use config::SessionConfig;
pub use connection::ConnectionRegistry;
pub use platform::{Capability, CapabilityProvider, Platform};
pub use recorder::RecordingCoordinator;
pub use screen_share::ScreenShareCoordinator;
pub use session::MediaSession;
pub use utils::error::{MediaError, MediaResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging.
///
/// Honors `RUST_LOG`, defaulting to debug output for this crate. Safe to call
/// more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_session=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    match result {
        Ok(()) => tracing::info!("Starting media session v{}", env!("CARGO_PKG_VERSION")),
        Err(e) => tracing::debug!("Tracing already initialized: {}", e),
    }
}
