//! Screen sharing
//!
//! Substitutes a screen capture for the camera on every peer connection.

pub mod coordinator;
pub mod state;

pub use coordinator::ScreenShareCoordinator;
pub use state::{ScreenShareEvent, ScreenShareOptions, ScreenShareState, ScreenShareStatus, StopReason};
