//! Local capture management
//!
//! Camera/microphone and screen capture behind the injected platform adapters.

pub mod coordinator;
pub mod state;

pub use coordinator::CaptureCoordinator;
pub use state::{CaptureEvent, CaptureStatus, LocalSession};
