//! Recording system module
//!
//! Encodes a media stream into a single timed blob:
//! - RecordingCoordinator drives the encoder lifecycle
//! - Timeline keeps pause-aware duration
//! - Format selection against the encoder's supported types

pub mod coordinator;
pub mod format;
pub mod state;

pub use coordinator::RecordingCoordinator;
pub use state::{RecordingEvent, RecordingOptions, RecordingOutput, RecordingState, Timeline};
