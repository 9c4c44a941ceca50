//! Multi-peer connection lifecycle
//!
//! One negotiated connection per remote participant, plus data channels and
//! statistics.

pub mod registry;
pub mod state;
pub mod stats;

pub use registry::ConnectionRegistry;
pub use state::{ConnectionStats, DataPayload, PeerEvent, PeerInfo, PeerSession};
