//! Shared utilities: error taxonomy and the typed event dispatcher.

pub mod error;
pub mod events;

pub use error::{ErrorResponse, MediaError, MediaResult, PlatformError};
pub use events::{EventDispatcher, SubscriptionId};
