//! Peer session state
//!
//! Per-peer bookkeeping owned by the connection registry, the payloads it
//! sends and the events it republishes.

use crate::platform::{
    DataChannel, DataChannelState, DataMessage, IceCandidate, IceConnectionState, MediaStream,
    PeerConnection, PeerConnectionState, TrackRef,
};
use crate::utils::error::MediaResult;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One registered remote participant
pub struct PeerSession {
    pub(crate) peer_id: String,

    /// Distinguishes this entry from an earlier one with the same peer id
    pub(crate) session_id: Uuid,

    pub(crate) connection: Arc<dyn PeerConnection>,

    /// Most recent remote stream
    pub(crate) remote_stream: Option<MediaStream>,

    pub(crate) data_channel: Option<Arc<dyn DataChannel>>,

    pub(crate) connection_state: PeerConnectionState,

    pub(crate) ice_state: IceConnectionState,

    pub(crate) created_at: DateTime<Utc>,
}

impl PeerSession {
    pub(crate) fn new(
        peer_id: &str,
        session_id: Uuid,
        connection: Arc<dyn PeerConnection>,
        data_channel: Option<Arc<dyn DataChannel>>,
    ) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            session_id,
            connection_state: connection.connection_state(),
            ice_state: connection.ice_connection_state(),
            connection,
            remote_stream: None,
            data_channel,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer_id.clone(),
            session_id: self.session_id,
            connection_state: self.connection_state,
            ice_state: self.ice_state,
            remote_stream_id: self.remote_stream.as_ref().map(|s| s.id().to_string()),
            data_channel_state: self.data_channel.as_ref().map(|c| c.ready_state()),
            created_at: self.created_at,
        }
    }
}

/// Serializable snapshot of a peer session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: String,
    pub session_id: Uuid,
    pub connection_state: PeerConnectionState,
    pub ice_state: IceConnectionState,
    pub remote_stream_id: Option<String>,
    pub data_channel_state: Option<DataChannelState>,
    pub created_at: DateTime<Utc>,
}

/// Flattened connection statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_lost: i64,
    pub jitter: f64,
    /// Seconds, from the most recent succeeded candidate pair
    pub round_trip_time: f64,
    /// Bits per second, from the most recent succeeded candidate pair
    pub available_bandwidth: f64,
}

/// Payload for [`send`](super::ConnectionRegistry::send)
#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    /// Sent as-is
    Text(String),
    /// Sent as its JSON encoding
    Json(serde_json::Value),
    Binary(Bytes),
}

impl DataPayload {
    /// Serialize any value into a JSON payload
    pub fn json<T: Serialize>(value: &T) -> MediaResult<Self> {
        Ok(DataPayload::Json(serde_json::to_value(value)?))
    }
}

impl From<&str> for DataPayload {
    fn from(text: &str) -> Self {
        DataPayload::Text(text.to_string())
    }
}

impl From<String> for DataPayload {
    fn from(text: String) -> Self {
        DataPayload::Text(text)
    }
}

impl From<serde_json::Value> for DataPayload {
    fn from(value: serde_json::Value) -> Self {
        DataPayload::Json(value)
    }
}

impl From<Bytes> for DataPayload {
    fn from(data: Bytes) -> Self {
        DataPayload::Binary(data)
    }
}

/// Events republished by the connection registry
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Local candidate to forward over signaling; `None` ends gathering
    IceCandidate {
        peer_id: String,
        candidate: Option<IceCandidate>,
    },
    ConnectionStateChanged {
        peer_id: String,
        state: PeerConnectionState,
    },
    IceStateChanged {
        peer_id: String,
        state: IceConnectionState,
    },
    RemoteStream {
        peer_id: String,
        stream: MediaStream,
        track: TrackRef,
    },
    DataChannelOpened {
        peer_id: String,
        label: String,
    },
    DataChannelClosed {
        peer_id: String,
        label: String,
    },
    DataMessage {
        peer_id: String,
        label: String,
        message: DataMessage,
    },
    Closed {
        peer_id: String,
    },
}

impl PeerEvent {
    pub fn peer_id(&self) -> &str {
        match self {
            PeerEvent::IceCandidate { peer_id, .. }
            | PeerEvent::ConnectionStateChanged { peer_id, .. }
            | PeerEvent::IceStateChanged { peer_id, .. }
            | PeerEvent::RemoteStream { peer_id, .. }
            | PeerEvent::DataChannelOpened { peer_id, .. }
            | PeerEvent::DataChannelClosed { peer_id, .. }
            | PeerEvent::DataMessage { peer_id, .. }
            | PeerEvent::Closed { peer_id } => peer_id,
        }
    }
}
