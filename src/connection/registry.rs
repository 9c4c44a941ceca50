//! Connection registry
//!
//! Owns one peer connection per remote participant and republishes the
//! notifications of each connection as [`PeerEvent`]s.

use super::state::{ConnectionStats, DataPayload, PeerEvent, PeerInfo, PeerSession};
use super::stats::summarize;
use crate::config::{DataChannelConfig, SessionConfig};
use crate::platform::{
    ConnectionEvent, ConnectionEventSink, DataChannel, DataChannelState, IceCandidate,
    IceConnectionState, MediaStream, MediaTrack, PeerConnection, PeerConnectionState, Platform,
    PlatformError, RtcConfiguration, SessionDescription, TrackKind, TrackRef,
};
use crate::utils::error::{MediaError, MediaResult};
use crate::utils::events::EventDispatcher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

type PeerMap = RwLock<HashMap<String, PeerSession>>;

fn not_found(peer_id: &str) -> MediaError {
    MediaError::NotFound(format!("unknown peer: {}", peer_id))
}

/// Registry of peer connections keyed by peer id. Cloning yields another
/// handle to the same registry.
#[derive(Clone)]
pub struct ConnectionRegistry {
    platform: Platform,
    rtc_config: RtcConfiguration,
    channel_config: DataChannelConfig,
    peers: Arc<PeerMap>,
    events: EventDispatcher<PeerEvent>,
}

impl ConnectionRegistry {
    pub fn new(platform: Platform, config: &SessionConfig) -> Self {
        Self {
            platform,
            rtc_config: config.rtc_configuration(),
            channel_config: config.data_channel.clone(),
            peers: Arc::new(RwLock::new(HashMap::new())),
            events: EventDispatcher::new(config.event_capacity),
        }
    }

    pub fn events(&self) -> &EventDispatcher<PeerEvent> {
        &self.events
    }

    /// Create and register a connection for `peer_id`.
    ///
    /// Local tracks of `local_stream` are attached and, when requested, a
    /// data channel is opened. An existing entry is never replaced.
    pub async fn create_connection(
        &self,
        peer_id: &str,
        local_stream: Option<&MediaStream>,
        want_data_channel: bool,
    ) -> MediaResult<PeerInfo> {
        if self.has_peer(peer_id) {
            return Err(MediaError::AlreadyActive(format!(
                "peer {} already has a connection",
                peer_id
            )));
        }
        let factory = self.platform.connections()?;

        let session_id = Uuid::new_v4();
        let connection = factory
            .create(&self.rtc_config, self.event_sink(peer_id, session_id))
            .await
            .map_err(|e| MediaError::from(e).with_context("createPeerConnection", Some(peer_id)))?;

        let prepared = self.prepare(connection.as_ref(), peer_id, local_stream, want_data_channel);
        let data_channel = match prepared {
            Ok(channel) => channel,
            Err(e) => {
                connection.close();
                return Err(e);
            }
        };

        let info = {
            let mut peers = self.peers.write();
            if peers.contains_key(peer_id) {
                None
            } else {
                let session = PeerSession::new(peer_id, session_id, connection.clone(), data_channel);
                let info = session.info();
                peers.insert(peer_id.to_string(), session);
                Some(info)
            }
        };

        // A concurrent create for the same peer won the race
        let Some(info) = info else {
            connection.close();
            return Err(MediaError::AlreadyActive(format!(
                "peer {} already has a connection",
                peer_id
            )));
        };

        tracing::info!(
            "Created connection for peer {} (tracks={}, dataChannel={})",
            peer_id,
            local_stream.map(|s| s.tracks().len()).unwrap_or(0),
            want_data_channel
        );
        Ok(info)
    }

    /// Attach local tracks and open the data channel on a fresh connection
    fn prepare(
        &self,
        connection: &dyn PeerConnection,
        peer_id: &str,
        local_stream: Option<&MediaStream>,
        want_data_channel: bool,
    ) -> MediaResult<Option<Arc<dyn DataChannel>>> {
        if let Some(stream) = local_stream {
            for track in stream.tracks() {
                connection
                    .add_track(track.clone(), stream)
                    .map_err(|e| MediaError::from(e).with_context("addTrack", Some(peer_id)))?;
            }
        }

        if !want_data_channel {
            return Ok(None);
        }
        let channel = connection
            .create_data_channel(&self.channel_config.label, self.channel_config.ordered)
            .map_err(|e| MediaError::from(e).with_context("createDataChannel", Some(peer_id)))?;
        Ok(Some(channel))
    }

    /// Sink wired into the platform connection for `peer_id`
    fn event_sink(&self, peer_id: &str, session_id: Uuid) -> ConnectionEventSink {
        let peers = Arc::downgrade(&self.peers);
        let events = self.events.clone();
        let peer_id = peer_id.to_string();

        Arc::new(move |event| {
            if let Some(peers) = peers.upgrade() {
                handle_connection_event(&peers, &events, &peer_id, session_id, event);
            }
        })
    }

    fn lookup(&self, peer_id: &str) -> MediaResult<(Arc<dyn PeerConnection>, Uuid)> {
        self.peers
            .read()
            .get(peer_id)
            .map(|s| (s.connection.clone(), s.session_id))
            .ok_or_else(|| not_found(peer_id))
    }

    fn is_current(&self, peer_id: &str, session_id: Uuid) -> bool {
        self.peers
            .read()
            .get(peer_id)
            .map(|s| s.session_id == session_id)
            .unwrap_or(false)
    }

    /// Resolve a finished platform operation for `peer_id`.
    ///
    /// If the peer was closed (or re-created) while the operation was pending
    /// the outcome is discarded, success or failure, and `NotFound` returned.
    fn settle<T>(
        &self,
        peer_id: &str,
        session_id: Uuid,
        operation: &str,
        result: Result<T, PlatformError>,
    ) -> MediaResult<T> {
        if !self.is_current(peer_id, session_id) {
            tracing::warn!(
                "Peer {} was closed while {} was pending, discarding result",
                peer_id,
                operation
            );
            return Err(not_found(peer_id));
        }
        result.map_err(|e| MediaError::from(e).with_context(operation, Some(peer_id)))
    }

    /// Create an offer and set it as the local description
    pub async fn create_offer(&self, peer_id: &str) -> MediaResult<SessionDescription> {
        let (connection, session_id) = self.lookup(peer_id)?;

        let result = connection.create_offer().await;
        let offer = self.settle(peer_id, session_id, "createOffer", result)?;

        let result = connection.set_local_description(offer.clone()).await;
        self.settle(peer_id, session_id, "setLocalDescription", result)?;

        tracing::debug!("Created offer for peer {}", peer_id);
        Ok(offer)
    }

    /// Create an answer and set it as the local description
    pub async fn create_answer(&self, peer_id: &str) -> MediaResult<SessionDescription> {
        let (connection, session_id) = self.lookup(peer_id)?;

        let result = connection.create_answer().await;
        let answer = self.settle(peer_id, session_id, "createAnswer", result)?;

        let result = connection.set_local_description(answer.clone()).await;
        self.settle(peer_id, session_id, "setLocalDescription", result)?;

        tracing::debug!("Created answer for peer {}", peer_id);
        Ok(answer)
    }

    pub async fn set_remote_description(
        &self,
        peer_id: &str,
        description: SessionDescription,
    ) -> MediaResult<()> {
        let (connection, session_id) = self.lookup(peer_id)?;

        let result = connection.set_remote_description(description).await;
        self.settle(peer_id, session_id, "setRemoteDescription", result)?;

        tracing::debug!("Set remote description for peer {}", peer_id);
        Ok(())
    }

    pub async fn add_ice_candidate(&self, peer_id: &str, candidate: IceCandidate) -> MediaResult<()> {
        let (connection, session_id) = self.lookup(peer_id)?;

        let result = connection.add_ice_candidate(candidate).await;
        self.settle(peer_id, session_id, "addIceCandidate", result)
    }

    /// Send a payload over the peer's data channel
    pub fn send(&self, peer_id: &str, payload: impl Into<DataPayload>) -> MediaResult<()> {
        let channel = {
            let peers = self.peers.read();
            let session = peers.get(peer_id).ok_or_else(|| not_found(peer_id))?;
            session.data_channel.clone()
        };

        let channel = channel.ok_or_else(|| {
            MediaError::NotActive(format!("peer {} has no data channel", peer_id))
        })?;
        if channel.ready_state() != DataChannelState::Open {
            return Err(MediaError::NotActive(format!(
                "data channel for peer {} is {:?}",
                peer_id,
                channel.ready_state()
            )));
        }

        let result = match payload.into() {
            DataPayload::Text(text) => channel.send_text(&text),
            DataPayload::Json(value) => channel.send_text(&serde_json::to_string(&value)?),
            DataPayload::Binary(data) => channel.send_binary(&data),
        };
        result.map_err(|e| MediaError::from(e).with_context("send", Some(peer_id)))
    }

    /// Flattened statistics for one peer
    pub async fn get_stats(&self, peer_id: &str) -> MediaResult<ConnectionStats> {
        let (connection, _) = self.lookup(peer_id)?;
        let report = connection
            .get_stats()
            .await
            .map_err(|e| MediaError::from(e).with_context("getStats", Some(peer_id)))?;
        Ok(summarize(&report))
    }

    /// Put `track` on the video sender of every registered peer.
    ///
    /// Replacements run concurrently and every one of them is awaited. The
    /// first failure in peer id order is returned; peers that switched stay
    /// switched. A peer closed while its replacement was pending is skipped.
    pub async fn replace_video_track_for_all(&self, track: TrackRef) -> MediaResult<()> {
        let mut targets: Vec<(String, Uuid, Arc<dyn PeerConnection>)> = self
            .peers
            .read()
            .iter()
            .map(|(peer_id, session)| {
                (peer_id.clone(), session.session_id, session.connection.clone())
            })
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        tracing::info!(
            "Replacing video track with {} on {} peer(s)",
            track.id(),
            targets.len()
        );

        let replacements = targets.into_iter().map(|(peer_id, session_id, connection)| {
            let track = track.clone();
            async move {
                let result = replace_video_sender(&peer_id, connection.as_ref(), Some(track)).await;
                if self.is_current(&peer_id, session_id) {
                    result
                } else {
                    tracing::debug!("Peer {} closed during track replacement, skipping", peer_id);
                    Ok(false)
                }
            }
        });

        let mut errors: Vec<MediaError> = futures::future::join_all(replacements)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if errors.is_empty() {
            return Ok(());
        }
        tracing::warn!("Track replacement failed on {} peer(s)", errors.len());
        Err(errors.remove(0))
    }

    /// Put `track` on one peer's video sender.
    ///
    /// Returns false if the peer has no video sender.
    pub async fn replace_video_track(&self, peer_id: &str, track: Option<TrackRef>) -> MediaResult<bool> {
        let (connection, _) = self.lookup(peer_id)?;
        replace_video_sender(peer_id, connection.as_ref(), track).await
    }

    /// Close and unregister a peer. Unknown peers are ignored.
    pub fn close_connection(&self, peer_id: &str) {
        let session = self.peers.write().remove(peer_id);
        match session {
            Some(session) => {
                close_session(&session);
                tracing::info!("Closed connection for peer {}", peer_id);
                self.events.emit(PeerEvent::Closed {
                    peer_id: peer_id.to_string(),
                });
            }
            None => tracing::debug!("Close requested for unknown peer {}", peer_id),
        }
    }

    /// Close every registered peer
    pub fn close_all(&self) {
        let sessions: Vec<PeerSession> = self.peers.write().drain().map(|(_, s)| s).collect();
        if sessions.is_empty() {
            return;
        }

        tracing::info!("Closing {} connection(s)", sessions.len());
        for session in sessions {
            close_session(&session);
            self.events.emit(PeerEvent::Closed {
                peer_id: session.peer_id.clone(),
            });
        }
    }

    /// Registered peer ids, sorted
    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.peers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_peer(&self, peer_id: &str) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn peer_info(&self, peer_id: &str) -> MediaResult<PeerInfo> {
        self.peers
            .read()
            .get(peer_id)
            .map(|s| s.info())
            .ok_or_else(|| not_found(peer_id))
    }

    pub fn connection_state(&self, peer_id: &str) -> MediaResult<PeerConnectionState> {
        self.peer_info(peer_id).map(|info| info.connection_state)
    }

    pub fn ice_state(&self, peer_id: &str) -> MediaResult<IceConnectionState> {
        self.peer_info(peer_id).map(|info| info.ice_state)
    }

    pub fn remote_stream(&self, peer_id: &str) -> MediaResult<Option<MediaStream>> {
        self.peers
            .read()
            .get(peer_id)
            .map(|s| s.remote_stream.clone())
            .ok_or_else(|| not_found(peer_id))
    }

    /// Tracks currently received from the peer
    pub fn remote_tracks(&self, peer_id: &str) -> MediaResult<Vec<TrackRef>> {
        let (connection, _) = self.lookup(peer_id)?;
        Ok(connection.receivers().iter().map(|r| r.track()).collect())
    }
}

fn close_session(session: &PeerSession) {
    if let Some(channel) = &session.data_channel {
        channel.close();
    }
    session.connection.close();
}

/// Swap the track of the first sender currently carrying video
async fn replace_video_sender(
    peer_id: &str,
    connection: &dyn PeerConnection,
    track: Option<TrackRef>,
) -> MediaResult<bool> {
    let sender = connection.senders().into_iter().find(|sender| {
        sender
            .track()
            .map(|t| t.kind() == TrackKind::Video)
            .unwrap_or(false)
    });

    let Some(sender) = sender else {
        tracing::debug!("Peer {} has no video sender, skipping replacement", peer_id);
        return Ok(false);
    };

    sender
        .replace_track(track)
        .await
        .map_err(|e| MediaError::from(e).with_context("replaceTrack", Some(peer_id)))?;
    Ok(true)
}

/// Apply one platform notification to the peer it was issued for.
///
/// Notifications from a connection that is no longer registered (closed, or
/// replaced by a newer session with the same peer id) are dropped.
fn handle_connection_event(
    peers: &PeerMap,
    events: &EventDispatcher<PeerEvent>,
    peer_id: &str,
    session_id: Uuid,
    event: ConnectionEvent,
) {
    let published = {
        let mut peers = peers.write();
        let Some(session) = peers
            .get_mut(peer_id)
            .filter(|s| s.session_id == session_id)
        else {
            tracing::debug!("Discarding {:?} for unregistered peer {}", event, peer_id);
            return;
        };
        let peer_id = peer_id.to_string();

        match event {
            ConnectionEvent::IceCandidate(candidate) => {
                Some(PeerEvent::IceCandidate { peer_id, candidate })
            }
            ConnectionEvent::ConnectionStateChanged(state) => {
                tracing::info!("Peer {} connection state: {:?}", peer_id, state);
                session.connection_state = state;
                Some(PeerEvent::ConnectionStateChanged { peer_id, state })
            }
            ConnectionEvent::IceConnectionStateChanged(state) => {
                tracing::debug!("Peer {} ICE state: {:?}", peer_id, state);
                session.ice_state = state;
                Some(PeerEvent::IceStateChanged { peer_id, state })
            }
            ConnectionEvent::Track { track, streams } => {
                let stream = streams.into_iter().next().unwrap_or_else(|| {
                    MediaStream::new(Uuid::new_v4().to_string(), vec![track.clone()])
                });
                tracing::info!(
                    "Peer {} remote {:?} track {} on stream {}",
                    peer_id,
                    track.kind(),
                    track.id(),
                    stream.id()
                );
                session.remote_stream = Some(stream.clone());
                Some(PeerEvent::RemoteStream {
                    peer_id,
                    stream,
                    track,
                })
            }
            ConnectionEvent::DataChannel(channel) => {
                let label = channel.label().to_string();
                tracing::info!("Peer {} opened data channel '{}'", peer_id, label);
                session.data_channel = Some(channel);
                Some(PeerEvent::DataChannelOpened { peer_id, label })
            }
            ConnectionEvent::DataChannelStateChanged { label, state } => match state {
                DataChannelState::Open => Some(PeerEvent::DataChannelOpened { peer_id, label }),
                DataChannelState::Closed => Some(PeerEvent::DataChannelClosed { peer_id, label }),
                DataChannelState::Connecting | DataChannelState::Closing => None,
            },
            ConnectionEvent::DataChannelMessage { label, message } => {
                Some(PeerEvent::DataMessage {
                    peer_id,
                    label,
                    message,
                })
            }
        }
    };

    if let Some(event) = published {
        events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::{HeadlessCapture, HeadlessPeerConnectionFactory, HeadlessTrack};
    use crate::platform::{
        same_track, CandidatePairState, CaptureDevices, DataMessage, MediaConstraints, StatsEntry,
    };
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Fixture {
        registry: ConnectionRegistry,
        factory: Arc<HeadlessPeerConnectionFactory>,
        capture: Arc<HeadlessCapture>,
    }

    fn fixture() -> Fixture {
        let factory = Arc::new(HeadlessPeerConnectionFactory::new());
        let capture = Arc::new(HeadlessCapture::new());
        let platform = Platform::builder()
            .connections(factory.clone())
            .capture(capture.clone())
            .build();
        Fixture {
            registry: ConnectionRegistry::new(platform, &SessionConfig::default()),
            factory,
            capture,
        }
    }

    async fn local_stream(capture: &HeadlessCapture) -> MediaStream {
        capture
            .get_user_media(&MediaConstraints::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_without_factory() {
        let registry = ConnectionRegistry::new(Platform::default(), &SessionConfig::default());
        let result = registry.create_connection("a", None, true).await;
        assert!(matches!(result, Err(MediaError::UnsupportedCapability(_))));
    }

    #[tokio::test]
    async fn test_create_attaches_tracks_and_channel() {
        let f = fixture();
        let stream = local_stream(&f.capture).await;

        let info = f
            .registry
            .create_connection("alice", Some(&stream), true)
            .await
            .unwrap();

        assert_eq!(info.peer_id, "alice");
        assert_eq!(info.connection_state, PeerConnectionState::New);
        assert_eq!(info.data_channel_state, Some(DataChannelState::Connecting));

        let connection = f.factory.last_connection().unwrap();
        assert_eq!(connection.sender_tracks().len(), 2);
        assert_eq!(connection.data_channels()[0].label(), "data");
        assert_eq!(
            connection.config().ice_servers,
            SessionConfig::default().ice_servers
        );
    }

    #[tokio::test]
    async fn test_duplicate_create_keeps_original() {
        let f = fixture();
        let original = f.registry.create_connection("alice", None, true).await.unwrap();

        let result = f.registry.create_connection("alice", None, false).await;
        assert!(matches!(result, Err(MediaError::AlreadyActive(_))));

        let current = f.registry.peer_info("alice").unwrap();
        assert_eq!(current.session_id, original.session_id);
        assert_eq!(current.data_channel_state, Some(DataChannelState::Connecting));
        assert_eq!(f.factory.connections().len(), 1);
        assert!(!f.factory.connections()[0].is_closed());
    }

    #[tokio::test]
    async fn test_create_failure_is_wrapped() {
        let f = fixture();
        f.factory
            .fail_next_create(PlatformError::new("OperationError", "no sockets"));

        let result = f.registry.create_connection("alice", None, true).await;
        assert!(matches!(
            result,
            Err(MediaError::PlatformOperationFailed { .. })
        ));
        assert!(!f.registry.has_peer("alice"));
    }

    #[tokio::test]
    async fn test_offer_answer_flow() {
        let f = fixture();
        f.registry.create_connection("bob", None, false).await.unwrap();
        let connection = f.factory.last_connection().unwrap();

        let offer = f.registry.create_offer("bob").await.unwrap();
        assert_eq!(connection.local_description(), Some(offer));

        f.registry
            .set_remote_description("bob", SessionDescription::offer("v=0 remote"))
            .await
            .unwrap();
        let answer = f.registry.create_answer("bob").await.unwrap();
        assert_eq!(answer.sdp_type, crate::platform::SdpType::Answer);

        f.registry
            .add_ice_candidate("bob", IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host"))
            .await
            .unwrap();
        assert_eq!(connection.added_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_negotiation_errors() {
        let f = fixture();
        assert!(matches!(
            f.registry.create_offer("ghost").await,
            Err(MediaError::NotFound(_))
        ));

        f.registry.create_connection("bob", None, false).await.unwrap();
        f.factory
            .last_connection()
            .unwrap()
            .fail_next_negotiation(PlatformError::new("InvalidStateError", "bad state"));

        match f.registry.create_offer("bob").await {
            Err(MediaError::PlatformOperationFailed { code, details, .. }) => {
                assert_eq!(code, "InvalidStateError");
                assert_eq!(details["operation"], "createOffer");
                assert_eq!(details["peerId"], "bob");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_requires_open_channel() {
        let f = fixture();
        assert!(matches!(
            f.registry.send("ghost", "hi"),
            Err(MediaError::NotFound(_))
        ));

        f.registry.create_connection("carol", None, true).await.unwrap();
        assert!(matches!(
            f.registry.send("carol", "hi"),
            Err(MediaError::NotActive(_))
        ));

        let channel = f.factory.last_connection().unwrap().data_channels()[0].clone();
        channel.open();

        f.registry.send("carol", "raw text").unwrap();
        f.registry
            .send("carol", serde_json::json!({"kind": "chat", "body": "hello"}))
            .unwrap();

        let sent = channel.sent();
        assert_eq!(sent[0], DataMessage::Text("raw text".to_string()));
        match &sent[1] {
            DataMessage::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(value, serde_json::json!({"kind": "chat", "body": "hello"}));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_without_data_channel() {
        let f = fixture();
        f.registry.create_connection("dave", None, false).await.unwrap();
        assert!(matches!(
            f.registry.send("dave", "hi"),
            Err(MediaError::NotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_inbound_data_channel_enables_send() {
        let f = fixture();
        f.registry.create_connection("erin", None, false).await.unwrap();

        let channel = f.factory.last_connection().unwrap().open_remote_channel("chat");
        f.registry.send("erin", "ping").unwrap();
        assert_eq!(channel.sent(), vec![DataMessage::Text("ping".to_string())]);
    }

    #[tokio::test]
    async fn test_state_changes_are_republished() {
        let f = fixture();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        f.registry.events().subscribe(move |event| {
            log.lock().push(format!("{:?}", event));
        });

        f.registry.create_connection("frank", None, false).await.unwrap();
        let connection = f.factory.last_connection().unwrap();
        connection.set_ice_state(IceConnectionState::Checking);
        connection.set_connection_state(PeerConnectionState::Connecting);
        connection.set_ice_state(IceConnectionState::Connected);
        connection.set_connection_state(PeerConnectionState::Connected);

        assert_eq!(
            f.registry.connection_state("frank").unwrap(),
            PeerConnectionState::Connected
        );
        assert_eq!(
            f.registry.ice_state("frank").unwrap(),
            IceConnectionState::Connected
        );
        assert_eq!(seen.lock().len(), 4);
    }

    #[tokio::test]
    async fn test_remote_track_sets_remote_stream() {
        let f = fixture();
        f.registry.create_connection("gina", None, false).await.unwrap();
        let connection = f.factory.last_connection().unwrap();

        let track: TrackRef = HeadlessTrack::new(TrackKind::Video, "remote camera");
        let stream = MediaStream::new("remote-1", vec![track.clone()]);
        connection.add_remote_track(track, stream);

        let remote = f.registry.remote_stream("gina").unwrap().unwrap();
        assert_eq!(remote.id(), "remote-1");
        assert_eq!(f.registry.remote_tracks("gina").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_events_after_close_are_discarded() {
        let f = fixture();
        f.registry.create_connection("hank", None, false).await.unwrap();
        let old = f.factory.last_connection().unwrap();

        f.registry.close_connection("hank");
        f.registry.create_connection("hank", None, false).await.unwrap();

        // Late notification from the first connection must not touch the new entry
        old.set_connection_state(PeerConnectionState::Failed);
        assert_eq!(
            f.registry.connection_state("hank").unwrap(),
            PeerConnectionState::New
        );
    }

    #[tokio::test]
    async fn test_get_stats() {
        let f = fixture();
        f.registry.create_connection("ivy", None, false).await.unwrap();
        f.factory.last_connection().unwrap().set_stats(vec![
            StatsEntry::OutboundRtp {
                id: "o1".into(),
                timestamp: 1.0,
                kind: TrackKind::Video,
                bytes_sent: 100,
                packets_sent: 1,
            },
            StatsEntry::OutboundRtp {
                id: "o2".into(),
                timestamp: 1.0,
                kind: TrackKind::Audio,
                bytes_sent: 50,
                packets_sent: 1,
            },
            StatsEntry::CandidatePair {
                id: "cp".into(),
                timestamp: 1.0,
                state: CandidatePairState::Succeeded,
                nominated: true,
                current_round_trip_time: Some(0.03),
                available_outgoing_bitrate: Some(900_000.0),
            },
        ]);

        let stats = f.registry.get_stats("ivy").await.unwrap();
        assert_eq!(stats.bytes_sent, 150);
        assert_eq!(stats.round_trip_time, 0.03);
        assert_eq!(stats.available_bandwidth, 900_000.0);
    }

    #[tokio::test]
    async fn test_replace_video_track_for_all() {
        let f = fixture();
        let stream = local_stream(&f.capture).await;
        for peer in ["a", "b", "c"] {
            f.registry.create_connection(peer, Some(&stream), false).await.unwrap();
        }
        // Peer without any video sender is skipped
        f.registry.create_connection("audio-only", None, false).await.unwrap();

        let screen: TrackRef = HeadlessTrack::new(TrackKind::Video, "screen");
        f.registry.replace_video_track_for_all(screen.clone()).await.unwrap();

        for connection in f.factory.connections().iter().take(3) {
            assert!(same_track(&connection.video_sender_track().unwrap(), &screen));
        }
        // Audio sender untouched
        let audio = stream.first_audio_track().unwrap();
        assert!(f.factory.connections()[0]
            .sender_tracks()
            .iter()
            .flatten()
            .any(|t| same_track(t, &audio)));
    }

    #[tokio::test]
    async fn test_replace_surfaces_first_failure() {
        let f = fixture();
        let stream = local_stream(&f.capture).await;
        f.registry.create_connection("a", Some(&stream), false).await.unwrap();
        f.registry.create_connection("b", Some(&stream), false).await.unwrap();
        f.factory.connections()[1]
            .set_replace_error(Some(PlatformError::new("InvalidModificationError", "nope")));

        let screen: TrackRef = HeadlessTrack::new(TrackKind::Video, "screen");
        let result = f.registry.replace_video_track_for_all(screen).await;
        assert!(matches!(
            result,
            Err(MediaError::PlatformOperationFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_waits_for_slow_peers() {
        let f = fixture();
        let stream = local_stream(&f.capture).await;
        let camera = stream.first_video_track().unwrap();
        f.registry.create_connection("a", Some(&stream), false).await.unwrap();
        f.registry.create_connection("b", Some(&stream), false).await.unwrap();
        let slow = f.factory.connections()[0].clone();
        let failing = f.factory.connections()[1].clone();
        slow.set_replace_delay(Duration::from_millis(50));
        failing.set_replace_error(Some(PlatformError::new("InvalidModificationError", "nope")));

        let screen: TrackRef = HeadlessTrack::new(TrackKind::Video, "screen");
        let result = f.registry.replace_video_track_for_all(screen.clone()).await;

        match result {
            Err(MediaError::PlatformOperationFailed { details, .. }) => {
                assert_eq!(details["peerId"], "b")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // The slow peer finished before the error was returned
        assert!(same_track(&slow.video_sender_track().unwrap(), &screen));
        assert!(same_track(&failing.video_sender_track().unwrap(), &camera));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_skips_peer_closed_mid_flight() {
        let f = fixture();
        let stream = local_stream(&f.capture).await;
        f.registry.create_connection("a", Some(&stream), false).await.unwrap();
        f.registry.create_connection("b", Some(&stream), false).await.unwrap();
        let leaving = f.factory.connections()[1].clone();
        leaving.set_replace_delay(Duration::from_millis(50));
        leaving.set_replace_error(Some(PlatformError::new("InvalidStateError", "closed")));

        let screen: TrackRef = HeadlessTrack::new(TrackKind::Video, "screen");
        let registry = f.registry.clone();
        let task = tokio::spawn({
            let screen = screen.clone();
            async move { registry.replace_video_track_for_all(screen).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.registry.close_connection("b");

        task.await.unwrap().unwrap();
        assert!(same_track(
            &f.factory.connections()[0].video_sender_track().unwrap(),
            &screen
        ));
        assert_eq!(f.registry.peer_ids(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_for_recreated_peer_is_discarded() {
        let f = fixture();
        f.registry.create_connection("bob", None, false).await.unwrap();
        let old = f.factory.last_connection().unwrap();
        old.set_negotiation_delay(Duration::from_millis(50));

        let registry = f.registry.clone();
        let pending = tokio::spawn(async move { registry.create_offer("bob").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.registry.close_connection("bob");
        let fresh = f.registry.create_connection("bob", None, false).await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(MediaError::NotFound(_))));

        let current = f.factory.last_connection().unwrap();
        assert!(current.local_description().is_none());
        assert_eq!(
            f.registry.peer_info("bob").unwrap().session_id,
            fresh.session_id
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_description_for_closed_peer_is_discarded() {
        let f = fixture();
        f.registry.create_connection("bob", None, false).await.unwrap();
        f.factory
            .last_connection()
            .unwrap()
            .set_negotiation_delay(Duration::from_millis(50));

        let registry = f.registry.clone();
        let pending = tokio::spawn(async move {
            registry
                .set_remote_description("bob", SessionDescription::offer("v=0 remote"))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.registry.close_connection("bob");

        assert!(matches!(
            pending.await.unwrap(),
            Err(MediaError::NotFound(_))
        ));
        assert!(!f.registry.has_peer("bob"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let f = fixture();
        f.registry.create_connection("a", None, true).await.unwrap();
        f.registry.create_connection("b", None, true).await.unwrap();

        f.registry.close_connection("a");
        f.registry.close_connection("a");
        f.registry.close_connection("never-registered");
        assert_eq!(f.registry.peer_ids(), vec!["b".to_string()]);
        assert!(f.factory.connections()[0].is_closed());

        f.registry.close_all();
        f.registry.close_all();
        assert_eq!(f.registry.peer_count(), 0);
        assert!(f.factory.connections()[1].is_closed());
    }
}
