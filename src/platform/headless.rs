//! Headless platform
//!
//! In-memory capture, negotiation and encoder adapters for hosts without
//! real devices. Every adapter exposes hooks to simulate platform behavior
//! (external track termination, remote events, injected failures).

use super::traits::{
    CaptureDevices, ConnectionEvent, ConnectionEventSink, DataChannel, EncoderEvent,
    EncoderEventSink, EndedCallback, ListenerId, MediaEncoder, MediaEncoderFactory,
    MediaStream, MediaTrack, PeerConnection, PeerConnectionFactory, RtpReceiver, RtpSender,
    TrackRef,
};
use super::types::{
    DataChannelState, DataMessage, EncoderOptions, EncoderState, IceCandidate,
    IceConnectionState, MediaConstraints, PeerConnectionState, RtcConfiguration,
    SessionDescription, StatsReport, TrackKind, TrackState,
};
use crate::utils::error::PlatformError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn invalid_state(message: &str) -> PlatformError {
    PlatformError::new("InvalidStateError", message)
}

/// In-memory media track
pub struct HeadlessTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    ended: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, EndedCallback)>>,
}

impl HeadlessTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            next_listener: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Simulate the platform ending the track (e.g. user stopped sharing)
    pub fn end(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners: Vec<_> = self.listeners.lock().drain(..).collect();
        for (_, callback) in listeners {
            callback();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl fmt::Debug for HeadlessTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("enabled", &self.enabled.load(Ordering::SeqCst))
            .field("ended", &self.ended.load(Ordering::SeqCst))
            .finish()
    }
}

impl MediaTrack for HeadlessTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.listeners.lock().clear();
    }

    fn on_ended(&self, callback: EndedCallback) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, callback));
        id
    }

    fn remove_ended_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }
}

/// In-memory camera, microphone and display capture
pub struct HeadlessCapture {
    user_media_error: Mutex<Option<PlatformError>>,
    display_error: Mutex<Option<PlatformError>>,
    display_has_video: AtomicBool,
    display_supported: AtomicBool,
    issued: Mutex<Vec<Arc<HeadlessTrack>>>,
}

impl HeadlessCapture {
    pub fn new() -> Self {
        Self {
            user_media_error: Mutex::new(None),
            display_error: Mutex::new(None),
            display_has_video: AtomicBool::new(true),
            display_supported: AtomicBool::new(true),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next camera/microphone request
    pub fn fail_next_user_media(&self, error: PlatformError) {
        *self.user_media_error.lock() = Some(error);
    }

    /// Fail the next display request
    pub fn fail_next_display_media(&self, error: PlatformError) {
        *self.display_error.lock() = Some(error);
    }

    /// Make display capture return streams without a video track
    pub fn set_display_has_video(&self, has_video: bool) {
        self.display_has_video.store(has_video, Ordering::SeqCst);
    }

    pub fn set_display_supported(&self, supported: bool) {
        self.display_supported.store(supported, Ordering::SeqCst);
    }

    /// Every track handed out so far
    pub fn issued_tracks(&self) -> Vec<Arc<HeadlessTrack>> {
        self.issued.lock().clone()
    }

    /// Simulate external termination of an issued track
    pub fn end_track(&self, track_id: &str) -> bool {
        let track = self
            .issued
            .lock()
            .iter()
            .find(|t| t.id == track_id)
            .cloned();
        match track {
            Some(track) => {
                track.end();
                true
            }
            None => false,
        }
    }

    fn issue(&self, kind: TrackKind, label: &str) -> TrackRef {
        let track = HeadlessTrack::new(kind, label);
        self.issued.lock().push(track.clone());
        track
    }
}

impl Default for HeadlessCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevices for HeadlessCapture {
    fn supports_display_capture(&self) -> bool {
        self.display_supported.load(Ordering::SeqCst)
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformError> {
        if let Some(error) = self.user_media_error.lock().take() {
            return Err(error);
        }
        if !constraints.audio.is_requested() && !constraints.video.is_requested() {
            return Err(PlatformError::new(
                "TypeError",
                "at least one of audio and video must be requested",
            ));
        }

        let mut tracks = Vec::new();
        if constraints.audio.is_requested() {
            tracks.push(self.issue(TrackKind::Audio, "headless microphone"));
        }
        if constraints.video.is_requested() {
            tracks.push(self.issue(TrackKind::Video, "headless camera"));
        }
        Ok(MediaStream::new(Uuid::new_v4().to_string(), tracks))
    }

    async fn get_display_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, PlatformError> {
        if !self.supports_display_capture() {
            return Err(PlatformError::new(
                "NotSupportedError",
                "display capture is not supported",
            ));
        }
        if let Some(error) = self.display_error.lock().take() {
            return Err(error);
        }

        let mut tracks = Vec::new();
        if self.display_has_video.load(Ordering::SeqCst) {
            tracks.push(self.issue(TrackKind::Video, "headless screen"));
        }
        if constraints.audio.is_requested() {
            tracks.push(self.issue(TrackKind::Audio, "headless system audio"));
        }
        Ok(MediaStream::new(Uuid::new_v4().to_string(), tracks))
    }
}

/// Creates [`HeadlessPeerConnection`]s and keeps them for inspection
#[derive(Default)]
pub struct HeadlessPeerConnectionFactory {
    created: Mutex<Vec<Arc<HeadlessPeerConnection>>>,
    create_error: Mutex<Option<PlatformError>>,
}

impl HeadlessPeerConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_create(&self, error: PlatformError) {
        *self.create_error.lock() = Some(error);
    }

    /// Connections in creation order
    pub fn connections(&self) -> Vec<Arc<HeadlessPeerConnection>> {
        self.created.lock().clone()
    }

    pub fn last_connection(&self) -> Option<Arc<HeadlessPeerConnection>> {
        self.created.lock().last().cloned()
    }
}

#[async_trait]
impl PeerConnectionFactory for HeadlessPeerConnectionFactory {
    async fn create(
        &self,
        config: &RtcConfiguration,
        events: ConnectionEventSink,
    ) -> Result<Arc<dyn PeerConnection>, PlatformError> {
        if let Some(error) = self.create_error.lock().take() {
            return Err(error);
        }
        let connection = Arc::new(HeadlessPeerConnection::new(config.clone(), events));
        self.created.lock().push(connection.clone());
        Ok(connection)
    }
}

/// Shared failure/latency knobs for the senders of one connection
#[derive(Default)]
struct ReplaceBehavior {
    error: Mutex<Option<PlatformError>>,
    delay: Mutex<Duration>,
}

/// In-memory negotiation primitive
pub struct HeadlessPeerConnection {
    config: RtcConfiguration,
    events: ConnectionEventSink,
    senders: Mutex<Vec<Arc<HeadlessSender>>>,
    receivers: Mutex<Vec<Arc<HeadlessReceiver>>>,
    channels: Mutex<Vec<Arc<HeadlessDataChannel>>>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    stats: Mutex<StatsReport>,
    negotiation_error: Mutex<Option<PlatformError>>,
    negotiation_delay: Mutex<Duration>,
    replace: Arc<ReplaceBehavior>,
    connection_state: Mutex<PeerConnectionState>,
    ice_state: Mutex<IceConnectionState>,
    closed: AtomicBool,
    sdp_version: AtomicU64,
}

impl HeadlessPeerConnection {
    fn new(config: RtcConfiguration, events: ConnectionEventSink) -> Self {
        Self {
            config,
            events,
            senders: Mutex::new(Vec::new()),
            receivers: Mutex::new(Vec::new()),
            channels: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            stats: Mutex::new(Vec::new()),
            negotiation_error: Mutex::new(None),
            negotiation_delay: Mutex::new(Duration::ZERO),
            replace: Arc::new(ReplaceBehavior::default()),
            connection_state: Mutex::new(PeerConnectionState::New),
            ice_state: Mutex::new(IceConnectionState::New),
            closed: AtomicBool::new(false),
            sdp_version: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &RtcConfiguration {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().clone()
    }

    pub fn added_candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn data_channels(&self) -> Vec<Arc<HeadlessDataChannel>> {
        self.channels.lock().clone()
    }

    /// Track currently held by the first video sender
    pub fn video_sender_track(&self) -> Option<TrackRef> {
        self.senders
            .lock()
            .iter()
            .filter_map(|s| s.track())
            .find(|t| t.kind() == TrackKind::Video)
    }

    pub fn sender_tracks(&self) -> Vec<Option<TrackRef>> {
        self.senders.lock().iter().map(|s| s.track()).collect()
    }

    /// Fail the next offer/answer/description/candidate operation
    pub fn fail_next_negotiation(&self, error: PlatformError) {
        *self.negotiation_error.lock() = Some(error);
    }

    /// Delay every offer/answer/description/candidate operation
    pub fn set_negotiation_delay(&self, delay: Duration) {
        *self.negotiation_delay.lock() = delay;
    }

    /// Fail every track replacement until cleared with `None`
    pub fn set_replace_error(&self, error: Option<PlatformError>) {
        *self.replace.error.lock() = error;
    }

    /// Delay every track replacement
    pub fn set_replace_delay(&self, delay: Duration) {
        *self.replace.delay.lock() = delay;
    }

    pub fn set_stats(&self, report: StatsReport) {
        *self.stats.lock() = report;
    }

    pub fn set_connection_state(&self, state: PeerConnectionState) {
        *self.connection_state.lock() = state;
        (self.events)(ConnectionEvent::ConnectionStateChanged(state));
    }

    pub fn set_ice_state(&self, state: IceConnectionState) {
        *self.ice_state.lock() = state;
        (self.events)(ConnectionEvent::IceConnectionStateChanged(state));
    }

    pub fn emit_candidate(&self, candidate: Option<IceCandidate>) {
        (self.events)(ConnectionEvent::IceCandidate(candidate));
    }

    /// Simulate a remote track arriving
    pub fn add_remote_track(&self, track: TrackRef, stream: MediaStream) {
        self.receivers.lock().push(Arc::new(HeadlessReceiver {
            track: track.clone(),
        }));
        (self.events)(ConnectionEvent::Track {
            track,
            streams: vec![stream],
        });
    }

    /// Simulate the remote side opening a data channel
    pub fn open_remote_channel(&self, label: &str) -> Arc<HeadlessDataChannel> {
        let channel = Arc::new(HeadlessDataChannel::new(label, true, self.events.clone()));
        *channel.state.lock() = DataChannelState::Open;
        self.channels.lock().push(channel.clone());
        (self.events)(ConnectionEvent::DataChannel(channel.clone()));
        channel
    }

    /// Simulate an inbound data-channel message
    pub fn deliver_message(&self, label: &str, message: DataMessage) {
        (self.events)(ConnectionEvent::DataChannelMessage {
            label: label.to_string(),
            message,
        });
    }

    async fn check_negotiation(&self) -> Result<(), PlatformError> {
        let delay = *self.negotiation_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.is_closed() {
            return Err(invalid_state("connection is closed"));
        }
        match self.negotiation_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_sdp(&self, role: &str) -> String {
        let version = self.sdp_version.fetch_add(1, Ordering::SeqCst);
        format!("v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=headless-{}\r\n", Uuid::new_v4().as_u128() as u32, version, role)
    }
}

#[async_trait]
impl PeerConnection for HeadlessPeerConnection {
    fn add_track(
        &self,
        track: TrackRef,
        _stream: &MediaStream,
    ) -> Result<Arc<dyn RtpSender>, PlatformError> {
        if self.is_closed() {
            return Err(invalid_state("connection is closed"));
        }
        let sender = Arc::new(HeadlessSender {
            track: Mutex::new(Some(track)),
            behavior: self.replace.clone(),
        });
        self.senders.lock().push(sender.clone());
        Ok(sender)
    }

    fn create_data_channel(
        &self,
        label: &str,
        ordered: bool,
    ) -> Result<Arc<dyn DataChannel>, PlatformError> {
        if self.is_closed() {
            return Err(invalid_state("connection is closed"));
        }
        let channel = Arc::new(HeadlessDataChannel::new(label, ordered, self.events.clone()));
        self.channels.lock().push(channel.clone());
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription, PlatformError> {
        self.check_negotiation().await?;
        Ok(SessionDescription::offer(self.next_sdp("offer")))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PlatformError> {
        self.check_negotiation().await?;
        if self.remote_description.lock().is_none() {
            return Err(invalid_state("no remote offer to answer"));
        }
        Ok(SessionDescription::answer(self.next_sdp("answer")))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PlatformError> {
        self.check_negotiation().await?;
        *self.local_description.lock() = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PlatformError> {
        self.check_negotiation().await?;
        *self.remote_description.lock() = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PlatformError> {
        self.check_negotiation().await?;
        if self.remote_description.lock().is_none() {
            return Err(invalid_state("remote description is not set"));
        }
        self.candidates.lock().push(candidate);
        Ok(())
    }

    fn senders(&self) -> Vec<Arc<dyn RtpSender>> {
        self.senders
            .lock()
            .iter()
            .map(|s| s.clone() as Arc<dyn RtpSender>)
            .collect()
    }

    fn receivers(&self) -> Vec<Arc<dyn RtpReceiver>> {
        self.receivers
            .lock()
            .iter()
            .map(|r| r.clone() as Arc<dyn RtpReceiver>)
            .collect()
    }

    async fn get_stats(&self) -> Result<StatsReport, PlatformError> {
        if self.is_closed() {
            return Err(invalid_state("connection is closed"));
        }
        Ok(self.stats.lock().clone())
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.connection_state.lock()
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        *self.ice_state.lock()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.connection_state.lock() = PeerConnectionState::Closed;
        *self.ice_state.lock() = IceConnectionState::Closed;
        for channel in self.channels.lock().iter() {
            *channel.state.lock() = DataChannelState::Closed;
        }
    }
}

/// In-memory sender
pub struct HeadlessSender {
    track: Mutex<Option<TrackRef>>,
    behavior: Arc<ReplaceBehavior>,
}

#[async_trait]
impl RtpSender for HeadlessSender {
    fn track(&self) -> Option<TrackRef> {
        self.track.lock().clone()
    }

    async fn replace_track(&self, track: Option<TrackRef>) -> Result<(), PlatformError> {
        let delay = *self.behavior.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.behavior.error.lock().clone() {
            return Err(error);
        }
        *self.track.lock() = track;
        Ok(())
    }
}

/// In-memory receiver
pub struct HeadlessReceiver {
    track: TrackRef,
}

impl RtpReceiver for HeadlessReceiver {
    fn track(&self) -> TrackRef {
        self.track.clone()
    }
}

/// In-memory data channel; records everything sent
pub struct HeadlessDataChannel {
    label: String,
    ordered: bool,
    state: Mutex<DataChannelState>,
    sent: Mutex<Vec<DataMessage>>,
    events: ConnectionEventSink,
}

impl HeadlessDataChannel {
    fn new(label: &str, ordered: bool, events: ConnectionEventSink) -> Self {
        Self {
            label: label.to_string(),
            ordered,
            state: Mutex::new(DataChannelState::Connecting),
            sent: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// Simulate the channel finishing its handshake
    pub fn open(&self) {
        *self.state.lock() = DataChannelState::Open;
        (self.events)(ConnectionEvent::DataChannelStateChanged {
            label: self.label.clone(),
            state: DataChannelState::Open,
        });
    }

    pub fn sent(&self) -> Vec<DataMessage> {
        self.sent.lock().clone()
    }

    fn check_open(&self) -> Result<(), PlatformError> {
        if *self.state.lock() != DataChannelState::Open {
            return Err(invalid_state("data channel is not open"));
        }
        Ok(())
    }
}

impl DataChannel for HeadlessDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> DataChannelState {
        *self.state.lock()
    }

    fn send_text(&self, text: &str) -> Result<(), PlatformError> {
        self.check_open()?;
        self.sent.lock().push(DataMessage::Text(text.to_string()));
        Ok(())
    }

    fn send_binary(&self, data: &[u8]) -> Result<(), PlatformError> {
        self.check_open()?;
        self.sent
            .lock()
            .push(DataMessage::Binary(Bytes::copy_from_slice(data)));
        Ok(())
    }

    fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), DataChannelState::Closed);
        if previous != DataChannelState::Closed {
            (self.events)(ConnectionEvent::DataChannelStateChanged {
                label: self.label.clone(),
                state: DataChannelState::Closed,
            });
        }
    }
}

/// Creates [`HeadlessEncoder`]s for a fixed set of formats
pub struct HeadlessEncoderFactory {
    supported: Mutex<Vec<String>>,
    start_error: Mutex<Option<PlatformError>>,
    encoders: Mutex<Vec<Arc<HeadlessEncoderControl>>>,
}

impl HeadlessEncoderFactory {
    pub fn new(supported: &[&str]) -> Self {
        Self {
            supported: Mutex::new(supported.iter().map(|s| s.to_string()).collect()),
            start_error: Mutex::new(None),
            encoders: Mutex::new(Vec::new()),
        }
    }

    pub fn set_supported(&self, supported: &[&str]) {
        *self.supported.lock() = supported.iter().map(|s| s.to_string()).collect();
    }

    /// Fail `start` on the next encoder created
    pub fn fail_next_start(&self, error: PlatformError) {
        *self.start_error.lock() = Some(error);
    }

    pub fn last_encoder(&self) -> Option<Arc<HeadlessEncoderControl>> {
        self.encoders.lock().last().cloned()
    }

    pub fn encoder_count(&self) -> usize {
        self.encoders.lock().len()
    }
}

impl Default for HeadlessEncoderFactory {
    fn default() -> Self {
        Self::new(&["video/webm;codecs=vp8,opus", "video/webm"])
    }
}

impl MediaEncoderFactory for HeadlessEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.lock().iter().any(|s| s == mime_type)
    }

    fn create(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EncoderEventSink,
    ) -> Result<Box<dyn MediaEncoder>, PlatformError> {
        if !self.is_type_supported(&options.mime_type) {
            return Err(PlatformError::new(
                "NotSupportedError",
                format!("{} is not supported", options.mime_type),
            ));
        }
        let control = Arc::new(HeadlessEncoderControl {
            stream_id: stream.id().to_string(),
            options: options.clone(),
            events,
            state: Mutex::new(EncoderState::Inactive),
            timeslice: Mutex::new(None),
            final_chunk: Mutex::new(None),
            start_error: Mutex::new(self.start_error.lock().take()),
        });
        self.encoders.lock().push(control.clone());
        Ok(Box::new(HeadlessEncoder { control }))
    }
}

/// Test-side view of a headless encoder
pub struct HeadlessEncoderControl {
    stream_id: String,
    options: EncoderOptions,
    events: EncoderEventSink,
    state: Mutex<EncoderState>,
    timeslice: Mutex<Option<Duration>>,
    final_chunk: Mutex<Option<Bytes>>,
    start_error: Mutex<Option<PlatformError>>,
}

impl HeadlessEncoderControl {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn state(&self) -> EncoderState {
        *self.state.lock()
    }

    pub fn timeslice(&self) -> Option<Duration> {
        *self.timeslice.lock()
    }

    /// Simulate a periodic flush
    pub fn emit_chunk(&self, data: &[u8]) {
        if self.state() == EncoderState::Inactive {
            return;
        }
        (self.events)(EncoderEvent::DataAvailable(Bytes::copy_from_slice(data)));
    }

    /// Chunk delivered during `stop`
    pub fn set_final_chunk(&self, data: &[u8]) {
        *self.final_chunk.lock() = Some(Bytes::copy_from_slice(data));
    }

    /// Simulate an encoder failure
    pub fn emit_error(&self, error: PlatformError) {
        (self.events)(EncoderEvent::Error(error));
    }

    /// Emit a raw event regardless of state, e.g. a late flush after stop
    pub fn emit_raw(&self, event: EncoderEvent) {
        (self.events)(event);
    }
}

/// In-memory encoder
pub struct HeadlessEncoder {
    control: Arc<HeadlessEncoderControl>,
}

#[async_trait]
impl MediaEncoder for HeadlessEncoder {
    fn start(&mut self, timeslice: Duration) -> Result<(), PlatformError> {
        if let Some(error) = self.control.start_error.lock().take() {
            return Err(error);
        }
        if self.control.state() != EncoderState::Inactive {
            return Err(invalid_state("encoder already started"));
        }
        *self.control.state.lock() = EncoderState::Recording;
        *self.control.timeslice.lock() = Some(timeslice);
        (self.control.events)(EncoderEvent::Started);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlatformError> {
        if self.control.state() != EncoderState::Recording {
            return Err(invalid_state("encoder is not recording"));
        }
        *self.control.state.lock() = EncoderState::Paused;
        (self.control.events)(EncoderEvent::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PlatformError> {
        if self.control.state() != EncoderState::Paused {
            return Err(invalid_state("encoder is not paused"));
        }
        *self.control.state.lock() = EncoderState::Recording;
        (self.control.events)(EncoderEvent::Resumed);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PlatformError> {
        if self.control.state() == EncoderState::Inactive {
            return Ok(());
        }
        let final_chunk = self.control.final_chunk.lock().take();
        if let Some(chunk) = final_chunk {
            (self.control.events)(EncoderEvent::DataAvailable(chunk));
        }
        *self.control.state.lock() = EncoderState::Inactive;
        (self.control.events)(EncoderEvent::Stopped);
        Ok(())
    }

    fn state(&self) -> EncoderState {
        self.control.state()
    }
}
