//! Offer/answer signaling for one peer connection.
//!
//! The [`SignalingSession`] owns at most one control channel and exactly one
//! underlying peer session, both reached through narrow traits the host
//! implements over its transport engine. The engine delivers events from its
//! own context, so every public entry point is safe to call concurrently
//! with teardown: a closed session turns all events into no-ops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::media::{Codec, Direction, MediaLine};
use crate::IngestConfig;

/// Errors from the signaling layer and the peer engine behind it.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The peer engine failed to create the underlying session.
    #[error("peer engine: {0}")]
    Engine(String),

    /// Sending on the control channel failed.
    #[error("control channel send: {0}")]
    ChannelSend(String),

    /// The engine rejected the remote description.
    #[error("remote description: {0}")]
    RemoteDescription(String),
}

/// Factory for peer sessions, implemented by the transport engine glue.
pub trait PeerEngine {
    /// Create the underlying peer session with the given media line and
    /// start local offer generation and candidate gathering.
    ///
    /// The engine is expected to deliver its events to the
    /// [`SignalingSession`] afterwards.
    fn connect(&self, media: &MediaLine) -> Result<Arc<dyn PeerSession>, SignalError>;
}

/// Handle to the engine's peer session.
///
/// Calls are made outside the signaling lock and must not block on network
/// I/O. Errors surface asynchronously through the engine's own channels and
/// are only logged here.
pub trait PeerSession: Send + Sync {
    /// Apply the client's answer as the remote description.
    fn set_remote_description(&self, sdp: &str) -> Result<(), SignalError>;

    /// Release the session and its registered media line.
    fn close(&self);
}

/// Handle to one control channel, e.g. a WebSocket.
pub trait ControlChannel: Send + Sync {
    /// Send one outbound text message. Fire and forget; a failure is logged
    /// by the caller, never retried.
    fn send_text(&self, text: &str) -> Result<(), SignalError>;

    /// Close the channel.
    fn close(&self);
}

/// Observable states of a [`SignalingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// Created, the peer session is not gathering yet.
    New,
    /// Waiting for candidate gathering to finalize the local offer.
    Offering,
    /// Offer final, waiting for a control channel and a ready client.
    AwaitingClient,
    /// Offer sent, waiting for the client's answer.
    Negotiating,
    /// Remote description applied.
    Established,
    /// Torn down. Terminal.
    Closed,
}

/// Callback receiving inbound media payloads, registered by the ingest
/// pipeline.
pub type MediaSink = Box<dyn FnMut(&[u8]) + Send>;

struct Inner {
    state: SignalingState,
    client_ready: bool,
    /// Final local description, present once gathering completes.
    local_description: Option<String>,
    /// The single active control channel, if any.
    channel: Option<Arc<dyn ControlChannel>>,
    /// Whether the description already went out on the current channel.
    sent_on_channel: bool,
    /// None only after close().
    peer: Option<Arc<dyn PeerSession>>,
}

impl Inner {
    /// Check the send preconditions. When they hold, mark the description
    /// sent and hand back what the caller needs to perform the send outside
    /// the lock.
    fn check_send(&mut self) -> Option<(Arc<dyn ControlChannel>, String)> {
        if self.sent_on_channel || !self.client_ready {
            return None;
        }
        let (Some(channel), Some(desc)) = (&self.channel, &self.local_description) else {
            return None;
        };

        let send = (channel.clone(), desc.clone());
        self.sent_on_channel = true;
        if matches!(
            self.state,
            SignalingState::Offering | SignalingState::AwaitingClient
        ) {
            self.state = SignalingState::Negotiating;
        }
        Some(send)
    }
}

/// State machine coordinating the offer/answer exchange for one peer
/// connection.
///
/// Lifecycle: the session is created when ingest starts and closed when the
/// host tears the source down. All `handle_*` entry points are driven by the
/// engine's event context; `close()` may race them from the host side, which
/// is why a closed session is checked first everywhere.
pub struct SignalingSession {
    inner: Mutex<Inner>,
    /// Cancellation token, set under the lock before handles are released.
    /// Checked first at every public entry point.
    closed: AtomicBool,
    media: Mutex<Option<MediaSink>>,
    ready_token: String,
}

impl SignalingSession {
    /// Create the session.
    ///
    /// Connects the peer engine with a single H.264 receive-only media line
    /// per the config, which also starts candidate gathering for the local
    /// offer. An engine failure here is fatal to this session only.
    pub fn new(
        engine: &dyn PeerEngine,
        config: &IngestConfig,
    ) -> Result<SignalingSession, SignalError> {
        let media = MediaLine {
            codec: Codec::H264,
            direction: Direction::RecvOnly,
            payload_type: config.payload_type,
            bitrate_kbps: config.bitrate_kbps,
        };

        let peer = engine.connect(&media)?;
        info!("Peer session created, gathering candidates");

        Ok(SignalingSession {
            inner: Mutex::new(Inner {
                state: SignalingState::Offering,
                client_ready: false,
                local_description: None,
                channel: None,
                sent_on_channel: false,
                peer: Some(peer),
            }),
            closed: AtomicBool::new(false),
            media: Mutex::new(None),
            ready_token: config.ready_token.clone(),
        })
    }

    /// Current observable state.
    pub fn state(&self) -> SignalingState {
        self.lock().state
    }

    /// Whether the session has been torn down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register the callback receiving inbound media payloads. Replaces any
    /// previous callback.
    pub fn set_media_sink(&self, sink: MediaSink) {
        *self.lock_media() = Some(sink);
    }

    /// Candidate gathering finished; `description` is the final local offer.
    ///
    /// Sent right away when a channel is attached and the client signaled
    /// ready, otherwise held until both preconditions are true.
    pub fn handle_gathering_complete(&self, description: String) {
        if self.is_closed() {
            return;
        }

        let send = {
            let mut inner = self.lock();
            if inner.state == SignalingState::Closed {
                return;
            }
            info!("Candidate gathering complete, local description final");
            inner.local_description = Some(description);

            let send = inner.check_send();
            if send.is_none() && inner.state == SignalingState::Offering {
                inner.state = SignalingState::AwaitingClient;
            }
            send
        };

        self.send_description(send);
    }

    /// A control channel connected.
    ///
    /// The first channel is adopted. Any further channel arriving while one
    /// is held is closed immediately and never replaces the active one.
    pub fn handle_channel_open(&self, channel: Arc<dyn ControlChannel>) {
        if self.is_closed() {
            channel.close();
            return;
        }

        let adopted = {
            let mut inner = self.lock();
            if inner.state == SignalingState::Closed || inner.channel.is_some() {
                None
            } else {
                inner.channel = Some(channel.clone());
                inner.sent_on_channel = false;
                Some(inner.check_send())
            }
        };

        match adopted {
            Some(send) => {
                debug!("Control channel attached");
                self.send_description(send);
            }
            None => {
                warn!("Refusing control channel, one is already active");
                channel.close();
            }
        }
    }

    /// The active control channel went away.
    ///
    /// The session stays alive; a new channel may attach later and signaling
    /// resumes. A new channel means a new client, so the readiness flag is
    /// cleared along with the channel.
    pub fn handle_channel_closed(&self) {
        if self.is_closed() {
            return;
        }

        let mut inner = self.lock();
        if inner.state == SignalingState::Closed {
            return;
        }
        if inner.channel.take().is_some() {
            debug!("Control channel lost");
            inner.client_ready = false;
            inner.sent_on_channel = false;
        }
    }

    /// One inbound text message from the client: either the readiness token
    /// or the answer description.
    pub fn handle_message(&self, text: &str) {
        if self.is_closed() {
            return;
        }

        if text == self.ready_token {
            let send = {
                let mut inner = self.lock();
                if inner.state == SignalingState::Closed {
                    return;
                }
                inner.client_ready = true;
                inner.check_send()
            };
            self.send_description(send);
            return;
        }

        // Anything else is the client's answer.
        let peer = {
            let mut inner = self.lock();
            if inner.state == SignalingState::Closed {
                return;
            }
            if inner.local_description.is_none() {
                warn!("Ignoring answer, no local offer exists yet");
                return;
            }
            let Some(peer) = inner.peer.clone() else {
                return;
            };
            // Reapplying after Established is allowed; the engine validates
            // the semantics.
            inner.state = SignalingState::Established;
            peer
        };

        debug!("Applying remote description, {} bytes", text.len());
        if let Err(e) = peer.set_remote_description(text) {
            warn!("Engine rejected remote description: {}", e);
        }
    }

    /// Inbound media payload, forwarded to the registered media sink.
    ///
    /// Per connection single writer: only the engine's event delivery
    /// context calls this.
    pub fn handle_media(&self, payload: &[u8]) {
        if self.is_closed() {
            return;
        }
        if let Some(sink) = self.lock_media().as_mut() {
            sink(payload);
        }
    }

    /// Tear the session down.
    ///
    /// Marks the session closed first, then releases the control channel and
    /// the peer session outside the lock. Events observed after this are
    /// no-ops. Idempotent.
    pub fn close(&self) {
        let (channel, peer) = {
            let mut inner = self.lock();
            if inner.state == SignalingState::Closed {
                return;
            }
            self.closed.store(true, Ordering::SeqCst);
            inner.state = SignalingState::Closed;
            inner.client_ready = false;
            inner.local_description = None;
            (inner.channel.take(), inner.peer.take())
        };

        *self.lock_media() = None;

        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(peer) = peer {
            peer.close();
        }
        info!("Signaling session closed");
    }

    /// Perform a send decided under the lock. Outward calls never happen
    /// with the lock held since the engine may reenter us from them.
    fn send_description(&self, send: Option<(Arc<dyn ControlChannel>, String)>) {
        let Some((channel, desc)) = send else {
            return;
        };
        info!("Sending local description to client");
        if let Err(e) = channel.send_text(&desc) {
            warn!("Failed to send local description: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_media(&self) -> MutexGuard<'_, Option<MediaSink>> {
        self.media.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SignalingSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Engine {
        peer: Arc<Peer>,
        fail: bool,
    }

    impl PeerEngine for Engine {
        fn connect(&self, media: &MediaLine) -> Result<Arc<dyn PeerSession>, SignalError> {
            if self.fail {
                return Err(SignalError::Engine("no session".into()));
            }
            assert_eq!(media.direction, Direction::RecvOnly);
            Ok(self.peer.clone())
        }
    }

    #[derive(Default)]
    struct Peer {
        remote: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl PeerSession for Peer {
        fn set_remote_description(&self, sdp: &str) -> Result<(), SignalError> {
            self.remote.lock().unwrap().push(sdp.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct Channel {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl ControlChannel for Channel {
        fn send_text(&self, text: &str) -> Result<(), SignalError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn session() -> (SignalingSession, Arc<Peer>) {
        let engine = Engine::default();
        let peer = engine.peer.clone();
        let session = SignalingSession::new(&engine, &IngestConfig::new()).unwrap();
        (session, peer)
    }

    #[test]
    fn engine_failure_is_fatal_to_construction() {
        let engine = Engine {
            fail: true,
            ..Default::default()
        };
        assert!(SignalingSession::new(&engine, &IngestConfig::new()).is_err());
    }

    #[test]
    fn gathering_without_channel_awaits_client() {
        let (session, _) = session();
        assert_eq!(session.state(), SignalingState::Offering);

        session.handle_gathering_complete("v=0 offer".into());
        assert_eq!(session.state(), SignalingState::AwaitingClient);
    }

    #[test]
    fn ready_client_gets_description_exactly_once() {
        let (session, _) = session();
        session.handle_gathering_complete("v=0 offer".into());

        let channel = Arc::new(Channel::default());
        session.handle_channel_open(channel.clone());
        assert!(channel.sent.lock().unwrap().is_empty());

        session.handle_message("ready");
        assert_eq!(*channel.sent.lock().unwrap(), vec!["v=0 offer"]);
        assert_eq!(session.state(), SignalingState::Negotiating);

        // A second "ready" does not send again.
        session.handle_message("ready");
        assert_eq!(channel.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn ready_before_gathering_sends_on_completion() {
        let (session, _) = session();

        let channel = Arc::new(Channel::default());
        session.handle_channel_open(channel.clone());
        session.handle_message("ready");
        assert!(channel.sent.lock().unwrap().is_empty());

        session.handle_gathering_complete("v=0 offer".into());
        assert_eq!(*channel.sent.lock().unwrap(), vec!["v=0 offer"]);
        assert_eq!(session.state(), SignalingState::Negotiating);
    }

    #[test]
    fn second_channel_is_refused() {
        let (session, _) = session();
        session.handle_gathering_complete("v=0 offer".into());

        let first = Arc::new(Channel::default());
        let second = Arc::new(Channel::default());
        session.handle_channel_open(first.clone());
        session.handle_channel_open(second.clone());

        assert!(second.closed.load(Ordering::SeqCst));
        assert!(!first.closed.load(Ordering::SeqCst));

        // The first channel remains the active one.
        session.handle_message("ready");
        assert_eq!(first.sent.lock().unwrap().len(), 1);
        assert!(second.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn channel_reattach_resumes_signaling() {
        let (session, _) = session();
        session.handle_gathering_complete("v=0 offer".into());

        let first = Arc::new(Channel::default());
        session.handle_channel_open(first.clone());
        session.handle_message("ready");
        assert_eq!(first.sent.lock().unwrap().len(), 1);

        session.handle_channel_closed();

        // A new client connects and signals ready; the description is sent
        // again on the new channel.
        let second = Arc::new(Channel::default());
        session.handle_channel_open(second.clone());
        assert!(second.sent.lock().unwrap().is_empty());
        session.handle_message("ready");
        assert_eq!(*second.sent.lock().unwrap(), vec!["v=0 offer"]);
    }

    #[test]
    fn answer_applies_remote_description() {
        let (session, peer) = session();
        session.handle_gathering_complete("v=0 offer".into());

        let channel = Arc::new(Channel::default());
        session.handle_channel_open(channel);
        session.handle_message("ready");

        session.handle_message("v=0 answer");
        assert_eq!(session.state(), SignalingState::Established);
        assert_eq!(*peer.remote.lock().unwrap(), vec!["v=0 answer"]);

        // Reapplying is accepted.
        session.handle_message("v=0 answer again");
        assert_eq!(session.state(), SignalingState::Established);
        assert_eq!(peer.remote.lock().unwrap().len(), 2);
    }

    #[test]
    fn answer_before_offer_is_ignored() {
        let (session, peer) = session();
        session.handle_message("v=0 answer");
        assert!(peer.remote.lock().unwrap().is_empty());
        assert_eq!(session.state(), SignalingState::Offering);
    }

    #[test]
    fn media_reaches_registered_sink() {
        let (session, _) = session();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        session.set_media_sink(Box::new(move |payload| {
            assert_eq!(payload, &[1, 2, 3]);
            c.fetch_add(1, Ordering::SeqCst);
        }));

        session.handle_media(&[1, 2, 3]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_releases_handles_and_gates_events() {
        let (session, peer) = session();
        session.handle_gathering_complete("v=0 offer".into());
        let channel = Arc::new(Channel::default());
        session.handle_channel_open(channel.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        session.set_media_sink(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        session.close();
        assert_eq!(session.state(), SignalingState::Closed);
        assert!(channel.closed.load(Ordering::SeqCst));
        assert!(peer.closed.load(Ordering::SeqCst));

        // Late events delivered by the engine are no-ops.
        session.handle_message("ready");
        session.handle_message("v=0 answer");
        session.handle_gathering_complete("v=0 late".into());
        session.handle_media(&[1, 2, 3]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(peer.remote.lock().unwrap().is_empty());
        assert_eq!(session.state(), SignalingState::Closed);

        // A channel arriving after close is closed right away.
        let late = Arc::new(Channel::default());
        session.handle_channel_open(late.clone());
        assert!(late.closed.load(Ordering::SeqCst));

        // Closing again is fine.
        session.close();
    }

    #[test]
    fn custom_ready_token() {
        let engine = Engine::default();
        let peer = engine.peer.clone();
        let config = IngestConfig::new().set_ready_token("go");
        let session = SignalingSession::new(&engine, &config).unwrap();
        session.handle_gathering_complete("v=0 offer".into());

        let channel = Arc::new(Channel::default());
        session.handle_channel_open(channel.clone());

        // With the token renamed, "ready" is just another answer text.
        session.handle_message("ready");
        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(*peer.remote.lock().unwrap(), vec!["ready"]);

        session.handle_message("go");
        assert_eq!(*channel.sent.lock().unwrap(), vec!["v=0 offer"]);
    }
}
