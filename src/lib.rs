//! Video ingest over WebRTC in Sans I/O style.
//!
//! This crate reconstructs an Annex B H.264 bitstream from RTP packets
//! delivered by a real-time transport engine and hands decoded frames to a
//! consumer. It owns the media pipeline and the offer/answer signaling state
//! machine, but deliberately not the transport itself: ICE, DTLS, SRTP and
//! socket I/O stay in the engine, and turning bitstream bytes into pixels
//! stays in the decoder. Both are reached through narrow traits implemented
//! by the host.
//!
//! The pipeline is single peer, single video track:
//!
//! ```text
//!  engine events ──> SignalingSession ──media payload──> MediaIngest
//!                         │                                  │
//!                 ControlChannel (text)             RtpPacket::parse
//!                 PeerSession (SDP)                 H264Reassembler
//!                                                       Decoder
//!                                                          │
//!                                                      FrameSink
//! ```
//!
//! # Usage
//!
//! The host bridges its transport engine by implementing [`PeerEngine`],
//! [`PeerSession`][signal::PeerSession] and
//! [`ControlChannel`][signal::ControlChannel], then forwards the engine's
//! events to the [`SignalingSession`]:
//!
//! ```no_run
//! use webrtc_ingest::{Ingest, IngestConfig};
//! use webrtc_ingest::signal::PeerEngine;
//! use webrtc_ingest::ingest::{Decoder, FrameSink};
//!
//! let engine: &dyn PeerEngine = todo!("bridge to your transport engine");
//! let decoder: Box<dyn Decoder> = todo!("bridge to your H.264 decoder");
//! let sink: Box<dyn FrameSink> = todo!("where decoded frames go");
//!
//! let ingest = Ingest::start(engine, IngestConfig::new(), decoder, sink).unwrap();
//! let session = ingest.session().clone();
//!
//! // Wire the engine's event callbacks to the session:
//! //   gathering complete       -> session.handle_gathering_complete(sdp)
//! //   control channel opened   -> session.handle_channel_open(channel)
//! //   control channel closed   -> session.handle_channel_closed()
//! //   inbound text message     -> session.handle_message(&text)
//! //   media payload            -> session.handle_media(&payload)
//!
//! // Tear down when the host stops the source.
//! ingest.stop();
//! ```
//!
//! # Error handling
//!
//! Construction-time failures (the engine refusing to create a session) are
//! returned as [`IngestError`]. Steady-state per-packet problems, such as a
//! malformed RTP header or a bad aggregate length, are logged and the stream
//! continues; a damaged packet never terminates the session.
//!
//! Logging uses the [`tracing`] crate. Per-packet noise is `trace!`,
//! recoverable drops are `debug!` and protocol violations are `warn!`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

use thiserror::Error;

mod config;
pub use config::IngestConfig;

pub mod ingest;
pub use ingest::Ingest;

pub mod media;

pub mod packet;

pub mod rtp;

pub mod signal;
pub use signal::PeerEngine;
pub use signal::{SignalingSession, SignalingState};

/// Errors creating the ingest pipeline.
///
/// Fatal to the session being created, never to the process. Per-packet
/// errors during a running session are logged, not surfaced here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The signaling session could not be set up with the peer engine.
    #[error("{0}")]
    Signal(#[from] signal::SignalError),
}
