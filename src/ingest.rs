//! The ingest orchestrator: from opaque transport payloads to decoded
//! frames.
//!
//! [`MediaIngest`] is the per-connection media path. Each payload delivered
//! by the signaling session is parsed as one RTP packet, fed through the
//! bitstream reassembler, and the completed units of that batch are written
//! to the decode interface in one go. Any frame the decoder has ready is
//! forwarded to the frame sink.

use std::sync::Arc;

use thiserror::Error;

use crate::media::VideoFrame;
use crate::packet::H264Reassembler;
use crate::rtp::{extend_u16, RtpPacket};
use crate::signal::{PeerEngine, SignalingSession};
use crate::{IngestConfig, IngestError};

/// Errors surfaced by the external decode interface.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder could not consume input or produce a frame.
    #[error("decoder: {0}")]
    Decoder(String),
}

/// The external decode interface.
///
/// A streaming pair in the style of a bitstream parser feeding a decoder:
/// writes carry arbitrary slices of the Annex B stream and the decoder keeps
/// its own parse state across them.
pub trait Decoder: Send {
    /// Write a batch of bitstream bytes.
    fn write(&mut self, bitstream: &[u8]) -> Result<(), DecodeError>;

    /// Fetch one decoded frame if ready. Never blocks; `None` simply means
    /// no frame yet.
    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn write(&mut self, bitstream: &[u8]) -> Result<(), DecodeError> {
        (**self).write(bitstream)
    }

    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        (**self).poll_frame()
    }
}

/// Receives decoded frames.
///
/// The frame and its plane buffers are borrowed for the duration of the
/// call only.
pub trait FrameSink: Send {
    /// One decoded frame.
    fn frame(&mut self, frame: &VideoFrame);
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn frame(&mut self, frame: &VideoFrame) {
        (**self).frame(frame)
    }
}

/// Per-connection media pipeline state.
///
/// Single writer: only the engine's event delivery context feeds it, via the
/// callback registered with the signaling session. Per-packet errors are
/// logged and the stream continues; nothing here tears the session down.
pub struct MediaIngest<D, S> {
    depack: H264Reassembler,
    decoder: D,
    sink: S,
    /// Extended sequence of the last packet, for loss logging.
    last_seq: Option<u64>,
    /// Batch output buffer, reused across packets.
    out: Vec<u8>,
}

impl<D: Decoder, S: FrameSink> MediaIngest<D, S> {
    /// Create the pipeline around a decode interface and a frame sink.
    pub fn new(decoder: D, sink: S) -> Self {
        MediaIngest {
            depack: H264Reassembler::new(),
            decoder,
            sink,
            last_seq: None,
            out: Vec::new(),
        }
    }

    /// Handle one opaque payload buffer from the transport.
    pub fn handle_packet(&mut self, buf: &[u8]) {
        let packet = match RtpPacket::parse(buf) {
            Ok(v) => v,
            Err(e) => {
                debug!("Dropping unparseable RTP packet: {}", e);
                return;
            }
        };
        trace!(
            "RTP pt {} seq {} ts {} marker {} payload {}B",
            packet.payload_type,
            packet.sequence_number,
            packet.timestamp,
            packet.marker,
            packet.payload.len()
        );

        self.track_sequence(packet.sequence_number);

        self.out.clear();
        if let Err(e) = self.depack.feed(packet.payload, &mut self.out) {
            // Units completed before the malformed part are still in the
            // batch and go to the decoder below.
            debug!("Dropping malformed payload remainder: {}", e);
        }
        if self.out.is_empty() {
            return;
        }

        if let Err(e) = self.decoder.write(&self.out) {
            warn!("Decoder rejected bitstream write: {}", e);
            return;
        }

        match self.decoder.poll_frame() {
            Ok(Some(frame)) => self.sink.frame(&frame),
            Ok(None) => {}
            Err(e) => warn!("Decoder failed to produce a frame: {}", e),
        }
    }

    /// Reset the reassembly state, e.g. when the sender restarts its stream.
    pub fn reset(&mut self) {
        self.depack.reset();
        self.last_seq = None;
    }

    fn track_sequence(&mut self, seq_no: u16) {
        let seq = extend_u16(self.last_seq, seq_no);
        if let Some(prev) = self.last_seq {
            if seq > prev + 1 {
                debug!("Sequence gap, {} packets lost", seq - prev - 1);
            } else if seq < prev {
                trace!("Out of order packet, seq {} after {}", seq, prev);
            }
        }
        self.last_seq = Some(seq);
    }
}

/// A running ingest pipeline: one signaling session with the media path
/// wired through parser, reassembler and decoder into the frame sink.
pub struct Ingest {
    session: Arc<SignalingSession>,
}

impl Ingest {
    /// Create the signaling session and register the media pipeline as its
    /// media callback.
    ///
    /// Fails only when the peer engine cannot create the underlying session.
    /// Steady-state per-packet errors are logged, never returned.
    pub fn start<D, S>(
        engine: &dyn PeerEngine,
        config: IngestConfig,
        decoder: D,
        sink: S,
    ) -> Result<Ingest, IngestError>
    where
        D: Decoder + 'static,
        S: FrameSink + 'static,
    {
        let session = Arc::new(SignalingSession::new(engine, &config)?);

        let mut media = MediaIngest::new(decoder, sink);
        session.set_media_sink(Box::new(move |payload| media.handle_packet(payload)));

        Ok(Ingest { session })
    }

    /// The signaling session, for wiring the engine's events.
    pub fn session(&self) -> &Arc<SignalingSession> {
        &self.session
    }

    /// Tear the session down. Idempotent; also happens on drop.
    pub fn stop(&self) {
        self.session.close();
    }
}

impl Drop for Ingest {
    fn drop(&mut self) {
        self.session.close();
    }
}
