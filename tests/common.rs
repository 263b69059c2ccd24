#![allow(unused)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use webrtc_ingest::ingest::{DecodeError, Decoder, FrameSink};
use webrtc_ingest::media::{ColorMatrix, ColorRange, MediaLine, PixelFormat, Plane, VideoFrame};
use webrtc_ingest::signal::{ControlChannel, PeerEngine, PeerSession, SignalError};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// Peer engine test double handing out one shared peer session.
#[derive(Default)]
pub struct TestEngine {
    pub peer: Arc<TestPeer>,
    pub media: Mutex<Option<MediaLine>>,
}

impl PeerEngine for TestEngine {
    fn connect(&self, media: &MediaLine) -> Result<Arc<dyn PeerSession>, SignalError> {
        *self.media.lock().unwrap() = Some(media.clone());
        Ok(self.peer.clone())
    }
}

#[derive(Default)]
pub struct TestPeer {
    pub remote: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl PeerSession for TestPeer {
    fn set_remote_description(&self, sdp: &str) -> Result<(), SignalError> {
        self.remote.lock().unwrap().push(sdp.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct TestChannel {
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl ControlChannel for TestChannel {
    fn send_text(&self, text: &str) -> Result<(), SignalError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Decode interface test double. Records every write and hands out frames
/// queued via [`TestDecoder::push_frame`].
#[derive(Clone, Default)]
pub struct TestDecoder {
    pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
    pub pending: Arc<Mutex<VecDeque<VideoFrame>>>,
    pub fail_writes: Arc<AtomicBool>,
}

impl TestDecoder {
    pub fn push_frame(&self, frame: VideoFrame) {
        self.pending.lock().unwrap().push_back(frame);
    }

    /// All written bitstream bytes concatenated, the way the decoder's
    /// stream parser sees them.
    pub fn bitstream(&self) -> Vec<u8> {
        self.writes.lock().unwrap().concat()
    }
}

impl Decoder for TestDecoder {
    fn write(&mut self, bitstream: &[u8]) -> Result<(), DecodeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DecodeError::Decoder("write failed".into()));
        }
        self.writes.lock().unwrap().push(bitstream.to_vec());
        Ok(())
    }

    fn poll_frame(&mut self) -> Result<Option<VideoFrame>, DecodeError> {
        Ok(self.pending.lock().unwrap().pop_front())
    }
}

/// Frame sink test double keeping copies of what it was handed.
#[derive(Clone, Default)]
pub struct TestSink {
    pub frames: Arc<Mutex<Vec<VideoFrame>>>,
}

impl FrameSink for TestSink {
    fn frame(&mut self, frame: &VideoFrame) {
        self.frames.lock().unwrap().push(frame.clone());
    }
}

/// Build one RTP packet with payload type 96 and a fixed ssrc.
pub fn rtp(seq: u16, ts: u32, marker: bool, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0_u8; 12];
    buf[0] = 0b1000_0000;
    buf[1] = 96 | if marker { 0x80 } else { 0 };
    buf[2..4].copy_from_slice(&seq.to_be_bytes());
    buf[4..8].copy_from_slice(&ts.to_be_bytes());
    buf[8..12].copy_from_slice(&0x1234_5678_u32.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// A small I420 frame with plausible strides.
pub fn test_frame(width: u32, height: u32) -> VideoFrame {
    let luma = (width as usize) * (height as usize);
    let chroma = luma / 4;
    VideoFrame {
        width,
        height,
        format: PixelFormat::I420,
        matrix: ColorMatrix::Bt709,
        range: ColorRange::Limited,
        planes: vec![
            Plane {
                data: vec![0x10; luma],
                stride: width as usize,
            },
            Plane {
                data: vec![0x80; chroma],
                stride: width as usize / 2,
            },
            Plane {
                data: vec![0x80; chroma],
                stride: width as usize / 2,
            },
        ],
    }
}
