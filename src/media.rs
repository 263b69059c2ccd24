//! Media-facing data model: the registered media line and decoded frames.

use crate::rtp::Pt;

/// Codecs this crate can register with the peer engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Codec {
    /// H.264 / AVC.
    H264,
}

impl Codec {
    /// The codec name as used in signaling.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
        }
    }
}

/// Direction of a media line, from our point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Send only.
    SendOnly,
    /// Receive only.
    RecvOnly,
    /// Both send and receive.
    SendRecv,
    /// Disabled direction.
    Inactive,
}

/// The media line registered with the peer session on construction.
///
/// This pipeline is single track: exactly one video line, receive only.
#[derive(Debug, Clone)]
pub struct MediaLine {
    /// Codec to negotiate.
    pub codec: Codec,
    /// Direction of the line. Always [`Direction::RecvOnly`] here.
    pub direction: Direction,
    /// RTP payload type to negotiate for the codec.
    pub payload_type: Pt,
    /// Target receive bitrate in kbit/s, signaled to the sender.
    pub bitrate_kbps: u32,
}

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, three planes with half resolution chroma.
    I420,
}

/// Color matrix coefficients for YUV to RGB conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMatrix {
    /// ITU-R BT.601, standard definition.
    Bt601,
    /// ITU-R BT.709, high definition.
    Bt709,
}

/// Quantization range of the pixel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    /// Limited (video) range, 16..235 for luma.
    Limited,
    /// Full range, 0..255.
    Full,
}

/// One plane of a planar video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Raw plane bytes, `stride * rows` long.
    pub data: Vec<u8>,
    /// Bytes per row, possibly larger than the visible width.
    pub stride: usize,
}

/// One decoded video frame.
///
/// Produced by the decode interface and handed to the frame sink by
/// borrow. The sink must copy what it wants to keep beyond the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    /// Pixel layout of [`planes`][VideoFrame::planes].
    pub format: PixelFormat,
    /// Color matrix the pixels were encoded with.
    pub matrix: ColorMatrix,
    /// Quantization range of the pixels.
    pub range: ColorRange,
    /// Plane buffers. Three planes for [`PixelFormat::I420`].
    pub planes: Vec<Plane>,
}
