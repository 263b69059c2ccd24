//! Parsing of RTP packets as delivered by the transport engine.
//!
//! The engine hands over whole, already decrypted packets. Parsing is a pure
//! function of the input buffer; the payload is a borrowed view, no copies
//! are made. Rejected packets are meant to be dropped by the caller without
//! terminating the stream.

use std::fmt;
use std::ops::Deref;

use thiserror::Error;

/// Reasons an RTP packet is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RtpError {
    /// Buffer shorter than the 12 byte fixed header.
    #[error("RTP packet shorter than fixed header: {0} bytes")]
    TooShort(usize),

    /// A header region (csrc list, extension) runs past the buffer.
    #[error("RTP header truncated in {0}")]
    Truncated(&'static str),

    /// The declared padding exceeds the payload.
    #[error("RTP padding {pad} exceeds payload length {payload}")]
    InvalidPadding {
        /// Padding byte count declared in the last byte of the packet.
        pad: usize,
        /// Payload length left after the header regions.
        payload: usize,
    },
}

macro_rules! num_id {
    ($(#[$attr:meta])* $id:ident, $t:ty) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $id($t);

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

num_id!(
    /// RTP payload type (7 bits), correlated to a codec via signaling.
    Pt,
    u8
);
num_id!(
    /// Synchronization source identifier of an RTP stream.
    Ssrc,
    u32
);

/// One parsed RTP packet.
///
/// Borrows the input buffer; [`payload`][RtpPacket::payload] is the region
/// after header, csrc list, extension block and minus any padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    /// Protocol version, top two bits of the first byte. Always 2 on the wire.
    pub version: u8,
    /// Whether the packet carried padding. The padding is already removed
    /// from [`payload`][RtpPacket::payload].
    pub has_padding: bool,
    /// Whether the packet carried a header extension block. The block is
    /// skipped, not interpreted.
    pub has_extension: bool,
    /// For video this marks the last packet of a frame.
    pub marker: bool,
    /// Payload type carried in the packet.
    pub payload_type: Pt,
    /// Sequence number increasing by 1 per packet, wrapping at 16 bits.
    pub sequence_number: u16,
    /// Timestamp in the media time base of the codec.
    pub timestamp: u32,
    /// Sender source identifier.
    pub ssrc: Ssrc,
    /// Contributing sources, 0 to 15 entries. Empty in the common case,
    /// which does not allocate.
    pub csrc: Vec<u32>,
    /// Payload bytes, a view into the input buffer.
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse one packet from a buffer.
    ///
    /// Pure function of the input. Never reads out of bounds; a packet that
    /// declares more csrc entries, extension words or padding than the
    /// buffer holds is rejected.
    pub fn parse(buf: &'a [u8]) -> Result<RtpPacket<'a>, RtpError> {
        if buf.len() < 12 {
            return Err(RtpError::TooShort(buf.len()));
        }

        let version = (buf[0] & 0b1100_0000) >> 6;
        let has_padding = buf[0] & 0b0010_0000 > 0;
        let has_extension = buf[0] & 0b0001_0000 > 0;
        let csrc_count = (buf[0] & 0b0000_1111) as usize;
        let marker = buf[1] & 0b1000_0000 > 0;
        let payload_type = (buf[1] & 0b0111_1111).into();
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]).into();

        let rest = &buf[12..];

        let csrc_len = 4 * csrc_count;
        if rest.len() < csrc_len {
            return Err(RtpError::Truncated("csrc list"));
        }
        let mut csrc = Vec::new();
        for c in rest[..csrc_len].chunks_exact(4) {
            csrc.push(u32::from_be_bytes([c[0], c[1], c[2], c[3]]));
        }

        let rest = &rest[csrc_len..];

        let rest = if has_extension {
            if rest.len() < 4 {
                return Err(RtpError::Truncated("extension header"));
            }
            let ext_words = u16::from_be_bytes([rest[2], rest[3]]) as usize;
            let ext_len = ext_words * 4;

            let rest = &rest[4..];
            if rest.len() < ext_len {
                return Err(RtpError::Truncated("extension block"));
            }
            &rest[ext_len..]
        } else {
            rest
        };

        let mut payload = rest;
        if has_padding {
            // The pad count sits in the very last byte of the packet.
            let pad = buf[buf.len() - 1] as usize;
            if pad > payload.len() {
                return Err(RtpError::InvalidPadding {
                    pad,
                    payload: payload.len(),
                });
            }
            payload = &payload[..payload.len() - pad];
        }

        Ok(RtpPacket {
            version,
            has_padding,
            has_extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            payload,
        })
    }
}

/// "Extend" a 16-bit sequence number into a 64 bit one by using the
/// knowledge of the previous extended number to detect wrap-arounds.
pub fn extend_u16(prev_ext_seq: Option<u64>, seq: u16) -> u64 {
    const MAX: u64 = 1 << 16;
    const HALF: u64 = MAX / 2;
    const ROC_MASK: i64 = (u64::MAX >> 16) as i64;

    let seq = seq as u64;

    let Some(prev_index) = prev_ext_seq else {
        // No wrap-around so far.
        return seq;
    };

    let roc = (prev_index >> 16) as i64; // how many wrap-arounds.
    let prev_seq = prev_index & (MAX - 1);

    let v = if prev_seq < HALF {
        if seq > HALF + prev_seq {
            (roc - 1) & ROC_MASK
        } else {
            roc
        }
    } else if prev_seq > seq + HALF {
        (roc + 1) & ROC_MASK
    } else {
        roc
    };

    if v < 0 {
        return 0;
    }

    (v as u64) * MAX + seq
}
