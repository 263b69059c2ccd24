use super::PacketError;

// NALU types, https://tools.ietf.org/html/rfc6184#section-5.4
pub const SINGLE_NALU_TYPE: u8 = 1;
pub const STAPA_NALU_TYPE: u8 = 24;
pub const FUA_NALU_TYPE: u8 = 28;

pub const STAPA_HEADER_SIZE: usize = 1;
pub const STAPA_NALU_LENGTH_SIZE: usize = 2;
pub const FUA_HEADER_SIZE: usize = 2;

pub const NALU_TYPE_BITMASK: u8 = 0x1f;
pub const NALU_FNRI_BITMASK: u8 = 0b1110_0000;
pub const FU_START_BITMASK: u8 = 0x80;
pub const FU_END_BITMASK: u8 = 0x40;

pub static ANNEXB_NALUSTART_CODE: &[u8] = &[0x00, 0x00, 0x01];

/// Reassembles an Annex B H.264 bitstream from RTP payloads.
///
/// Single NAL units (type 1) and STAP-A aggregates (type 24) complete within
/// one payload and are emitted immediately. FU-A fragments (type 28)
/// accumulate in an owned per-stream buffer; the reassembled unit is emitted
/// when the fragment carrying the end bit arrives. Any other NALU type is
/// skipped without error so that unsupported unit types pass by harmlessly.
///
/// Completed units are appended to the caller's output buffer, each prefixed
/// with the Annex B start code. The decoder is a streaming parser, so unit
/// boundaries inside one batch need no further framing.
#[derive(Debug, Default, Clone)]
pub struct H264Reassembler {
    /// Accumulates start code, reconstructed NALU header and fragment bytes
    /// while an FU-A is in flight.
    frag: Vec<u8>,
    /// A fragment start has been seen without its end bit yet.
    in_fragment: bool,
}

impl H264Reassembler {
    /// Create a reassembler with empty fragmentation state.
    pub fn new() -> Self {
        H264Reassembler::default()
    }

    /// Feed one RTP payload, appending zero or more completed units to
    /// `out`. Returns the number of units appended.
    ///
    /// On error, units completed earlier in the same payload remain in
    /// `out`; only the malformed remainder is dropped.
    pub fn feed(&mut self, payload: &[u8], out: &mut Vec<u8>) -> Result<usize, PacketError> {
        if payload.is_empty() {
            return Err(PacketError::ShortPacket);
        }

        let nalu_type = payload[0] & NALU_TYPE_BITMASK;

        match nalu_type {
            SINGLE_NALU_TYPE => {
                self.drop_stale_fragment();
                out.extend_from_slice(ANNEXB_NALUSTART_CODE);
                out.extend_from_slice(payload);
                Ok(1)
            }
            STAPA_NALU_TYPE => {
                self.drop_stale_fragment();
                let mut emitted = 0;
                let mut offset = STAPA_HEADER_SIZE;
                // Trailing bytes too short for a length field end the loop.
                while offset + STAPA_NALU_LENGTH_SIZE <= payload.len() {
                    let size =
                        u16::from_be_bytes([payload[offset], payload[offset + 1]]) as usize;
                    offset += STAPA_NALU_LENGTH_SIZE;

                    if offset + size > payload.len() {
                        return Err(PacketError::AggregateOverrun(
                            size,
                            payload.len() - offset,
                        ));
                    }

                    out.extend_from_slice(ANNEXB_NALUSTART_CODE);
                    out.extend_from_slice(&payload[offset..offset + size]);
                    offset += size;
                    emitted += 1;
                }
                Ok(emitted)
            }
            FUA_NALU_TYPE => {
                if payload.len() < FUA_HEADER_SIZE {
                    return Err(PacketError::ShortPacket);
                }

                let indicator = payload[0];
                let header = payload[1];

                if header & FU_START_BITMASK != 0 {
                    self.drop_stale_fragment();
                    self.frag.extend_from_slice(ANNEXB_NALUSTART_CODE);
                    // The original NALU header is spread over the indicator
                    // (F and NRI bits) and the fragment header (type bits).
                    self.frag
                        .push((indicator & NALU_FNRI_BITMASK) | (header & NALU_TYPE_BITMASK));
                    self.in_fragment = true;
                } else if !self.in_fragment {
                    trace!("Dropping FU-A continuation without a start fragment");
                    return Ok(0);
                }

                self.frag.extend_from_slice(&payload[FUA_HEADER_SIZE..]);

                if header & FU_END_BITMASK != 0 {
                    out.append(&mut self.frag);
                    self.in_fragment = false;
                    Ok(1)
                } else {
                    Ok(0)
                }
            }
            _ => {
                trace!("Skipping unhandled NALU type {}", nalu_type);
                Ok(0)
            }
        }
    }

    /// Discard any partially accumulated fragment, for stream resets.
    pub fn reset(&mut self) {
        self.frag.clear();
        self.in_fragment = false;
    }

    /// A fragment that never saw its end bit is dropped when the stream
    /// moves on. Its bytes must not leak into the next unit.
    fn drop_stale_fragment(&mut self) {
        if self.in_fragment {
            debug!(
                "Dropping unfinished fragment of {} bytes",
                self.frag.len()
            );
        }
        self.frag.clear();
        self.in_fragment = false;
    }
}
