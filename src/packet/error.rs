use thiserror::Error;

/// Errors arising in bitstream reassembly.
///
/// All of these are local to one packet. The caller drops the packet's
/// remaining contribution and continues the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Payload too short to carry the indicated packetization mode.
    #[error("payload too short for its packetization mode")]
    ShortPacket,

    /// An aggregate entry declared a length running past the payload.
    #[error("aggregate entry size larger than remaining payload: {0} > {1}")]
    AggregateOverrun(usize, usize),
}
