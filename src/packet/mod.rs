//! Reassembly of the compressed-video bitstream from RTP payloads.
//!
//! The sending side splits the bitstream over packets in three ways: one
//! unit per packet, several small units aggregated into one packet, or one
//! large unit fragmented across many packets. The reassembler undoes all
//! three and emits units framed the way the decoder's stream parser expects
//! them.

mod error;
pub use error::PacketError;

mod h264;
pub use h264::H264Reassembler;
