//! `rohcdec`: a ROHC (Robust Header Compression, RFC 3095) decompression
//! engine for the generic IP / IP-in-IP / next-header profile family.
//!
//! The engine takes compressed ROHC packets off the wire and reconstructs
//! the original IP headers. It covers per-flow context management with the
//! NO_CONTEXT / STATIC_CONTEXT / FULL_CONTEXT lifecycle, W-LSB decoding of
//! wraparound counters, IPv6 extension-header list decompression with the
//! generation-id protocol, small and large CID framing, packet-type
//! discrimination (IR, IR-DYN, UO-0, UO-1*, UOR-2* with extensions 0..3),
//! and CRC-based validation with the RFC 3095 correction-counter repair
//! procedure.
//!
//! ## Core concepts
//!
//! - **[`RohcDecompressor`]**: the per-channel engine. Configure it with a
//!   [`DecompressorConfig`] (CID encoding, enabled profiles, repair budget,
//!   list window) and feed it packets.
//! - **Contexts**: one per flow (CID), created when an IR packet arrives
//!   for a new CID and mutated only by CRC-validated reconstructions.
//! - **Repair**: a failed CRC first tries SN wraparound repair, then
//!   clock-based repair; exhaustion demotes the context until the
//!   compressor resynchronizes it with IR/IR-DYN.
//!
//! ## Quick start
//!
//! ```rust
//! use rohcdec::RohcDecompressor;
//!
//! let mut engine = RohcDecompressor::with_defaults();
//! // Feed ROHC packets from the channel; each success yields the rebuilt
//! // uncompressed packet (headers plus payload).
//! # let ir_packet: &[u8] = &[];
//! match engine.decompress(ir_packet) {
//!     Ok(packet) => { /* deliver upward */ let _ = packet; }
//!     Err(err) if err.is_expected_with_packet_loss() => { /* NACK, drop */ }
//!     Err(err) => { /* malformed input */ let _ = err; }
//! }
//! ```

pub mod bitstream;
pub mod constants;
pub mod context_manager;
pub mod crc;
pub mod encodings;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod packet_defs;
pub mod profiles;
pub mod time;
pub mod types;

pub use engine::{DecompressorConfig, RohcDecompressor};
pub use error::{
    CrcType, DecompressionError, Field, ParseContext, RohcBuildingError, RohcError,
    RohcParsingError,
};
pub use feedback::FeedbackAckType;
pub use packet_defs::{CidType, RohcProfile};
pub use time::{Clock, SystemClock};
pub use types::{ContextId, GenId, IpId, SequenceNumber, Ssrc, Timestamp};
