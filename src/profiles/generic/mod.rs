//! The generic IP / IP-in-IP / next-header decompression profile family.
//!
//! RFC 3095's IP-only, UDP, UDP-Lite and RTP profiles share one
//! decompression pipeline: CID routing hands a packet to a context, the
//! parser extracts raw bit bundles, the value decoder resolves them
//! against the context's references, and the builder reconstructs the
//! headers and proves them with a CRC before anything is committed.
//! Profile-specific behavior is a tagged variant
//! ([`protocol_types::NextHeader`]) dispatched per packet.

pub mod builder;
pub mod context;
pub mod decoder;
pub mod decompressor;
pub mod discriminator;
pub mod lists;
pub mod packet_types;
pub mod parser;
pub mod protocol_types;
pub mod repair;

pub use context::{DecompressorMode, GenericDecompressorContext, IpHeaderState};
pub use decompressor::decompress_packet;
pub use discriminator::GenericPacketType;
pub use parser::CidFraming;
pub use protocol_types::{
    ExtensionItem, IpHeader, Ipv4Header, Ipv6Header, NextHeader, ReconstructedHeaders, RtpHeader,
    UdpHeader, UdpLiteHeader,
};
