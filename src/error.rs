//! Error types for the ROHC decompression engine.
//!
//! This module distinguishes between parsing errors (malformed input on the
//! wire), decompression errors (context or CRC trouble), and packet building
//! errors. The `thiserror` crate is used for ergonomic error definitions.
//!
//! Errors never mutate committed context state: a failing packet leaves its
//! context exactly as it was before the packet was offered.

use thiserror::Error;

use crate::types::{ContextId, GenId};

/// Context types for parsing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseContext {
    RohcPacketInput,
    CidParsing,
    SdvlValue,
    IrPacketHeader,
    StaticChain,
    DynamicChain,
    UoPacketCore,
    UoPacketExtension,
    ListEncoding,
    ListItem,
    UncompressedPassthrough,
    FeedbackPayload,
}

impl std::fmt::Display for ParseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RohcPacketInput => "ROHC packet input",
            Self::CidParsing => "CID parsing",
            Self::SdvlValue => "SDVL-encoded value",
            Self::IrPacketHeader => "IR packet header",
            Self::StaticChain => "static chain",
            Self::DynamicChain => "dynamic chain",
            Self::UoPacketCore => "UO packet core",
            Self::UoPacketExtension => "UO packet extension",
            Self::ListEncoding => "extension-header list encoding",
            Self::ListItem => "extension-header list item",
            Self::UncompressedPassthrough => "uncompressed passthrough packet",
            Self::FeedbackPayload => "feedback payload",
        };
        write!(f, "{}", s)
    }
}

/// Field types for structured error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Cid,
    ProfileId,
    IpVersion,
    IpProtocol,
    SnLsb,
    TsLsb,
    IpIdLsb,
    NumLsbBits,
    GenId,
    XiIndex,
    ListEncodingType,
    ItemLength,
    ExtensionDiscriminator,
    BufferSize,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Cid => "CID",
            Self::ProfileId => "profile ID",
            Self::IpVersion => "IP version",
            Self::IpProtocol => "IP protocol",
            Self::SnLsb => "sn_lsb",
            Self::TsLsb => "ts_lsb",
            Self::IpIdLsb => "ip_id_lsb",
            Self::NumLsbBits => "num_lsb_bits",
            Self::GenId => "gen_id",
            Self::XiIndex => "XI index",
            Self::ListEncodingType => "list encoding type",
            Self::ItemLength => "item length",
            Self::ExtensionDiscriminator => "extension discriminator",
            Self::BufferSize => "buffer size",
        };
        write!(f, "{}", s)
    }
}

/// CRC flavors used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcType {
    /// 3-bit CRC over UO-0/UO-1 reconstructions.
    Crc3,
    /// 7-bit CRC over UOR-2 reconstructions.
    Crc7,
    /// 8-bit CRC over IR/IR-DYN headers.
    Crc8,
}

impl std::fmt::Display for CrcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Crc3 => "CRC-3",
            Self::Crc7 => "CRC-7",
            Self::Crc8 => "CRC-8",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised while parsing bytes off the wire (the MALFORMED family).
///
/// These indicate issues with the format or content of an incoming ROHC
/// packet: truncated SDVL values, unknown packet-type prefixes, impossible
/// extension or list-encoding combinations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RohcParsingError {
    /// Insufficient data to parse a complete field or structure.
    #[error("Incomplete packet data: needed {needed} bytes, got {got} for {context}")]
    NotEnoughData {
        needed: usize,
        got: usize,
        context: ParseContext,
    },

    /// Unrecognized ROHC packet type discriminator.
    #[error("Invalid ROHC packet type discriminator: 0x{discriminator:02X}")]
    InvalidPacketType { discriminator: u8 },

    /// Invalid IP version nibble in a static chain or rebuilt header.
    #[error("Invalid IP version: expected {expected}, got {got}")]
    InvalidIpVersion { expected: u8, got: u8 },

    /// A field contained an invalid or unexpected value.
    #[error("Invalid value for field '{field}' in {context}: expected {expected}, got {got}")]
    InvalidFieldValue {
        field: Field,
        context: ParseContext,
        expected: u32,
        got: u32,
    },

    /// CRC validation failed, indicating corruption or context mismatch.
    #[error("CRC mismatch: expected 0x{expected:X}, got 0x{calculated:X} for {crc_type}")]
    CrcMismatch {
        expected: u8,
        calculated: u8,
        crc_type: CrcType,
    },

    /// LSB encoding operation received invalid parameters.
    #[error("Invalid LSB operation for field '{field}': {description}")]
    InvalidLsbOperation {
        field: Field,
        description: &'static str,
    },

    /// An extension-header list encoding could not be interpreted.
    #[error("Invalid list encoding (ET={encoding_type}): {description}")]
    InvalidListEncoding {
        encoding_type: u8,
        description: &'static str,
    },
}

/// Errors raised while building packets (feedback, SDVL values).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RohcBuildingError {
    /// Provided buffer was too small for the packet being built.
    #[error("Buffer too small: needed {needed} bytes, have {available} for {context}")]
    BufferTooSmall {
        needed: usize,
        available: usize,
        context: ParseContext,
    },

    /// Value does not fit the encoding being produced.
    #[error("Invalid value for field '{field}': {value} exceeds {max_bits}-bit limit")]
    ValueTooLarge {
        field: Field,
        value: u32,
        max_bits: u8,
    },
}

/// Errors raised during decompression proper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompressionError {
    /// No usable context for the given CID (unknown CID with a non-IR
    /// packet, or a context demoted below the level the packet requires).
    #[error("No context for {cid}")]
    NoContext { cid: ContextId },

    /// CRC validation failed and both repair strategies were exhausted.
    #[error("Unrepairable CRC failure in context {cid}: received 0x{received:X} ({crc_type})")]
    CrcUnrepairable {
        cid: ContextId,
        received: u8,
        crc_type: CrcType,
    },

    /// A list encoding referenced a generation no longer in the window.
    #[error("List reference {gen_id} missing from window in context {cid}")]
    ListReferenceMissing { cid: ContextId, gen_id: GenId },

    /// Profile byte in an IR packet is not enabled on this channel.
    #[error("Unsupported ROHC profile: 0x{0:02X}")]
    UnsupportedProfile(u8),

    /// CID exceeds the channel's configured `max_cid`.
    #[error("CID {cid} exceeds configured maximum {max_cid}")]
    CidOutOfRange { cid: ContextId, max_cid: ContextId },

    /// Packet parsing failed during decompression.
    #[error("Packet parsing failed: {0}")]
    ParsingFailed(#[from] RohcParsingError),
}

/// Top-level error type for the decompression engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RohcError {
    /// Error during decompression operations.
    #[error("Decompression error: {0}")]
    Decompression(#[from] DecompressionError),

    /// Error during packet parsing.
    #[error("Parsing error: {0}")]
    Parsing(#[from] RohcParsingError),

    /// Error during packet building.
    #[error("Building error: {0}")]
    Building(#[from] RohcBuildingError),
}

impl RohcError {
    /// Returns true if this error is expected under packet loss conditions.
    ///
    /// These errors represent normal ROHC protocol behavior when packets are
    /// lost or corrupted on the channel and should typically be handled
    /// gracefully by callers (e.g., by emitting a NACK) rather than treated
    /// as implementation failures.
    pub fn is_expected_with_packet_loss(&self) -> bool {
        matches!(
            self,
            RohcError::Parsing(RohcParsingError::CrcMismatch { .. })
                | RohcError::Decompression(DecompressionError::NoContext { .. })
                | RohcError::Decompression(DecompressionError::CrcUnrepairable { .. })
                | RohcError::Decompression(DecompressionError::ListReferenceMissing { .. })
                | RohcError::Decompression(DecompressionError::ParsingFailed(
                    RohcParsingError::CrcMismatch { .. }
                ))
        )
    }
}
