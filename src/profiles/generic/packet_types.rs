//! Bit bundles and decoded values exchanged between the parser, the value
//! decoder and the header builder.
//!
//! The parser extracts raw bits and their widths without consulting any
//! reference value; the value decoder then resolves them against the
//! context. A bit count of zero means the field was absent from the packet.

use crate::types::{IpId, SequenceNumber, Timestamp};

use super::lists::ListEncoding;

/// The exact UO packet variant, resolved from the type octet, the profile
/// and the presence of a sequentially-numbered IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UoVariant {
    Uo0,
    Uo1,
    Uo1Rtp,
    Uo1Id,
    Uo1Ts,
    Uor2,
    Uor2Rtp,
    Uor2Id,
    Uor2Ts,
}

impl UoVariant {
    /// True for variants carrying a 7-bit CRC (the UOR-2 family).
    pub fn uses_crc7(self) -> bool {
        matches!(
            self,
            UoVariant::Uor2 | UoVariant::Uor2Rtp | UoVariant::Uor2Id | UoVariant::Uor2Ts
        )
    }
}

/// Field updates for one IP header, carried by an extension 3.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpFieldUpdates {
    pub tos: Option<u8>,
    pub ttl: Option<u8>,
    pub protocol: Option<u8>,
    pub df: Option<bool>,
    pub nbo: Option<bool>,
    pub rnd: Option<bool>,
    /// Full extension-header list update (IPv6 headers only).
    pub list: Option<ListEncoding>,
}

impl IpFieldUpdates {
    /// True when no field of this header is touched.
    pub fn is_empty(&self) -> bool {
        self.tos.is_none()
            && self.ttl.is_none()
            && self.protocol.is_none()
            && self.df.is_none()
            && self.nbo.is_none()
            && self.rnd.is_none()
            && self.list.is_none()
    }
}

/// RTP-level updates carried by an extension 3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpFieldUpdates {
    pub payload_type: Option<u8>,
    pub padding: Option<bool>,
    pub extension: Option<bool>,
    pub ts_stride: Option<u32>,
}

/// The bit bundle extracted from one UO packet (base header plus any
/// extension), before reference resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedBits {
    /// SN bits; extension bits are appended below the base header bits.
    pub sn: u16,
    pub sn_bits: u8,

    /// Outer (first) IP header identification bits.
    pub ip_id: u16,
    pub ip_id_bits: u8,

    /// Inner (second) IP header identification bits.
    pub ip_id2: u16,
    pub ip_id2_bits: u8,

    /// Timestamp bits; `ts_scaled` marks TS_SCALED interpretation.
    pub ts: u32,
    pub ts_bits: u8,
    pub ts_scaled: bool,

    /// RTP marker bit, when the packet carries one.
    pub marker: Option<bool>,

    /// Received CRC and its width (3 or 7 bits).
    pub crc: u8,
    pub crc_bits: u8,

    /// X flag of the base header (extension octet follows).
    pub ext_flag: bool,

    /// UDP checksum carried in the packet tail (checksum-enabled flows).
    pub udp_checksum: Option<u16>,
    /// UDP-Lite checksum coverage carried in the packet tail.
    pub udplite_coverage: Option<u16>,

    /// Updates for the innermost IP header (extension 3).
    pub innermost_updates: IpFieldUpdates,
    /// Updates for the outermost IP header (extension 3, two-header flows).
    pub outermost_updates: IpFieldUpdates,
    /// RTP flag/stride updates (extension 3).
    pub rtp_updates: RtpFieldUpdates,
}

/// Candidate values decoded from an [`ExtractedBits`] bundle against the
/// context's references, ready for header reconstruction and CRC checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedValues {
    pub sn: SequenceNumber,
    pub ts: Timestamp,
    /// Outer IP-ID, when the outer header is IPv4.
    pub ip_id: Option<IpId>,
    /// Inner IP-ID, when an inner IPv4 header exists.
    pub ip_id2: Option<IpId>,
    pub marker: bool,
}

/// A candidate extension-header list decode, tagged with which header it
/// belongs to. Published to the list tables only after CRC validation.
#[derive(Debug, Clone, Default)]
pub struct PendingListUpdates {
    pub outer: Option<super::lists::DecodedList>,
    pub inner: Option<super::lists::DecodedList>,
}

impl PendingListUpdates {
    pub fn is_empty(&self) -> bool {
        self.outer.is_none() && self.inner.is_none()
    }
}
