//! Uncompressed header representations for the generic profile family.
//!
//! These structures hold the reconstructed IP / IP-in-IP / next-header
//! fields, not raw bytes; serialization to wire form happens once per
//! packet after CRC validation. Inferred fields (IPv4 total length and
//! header checksum, UDP length, IPv6 payload length) are computed during
//! serialization from the payload length and are never stored.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::constants::{
    IP_PROTOCOL_AH, IP_PROTOCOL_DEST_OPTS, IP_PROTOCOL_HOP_BY_HOP, IP_PROTOCOL_IPIP,
    IP_PROTOCOL_IPV6, IP_PROTOCOL_ROUTING, IPV4_MIN_HEADER_LENGTH_BYTES, IPV4_STANDARD_IHL,
    IPV6_BASE_HEADER_LENGTH_BYTES, RTP_MIN_HEADER_LENGTH_BYTES, RTP_VERSION,
    UDP_HEADER_LENGTH_BYTES,
};
use crate::error::{Field, ParseContext, RohcParsingError};
use crate::types::{IpId, SequenceNumber, Ssrc, Timestamp};

/// A reconstructed IPv4 header (no options; IHL is always 5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Header {
    pub tos: u8,
    pub identification: IpId,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Self {
            tos: 0,
            identification: IpId::INITIAL,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl: 64,
            protocol: 0,
            src: Ipv4Addr::UNSPECIFIED,
            dst: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl Ipv4Header {
    /// Serializes the header, computing total length and checksum.
    pub fn serialize(&self, payload_len: usize, out: &mut Vec<u8>) {
        let start = out.len();
        let total_length = (IPV4_MIN_HEADER_LENGTH_BYTES + payload_len) as u16;
        out.push(0x40 | IPV4_STANDARD_IHL);
        out.push(self.tos);
        out.extend_from_slice(&total_length.to_be_bytes());
        out.extend_from_slice(&self.identification.to_be_bytes());
        let flags_frag = ((self.dont_fragment as u16) << 14)
            | ((self.more_fragments as u16) << 13)
            | (self.fragment_offset & 0x1FFF);
        out.extend_from_slice(&flags_frag.to_be_bytes());
        out.push(self.ttl);
        out.push(self.protocol);
        out.extend_from_slice(&[0, 0]); // checksum placeholder
        out.extend_from_slice(&self.src.octets());
        out.extend_from_slice(&self.dst.octets());

        let checksum = ipv4_header_checksum(&out[start..start + IPV4_MIN_HEADER_LENGTH_BYTES]);
        out[start + 10..start + 12].copy_from_slice(&checksum.to_be_bytes());
    }
}

/// Computes the RFC 791 ones-complement header checksum.
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = header.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// One IPv6 extension header carried in a compressed list.
///
/// `data` holds the complete raw header bytes; `data[0]` is the next-header
/// field and is rewritten during serialization to maintain chain linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionItem {
    pub header_type: u8,
    pub data: Vec<u8>,
}

impl ExtensionItem {
    /// Validates and captures an extension-header item body.
    ///
    /// Supported types are Hop-by-Hop (0), Routing (43), AH (51) and
    /// Destination Options (60); the byte length must agree with the
    /// header's own length field.
    ///
    /// # Errors
    /// - `RohcParsingError::InvalidFieldValue` - Unknown type or length mismatch
    /// - `RohcParsingError::NotEnoughData` - Item shorter than two bytes
    pub fn parse(header_type: u8, data: &[u8]) -> Result<Self, RohcParsingError> {
        if data.len() < 2 {
            return Err(RohcParsingError::NotEnoughData {
                needed: 2,
                got: data.len(),
                context: ParseContext::ListItem,
            });
        }
        let expected_len = match header_type {
            IP_PROTOCOL_HOP_BY_HOP | IP_PROTOCOL_ROUTING | IP_PROTOCOL_DEST_OPTS => {
                (data[1] as usize + 1) * 8
            }
            IP_PROTOCOL_AH => (data[1] as usize + 2) * 4,
            other => {
                return Err(RohcParsingError::InvalidFieldValue {
                    field: Field::ListEncodingType,
                    context: ParseContext::ListItem,
                    expected: IP_PROTOCOL_HOP_BY_HOP as u32,
                    got: other as u32,
                });
            }
        };
        if data.len() != expected_len {
            return Err(RohcParsingError::InvalidFieldValue {
                field: Field::ItemLength,
                context: ParseContext::ListItem,
                expected: expected_len as u32,
                got: data.len() as u32,
            });
        }
        Ok(Self {
            header_type,
            data: data.to_vec(),
        })
    }

    /// Byte length of this extension header on the wire.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the item carries no bytes (never the case for parsed items).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A reconstructed IPv6 header plus its extension-header chain.
///
/// `next_header` stores the protocol *after* the extension chain (the inner
/// IP or transport protocol); linkage bytes through the chain are fixed up
/// at serialization time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Header {
    pub traffic_class: u8,
    pub flow_label: u32,
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub extensions: Vec<ExtensionItem>,
}

impl Default for Ipv6Header {
    fn default() -> Self {
        Self {
            traffic_class: 0,
            flow_label: 0,
            next_header: 0,
            hop_limit: 64,
            src: Ipv6Addr::UNSPECIFIED,
            dst: Ipv6Addr::UNSPECIFIED,
            extensions: Vec::new(),
        }
    }
}

impl Ipv6Header {
    /// Total serialized length including the extension chain.
    pub fn header_len(&self) -> usize {
        IPV6_BASE_HEADER_LENGTH_BYTES + self.extensions.iter().map(ExtensionItem::len).sum::<usize>()
    }

    /// Serializes the base header and extension chain, fixing next-header
    /// linkage so the chain ends at `self.next_header`.
    pub fn serialize(&self, payload_len: usize, out: &mut Vec<u8>) {
        let ext_len: usize = self.extensions.iter().map(ExtensionItem::len).sum();
        let payload_length = (ext_len + payload_len) as u16;

        let first_proto = self
            .extensions
            .first()
            .map_or(self.next_header, |item| item.header_type);
        let word0 = (6u32 << 28)
            | ((self.traffic_class as u32) << 20)
            | (self.flow_label & 0x000F_FFFF);
        out.extend_from_slice(&word0.to_be_bytes());
        out.extend_from_slice(&payload_length.to_be_bytes());
        out.push(first_proto);
        out.push(self.hop_limit);
        out.extend_from_slice(&self.src.octets());
        out.extend_from_slice(&self.dst.octets());

        for (idx, item) in self.extensions.iter().enumerate() {
            let start = out.len();
            out.extend_from_slice(&item.data);
            let next = self
                .extensions
                .get(idx + 1)
                .map_or(self.next_header, |n| n.header_type);
            out[start] = next;
        }
    }
}

/// Either IP version, as held in a decompression context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpHeader {
    V4(Ipv4Header),
    V6(Ipv6Header),
}

impl IpHeader {
    /// Serialized length of this header (including IPv6 extensions).
    pub fn header_len(&self) -> usize {
        match self {
            IpHeader::V4(_) => IPV4_MIN_HEADER_LENGTH_BYTES,
            IpHeader::V6(v6) => v6.header_len(),
        }
    }

    /// Protocol / next-header value after this IP header and its chain.
    pub fn protocol(&self) -> u8 {
        match self {
            IpHeader::V4(v4) => v4.protocol,
            IpHeader::V6(v6) => v6.next_header,
        }
    }

    /// Sets the protocol carried after this header.
    pub fn set_protocol(&mut self, protocol: u8) {
        match self {
            IpHeader::V4(v4) => v4.protocol = protocol,
            IpHeader::V6(v6) => v6.next_header = protocol,
        }
    }

    /// Protocol value that identifies this header when nested inside
    /// another IP header.
    pub fn encapsulation_protocol(&self) -> u8 {
        match self {
            IpHeader::V4(_) => IP_PROTOCOL_IPIP,
            IpHeader::V6(_) => IP_PROTOCOL_IPV6,
        }
    }

    /// Serializes the header for a payload of `payload_len` bytes.
    pub fn serialize(&self, payload_len: usize, out: &mut Vec<u8>) {
        match self {
            IpHeader::V4(v4) => v4.serialize(payload_len, out),
            IpHeader::V6(v6) => v6.serialize(payload_len, out),
        }
    }
}

/// A reconstructed UDP header; length is inferred at serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub checksum: u16,
}

impl UdpHeader {
    /// Serializes the header for `payload_len` bytes of UDP payload.
    pub fn serialize(&self, payload_len: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&((UDP_HEADER_LENGTH_BYTES + payload_len) as u16).to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
    }
}

/// A reconstructed UDP-Lite header; the length field carries the checksum
/// coverage instead of the datagram length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpLiteHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub checksum_coverage: u16,
    pub checksum: u16,
}

impl UdpLiteHeader {
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.src_port.to_be_bytes());
        out.extend_from_slice(&self.dst_port.to_be_bytes());
        out.extend_from_slice(&self.checksum_coverage.to_be_bytes());
        out.extend_from_slice(&self.checksum.to_be_bytes());
    }
}

/// A reconstructed RTP header (version 2, no CSRC list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpHeader {
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: SequenceNumber,
    pub timestamp: Timestamp,
    pub ssrc: Ssrc,
}

impl RtpHeader {
    /// First octet of the serialized header (V, P, X, CC fields).
    #[inline]
    pub fn first_octet(&self) -> u8 {
        (RTP_VERSION << 6) | ((self.padding as u8) << 5) | ((self.extension as u8) << 4)
    }

    /// Second octet of the serialized header (M, PT fields).
    #[inline]
    pub fn marker_pt_octet(&self) -> u8 {
        ((self.marker as u8) << 7) | (self.payload_type & 0x7F)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.push(self.first_octet());
        out.push(self.marker_pt_octet());
        out.extend_from_slice(&self.sequence_number.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
    }
}

/// The reconstructed block following the IP header(s), per profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextHeader {
    /// IP-only profile: nothing after the IP chain.
    #[default]
    None,
    Udp(UdpHeader),
    UdpLite(UdpLiteHeader),
    Rtp { udp: UdpHeader, rtp: RtpHeader },
}

impl NextHeader {
    /// Serialized length of the next-header block.
    pub fn header_len(&self) -> usize {
        match self {
            NextHeader::None => 0,
            NextHeader::Udp(_) | NextHeader::UdpLite(_) => UDP_HEADER_LENGTH_BYTES,
            NextHeader::Rtp { .. } => UDP_HEADER_LENGTH_BYTES + RTP_MIN_HEADER_LENGTH_BYTES,
        }
    }

    /// IP protocol number introducing this block, when one exists.
    pub fn protocol(&self) -> Option<u8> {
        match self {
            NextHeader::None => None,
            NextHeader::Udp(_) | NextHeader::Rtp { .. } => Some(crate::constants::IP_PROTOCOL_UDP),
            NextHeader::UdpLite(_) => Some(crate::constants::IP_PROTOCOL_UDP_LITE),
        }
    }

    pub fn serialize(&self, payload_len: usize, out: &mut Vec<u8>) {
        match self {
            NextHeader::None => {}
            NextHeader::Udp(udp) => udp.serialize(payload_len, out),
            NextHeader::UdpLite(lite) => lite.serialize(out),
            NextHeader::Rtp { udp, rtp } => {
                udp.serialize(RTP_MIN_HEADER_LENGTH_BYTES + payload_len, out);
                rtp.serialize(out);
            }
        }
    }
}

/// The complete reconstructed header stack for one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructedHeaders {
    pub outer_ip: IpHeader,
    pub inner_ip: Option<IpHeader>,
    pub next_header: NextHeader,
}

impl ReconstructedHeaders {
    /// Total serialized header length.
    pub fn header_len(&self) -> usize {
        self.outer_ip.header_len()
            + self.inner_ip.as_ref().map_or(0, IpHeader::header_len)
            + self.next_header.header_len()
    }

    /// Serializes the full header stack for `payload_len` trailing payload
    /// bytes, producing a wire-ready uncompressed packet prefix.
    pub fn serialize(&self, payload_len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_len() + payload_len);
        let next_len = self.next_header.header_len();
        match &self.inner_ip {
            Some(inner) => {
                let inner_total = inner.header_len() + next_len + payload_len;
                self.outer_ip.serialize(inner_total, &mut out);
                inner.serialize(next_len + payload_len, &mut out);
            }
            None => {
                self.outer_ip.serialize(next_len + payload_len, &mut out);
            }
        }
        self.next_header.serialize(payload_len, &mut out);
        out
    }
}
