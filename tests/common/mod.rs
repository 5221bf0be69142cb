//! Shared helpers for integration tests: wire-packet builders playing the
//! compressor's role, and expected-reconstruction builders for byte-exact
//! comparisons.

#![allow(dead_code)]

use rohcdec::crc::{calculate_rohc_crc8, CrcCalculators};
use rohcdec::profiles::generic::builder::compute_uo_crc;
use rohcdec::profiles::generic::{
    ExtensionItem, IpHeader, Ipv4Header, Ipv6Header, NextHeader, ReconstructedHeaders, UdpHeader,
};
use rohcdec::{CrcType, IpId, RohcProfile, SequenceNumber};

pub const TEST_SRC: [u8; 4] = [192, 168, 1, 10];
pub const TEST_DST: [u8; 4] = [192, 168, 1, 20];
pub const TEST_SRC_PORT: u16 = 10010;
pub const TEST_DST_PORT: u16 = 20020;

/// Static description of a UDP/IPv4 test flow.
#[derive(Debug, Clone)]
pub struct UdpV4Flow {
    pub tos: u8,
    pub ttl: u8,
    pub df: bool,
    pub udp_checksum: u16,
    /// IP-ID offset from the SN (sequential IP-ID flows).
    pub ip_id_offset: u16,
}

impl Default for UdpV4Flow {
    fn default() -> Self {
        Self {
            tos: 0,
            ttl: 64,
            df: true,
            udp_checksum: 0,
            ip_id_offset: 500,
        }
    }
}

impl UdpV4Flow {
    /// The uncompressed headers the compressor would have seen at `sn`.
    pub fn headers_at(&self, sn: u16) -> ReconstructedHeaders {
        ReconstructedHeaders {
            outer_ip: IpHeader::V4(Ipv4Header {
                tos: self.tos,
                identification: IpId::new(sn.wrapping_add(self.ip_id_offset)),
                dont_fragment: self.df,
                more_fragments: false,
                fragment_offset: 0,
                ttl: self.ttl,
                protocol: 17,
                src: TEST_SRC.into(),
                dst: TEST_DST.into(),
            }),
            inner_ip: None,
            next_header: NextHeader::Udp(UdpHeader {
                src_port: TEST_SRC_PORT,
                dst_port: TEST_DST_PORT,
                checksum: self.udp_checksum,
            }),
        }
    }

    /// The full uncompressed packet at `sn` with `payload` appended.
    pub fn packet_at(&self, sn: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = self.headers_at(sn).serialize(payload.len());
        bytes.extend_from_slice(payload);
        bytes
    }

    /// CRC-3 the compressor would emit for a UO-0/UO-1 at `sn`.
    pub fn crc3_at(&self, crcs: &CrcCalculators, sn: u16) -> u8 {
        compute_uo_crc(
            crcs,
            CrcType::Crc3,
            RohcProfile::Udp,
            &self.headers_at(sn),
            SequenceNumber::new(sn),
        )
    }

    /// CRC-7 the compressor would emit for a UOR-2 at `sn`.
    pub fn crc7_at(&self, crcs: &CrcCalculators, sn: u16) -> u8 {
        compute_uo_crc(
            crcs,
            CrcType::Crc7,
            RohcProfile::Udp,
            &self.headers_at(sn),
            SequenceNumber::new(sn),
        )
    }

    /// Unsealed IR header (CRC octet zero, no CID framing, no payload).
    pub fn ir_header(&self, sn: u16) -> Vec<u8> {
        let mut packet = vec![0xFD, u8::from(RohcProfile::Udp), 0x00];
        // Static chain: IPv4 then UDP ports.
        packet.push(0x40);
        packet.push(17);
        packet.extend_from_slice(&TEST_SRC);
        packet.extend_from_slice(&TEST_DST);
        packet.extend_from_slice(&TEST_SRC_PORT.to_be_bytes());
        packet.extend_from_slice(&TEST_DST_PORT.to_be_bytes());
        self.push_dyn_chain(&mut packet, sn);
        packet
    }

    /// IR packet for CID 0 on a small-CID channel.
    pub fn build_ir(&self, sn: u16, payload: &[u8]) -> Vec<u8> {
        seal_and_payload(self.ir_header(sn), 2, payload)
    }

    /// IR-DYN packet for CID 0 refreshing the dynamic chain at `sn`.
    pub fn build_ir_dyn(&self, sn: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xF8, u8::from(RohcProfile::Udp), 0x00];
        self.push_dyn_chain(&mut packet, sn);
        seal_and_payload(packet, 2, payload)
    }

    fn push_dyn_chain(&self, packet: &mut Vec<u8>, sn: u16) {
        packet.push(self.tos);
        packet.push(self.ttl);
        packet.extend_from_slice(&sn.wrapping_add(self.ip_id_offset).to_be_bytes());
        packet.push(ipv4_dyn_flags(self.df, false, true));
        packet.extend_from_slice(&self.udp_checksum.to_be_bytes());
        packet.extend_from_slice(&sn.to_be_bytes());
    }

    /// UO-0 carrying the 4 SN LSBs of `sn` and the matching CRC-3.
    pub fn build_uo0(&self, crcs: &CrcCalculators, sn: u16, payload: &[u8]) -> Vec<u8> {
        build_uo0_raw((sn & 0x0F) as u8, self.crc3_at(crcs, sn), payload)
    }

    /// UO-1 with 6 IP-ID offset LSBs and 5 SN LSBs.
    pub fn build_uo1(&self, crcs: &CrcCalculators, sn: u16, payload: &[u8]) -> Vec<u8> {
        let offset = self.ip_id_offset & 0x3F;
        let mut packet = vec![
            0x80 | offset as u8,
            (((sn & 0x1F) as u8) << 3) | self.crc3_at(crcs, sn),
        ];
        packet.extend_from_slice(payload);
        packet
    }

    /// UOR-2 with 5 SN LSBs, no extension.
    pub fn build_uor2(&self, crcs: &CrcCalculators, sn: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xC0 | (sn & 0x1F) as u8, self.crc7_at(crcs, sn)];
        packet.extend_from_slice(payload);
        packet
    }
}

/// UO-0 core byte from raw field values.
pub fn build_uo0_raw(sn_lsb: u8, crc3: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![(sn_lsb << 3) | (crc3 & 0x07)];
    packet.extend_from_slice(payload);
    packet
}

/// IPv4 dynamic-chain flags octet.
pub fn ipv4_dyn_flags(df: bool, rnd: bool, nbo: bool) -> u8 {
    ((df as u8) << 7) | ((rnd as u8) << 6) | ((nbo as u8) << 5)
}

/// Seals an IR header: computes the CRC-8 over the framed header (the CRC
/// octet at `crc_pos` must still be zero) and appends the payload.
pub fn seal_and_payload(mut header: Vec<u8>, crc_pos: usize, payload: &[u8]) -> Vec<u8> {
    debug_assert_eq!(header[crc_pos], 0);
    let crc = calculate_rohc_crc8(&header);
    header[crc_pos] = crc;
    header.extend_from_slice(payload);
    header
}

/// Splices an Add-CID octet in front of a CID-0 packet.
pub fn with_add_cid(cid: u8, packet: &[u8]) -> Vec<u8> {
    assert!(cid <= 15);
    let mut out = vec![0xE0 | cid];
    out.extend_from_slice(packet);
    out
}

/// Splices a large-CID SDVL encoding after the first octet of a packet.
pub fn with_large_cid(cid_sdvl: &[u8], packet: &[u8]) -> Vec<u8> {
    let mut out = vec![packet[0]];
    out.extend_from_slice(cid_sdvl);
    out.extend_from_slice(&packet[1..]);
    out
}

/// Static description of a UDP/IPv6 test flow with an extension chain.
#[derive(Debug, Clone)]
pub struct UdpV6Flow {
    pub traffic_class: u8,
    pub hop_limit: u8,
    pub flow_label: u32,
    pub src: [u8; 16],
    pub dst: [u8; 16],
    pub udp_checksum: u16,
}

impl Default for UdpV6Flow {
    fn default() -> Self {
        Self {
            traffic_class: 0,
            hop_limit: 64,
            flow_label: 0xABCDE,
            src: [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1],
            dst: [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2],
            udp_checksum: 0,
        }
    }
}

impl UdpV6Flow {
    pub fn headers_with(&self, extensions: Vec<ExtensionItem>) -> ReconstructedHeaders {
        ReconstructedHeaders {
            outer_ip: IpHeader::V6(Ipv6Header {
                traffic_class: self.traffic_class,
                flow_label: self.flow_label,
                next_header: 17,
                hop_limit: self.hop_limit,
                src: self.src.into(),
                dst: self.dst.into(),
                extensions,
            }),
            inner_ip: None,
            next_header: NextHeader::Udp(UdpHeader {
                src_port: TEST_SRC_PORT,
                dst_port: TEST_DST_PORT,
                checksum: self.udp_checksum,
            }),
        }
    }

    pub fn crc7_with(
        &self,
        crcs: &CrcCalculators,
        extensions: Vec<ExtensionItem>,
        sn: u16,
    ) -> u8 {
        compute_uo_crc(
            crcs,
            CrcType::Crc7,
            RohcProfile::Udp,
            &self.headers_with(extensions),
            SequenceNumber::new(sn),
        )
    }

    /// IR establishing the flow with `list_encoding` as the IPv6 dynamic
    /// chain's extension list.
    pub fn build_ir(&self, sn: u16, list_encoding: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut packet = vec![0xFD, u8::from(RohcProfile::Udp), 0x00];
        // Static chain: IPv6 then UDP ports.
        packet.push(0x60 | ((self.flow_label >> 16) as u8 & 0x0F));
        packet.extend_from_slice(&(self.flow_label as u16).to_be_bytes());
        packet.push(17);
        packet.extend_from_slice(&self.src);
        packet.extend_from_slice(&self.dst);
        packet.extend_from_slice(&TEST_SRC_PORT.to_be_bytes());
        packet.extend_from_slice(&TEST_DST_PORT.to_be_bytes());
        // Dynamic chain: IPv6 (with list), UDP checksum, trailing SN.
        packet.push(self.traffic_class);
        packet.push(self.hop_limit);
        packet.extend_from_slice(list_encoding);
        packet.extend_from_slice(&self.udp_checksum.to_be_bytes());
        packet.extend_from_slice(&sn.to_be_bytes());

        seal_and_payload(packet, 2, payload)
    }
}

/// Static description of an RTP/UDP/IPv4 test flow.
#[derive(Debug, Clone)]
pub struct RtpV4Flow {
    pub ssrc: u32,
    pub payload_type: u8,
    pub ip_id_offset: u16,
    /// IPv4 identification is random (carried in full in every packet).
    pub rnd: bool,
    pub ttl: u8,
}

impl Default for RtpV4Flow {
    fn default() -> Self {
        Self {
            ssrc: 0xAABB_CCDD,
            payload_type: 96,
            ip_id_offset: 500,
            rnd: false,
            ttl: 64,
        }
    }
}

impl RtpV4Flow {
    /// The uncompressed headers at (`sn`, `ts`, `marker`) with a
    /// sequential IP-ID.
    pub fn headers_at(&self, sn: u16, ts: u32, marker: bool) -> ReconstructedHeaders {
        self.headers_with_id(sn.wrapping_add(self.ip_id_offset), sn, ts, marker)
    }

    /// The uncompressed headers with an explicit IP-ID (random-IP-ID flows).
    pub fn headers_with_id(
        &self,
        ip_id: u16,
        sn: u16,
        ts: u32,
        marker: bool,
    ) -> ReconstructedHeaders {
        ReconstructedHeaders {
            outer_ip: IpHeader::V4(Ipv4Header {
                tos: 0,
                identification: IpId::new(ip_id),
                dont_fragment: true,
                more_fragments: false,
                fragment_offset: 0,
                ttl: self.ttl,
                protocol: 17,
                src: TEST_SRC.into(),
                dst: TEST_DST.into(),
            }),
            inner_ip: None,
            next_header: NextHeader::Rtp {
                udp: UdpHeader {
                    src_port: TEST_SRC_PORT,
                    dst_port: TEST_DST_PORT,
                    checksum: 0,
                },
                rtp: rohcdec::profiles::generic::RtpHeader {
                    padding: false,
                    extension: false,
                    marker,
                    payload_type: self.payload_type,
                    sequence_number: SequenceNumber::new(sn),
                    timestamp: rohcdec::Timestamp::new(ts),
                    ssrc: rohcdec::Ssrc::new(self.ssrc),
                },
            },
        }
    }

    pub fn packet_at(&self, sn: u16, ts: u32, marker: bool, payload: &[u8]) -> Vec<u8> {
        let mut bytes = self.headers_at(sn, ts, marker).serialize(payload.len());
        bytes.extend_from_slice(payload);
        bytes
    }

    pub fn crc3_at(&self, crcs: &CrcCalculators, sn: u16, ts: u32, marker: bool) -> u8 {
        compute_uo_crc(
            crcs,
            CrcType::Crc3,
            RohcProfile::Rtp,
            &self.headers_at(sn, ts, marker),
            SequenceNumber::new(sn),
        )
    }

    pub fn crc7_at(&self, crcs: &CrcCalculators, sn: u16, ts: u32, marker: bool) -> u8 {
        compute_uo_crc(
            crcs,
            CrcType::Crc7,
            RohcProfile::Rtp,
            &self.headers_at(sn, ts, marker),
            SequenceNumber::new(sn),
        )
    }

    /// Unsealed IR header at (`sn`, `ts`).
    pub fn ir_header(&self, sn: u16, ts: u32) -> Vec<u8> {
        let mut packet = vec![0xFD, u8::from(RohcProfile::Rtp), 0x00];
        // Static chain: IPv4, UDP ports, SSRC.
        packet.push(0x40);
        packet.push(17);
        packet.extend_from_slice(&TEST_SRC);
        packet.extend_from_slice(&TEST_DST);
        packet.extend_from_slice(&TEST_SRC_PORT.to_be_bytes());
        packet.extend_from_slice(&TEST_DST_PORT.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        // Dynamic chain: IPv4 then RTP (the SN rides inside the RTP part).
        packet.push(0); // TOS
        packet.push(self.ttl);
        packet.extend_from_slice(&sn.wrapping_add(self.ip_id_offset).to_be_bytes());
        packet.push(ipv4_dyn_flags(true, self.rnd, true));
        packet.push(0x80); // V=2, P=0, RX=0, CC=0
        packet.push(self.payload_type & 0x7F);
        packet.extend_from_slice(&sn.to_be_bytes());
        packet.extend_from_slice(&ts.to_be_bytes());
        packet
    }

    pub fn build_ir(&self, sn: u16, ts: u32, payload: &[u8]) -> Vec<u8> {
        seal_and_payload(self.ir_header(sn, ts), 2, payload)
    }

    /// UO-0 with the CRC for (`sn`, `ts`, reference marker false).
    pub fn build_uo0(&self, crcs: &CrcCalculators, sn: u16, ts: u32, payload: &[u8]) -> Vec<u8> {
        build_uo0_raw(
            (sn & 0x0F) as u8,
            self.crc3_at(crcs, sn, ts, false),
            payload,
        )
    }

    /// UO-1-TS: `10|T=1|TS(5)` then `M|SN(4)|CRC(3)`.
    pub fn build_uo1_ts(
        &self,
        crcs: &CrcCalculators,
        sn: u16,
        ts: u32,
        marker: bool,
        payload: &[u8],
    ) -> Vec<u8> {
        let crc = self.crc3_at(crcs, sn, ts, marker);
        let mut packet = vec![
            0x80 | 0x20 | (ts & 0x1F) as u8,
            ((marker as u8) << 7) | (((sn & 0x0F) as u8) << 3) | crc,
        ];
        packet.extend_from_slice(payload);
        packet
    }

    /// UO-1-ID: `10|T=0|IP-ID(5)` then `X=0|SN(4)|CRC(3)`.
    pub fn build_uo1_id(
        &self,
        crcs: &CrcCalculators,
        sn: u16,
        ts: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let crc = self.crc3_at(crcs, sn, ts, false);
        let mut packet = vec![
            0x80 | (self.ip_id_offset & 0x1F) as u8,
            (((sn & 0x0F) as u8) << 3) | crc,
        ];
        packet.extend_from_slice(payload);
        packet
    }
}

/// Hop-by-Hop item body as transmitted (type byte first, 8 bytes total).
pub fn hbh_item_bytes() -> Vec<u8> {
    vec![0x00, 0x00, 0x01, 0x04, 0x00, 0x00, 0x00, 0x00]
}

/// Destination Options item body (8 bytes).
pub fn dest_item_bytes() -> Vec<u8> {
    vec![60, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00]
}

/// AH item body (16 bytes).
pub fn ah_item_bytes() -> Vec<u8> {
    vec![
        51, 0x02, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0x11, 0x22, 0x33, 0x44, 0x00, 0x00, 0x00,
        0x00,
    ]
}

/// Parsed `ExtensionItem` for an item-bytes helper.
pub fn item_of(bytes: &[u8]) -> ExtensionItem {
    ExtensionItem::parse(bytes[0], bytes).unwrap()
}
