//! Wire parsing for the generic profile family.
//!
//! Parsers extract raw bit bundles and chain fields; no reference
//! resolution happens here. IR/IR-DYN parsing also validates the 8-bit
//! header CRC, which covers every header octet (CID framing included) with
//! the CRC field itself zeroed.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::bitstream::BitCursor;
use crate::constants::{
    IP_PROTOCOL_IPIP, IP_PROTOCOL_IPV6, ROHC_IR_D_BIT_MASK, ROHC_IR_DYN_PACKET_TYPE,
    ROHC_IR_PACKET_TYPE_BASE, RTP_VERSION,
};
use crate::crc::CrcCalculators;
use crate::error::{CrcType, Field, ParseContext, RohcParsingError};
use crate::packet_defs::RohcProfile;
use crate::types::{ContextId, IpId, SequenceNumber, Ssrc, Timestamp};

use super::context::GenericDecompressorContext;
use super::discriminator::GenericPacketType;
use super::lists::{parse_list_encoding, ListEncoding};
use super::packet_types::{ExtractedBits, IpFieldUpdates, UoVariant};
use super::protocol_types::NextHeader;

/// CID framing of one incoming packet, computed by the engine.
///
/// Small-CID channels may prepend an Add-CID octet; large-CID channels
/// place the SDVL-encoded CID after the packet type octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidFraming {
    pub cid: ContextId,
    pub add_cid_present: bool,
    pub large_cid_len: usize,
}

impl CidFraming {
    /// Index of the packet type octet within the full packet.
    #[inline]
    pub fn type_octet_index(&self) -> usize {
        self.add_cid_present as usize
    }

    /// Index of the first octet following type octet and large CID bytes.
    #[inline]
    pub fn fields_start(&self) -> usize {
        self.type_octet_index() + 1 + self.large_cid_len
    }
}

/// Static chain fields of one IP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticIp {
    V4 {
        protocol: u8,
        src: Ipv4Addr,
        dst: Ipv4Addr,
    },
    V6 {
        flow_label: u32,
        next_header: u8,
        src: Ipv6Addr,
        dst: Ipv6Addr,
    },
}

impl StaticIp {
    /// Protocol / next-header value carried in the static part.
    pub fn protocol(&self) -> u8 {
        match self {
            StaticIp::V4 { protocol, .. } => *protocol,
            StaticIp::V6 { next_header, .. } => *next_header,
        }
    }
}

/// Static chain fields of the next-header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStatic {
    None,
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    UdpLite {
        src_port: u16,
        dst_port: u16,
    },
    Rtp {
        src_port: u16,
        dst_port: u16,
        ssrc: Ssrc,
    },
}

/// Dynamic chain fields of one IP header.
#[derive(Debug, Clone, PartialEq)]
pub struct DynIp {
    pub tos: u8,
    pub ttl: u8,
    /// IPv4 only.
    pub identification: Option<IpId>,
    pub df: bool,
    pub rnd: bool,
    pub nbo: bool,
    /// IPv6 only: generic extension-header list.
    pub list: Option<ListEncoding>,
}

/// Dynamic chain fields of the next-header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextDynamic {
    None,
    Udp {
        checksum: u16,
    },
    UdpLite {
        checksum_coverage: u16,
        checksum: u16,
    },
    Rtp {
        padding: bool,
        extension: bool,
        marker: bool,
        payload_type: u8,
        sequence_number: SequenceNumber,
        timestamp: Timestamp,
        ts_stride: Option<u32>,
    },
}

/// A fully parsed dynamic chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDynChain {
    pub outer: DynIp,
    pub inner: Option<DynIp>,
    pub next: NextDynamic,
    /// SN of the chain: from the RTP dynamic part, or the trailing 16-bit
    /// field of non-RTP chains.
    pub sn: SequenceNumber,
}

/// A fully parsed IR or IR-DYN packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIr {
    pub profile: RohcProfile,
    pub dynamic_present: bool,
    pub outer_static: Option<StaticIp>,
    pub inner_static: Option<StaticIp>,
    pub next_static: Option<NextStatic>,
    pub dynamic: Option<ParsedDynChain>,
    /// Offset of the payload within the full packet.
    pub header_len: usize,
}

fn verify_ir_crc8(
    packet: &[u8],
    crc_pos: usize,
    header_len: usize,
    crc_calculators: &CrcCalculators,
) -> Result<(), RohcParsingError> {
    let received = packet[crc_pos];
    let mut input = packet[..header_len].to_vec();
    input[crc_pos] = 0;
    let calculated = crc_calculators.crc8(&input);
    if calculated != received {
        return Err(RohcParsingError::CrcMismatch {
            expected: received,
            calculated,
            crc_type: CrcType::Crc8,
        });
    }
    Ok(())
}

/// Parses an IR packet: type octet, profile, CRC-8, static chain and
/// (with the D bit) dynamic chain.
///
/// # Errors
/// - `RohcParsingError::NotEnoughData` - Truncated chains
/// - `RohcParsingError::CrcMismatch` - Header CRC-8 failure
/// - `RohcParsingError::InvalidPacketType` - Octet is not an IR type
pub fn parse_ir(
    packet: &[u8],
    framing: &CidFraming,
    crc_calculators: &CrcCalculators,
) -> Result<ParsedIr, RohcParsingError> {
    let type_idx = framing.type_octet_index();
    let type_octet = *packet.get(type_idx).ok_or(RohcParsingError::NotEnoughData {
        needed: type_idx + 1,
        got: packet.len(),
        context: ParseContext::IrPacketHeader,
    })?;
    if (type_octet & !ROHC_IR_D_BIT_MASK) != ROHC_IR_PACKET_TYPE_BASE {
        return Err(RohcParsingError::InvalidPacketType {
            discriminator: type_octet,
        });
    }
    let dynamic_present = (type_octet & ROHC_IR_D_BIT_MASK) != 0;

    let fields_start = framing.fields_start();
    let mut cursor = BitCursor::new(packet.get(fields_start..).ok_or(
        RohcParsingError::NotEnoughData {
            needed: fields_start,
            got: packet.len(),
            context: ParseContext::IrPacketHeader,
        },
    )?);
    let profile = RohcProfile::from(cursor.read_u8()?);
    cursor.read_u8()?; // CRC octet, verified over the whole header below

    if profile == RohcProfile::Uncompressed {
        let header_len = fields_start + cursor.consumed_bytes();
        verify_ir_crc8(packet, fields_start + 1, header_len, crc_calculators)?;
        return Ok(ParsedIr {
            profile,
            dynamic_present,
            outer_static: None,
            inner_static: None,
            next_static: None,
            dynamic: None,
            header_len,
        });
    }

    let outer_static = parse_static_ip(&mut cursor)?;
    let inner_static = match outer_static.protocol() {
        IP_PROTOCOL_IPIP | IP_PROTOCOL_IPV6 => Some(parse_static_ip(&mut cursor)?),
        _ => None,
    };
    let next_static = parse_next_static(&mut cursor, profile)?;

    let dynamic = if dynamic_present {
        Some(parse_dyn_chain(
            &mut cursor,
            profile,
            matches!(outer_static, StaticIp::V4 { .. }),
            inner_static
                .as_ref()
                .map(|ip| matches!(ip, StaticIp::V4 { .. })),
        )?)
    } else {
        None
    };

    let header_len = fields_start + cursor.consumed_bytes();
    verify_ir_crc8(packet, fields_start + 1, header_len, crc_calculators)?;

    Ok(ParsedIr {
        profile,
        dynamic_present,
        outer_static: Some(outer_static),
        inner_static,
        next_static: Some(next_static),
        dynamic,
        header_len,
    })
}

/// Parses an IR-DYN packet against an established static context.
///
/// # Errors
/// - `RohcParsingError::NotEnoughData` - Truncated chain
/// - `RohcParsingError::CrcMismatch` - Header CRC-8 failure
/// - `RohcParsingError::InvalidFieldValue` - Profile disagrees with the context
pub fn parse_ir_dyn(
    packet: &[u8],
    framing: &CidFraming,
    context: &GenericDecompressorContext,
    crc_calculators: &CrcCalculators,
) -> Result<ParsedIr, RohcParsingError> {
    let type_idx = framing.type_octet_index();
    let type_octet = *packet.get(type_idx).ok_or(RohcParsingError::NotEnoughData {
        needed: type_idx + 1,
        got: packet.len(),
        context: ParseContext::IrPacketHeader,
    })?;
    if type_octet != ROHC_IR_DYN_PACKET_TYPE {
        return Err(RohcParsingError::InvalidPacketType {
            discriminator: type_octet,
        });
    }

    let fields_start = framing.fields_start();
    let mut cursor = BitCursor::new(packet.get(fields_start..).ok_or(
        RohcParsingError::NotEnoughData {
            needed: fields_start,
            got: packet.len(),
            context: ParseContext::IrPacketHeader,
        },
    )?);
    let profile = RohcProfile::from(cursor.read_u8()?);
    if profile != context.profile {
        return Err(RohcParsingError::InvalidFieldValue {
            field: Field::ProfileId,
            context: ParseContext::IrPacketHeader,
            expected: u8::from(context.profile) as u32,
            got: u8::from(profile) as u32,
        });
    }
    cursor.read_u8()?; // CRC octet

    let outer_is_v4 = matches!(
        context.outer_ip.as_ref().map(|state| &state.header),
        Some(super::protocol_types::IpHeader::V4(_))
    );
    let inner_is_v4 = context.inner_ip.as_ref().map(|state| {
        matches!(state.header, super::protocol_types::IpHeader::V4(_))
    });

    let dynamic = parse_dyn_chain(&mut cursor, profile, outer_is_v4, inner_is_v4)?;
    let header_len = fields_start + cursor.consumed_bytes();
    verify_ir_crc8(packet, fields_start + 1, header_len, crc_calculators)?;

    Ok(ParsedIr {
        profile,
        dynamic_present: true,
        outer_static: None,
        inner_static: None,
        next_static: None,
        dynamic: Some(dynamic),
        header_len,
    })
}

fn parse_static_ip(cursor: &mut BitCursor<'_>) -> Result<StaticIp, RohcParsingError> {
    let first = cursor.read_u8()?;
    match first >> 4 {
        4 => {
            let protocol = cursor.read_u8()?;
            let src_bytes = cursor.read_bytes(4)?;
            let dst_bytes = cursor.read_bytes(4)?;
            Ok(StaticIp::V4 {
                protocol,
                src: Ipv4Addr::new(src_bytes[0], src_bytes[1], src_bytes[2], src_bytes[3]),
                dst: Ipv4Addr::new(dst_bytes[0], dst_bytes[1], dst_bytes[2], dst_bytes[3]),
            })
        }
        6 => {
            let flow_hi = (first & 0x0F) as u32;
            let flow_label = (flow_hi << 16) | cursor.read_u16()? as u32;
            let next_header = cursor.read_u8()?;
            let mut src = [0u8; 16];
            src.copy_from_slice(cursor.read_bytes(16)?);
            let mut dst = [0u8; 16];
            dst.copy_from_slice(cursor.read_bytes(16)?);
            Ok(StaticIp::V6 {
                flow_label,
                next_header,
                src: Ipv6Addr::from(src),
                dst: Ipv6Addr::from(dst),
            })
        }
        version => Err(RohcParsingError::InvalidIpVersion {
            expected: 4,
            got: version,
        }),
    }
}

fn parse_next_static(
    cursor: &mut BitCursor<'_>,
    profile: RohcProfile,
) -> Result<NextStatic, RohcParsingError> {
    match profile {
        RohcProfile::Ip => Ok(NextStatic::None),
        RohcProfile::Udp => Ok(NextStatic::Udp {
            src_port: cursor.read_u16()?,
            dst_port: cursor.read_u16()?,
        }),
        RohcProfile::UdpLite => Ok(NextStatic::UdpLite {
            src_port: cursor.read_u16()?,
            dst_port: cursor.read_u16()?,
        }),
        RohcProfile::Rtp => {
            let src_port = cursor.read_u16()?;
            let dst_port = cursor.read_u16()?;
            let ssrc = Ssrc::new(cursor.read_u32()?);
            Ok(NextStatic::Rtp {
                src_port,
                dst_port,
                ssrc,
            })
        }
        other => Err(RohcParsingError::InvalidFieldValue {
            field: Field::ProfileId,
            context: ParseContext::StaticChain,
            expected: u8::from(RohcProfile::Ip) as u32,
            got: u8::from(other) as u32,
        }),
    }
}

fn parse_dyn_ip(cursor: &mut BitCursor<'_>, is_v4: bool) -> Result<DynIp, RohcParsingError> {
    if is_v4 {
        let tos = cursor.read_u8()?;
        let ttl = cursor.read_u8()?;
        let identification = IpId::new(cursor.read_u16()?);
        let flags = cursor.read_u8()?;
        Ok(DynIp {
            tos,
            ttl,
            identification: Some(identification),
            df: flags & 0x80 != 0,
            rnd: flags & 0x40 != 0,
            nbo: flags & 0x20 != 0,
            list: None,
        })
    } else {
        let tos = cursor.read_u8()?;
        let ttl = cursor.read_u8()?;
        let list = parse_list_encoding(cursor)?;
        Ok(DynIp {
            tos,
            ttl,
            identification: None,
            df: false,
            rnd: false,
            nbo: true,
            list: Some(list),
        })
    }
}

fn parse_next_dynamic(
    cursor: &mut BitCursor<'_>,
    profile: RohcProfile,
) -> Result<NextDynamic, RohcParsingError> {
    match profile {
        RohcProfile::Ip => Ok(NextDynamic::None),
        RohcProfile::Udp => Ok(NextDynamic::Udp {
            checksum: cursor.read_u16()?,
        }),
        RohcProfile::UdpLite => Ok(NextDynamic::UdpLite {
            checksum_coverage: cursor.read_u16()?,
            checksum: cursor.read_u16()?,
        }),
        RohcProfile::Rtp => {
            let first = cursor.read_u8()?;
            let version = first >> 6;
            if version != RTP_VERSION {
                return Err(RohcParsingError::InvalidFieldValue {
                    field: Field::ProfileId,
                    context: ParseContext::DynamicChain,
                    expected: RTP_VERSION as u32,
                    got: version as u32,
                });
            }
            let padding = first & 0x20 != 0;
            let rx = first & 0x10 != 0;
            let csrc_count = first & 0x0F;
            if csrc_count != 0 {
                return Err(RohcParsingError::InvalidFieldValue {
                    field: Field::ProfileId,
                    context: ParseContext::DynamicChain,
                    expected: 0,
                    got: csrc_count as u32,
                });
            }
            let second = cursor.read_u8()?;
            let marker = second & 0x80 != 0;
            let payload_type = second & 0x7F;
            let sequence_number = SequenceNumber::new(cursor.read_u16()?);
            let timestamp = Timestamp::new(cursor.read_u32()?);

            let mut extension = false;
            let mut ts_stride = None;
            if rx {
                let flags = cursor.read_u8()?;
                extension = flags & 0x80 != 0;
                let tis = flags & 0x10 != 0;
                let tss = flags & 0x08 != 0;
                if tis {
                    return Err(RohcParsingError::InvalidFieldValue {
                        field: Field::ExtensionDiscriminator,
                        context: ParseContext::DynamicChain,
                        expected: 0,
                        got: 1,
                    });
                }
                if tss {
                    ts_stride = Some(cursor.read_sdvl()?);
                }
            }
            Ok(NextDynamic::Rtp {
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ts_stride,
            })
        }
        other => Err(RohcParsingError::InvalidFieldValue {
            field: Field::ProfileId,
            context: ParseContext::DynamicChain,
            expected: u8::from(RohcProfile::Ip) as u32,
            got: u8::from(other) as u32,
        }),
    }
}

fn parse_dyn_chain(
    cursor: &mut BitCursor<'_>,
    profile: RohcProfile,
    outer_is_v4: bool,
    inner_is_v4: Option<bool>,
) -> Result<ParsedDynChain, RohcParsingError> {
    let outer = parse_dyn_ip(cursor, outer_is_v4)?;
    let inner = match inner_is_v4 {
        Some(is_v4) => Some(parse_dyn_ip(cursor, is_v4)?),
        None => None,
    };
    let next = parse_next_dynamic(cursor, profile)?;
    let sn = match &next {
        NextDynamic::Rtp {
            sequence_number, ..
        } => *sequence_number,
        // Non-RTP chains end with the 16-bit SN the decompressor anchors on.
        _ => SequenceNumber::new(cursor.read_u16()?),
    };
    Ok(ParsedDynChain {
        outer,
        inner,
        next,
        sn,
    })
}

/// Parses a UO packet into its variant and raw bit bundle.
///
/// Variant resolution needs the context: the profile selects the RTP
/// layouts and the rnd flags decide whether the T-bit forms apply. Returns
/// the bundle plus the total header length (payload offset).
///
/// # Errors
/// - `RohcParsingError::NotEnoughData` - Truncated base, extension or tail
/// - `RohcParsingError::InvalidPacketType` - First octet not a UO type
pub fn parse_uo(
    packet: &[u8],
    framing: &CidFraming,
    context: &GenericDecompressorContext,
) -> Result<(UoVariant, ExtractedBits, usize), RohcParsingError> {
    let type_idx = framing.type_octet_index();
    let b0 = *packet.get(type_idx).ok_or(RohcParsingError::NotEnoughData {
        needed: type_idx + 1,
        got: packet.len(),
        context: ParseContext::UoPacketCore,
    })?;
    let fields_start = framing.fields_start();
    let mut cursor = BitCursor::new(packet.get(fields_start..).ok_or(
        RohcParsingError::NotEnoughData {
            needed: fields_start,
            got: packet.len(),
            context: ParseContext::UoPacketCore,
        },
    )?);

    let rtp = context.is_rtp();
    let seq_v4 = context.has_sequential_ipv4();
    let mut bits = ExtractedBits::default();

    let variant = match GenericPacketType::from_first_byte(b0) {
        GenericPacketType::Uo0 => {
            bits.sn = ((b0 >> 3) & 0x0F) as u16;
            bits.sn_bits = 4;
            bits.crc = b0 & 0x07;
            bits.crc_bits = 3;
            UoVariant::Uo0
        }
        GenericPacketType::Uo1 => {
            if !rtp {
                bits.ip_id = (b0 & 0x3F) as u16;
                bits.ip_id_bits = 6;
                let b1 = cursor.read_u8()?;
                bits.sn = (b1 >> 3) as u16;
                bits.sn_bits = 5;
                bits.crc = b1 & 0x07;
                bits.crc_bits = 3;
                UoVariant::Uo1
            } else if !seq_v4 {
                bits.ts = (b0 & 0x3F) as u32;
                bits.ts_bits = 6;
                let b1 = cursor.read_u8()?;
                bits.marker = Some(b1 & 0x80 != 0);
                bits.sn = ((b1 >> 3) & 0x0F) as u16;
                bits.sn_bits = 4;
                bits.crc = b1 & 0x07;
                bits.crc_bits = 3;
                UoVariant::Uo1Rtp
            } else if b0 & 0x20 == 0 {
                bits.ip_id = (b0 & 0x1F) as u16;
                bits.ip_id_bits = 5;
                let b1 = cursor.read_u8()?;
                bits.ext_flag = b1 & 0x80 != 0;
                bits.sn = ((b1 >> 3) & 0x0F) as u16;
                bits.sn_bits = 4;
                bits.crc = b1 & 0x07;
                bits.crc_bits = 3;
                UoVariant::Uo1Id
            } else {
                bits.ts = (b0 & 0x1F) as u32;
                bits.ts_bits = 5;
                let b1 = cursor.read_u8()?;
                bits.marker = Some(b1 & 0x80 != 0);
                bits.sn = ((b1 >> 3) & 0x0F) as u16;
                bits.sn_bits = 4;
                bits.crc = b1 & 0x07;
                bits.crc_bits = 3;
                UoVariant::Uo1Ts
            }
        }
        GenericPacketType::Uor2 => {
            if !rtp {
                bits.sn = (b0 & 0x1F) as u16;
                bits.sn_bits = 5;
                let b1 = cursor.read_u8()?;
                bits.ext_flag = b1 & 0x80 != 0;
                bits.crc = b1 & 0x7F;
                bits.crc_bits = 7;
                UoVariant::Uor2
            } else {
                let b1 = cursor.read_u8()?;
                let b2 = cursor.read_u8()?;
                bits.marker = Some(b1 & 0x40 != 0);
                bits.sn = (b1 & 0x3F) as u16;
                bits.sn_bits = 6;
                bits.ext_flag = b2 & 0x80 != 0;
                bits.crc = b2 & 0x7F;
                bits.crc_bits = 7;
                if !seq_v4 {
                    bits.ts = (((b0 & 0x1F) as u32) << 1) | (b1 >> 7) as u32;
                    bits.ts_bits = 6;
                    UoVariant::Uor2Rtp
                } else if b1 & 0x80 == 0 {
                    bits.ip_id = (b0 & 0x1F) as u16;
                    bits.ip_id_bits = 5;
                    UoVariant::Uor2Id
                } else {
                    bits.ts = (b0 & 0x1F) as u32;
                    bits.ts_bits = 5;
                    UoVariant::Uor2Ts
                }
            }
        }
        _ => {
            return Err(RohcParsingError::InvalidPacketType { discriminator: b0 });
        }
    };

    if bits.ext_flag {
        parse_extension(&mut cursor, rtp, &mut bits)?;
    }
    parse_uo_tail(&mut cursor, context, &mut bits)?;

    let header_len = fields_start + cursor.consumed_bytes();
    Ok((variant, bits, header_len))
}

/// Parses the extension selected by the two MSBs of the octet after the
/// base header, appending its bits below the base header's.
fn parse_extension(
    cursor: &mut BitCursor<'_>,
    rtp: bool,
    bits: &mut ExtractedBits,
) -> Result<(), RohcParsingError> {
    let first = cursor.read_u8()?;
    match first >> 6 {
        0 => {
            append_sn(bits, ((first >> 3) & 0x07) as u16, 3);
            append_ip_id(bits, (first & 0x07) as u16, 3);
        }
        1 => {
            append_sn(bits, ((first >> 3) & 0x07) as u16, 3);
            let low = cursor.read_u8()?;
            append_ip_id(bits, (((first & 0x07) as u16) << 8) | low as u16, 11);
        }
        2 => {
            append_sn(bits, ((first >> 3) & 0x07) as u16, 3);
            let inner_low = cursor.read_u8()?;
            bits.ip_id2 = (bits.ip_id2 << 11) | ((((first & 0x07) as u16) << 8) | inner_low as u16);
            bits.ip_id2_bits += 11;
            let outer = cursor.read_u8()?;
            append_ip_id(bits, outer as u16, 8);
        }
        3 => parse_extension3(cursor, rtp, first, bits)?,
        _ => unreachable!("extension discriminator is two bits"),
    }
    Ok(())
}

fn append_sn(bits: &mut ExtractedBits, value: u16, count: u8) {
    bits.sn = (bits.sn << count) | value;
    bits.sn_bits += count;
}

fn append_ip_id(bits: &mut ExtractedBits, value: u16, count: u8) {
    bits.ip_id = (bits.ip_id << count) | value;
    bits.ip_id_bits += count;
}

/// Flag-directed extension 3 (RFC 3095, Section 5.7.5).
fn parse_extension3(
    cursor: &mut BitCursor<'_>,
    rtp: bool,
    flags: u8,
    bits: &mut ExtractedBits,
) -> Result<(), RohcParsingError> {
    let s = flags & 0x20 != 0;
    let i = flags & 0x04 != 0;
    let ip = flags & 0x02 != 0;

    let (rts, tsc, rtp_flag, mut ip2) = if rtp {
        (flags & 0x10 != 0, flags & 0x08 != 0, flags & 0x01 != 0, false)
    } else {
        (false, false, false, flags & 0x01 != 0)
    };

    let mut inner_flags = 0u8;
    if ip {
        inner_flags = cursor.read_u8()?;
        if rtp {
            ip2 = inner_flags & 0x01 != 0;
        }
    }
    let mut outer_flags = 0u8;
    let mut i2 = false;
    if ip2 {
        outer_flags = cursor.read_u8()?;
        i2 = outer_flags & 0x01 != 0;
    }

    if s {
        let sn_byte = cursor.read_u8()?;
        append_sn(bits, sn_byte as u16, 8);
    }

    if rts {
        // An SDVL timestamp supersedes the base header's TS bits.
        let before = cursor.consumed_bytes();
        let ts = cursor.read_sdvl()?;
        let sdvl_len = cursor.consumed_bytes() - before;
        bits.ts = ts;
        bits.ts_bits = match sdvl_len {
            1 => 7,
            2 => 14,
            3 => 21,
            _ => 29,
        };
    }
    bits.ts_scaled = tsc;

    if ip {
        parse_ip_field_updates(cursor, inner_flags, &mut bits.innermost_updates)?;
    }

    if i {
        bits.ip_id = cursor.read_u16()?;
        bits.ip_id_bits = 16;
    }

    if ip2 {
        parse_ip_field_updates(cursor, outer_flags, &mut bits.outermost_updates)?;
        if i2 {
            bits.ip_id2 = cursor.read_u16()?;
            bits.ip_id2_bits = 16;
        }
    }

    if rtp_flag {
        let rtp_flags = cursor.read_u8()?;
        let r_pt = rtp_flags & 0x20 != 0;
        bits.marker = Some(rtp_flags & 0x10 != 0);
        bits.rtp_updates.extension = Some(rtp_flags & 0x08 != 0);
        let csrc = rtp_flags & 0x04 != 0;
        let tss = rtp_flags & 0x02 != 0;
        let tis = rtp_flags & 0x01 != 0;
        if csrc || tis {
            // CSRC list compression and time-stride are not part of this
            // profile family.
            return Err(RohcParsingError::InvalidFieldValue {
                field: Field::ExtensionDiscriminator,
                context: ParseContext::UoPacketExtension,
                expected: 0,
                got: rtp_flags as u32,
            });
        }
        if r_pt {
            let pt_byte = cursor.read_u8()?;
            bits.rtp_updates.padding = Some(pt_byte & 0x80 != 0);
            bits.rtp_updates.payload_type = Some(pt_byte & 0x7F);
        }
        if tss {
            bits.rtp_updates.ts_stride = Some(cursor.read_sdvl()?);
        }
    }
    Ok(())
}

/// Field list following an inner/outer IP flags octet of extension 3.
fn parse_ip_field_updates(
    cursor: &mut BitCursor<'_>,
    flags: u8,
    updates: &mut IpFieldUpdates,
) -> Result<(), RohcParsingError> {
    let tos = flags & 0x80 != 0;
    let ttl = flags & 0x40 != 0;
    let df = flags & 0x20 != 0;
    let pr = flags & 0x10 != 0;
    let ipx = flags & 0x08 != 0;
    updates.nbo = Some(flags & 0x04 != 0);
    updates.rnd = Some(flags & 0x02 != 0);
    updates.df = Some(df);
    if tos {
        updates.tos = Some(cursor.read_u8()?);
    }
    if ttl {
        updates.ttl = Some(cursor.read_u8()?);
    }
    if pr {
        updates.protocol = Some(cursor.read_u8()?);
    }
    if ipx {
        updates.list = Some(parse_list_encoding(cursor)?);
    }
    Ok(())
}

/// Parses the UO packet tail: full IP-IDs of random-IP-ID headers, then the
/// per-profile next-header fields carried uncompressed in every packet.
fn parse_uo_tail(
    cursor: &mut BitCursor<'_>,
    context: &GenericDecompressorContext,
    bits: &mut ExtractedBits,
) -> Result<(), RohcParsingError> {
    if let Some(outer) = &context.outer_ip {
        if matches!(outer.header, super::protocol_types::IpHeader::V4(_)) && outer.rnd {
            bits.ip_id = cursor.read_u16()?;
            bits.ip_id_bits = 16;
        }
    }
    if let Some(inner) = &context.inner_ip {
        if matches!(inner.header, super::protocol_types::IpHeader::V4(_)) && inner.rnd {
            bits.ip_id2 = cursor.read_u16()?;
            bits.ip_id2_bits = 16;
        }
    }

    match &context.next_header {
        NextHeader::Udp(udp) if udp.checksum != 0 => {
            bits.udp_checksum = Some(cursor.read_u16()?);
        }
        NextHeader::Rtp { udp, .. } if udp.checksum != 0 => {
            bits.udp_checksum = Some(cursor.read_u16()?);
        }
        NextHeader::UdpLite(_) => {
            bits.udplite_coverage = Some(cursor.read_u16()?);
            bits.udp_checksum = Some(cursor.read_u16()?);
        }
        _ => {}
    }
    Ok(())
}
