//! Per-packet decompression orchestration and the context state machine.
//!
//! The pipeline per packet is: discriminate, parse into a bit bundle,
//! decode values against the references, rebuild the headers, check the
//! CRC, and only then commit. CRC failures divert through the repair
//! strategies; exhaustion demotes the context.

use std::time::Instant;

use crate::crc::CrcCalculators;
use crate::error::{CrcType, DecompressionError, RohcError, RohcParsingError};
use crate::packet_defs::RohcProfile;
use crate::types::Timestamp;

use super::builder::{build_candidate, verify_uo_crc, BuildError, CandidateReconstruction};
use super::context::{DecompressorMode, GenericDecompressorContext, IpHeaderState};
use super::decoder::{decode_sn, decode_with_sn};
use super::discriminator::GenericPacketType;
use super::packet_types::{DecodedValues, ExtractedBits, PendingListUpdates};
use super::parser::{
    parse_ir, parse_ir_dyn, parse_uo, CidFraming, DynIp, NextDynamic, NextStatic, ParsedDynChain,
    StaticIp,
};
use super::protocol_types::{
    IpHeader, Ipv4Header, Ipv6Header, NextHeader, ReconstructedHeaders, RtpHeader, UdpHeader,
    UdpLiteHeader,
};
use super::repair::attempt_repair;

/// Decompresses one core packet against its context.
///
/// On success the returned vector holds the rebuilt uncompressed packet:
/// reconstructed headers followed by the payload copied from the ROHC
/// trailer. On failure the context is left exactly as it was, except for
/// the repair bookkeeping mandated by the correction-counter procedure.
///
/// # Errors
/// - [`RohcError::Parsing`] - Malformed packet
/// - [`RohcError::Decompression`] - Context/mode mismatch, CRC exhaustion,
///   missing list reference
pub fn decompress_packet(
    context: &mut GenericDecompressorContext,
    packet: &[u8],
    framing: &CidFraming,
    crc_calculators: &CrcCalculators,
    now: Instant,
) -> Result<Vec<u8>, RohcError> {
    context.current_time = now;
    context.last_accessed = now;

    let type_octet = *packet
        .get(framing.type_octet_index())
        .ok_or(RohcError::Parsing(RohcParsingError::NotEnoughData {
            needed: framing.type_octet_index() + 1,
            got: packet.len(),
            context: crate::error::ParseContext::RohcPacketInput,
        }))?;

    match GenericPacketType::from_first_byte(type_octet) {
        GenericPacketType::Ir { .. } => process_ir(context, packet, framing, crc_calculators),
        GenericPacketType::IrDyn => process_ir_dyn(context, packet, framing, crc_calculators),
        GenericPacketType::Uo0 | GenericPacketType::Uo1 | GenericPacketType::Uor2 => {
            if context.mode != DecompressorMode::FullContext {
                return Err(RohcError::Decompression(DecompressionError::NoContext {
                    cid: context.cid,
                }));
            }
            process_uo(context, packet, framing, crc_calculators)
        }
        GenericPacketType::Unknown(discriminator) => Err(RohcError::Parsing(
            RohcParsingError::InvalidPacketType { discriminator },
        )),
    }
}

fn process_ir(
    context: &mut GenericDecompressorContext,
    packet: &[u8],
    framing: &CidFraming,
    crc_calculators: &CrcCalculators,
) -> Result<Vec<u8>, RohcError> {
    let parsed = parse_ir(packet, framing, crc_calculators)?;
    debug_assert_ne!(parsed.profile, RohcProfile::Uncompressed);

    let outer_static = parsed.outer_static.as_ref().expect("generic IR static chain");
    let list_window = context.list_window;
    let mut outer = IpHeaderState::new(static_to_header(outer_static), list_window);
    let mut inner = parsed
        .inner_static
        .as_ref()
        .map(|ip| IpHeaderState::new(static_to_header(ip), list_window));

    let mut next_header = next_static_to_header(
        parsed.next_static.as_ref().expect("generic IR next header"),
    );

    // Nested chains: the outer static protocol already names the inner
    // encapsulation; the innermost header points at the transport.
    let innermost = inner.as_mut().unwrap_or(&mut outer);
    if let Some(protocol) = next_header.protocol() {
        innermost.header.set_protocol(protocol);
    }

    let mut sn_ref = context.sn_ref;
    let mut ts_ref = context.ts_ref;
    if let Some(dynamic) = &parsed.dynamic {
        apply_dyn_ip_with_cid(&mut outer, &dynamic.outer, context.cid)?;
        if let (Some(inner_state), Some(dyn_inner)) = (inner.as_mut(), dynamic.inner.as_ref()) {
            apply_dyn_ip_with_cid(inner_state, dyn_inner, context.cid)?;
        }
        apply_next_dynamic(&mut next_header, &dynamic.next, context);
        sn_ref = dynamic.sn;
        if let NextDynamic::Rtp { timestamp, .. } = dynamic.next {
            ts_ref = timestamp;
        }
    }

    context.profile = parsed.profile;
    context.outer_ip = Some(outer);
    context.inner_ip = inner;
    context.next_header = next_header;
    context.sn_ref = sn_ref;
    context.ts_ref = ts_ref;
    context.correction_counter = 0;
    context.repair_failures = 0;
    context.inter_arrival_time = std::time::Duration::ZERO;
    context.last_ok_time = context.current_time;
    context.mode = if parsed.dynamic.is_some() {
        DecompressorMode::FullContext
    } else {
        DecompressorMode::StaticContext
    };
    tracing::debug!(cid = %context.cid, profile = ?context.profile, mode = ?context.mode, "IR established context");

    emit(context, &packet[parsed.header_len..])
}

fn process_ir_dyn(
    context: &mut GenericDecompressorContext,
    packet: &[u8],
    framing: &CidFraming,
    crc_calculators: &CrcCalculators,
) -> Result<Vec<u8>, RohcError> {
    if context.mode == DecompressorMode::NoContext || context.outer_ip.is_none() {
        return Err(RohcError::Decompression(DecompressionError::NoContext {
            cid: context.cid,
        }));
    }
    let parsed = parse_ir_dyn(packet, framing, context, crc_calculators)?;
    let dynamic = parsed.dynamic.as_ref().expect("IR-DYN carries a dynamic chain");

    apply_dyn_chain(context, dynamic)?;
    context.sn_ref = dynamic.sn;
    if let NextDynamic::Rtp { timestamp, .. } = dynamic.next {
        context.ts_ref = timestamp;
    }
    context.correction_counter = 0;
    context.repair_failures = 0;
    context.last_ok_time = context.current_time;
    context.mode = DecompressorMode::FullContext;
    tracing::debug!(cid = %context.cid, "IR-DYN refreshed dynamic chain");

    emit(context, &packet[parsed.header_len..])
}

fn apply_dyn_chain(
    context: &mut GenericDecompressorContext,
    dynamic: &ParsedDynChain,
) -> Result<(), RohcError> {
    let cid = context.cid;
    {
        let outer = context.outer_ip.as_mut().expect("caller checked static chain");
        apply_dyn_ip_with_cid(outer, &dynamic.outer, cid)?;
    }
    if let Some(dyn_inner) = &dynamic.inner {
        let inner = context
            .inner_ip
            .as_mut()
            .ok_or(RohcError::Decompression(DecompressionError::NoContext { cid }))?;
        apply_dyn_ip_with_cid(inner, dyn_inner, cid)?;
    }
    let mut next_header = context.next_header.clone();
    apply_next_dynamic(&mut next_header, &dynamic.next, context);
    context.next_header = next_header;
    Ok(())
}

fn static_to_header(static_ip: &StaticIp) -> IpHeader {
    match static_ip {
        StaticIp::V4 { protocol, src, dst } => IpHeader::V4(Ipv4Header {
            protocol: *protocol,
            src: *src,
            dst: *dst,
            ..Default::default()
        }),
        StaticIp::V6 {
            flow_label,
            next_header,
            src,
            dst,
        } => IpHeader::V6(Ipv6Header {
            flow_label: *flow_label,
            next_header: *next_header,
            src: *src,
            dst: *dst,
            ..Default::default()
        }),
    }
}

fn next_static_to_header(next: &NextStatic) -> NextHeader {
    match next {
        NextStatic::None => NextHeader::None,
        NextStatic::Udp { src_port, dst_port } => NextHeader::Udp(UdpHeader {
            src_port: *src_port,
            dst_port: *dst_port,
            checksum: 0,
        }),
        NextStatic::UdpLite { src_port, dst_port } => NextHeader::UdpLite(UdpLiteHeader {
            src_port: *src_port,
            dst_port: *dst_port,
            checksum_coverage: 0,
            checksum: 0,
        }),
        NextStatic::Rtp {
            src_port,
            dst_port,
            ssrc,
        } => NextHeader::Rtp {
            udp: UdpHeader {
                src_port: *src_port,
                dst_port: *dst_port,
                checksum: 0,
            },
            rtp: RtpHeader {
                ssrc: *ssrc,
                ..Default::default()
            },
        },
    }
}

fn apply_dyn_ip(state: &mut IpHeaderState, dynamic: &DynIp) -> Result<(), RohcError> {
    apply_dyn_ip_fields(state, dynamic);
    if let Some(list_enc) = &dynamic.list {
        let reference = match list_enc.ref_id {
            Some(ref_id) => Some(
                state
                    .list
                    .generation(ref_id)
                    .map(|gen| gen.indices.clone())
                    .ok_or(RohcError::Decompression(
                        DecompressionError::ListReferenceMissing {
                            cid: crate::types::ContextId::new(0),
                            gen_id: ref_id,
                        },
                    ))?,
            ),
            None => None,
        };
        let decoded = state
            .list
            .decode(list_enc, reference.as_deref())
            .map_err(RohcError::Parsing)?;
        let items = state.list.materialize(&decoded).map_err(RohcError::Parsing)?;
        // The IR-level CRC-8 already covered the chain, so the generation
        // publishes immediately.
        state.list.commit(&decoded);
        if let IpHeader::V6(v6) = &mut state.header {
            v6.extensions = items;
        }
    }
    Ok(())
}

fn apply_dyn_ip_with_cid(
    state: &mut IpHeaderState,
    dynamic: &DynIp,
    cid: crate::types::ContextId,
) -> Result<(), RohcError> {
    apply_dyn_ip(state, dynamic).map_err(|err| match err {
        RohcError::Decompression(DecompressionError::ListReferenceMissing { gen_id, .. }) => {
            RohcError::Decompression(DecompressionError::ListReferenceMissing { cid, gen_id })
        }
        other => other,
    })
}

fn apply_dyn_ip_fields(state: &mut IpHeaderState, dynamic: &DynIp) {
    match &mut state.header {
        IpHeader::V4(v4) => {
            v4.tos = dynamic.tos;
            v4.ttl = dynamic.ttl;
            if let Some(id) = dynamic.identification {
                v4.identification = id;
            }
            v4.dont_fragment = dynamic.df;
            state.rnd = dynamic.rnd;
            state.nbo = dynamic.nbo;
        }
        IpHeader::V6(v6) => {
            v6.traffic_class = dynamic.tos;
            v6.hop_limit = dynamic.ttl;
        }
    }
}

fn apply_next_dynamic(
    next_header: &mut NextHeader,
    dynamic: &NextDynamic,
    context: &mut GenericDecompressorContext,
) {
    match (next_header, dynamic) {
        (NextHeader::Udp(udp), NextDynamic::Udp { checksum }) => {
            udp.checksum = *checksum;
        }
        (
            NextHeader::UdpLite(lite),
            NextDynamic::UdpLite {
                checksum_coverage,
                checksum,
            },
        ) => {
            lite.checksum_coverage = *checksum_coverage;
            lite.checksum = *checksum;
        }
        (
            NextHeader::Rtp { rtp, .. },
            NextDynamic::Rtp {
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ts_stride,
            },
        ) => {
            rtp.padding = *padding;
            rtp.extension = *extension;
            rtp.marker = *marker;
            rtp.payload_type = *payload_type;
            rtp.sequence_number = *sequence_number;
            rtp.timestamp = *timestamp;
            if let Some(stride) = ts_stride {
                context.ts_stride = Some(*stride);
                context.ts_offset = *timestamp;
            }
        }
        _ => {}
    }
}

fn process_uo(
    context: &mut GenericDecompressorContext,
    packet: &[u8],
    framing: &CidFraming,
    crc_calculators: &CrcCalculators,
) -> Result<Vec<u8>, RohcError> {
    let (_variant, bits, header_len) = parse_uo(packet, framing, context)?;

    let sn = decode_sn(context, &bits);
    let decoded = decode_with_sn(context, &bits, sn);
    let candidate = match build_candidate(context, &bits, &decoded) {
        Ok(candidate) => candidate,
        Err(BuildError::ListReferenceMissing(gen_id)) => {
            return Err(RohcError::Decompression(
                DecompressionError::ListReferenceMissing {
                    cid: context.cid,
                    gen_id,
                },
            ));
        }
        Err(BuildError::Malformed(err)) => return Err(RohcError::Parsing(err)),
    };

    let crc_ok = verify_uo_crc(
        crc_calculators,
        &bits,
        context.profile,
        &candidate.headers,
        decoded.sn,
    );

    let (decoded, candidate, repaired) = match crc_ok {
        Ok(()) => (decoded, candidate, false),
        Err(_) => match attempt_repair(context, &bits, decoded.sn, crc_calculators) {
            Some(repaired) => (repaired.decoded, repaired.candidate, true),
            None => {
                let crc_type = if bits.crc_bits == 7 {
                    CrcType::Crc7
                } else {
                    CrcType::Crc3
                };
                context.record_unrepairable_failure();
                return Err(RohcError::Decompression(
                    DecompressionError::CrcUnrepairable {
                        cid: context.cid,
                        received: bits.crc,
                        crc_type,
                    },
                ));
            }
        },
    };

    commit_uo(context, &bits, &decoded, &candidate, repaired);
    emit_with_headers(&candidate.headers, &packet[header_len..])
}

fn commit_uo(
    context: &mut GenericDecompressorContext,
    bits: &ExtractedBits,
    decoded: &DecodedValues,
    candidate: &CandidateReconstruction,
    repaired: bool,
) {
    // Timestamp stride signaled by an extension 3 re-anchors scaled decoding.
    if let Some(stride) = bits.rtp_updates.ts_stride {
        context.ts_stride = Some(stride);
        context.ts_offset = decoded.ts;
    } else if context.ts_stride.is_none() && context.is_rtp() {
        // Learn the stride from explicit timestamps advancing with the SN.
        let sn_delta = decoded.sn.wrapping_sub(context.sn_ref);
        let ts_delta = decoded.ts.wrapping_diff(context.ts_ref);
        if sn_delta > 0 && ts_delta > 0 && ts_delta % sn_delta as u32 == 0 {
            context.ts_stride = Some(ts_delta / sn_delta as u32);
            context.ts_offset = Timestamp::new(
                decoded
                    .ts
                    .value()
                    .wrapping_sub((ts_delta / sn_delta as u32).wrapping_mul(decoded.sn.value() as u32)),
            );
        }
    }

    let lists = PendingListUpdates {
        outer: candidate.lists.outer.clone(),
        inner: candidate.lists.inner.clone(),
    };
    context.commit(&candidate.headers, decoded, &lists, repaired);

    if let Some(outer) = context.outer_ip.as_mut() {
        if let Some(rnd) = candidate.outer_flags.rnd {
            outer.rnd = rnd;
        }
        if let Some(nbo) = candidate.outer_flags.nbo {
            outer.nbo = nbo;
        }
    }
    if let Some(inner) = context.inner_ip.as_mut() {
        if let Some(rnd) = candidate.inner_flags.rnd {
            inner.rnd = rnd;
        }
        if let Some(nbo) = candidate.inner_flags.nbo {
            inner.nbo = nbo;
        }
    }
}

fn emit(context: &GenericDecompressorContext, payload: &[u8]) -> Result<Vec<u8>, RohcError> {
    let headers = context
        .reference_headers()
        .expect("emit requires an established chain");
    emit_with_headers(&headers, payload)
}

fn emit_with_headers(
    headers: &ReconstructedHeaders,
    payload: &[u8],
) -> Result<Vec<u8>, RohcError> {
    let mut out = headers.serialize(payload.len());
    out.extend_from_slice(payload);
    Ok(out)
}
