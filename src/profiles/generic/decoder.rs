//! Value decoding: turning extracted bit bundles into candidate full-width
//! values against the context's references.
//!
//! Order matters: the SN resolves first, the timestamp next (it may be
//! inferred from the SN delta), and the IP-IDs last (offset decoding
//! re-adds the decoded SN). Every result is a candidate only; the CRC over
//! the rebuilt headers decides whether it is accepted.

use crate::encodings::{decode_ip_id_offset, decode_lsb, sn_p_offset, ts_p_offset};
use crate::types::{IpId, SequenceNumber, Timestamp};

use super::context::{GenericDecompressorContext, IpHeaderState};
use super::packet_types::{DecodedValues, ExtractedBits};
use super::protocol_types::NextHeader;

/// Decodes the sequence number from the bundle.
///
/// A bundle without SN bits implies the next SN in sequence.
pub fn decode_sn(context: &GenericDecompressorContext, bits: &ExtractedBits) -> SequenceNumber {
    if bits.sn_bits == 0 {
        return context.sn_ref.wrapping_add(1);
    }
    let k = bits.sn_bits.min(16);
    if k == 16 {
        return SequenceNumber::new(bits.sn);
    }
    SequenceNumber::new(decode_lsb(
        bits.sn as u32,
        context.sn_ref.value() as u32,
        k,
        sn_p_offset(k),
        16,
    ) as u16)
}

/// Decodes the full value set for a given (possibly repaired) SN.
pub fn decode_with_sn(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
    sn: SequenceNumber,
) -> DecodedValues {
    let ts = decode_ts(context, bits, sn);
    let ip_id = context
        .outer_ip
        .as_ref()
        .and_then(|state| decode_one_ip_id(state, bits.ip_id, bits.ip_id_bits, sn, context.sn_ref));
    let ip_id2 = context.inner_ip.as_ref().and_then(|state| {
        decode_one_ip_id(state, bits.ip_id2, bits.ip_id2_bits, sn, context.sn_ref)
    });

    let marker = bits.marker.unwrap_or_else(|| reference_marker(context));

    DecodedValues {
        sn,
        ts,
        ip_id,
        ip_id2,
        marker,
    }
}

/// Decodes the bundle end to end (SN first).
pub fn decode_values(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
) -> DecodedValues {
    let sn = decode_sn(context, bits);
    decode_with_sn(context, bits, sn)
}

fn reference_marker(context: &GenericDecompressorContext) -> bool {
    match &context.next_header {
        NextHeader::Rtp { rtp, .. } => rtp.marker,
        _ => false,
    }
}

fn decode_one_ip_id(
    state: &IpHeaderState,
    received: u16,
    num_bits: u8,
    sn: SequenceNumber,
    sn_ref: SequenceNumber,
) -> Option<IpId> {
    let ip_id_ref = match state.ip_id_ref() {
        Some(id) => id,
        None => return None,
    };
    if state.rnd {
        // Random IP-ID travels in full; without bits it is unchanged.
        return Some(if num_bits >= 16 {
            IpId::new(received)
        } else {
            ip_id_ref
        });
    }
    Some(decode_ip_id_offset(received, num_bits, sn, sn_ref, ip_id_ref))
}

/// Decodes the timestamp: explicit LSBs, TS_SCALED, or SN-scaled inference.
fn decode_ts(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
    sn: SequenceNumber,
) -> Timestamp {
    if bits.ts_bits > 0 {
        if bits.ts_scaled {
            return decode_ts_scaled(context, bits);
        }
        let k = bits.ts_bits.min(32);
        if k == 32 {
            return Timestamp::new(bits.ts);
        }
        return Timestamp::new(decode_lsb(
            bits.ts,
            context.ts_ref.value(),
            k,
            ts_p_offset(k),
            32,
        ));
    }

    // No TS bits: infer from the SN advance using the established stride.
    match context.ts_stride {
        Some(stride) if stride > 0 => {
            let sn_delta = sn.wrapping_sub(context.sn_ref);
            if sn_delta > 0 && sn_delta < 0x8000 {
                Timestamp::new(
                    context
                        .ts_ref
                        .value()
                        .wrapping_add(sn_delta as u32 * stride),
                )
            } else {
                context.ts_ref
            }
        }
        _ => context.ts_ref,
    }
}

/// TS = TS_SCALED * TS_STRIDE + TS_OFFSET, with the scaled part W-LSB
/// decoded against the scaled reference.
fn decode_ts_scaled(context: &GenericDecompressorContext, bits: &ExtractedBits) -> Timestamp {
    let stride = match context.ts_stride {
        Some(stride) if stride > 0 => stride,
        // Scaled bits without an established stride cannot advance the
        // clock; the CRC check rejects the packet if this guess is wrong.
        _ => return context.ts_ref,
    };
    let scaled_ref = context
        .ts_ref
        .value()
        .wrapping_sub(context.ts_offset.value())
        / stride;
    let k = bits.ts_bits.min(32);
    let scaled = if k == 32 {
        bits.ts
    } else {
        decode_lsb(bits.ts, scaled_ref, k, ts_p_offset(k), 32)
    };
    Timestamp::new(
        context
            .ts_offset
            .value()
            .wrapping_add(scaled.wrapping_mul(stride)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_defs::RohcProfile;
    use crate::profiles::generic::protocol_types::{IpHeader, Ipv4Header, RtpHeader, UdpHeader};
    use crate::types::ContextId;
    use std::time::Instant;

    fn rtp_context() -> GenericDecompressorContext {
        let mut ctx = GenericDecompressorContext::new(
            ContextId::new(0),
            RohcProfile::Rtp,
            3,
            10,
            Instant::now(),
        );
        ctx.outer_ip = Some(IpHeaderState::new(
            IpHeader::V4(Ipv4Header {
                identification: IpId::new(600),
                ..Default::default()
            }),
            10,
        ));
        ctx.next_header = NextHeader::Rtp {
            udp: UdpHeader::default(),
            rtp: RtpHeader::default(),
        };
        ctx.sn_ref = SequenceNumber::new(100);
        ctx.ts_ref = Timestamp::new(16_000);
        ctx.ts_stride = Some(160);
        ctx
    }

    #[test]
    fn sn_decodes_against_reference() {
        let ctx = rtp_context();
        let bits = ExtractedBits {
            sn: (101 & 0x0F),
            sn_bits: 4,
            ..Default::default()
        };
        assert_eq!(decode_sn(&ctx, &bits), 101);
    }

    #[test]
    fn absent_sn_implies_increment() {
        let ctx = rtp_context();
        let bits = ExtractedBits::default();
        assert_eq!(decode_sn(&ctx, &bits), 101);
    }

    #[test]
    fn implicit_ts_follows_stride_times_delta() {
        let ctx = rtp_context();
        let bits = ExtractedBits {
            sn: (103 & 0x0F),
            sn_bits: 4,
            ..Default::default()
        };
        let decoded = decode_values(&ctx, &bits);
        assert_eq!(decoded.sn, 103);
        assert_eq!(decoded.ts, 16_000 + 3 * 160);
    }

    #[test]
    fn scaled_ts_multiplies_stride() {
        let mut ctx = rtp_context();
        ctx.ts_offset = Timestamp::new(0);
        ctx.ts_ref = Timestamp::new(160 * 100);
        let bits = ExtractedBits {
            ts: 102 & 0x1F,
            ts_bits: 5,
            ts_scaled: true,
            sn: 101 & 0x0F,
            sn_bits: 4,
            ..Default::default()
        };
        let decoded = decode_values(&ctx, &bits);
        assert_eq!(decoded.ts, 160 * 102);
    }

    #[test]
    fn sequential_ip_id_tracks_sn() {
        let ctx = rtp_context();
        let bits = ExtractedBits {
            sn: 102 & 0x0F,
            sn_bits: 4,
            ..Default::default()
        };
        let decoded = decode_values(&ctx, &bits);
        // Offset 500 persists: IP-ID = SN + 500.
        assert_eq!(decoded.ip_id, Some(IpId::new(602)));
        assert!(decoded.ip_id2.is_none());
    }

    #[test]
    fn random_ip_id_requires_full_bits() {
        let mut ctx = rtp_context();
        ctx.outer_ip.as_mut().unwrap().rnd = true;
        let bits = ExtractedBits {
            sn: 101 & 0x0F,
            sn_bits: 4,
            ip_id: 0x4242,
            ip_id_bits: 16,
            ..Default::default()
        };
        let decoded = decode_values(&ctx, &bits);
        assert_eq!(decoded.ip_id, Some(IpId::new(0x4242)));

        let bits_without = ExtractedBits {
            sn: 101 & 0x0F,
            sn_bits: 4,
            ..Default::default()
        };
        let decoded = decode_values(&ctx, &bits_without);
        assert_eq!(decoded.ip_id, Some(IpId::new(600)));
    }

    #[test]
    fn marker_defaults_to_reference() {
        let mut ctx = rtp_context();
        if let NextHeader::Rtp { rtp, .. } = &mut ctx.next_header {
            rtp.marker = true;
        }
        let bits = ExtractedBits {
            sn: 101 & 0x0F,
            sn_bits: 4,
            ..Default::default()
        };
        assert!(decode_values(&ctx, &bits).marker);

        let bits_explicit = ExtractedBits {
            marker: Some(false),
            sn: 101 & 0x0F,
            sn_bits: 4,
            ..Default::default()
        };
        assert!(!decode_values(&ctx, &bits_explicit).marker);
    }
}
