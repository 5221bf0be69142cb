//! CRC failure repair (RFC 3095, Section 5.3.2.2.4).
//!
//! Two strategies run in order after a failed CRC check:
//!
//! 1. **SN wraparound repair** — assume the compressor's SN wrapped past
//!    the top of the 16-bit space while the decompressor's interpretation
//!    window did not: add `2^k` to the decoded SN and revalidate.
//! 2. **Clock-based repair** — estimate how many packets went missing from
//!    the wall-clock gap since the last valid packet and the smoothed
//!    inter-arrival time, re-anchor the W-LSB window on that estimate and
//!    revalidate.
//!
//! Both strategies rebuild the headers and re-run the CRC; a candidate is
//! accepted only on a CRC match. The caller commits with the probation
//! counter armed so a lucky CRC cannot silently poison the context.

use crate::crc::CrcCalculators;
use crate::encodings::decode_lsb;
use crate::types::SequenceNumber;

use super::builder::{build_candidate, verify_uo_crc, CandidateReconstruction};
use super::context::GenericDecompressorContext;
use super::decoder::decode_with_sn;
use super::packet_types::{DecodedValues, ExtractedBits};

/// Outcome of a successful repair attempt.
#[derive(Debug, Clone)]
pub struct RepairedPacket {
    pub decoded: DecodedValues,
    pub candidate: CandidateReconstruction,
}

/// Attempts both repair strategies against a CRC-failed packet.
///
/// `first_sn` is the SN candidate that just failed validation. Returns
/// `None` when neither strategy produces a CRC-valid reconstruction.
pub fn attempt_repair(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
    first_sn: SequenceNumber,
    crc_calculators: &CrcCalculators,
) -> Option<RepairedPacket> {
    if bits.sn_bits == 0 || bits.sn_bits >= 16 {
        return None;
    }

    if let Some(repaired) = try_candidate_sn(
        context,
        bits,
        first_sn.wrapping_add(1u16 << bits.sn_bits),
        crc_calculators,
    ) {
        tracing::debug!(cid = %context.cid, sn = %repaired.decoded.sn, "SN wraparound repair succeeded");
        return Some(repaired);
    }

    let clock_sn = clock_based_sn(context, bits)?;
    if clock_sn == first_sn {
        return None;
    }
    let repaired = try_candidate_sn(context, bits, clock_sn, crc_calculators)?;
    tracing::debug!(cid = %context.cid, sn = %repaired.decoded.sn, "clock-based SN repair succeeded");
    Some(repaired)
}

fn try_candidate_sn(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
    sn: SequenceNumber,
    crc_calculators: &CrcCalculators,
) -> Option<RepairedPacket> {
    let decoded = decode_with_sn(context, bits, sn);
    let candidate = build_candidate(context, bits, &decoded).ok()?;
    verify_uo_crc(
        crc_calculators,
        bits,
        context.profile,
        &candidate.headers,
        decoded.sn,
    )
    .ok()?;
    Some(RepairedPacket { decoded, candidate })
}

/// Estimates the current SN from elapsed wall-clock time and re-decodes
/// the received LSBs against that estimate.
///
/// Returns `None` when no inter-arrival time is established yet (the
/// first-packet edge is treated as "skip this strategy").
fn clock_based_sn(
    context: &GenericDecompressorContext,
    bits: &ExtractedBits,
) -> Option<SequenceNumber> {
    if context.inter_arrival_time.is_zero() {
        return None;
    }
    let elapsed = context
        .current_time
        .saturating_duration_since(context.last_ok_time);
    let estimated_delta =
        (elapsed.as_nanos() / context.inter_arrival_time.as_nanos()).min(u16::MAX as u128) as u16;
    if estimated_delta == 0 {
        return None;
    }
    let estimated_ref = context.sn_ref.wrapping_add(estimated_delta);
    let k = bits.sn_bits;
    // The estimate can land on either side of the true SN, so the window
    // is centered on it instead of strictly forward.
    let p_centered = (1i64 << (k - 1)) - 1;
    Some(SequenceNumber::new(decode_lsb(
        bits.sn as u32,
        estimated_ref.value() as u32,
        k,
        p_centered,
        16,
    ) as u16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet_defs::RohcProfile;
    use crate::profiles::generic::builder::compute_uo_crc;
    use crate::profiles::generic::context::IpHeaderState;
    use crate::profiles::generic::decoder::decode_sn;
    use crate::profiles::generic::protocol_types::{
        IpHeader, Ipv4Header, NextHeader, UdpHeader,
    };
    use crate::error::CrcType;
    use crate::types::{ContextId, IpId};
    use std::time::{Duration, Instant};

    fn udp_context(sn_ref: u16) -> GenericDecompressorContext {
        let mut ctx = GenericDecompressorContext::new(
            ContextId::new(0),
            RohcProfile::Udp,
            3,
            10,
            Instant::now(),
        );
        ctx.outer_ip = Some(IpHeaderState::new(
            IpHeader::V4(Ipv4Header {
                identification: IpId::new(sn_ref),
                protocol: crate::constants::IP_PROTOCOL_UDP,
                ..Default::default()
            }),
            10,
        ));
        ctx.next_header = NextHeader::Udp(UdpHeader {
            src_port: 1000,
            dst_port: 2000,
            checksum: 0,
        });
        ctx.sn_ref = SequenceNumber::new(sn_ref);
        ctx
    }

    /// CRC for the header stack the compressor would have produced at `sn`.
    fn crc_for_sn(ctx: &GenericDecompressorContext, sn: u16) -> u8 {
        let crcs = CrcCalculators::new();
        let decoded = decode_with_sn(
            ctx,
            &ExtractedBits::default(),
            SequenceNumber::new(sn),
        );
        let candidate = build_candidate(ctx, &ExtractedBits::default(), &decoded).unwrap();
        compute_uo_crc(
            &crcs,
            CrcType::Crc3,
            ctx.profile,
            &candidate.headers,
            decoded.sn,
        )
    }

    #[test]
    fn wraparound_repair_recovers_wrapped_sn() {
        let ctx = udp_context(65530);
        let crcs = CrcCalculators::new();

        // The compressor advanced past 65535 to SN 2; 4 LSBs = 0b0010.
        let true_sn = 2u16;
        let bits = ExtractedBits {
            sn: (true_sn & 0x0F),
            sn_bits: 4,
            crc: crc_for_sn(&ctx, true_sn),
            crc_bits: 3,
            ..Default::default()
        };

        // Direct decode lands one window below the wrap.
        let first_sn = decode_sn(&ctx, &bits);
        assert_eq!(first_sn, 65522);

        let repaired = attempt_repair(&ctx, &bits, first_sn, &crcs)
            .expect("wraparound repair must find SN 2");
        assert_eq!(repaired.decoded.sn, 2);
    }

    #[test]
    fn clock_repair_uses_inter_arrival_estimate() {
        let mut ctx = udp_context(100);
        let crcs = CrcCalculators::new();
        let start = Instant::now();
        ctx.last_ok_time = start;
        ctx.inter_arrival_time = Duration::from_millis(20);
        // 1000 ms gap: roughly 50 packets lost, true SN = 150.
        ctx.current_time = start + Duration::from_millis(1000);

        // True SN sits inside the clock estimate's window [143, 158] but
        // far outside the direct window anchored at 100. Skip the rare SN
        // whose CRC collides with the direct or wraparound candidate, so
        // only the clock strategy can validate.
        let (true_sn, bits) = (144u16..=158)
            .find_map(|sn| {
                let bits = ExtractedBits {
                    sn: sn & 0x0F,
                    sn_bits: 4,
                    crc: crc_for_sn(&ctx, sn),
                    crc_bits: 3,
                    ..Default::default()
                };
                let direct = decode_sn(&ctx, &bits);
                let wrapped = direct.wrapping_add(16);
                (bits.crc != crc_for_sn(&ctx, direct.value())
                    && bits.crc != crc_for_sn(&ctx, wrapped.value()))
                .then_some((sn, bits))
            })
            .expect("some SN in the window must be CRC-distinguishable");

        let first_sn = decode_sn(&ctx, &bits);
        assert_ne!(first_sn, true_sn);

        let repaired =
            attempt_repair(&ctx, &bits, first_sn, &crcs).expect("clock repair must find the SN");
        assert_eq!(repaired.decoded.sn, true_sn);
    }

    #[test]
    fn zero_inter_arrival_skips_clock_strategy() {
        let ctx = udp_context(100);
        let bits = ExtractedBits {
            sn: 0x05,
            sn_bits: 4,
            ..Default::default()
        };
        assert!(clock_based_sn(&ctx, &bits).is_none());
    }

    #[test]
    fn unrepairable_crc_returns_none() {
        let ctx = udp_context(100);
        let crcs = CrcCalculators::new();
        // Pick a corrupted CRC that matches neither the direct candidate
        // (105) nor the wraparound candidate (121); the clock strategy is
        // off because no inter-arrival time is established.
        let c_direct = crc_for_sn(&ctx, 105);
        let c_wrapped = crc_for_sn(&ctx, 121);
        let bad = (0u8..8).find(|c| *c != c_direct && *c != c_wrapped).unwrap();
        let bits = ExtractedBits {
            sn: 105 & 0x0F,
            sn_bits: 4,
            crc: bad,
            crc_bits: 3,
            ..Default::default()
        };
        let first_sn = decode_sn(&ctx, &bits);
        assert!(attempt_repair(&ctx, &bits, first_sn, &crcs).is_none());
    }
}
