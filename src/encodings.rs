//! W-LSB and IP-ID decoding for wraparound counter fields.
//!
//! Implements Window-based Least Significant Bits (W-LSB) interpretation as
//! specified in RFC 3095, Sections 4.5 and 5.3.1, plus the offset-based
//! IP-ID reconstruction of Section 4.5.5. These utilities are shared by all
//! profiles in the generic family.
//!
//! Decoding never fails: for any received LSB pattern exactly one candidate
//! exists in the interpretation interval, and the CRC check over the rebuilt
//! header is what proves or disproves the candidate.

use crate::error::{Field, RohcParsingError};
use crate::types::{IpId, SequenceNumber};

/// Determines if a value falls within the W-LSB interpretation window.
///
/// The interpretation window is
/// `[reference_value - p_offset, reference_value - p_offset + (2^num_lsb_bits) - 1]`,
/// evaluated in plain integer space.
pub fn is_value_in_lsb_interval(
    value: u64,
    reference_value: u64,
    num_lsb_bits: u8,
    p_offset: i64,
) -> bool {
    if num_lsb_bits == 0 || num_lsb_bits > 32 {
        return false;
    }
    let window_size = 1i64 << num_lsb_bits;
    let base = reference_value as i64 - p_offset;
    let v = value as i64;
    v >= base && v < base + window_size
}

/// Extracts the N least significant bits from a value for W-LSB encoding.
///
/// # Errors
/// - `RohcParsingError::InvalidLsbOperation` - Invalid `num_lsb_bits` parameter
pub fn encode_lsb(value: u64, num_lsb_bits: u8) -> Result<u64, RohcParsingError> {
    if num_lsb_bits == 0 {
        return Err(RohcParsingError::InvalidLsbOperation {
            field: Field::NumLsbBits,
            description: "number of LSBs (k) cannot be 0 for encoding",
        });
    }
    if num_lsb_bits > 32 {
        return Err(RohcParsingError::InvalidLsbOperation {
            field: Field::NumLsbBits,
            description: "number of LSBs (k) cannot exceed 32",
        });
    }
    Ok(value & ((1u64 << num_lsb_bits) - 1))
}

/// Reconstructs the original value from its W-LSB encoded representation.
///
/// Returns the unique value whose low `num_lsb_bits` bits equal
/// `received_lsbs` inside the interpretation window
/// `[reference - p_offset, reference - p_offset + 2^k - 1]`.
///
/// The window is anchored in plain integer space and clipped at the top of
/// the `width`-bit value space: when the true counter wrapped past
/// `2^width - 1` but the window did not reach it, the returned candidate is
/// the pre-wrap value and the CRC repair path recovers the wrap. A window
/// dipping below zero wraps downward normally.
pub fn decode_lsb(
    received_lsbs: u32,
    reference: u32,
    num_lsb_bits: u8,
    p_offset: i64,
    width: u8,
) -> u32 {
    debug_assert!(num_lsb_bits >= 1 && num_lsb_bits <= width);
    debug_assert!(width == 16 || width == 32);
    debug_assert!(
        num_lsb_bits == 32 || received_lsbs < (1u32 << num_lsb_bits),
        "received LSBs {:#x} exceed {} bits",
        received_lsbs,
        num_lsb_bits
    );

    let window: i64 = 1i64 << num_lsb_bits;
    let mask: i64 = window - 1;
    let domain: i64 = 1i64 << width;

    let base: i64 = reference as i64 - p_offset;
    let mut candidate: i64 = (base & !mask) | received_lsbs as i64;
    if candidate < base {
        candidate += window;
    }

    if candidate < 0 {
        candidate += domain;
    } else if candidate >= domain {
        // Window ran past the top of the value space. Return the in-domain
        // candidate one window below; SN wraparound repair adds 2^k back.
        candidate -= window;
    }
    candidate as u32
}

/// W-LSB `p` offset for sequence number fields of width `k`.
///
/// Narrow SN fields use a strictly-forward window (the SN always advances
/// between packets of a flow); wider fields keep reordering slack.
#[inline]
pub fn sn_p_offset(num_lsb_bits: u8) -> i64 {
    if num_lsb_bits <= 4 {
        -1
    } else {
        (1i64 << (num_lsb_bits - 5)) - 1
    }
}

/// W-LSB `p` offset for timestamp fields of width `k` (RFC 3095, 4.5.4).
#[inline]
pub fn ts_p_offset(num_lsb_bits: u8) -> i64 {
    if num_lsb_bits < 2 {
        0
    } else {
        (1i64 << (num_lsb_bits - 2)) - 1
    }
}

/// Reconstructs a sequential IPv4 identification from offset-encoded LSBs.
///
/// For non-random IP-IDs the compressor transmits LSBs of the *offset*
/// `IP-ID - SN`; the decompressor decodes that offset against the reference
/// offset `ip_id_ref - sn_ref` and re-adds the decoded SN. A bit count of 0
/// means the offset is unchanged; a count of 16 carries the field in full.
pub fn decode_ip_id_offset(
    received: u16,
    num_bits: u8,
    decoded_sn: SequenceNumber,
    sn_ref: SequenceNumber,
    ip_id_ref: IpId,
) -> IpId {
    if num_bits >= 16 {
        return IpId::new(received);
    }
    let offset_ref = ip_id_ref.value().wrapping_sub(sn_ref.value());
    let offset = if num_bits == 0 {
        offset_ref
    } else {
        decode_lsb(received as u32, offset_ref as u32, num_bits, 0, 16) as u16
    };
    IpId::new(decoded_sn.value().wrapping_add(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_lsb_forward_window_tracks_increments() {
        // SN windows with p = -1 sit strictly ahead of the reference.
        for sn_ref in [0u32, 99, 1000, 32767] {
            for delta in 1u32..=16 {
                let v = sn_ref + delta;
                let lsbs = v & 0xF;
                assert_eq!(decode_lsb(lsbs, sn_ref, 4, -1, 16), v, "ref={sn_ref} d={delta}");
            }
        }
    }

    #[test]
    fn decode_lsb_interprets_missed_packets() {
        // Reference 100, window [101, 116]; LSBs 0b0100 resolve to 116.
        assert_eq!(decode_lsb(0b0100, 100, 4, -1, 16), 116);
    }

    #[test]
    fn decode_lsb_top_of_domain_returns_pre_wrap_candidate() {
        // Reference 65530, window would span past 65535; the unique
        // in-domain candidate with LSBs 0b0010 sits one window below.
        let decoded = decode_lsb(0b0010, 65530, 4, -1, 16);
        assert_eq!(decoded, 65522);
        // Wraparound repair then restores the true value.
        assert_eq!(decoded.wrapping_add(1 << 4) as u16 as u32 % 65536, 2);
    }

    #[test]
    fn decode_lsb_below_zero_window_wraps_down() {
        // Reference 0 with p = 1 puts the window base at -1.
        assert_eq!(decode_lsb(0xF, 0, 4, 1, 16), 65535);
        assert_eq!(decode_lsb(0x0, 0, 4, 1, 16), 0);
    }

    #[test]
    fn decode_lsb_positive_p_shifts_window_left() {
        // v_ref=100, k=4, p=2. Window [98, 113].
        assert_eq!(decode_lsb(0x2, 100, 4, 2, 16), 98);
        assert_eq!(decode_lsb(0x3, 100, 4, 2, 16), 99);
        assert_eq!(decode_lsb(0x1, 100, 4, 2, 16), 113);
        assert_eq!(decode_lsb(0x0, 100, 4, 2, 16), 112);
    }

    #[test]
    fn decode_lsb_32_bit_timestamps() {
        let ts_ref = 160_000u32;
        let p = ts_p_offset(16);
        for delta in [0u32, 160, 320, 16_000] {
            let v = ts_ref + delta;
            let lsbs = v & 0xFFFF;
            assert_eq!(decode_lsb(lsbs, ts_ref, 16, p, 32), v);
        }
    }

    #[test]
    fn lsb_roundtrip_within_window() {
        for v_ref in [0u32, 50, 65_000] {
            for k in [4u8, 5, 6, 8, 11] {
                let p = sn_p_offset(k);
                let base = v_ref as i64 - p;
                for step in 0..(1i64 << k) {
                    let v = base + step;
                    if !(0..=65535).contains(&v) {
                        continue;
                    }
                    let lsbs = encode_lsb(v as u64, k).unwrap() as u32;
                    assert_eq!(decode_lsb(lsbs, v_ref, k, p, 16), v as u32);
                }
            }
        }
    }

    #[test]
    fn interval_membership_matches_decode() {
        assert!(is_value_in_lsb_interval(105, 100, 4, -1));
        assert!(is_value_in_lsb_interval(116, 100, 4, -1));
        assert!(!is_value_in_lsb_interval(100, 100, 4, -1));
        assert!(!is_value_in_lsb_interval(117, 100, 4, -1));
        assert!(!is_value_in_lsb_interval(10, 10, 0, 0));
    }

    #[test]
    fn encode_lsb_masks_to_k_bits() {
        assert_eq!(encode_lsb(0x1234, 8).unwrap(), 0x34);
        assert_eq!(encode_lsb(0x1234, 4).unwrap(), 0x04);
        assert_eq!(encode_lsb(0xFFFF, 16).unwrap(), 0xFFFF);
        assert!(encode_lsb(0x1234, 0).is_err());
        assert!(encode_lsb(0x1234, 33).is_err());
    }

    #[test]
    fn ip_id_offset_follows_sn() {
        // Established flow: IP-ID = SN + 500.
        let sn_ref = SequenceNumber::new(100);
        let ip_id_ref = IpId::new(600);

        // No bits: offset unchanged, IP-ID tracks the decoded SN.
        let id = decode_ip_id_offset(0, 0, SequenceNumber::new(103), sn_ref, ip_id_ref);
        assert_eq!(id, 603);

        // Offset moved by +2, carried in 5 LSBs.
        let new_offset = 502u16;
        let id = decode_ip_id_offset(
            new_offset & 0x1F,
            5,
            SequenceNumber::new(101),
            sn_ref,
            ip_id_ref,
        );
        assert_eq!(id, 101 + 502);
    }

    #[test]
    fn ip_id_full_width_passthrough() {
        let id = decode_ip_id_offset(
            0xBEEF,
            16,
            SequenceNumber::new(5),
            SequenceNumber::new(4),
            IpId::new(1),
        );
        assert_eq!(id, 0xBEEF);
    }

    #[test]
    fn sn_p_offset_table() {
        assert_eq!(sn_p_offset(4), -1);
        assert_eq!(sn_p_offset(5), 0);
        assert_eq!(sn_p_offset(6), 1);
        assert_eq!(sn_p_offset(8), 7);
        assert_eq!(sn_p_offset(11), 63);
    }

    #[test]
    fn ts_p_offset_table() {
        assert_eq!(ts_p_offset(2), 0);
        assert_eq!(ts_p_offset(5), 7);
        assert_eq!(ts_p_offset(16), 16383);
    }
}
