//! ROHC feedback primitives (RFC 3095, Section 5.7.6).
//!
//! The engine does not negotiate a feedback channel; it only builds
//! FEEDBACK-1 and FEEDBACK-2 payloads when a caller asks for one, typically
//! to NACK after a context demotion. Transport of the payload is the
//! caller's concern.

use crate::constants::{ROHC_ADD_CID_PREFIX_VALUE, ROHC_SMALL_CID_MASK};
use crate::error::{Field, ParseContext, RohcBuildingError};
use crate::types::{ContextId, SequenceNumber};

/// Acknowledgment type carried in a FEEDBACK-2 payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAckType {
    /// Context is consistent; SN was decompressed successfully.
    Ack,
    /// Dynamic context is out of sync; IR-DYN (or UOR-2) requested.
    Nack,
    /// Static context is unusable; IR requested.
    StaticNack,
}

impl FeedbackAckType {
    fn acktype_bits(self) -> u8 {
        match self {
            FeedbackAckType::Ack => 0,
            FeedbackAckType::Nack => 1,
            FeedbackAckType::StaticNack => 2,
        }
    }
}

/// Builds a FEEDBACK-1 payload: eight LSBs of the acknowledged SN, preceded
/// by an Add-CID octet for small CIDs above zero.
///
/// # Returns
/// Number of bytes written to `out`.
///
/// # Errors
/// - `RohcBuildingError::BufferTooSmall` - `out` shorter than the payload
/// - `RohcBuildingError::ValueTooLarge` - CID not expressible in Add-CID form
pub fn build_feedback1(
    cid: ContextId,
    sn: SequenceNumber,
    out: &mut [u8],
) -> Result<usize, RohcBuildingError> {
    let needs_add_cid = cid.value() != 0;
    if needs_add_cid && cid.value() > 15 {
        return Err(RohcBuildingError::ValueTooLarge {
            field: Field::Cid,
            value: cid.value() as u32,
            max_bits: 4,
        });
    }
    let needed = 1 + needs_add_cid as usize;
    if out.len() < needed {
        return Err(RohcBuildingError::BufferTooSmall {
            needed,
            available: out.len(),
            context: ParseContext::FeedbackPayload,
        });
    }
    let mut pos = 0;
    if needs_add_cid {
        out[pos] = ROHC_ADD_CID_PREFIX_VALUE | (cid.value() as u8 & ROHC_SMALL_CID_MASK);
        pos += 1;
    }
    out[pos] = (sn.value() & 0xFF) as u8;
    Ok(pos + 1)
}

/// Builds a FEEDBACK-2 payload: acktype, mode and twelve SN bits, preceded
/// by an Add-CID octet for small CIDs above zero. Feedback options are not
/// emitted.
///
/// # Returns
/// Number of bytes written to `out`.
///
/// # Errors
/// - `RohcBuildingError::BufferTooSmall` - `out` shorter than the payload
/// - `RohcBuildingError::ValueTooLarge` - CID or mode out of range
pub fn build_feedback2(
    cid: ContextId,
    ack_type: FeedbackAckType,
    mode: u8,
    sn: SequenceNumber,
    out: &mut [u8],
) -> Result<usize, RohcBuildingError> {
    if mode > 3 {
        return Err(RohcBuildingError::ValueTooLarge {
            field: Field::ProfileId,
            value: mode as u32,
            max_bits: 2,
        });
    }
    let needs_add_cid = cid.value() != 0;
    if needs_add_cid && cid.value() > 15 {
        return Err(RohcBuildingError::ValueTooLarge {
            field: Field::Cid,
            value: cid.value() as u32,
            max_bits: 4,
        });
    }
    let needed = 2 + needs_add_cid as usize;
    if out.len() < needed {
        return Err(RohcBuildingError::BufferTooSmall {
            needed,
            available: out.len(),
            context: ParseContext::FeedbackPayload,
        });
    }
    let mut pos = 0;
    if needs_add_cid {
        out[pos] = ROHC_ADD_CID_PREFIX_VALUE | (cid.value() as u8 & ROHC_SMALL_CID_MASK);
        pos += 1;
    }
    let sn12 = sn.value() & 0x0FFF;
    out[pos] = (ack_type.acktype_bits() << 6) | (mode << 4) | ((sn12 >> 8) as u8);
    out[pos + 1] = (sn12 & 0xFF) as u8;
    Ok(pos + 2)
}
