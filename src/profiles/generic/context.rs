//! Decompression context for the generic profile family.
//!
//! One context exists per active flow (CID). It stores the last
//! CRC-validated reference headers, the reference values anchoring W-LSB
//! decoding, per-IP-header list compression state, the RFC 3095 correction
//! counter and the timestamps driving clock-based repair.
//!
//! A context is mutated only by [`commit`](GenericDecompressorContext::commit)
//! (after a CRC-validated reconstruction) or by the repair bookkeeping;
//! a failing packet leaves it untouched.

use std::time::{Duration, Instant};

use crate::packet_defs::RohcProfile;
use crate::types::{ContextId, IpId, SequenceNumber, Timestamp};

use super::lists::ListDecompressor;
use super::packet_types::{DecodedValues, PendingListUpdates};
use super::protocol_types::{IpHeader, NextHeader, ReconstructedHeaders};

/// Decompressor states per RFC 3095, Section 5.3.2.
///
/// `NoContext` accepts only IR; `StaticContext` accepts IR and IR-DYN;
/// `FullContext` accepts any packet type. The repair procedure is a hidden
/// sub-state of `FullContext`, tracked by the correction counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecompressorMode {
    #[default]
    NoContext,
    StaticContext,
    FullContext,
}

/// Saved state for one IP header of the flow.
#[derive(Debug, Clone)]
pub struct IpHeaderState {
    /// The last successfully reconstructed header (fields, not bytes).
    pub header: IpHeader,
    /// IPv4 only: identification is random, carried in full.
    pub rnd: bool,
    /// IPv4 only: identification is in network byte order.
    pub nbo: bool,
    /// IPv6 only: extension-header list decompressor.
    pub list: ListDecompressor,
}

impl IpHeaderState {
    pub fn new(header: IpHeader, list_window: usize) -> Self {
        Self {
            header,
            rnd: false,
            nbo: true,
            list: ListDecompressor::new(list_window),
        }
    }

    /// True for an IPv4 header whose identification is sequential
    /// (compressed as an offset from the SN).
    pub fn is_ipv4_sequential(&self) -> bool {
        matches!(self.header, IpHeader::V4(_)) && !self.rnd
    }

    /// Reference identification for offset decoding (IPv4 only), in host
    /// interpretation: a non-NBO flow stores the byte-swapped wire value.
    pub fn ip_id_ref(&self) -> Option<IpId> {
        match &self.header {
            IpHeader::V4(v4) => Some(if self.nbo {
                v4.identification
            } else {
                IpId::new(v4.identification.value().swap_bytes())
            }),
            IpHeader::V6(_) => None,
        }
    }
}

/// Per-flow decompression context.
#[derive(Debug, Clone)]
pub struct GenericDecompressorContext {
    pub profile: RohcProfile,
    pub cid: ContextId,
    pub mode: DecompressorMode,

    /// First (outermost) IP header of the flow.
    pub outer_ip: Option<IpHeaderState>,
    /// Second IP header for IP-in-IP flows.
    pub inner_ip: Option<IpHeaderState>,
    /// Reference next-header block (UDP/UDP-Lite/RTP).
    pub next_header: NextHeader,

    /// Reference SN anchoring W-LSB decoding.
    pub sn_ref: SequenceNumber,
    /// Reference RTP timestamp.
    pub ts_ref: Timestamp,
    /// Established timestamp stride for TS_SCALED and implicit TS.
    pub ts_stride: Option<u32>,
    /// TS_OFFSET for scaled timestamp decoding.
    pub ts_offset: Timestamp,

    /// Probation counter after a successful repair (RFC 3095 `e`).
    pub correction_counter: u8,
    /// Consecutive unrepairable CRC failures (RFC 3095 `f`).
    pub repair_failures: u8,
    /// Repair budget before the context is demoted.
    pub correction_counter_max: u8,

    /// Timestamp of the last CRC-approved packet.
    pub last_ok_time: Instant,
    /// Timestamp of the packet currently being processed.
    pub current_time: Instant,
    /// Smoothed inter-packet arrival time for clock-based repair.
    pub inter_arrival_time: Duration,

    /// Last access, for staleness pruning.
    pub last_accessed: Instant,

    /// Window size handed to per-header list decompressors.
    pub list_window: usize,
}

impl GenericDecompressorContext {
    /// Creates a fresh context in `NoContext` mode.
    pub fn new(
        cid: ContextId,
        profile: RohcProfile,
        correction_counter_max: u8,
        list_window: usize,
        creation_time: Instant,
    ) -> Self {
        Self {
            profile,
            cid,
            mode: DecompressorMode::NoContext,
            outer_ip: None,
            inner_ip: None,
            next_header: NextHeader::None,
            sn_ref: SequenceNumber::INITIAL,
            ts_ref: Timestamp::INITIAL,
            ts_stride: None,
            ts_offset: Timestamp::INITIAL,
            correction_counter: 0,
            repair_failures: 0,
            correction_counter_max,
            last_ok_time: creation_time,
            current_time: creation_time,
            inter_arrival_time: Duration::ZERO,
            last_accessed: creation_time,
            list_window,
        }
    }

    /// True when the flow carries RTP.
    pub fn is_rtp(&self) -> bool {
        self.profile == RohcProfile::Rtp
    }

    /// True when any IPv4 header of the flow has a sequential IP-ID.
    /// Selects the UO-1-ID/TS and UOR-2-ID/TS packet layouts for RTP flows.
    pub fn has_sequential_ipv4(&self) -> bool {
        self.outer_ip
            .as_ref()
            .is_some_and(IpHeaderState::is_ipv4_sequential)
            || self
                .inner_ip
                .as_ref()
                .is_some_and(IpHeaderState::is_ipv4_sequential)
    }

    /// Snapshot of the reference headers, as a starting point for a
    /// candidate reconstruction.
    pub fn reference_headers(&self) -> Option<ReconstructedHeaders> {
        Some(ReconstructedHeaders {
            outer_ip: self.outer_ip.as_ref()?.header.clone(),
            inner_ip: self.inner_ip.as_ref().map(|state| state.header.clone()),
            next_header: self.next_header.clone(),
        })
    }

    /// Commits a CRC-validated reconstruction: reference headers, decoded
    /// values, pending list generations and the time bookkeeping driving
    /// clock-based repair.
    pub fn commit(
        &mut self,
        headers: &ReconstructedHeaders,
        decoded: &DecodedValues,
        lists: &PendingListUpdates,
        repaired: bool,
    ) {
        if let Some(outer) = self.outer_ip.as_mut() {
            outer.header = headers.outer_ip.clone();
            if let Some(list) = &lists.outer {
                outer.list.commit(list);
            }
        }
        if let Some(inner) = self.inner_ip.as_mut() {
            if let Some(header) = &headers.inner_ip {
                inner.header = header.clone();
            }
            if let Some(list) = &lists.inner {
                inner.list.commit(list);
            }
        }
        self.next_header = headers.next_header.clone();

        self.sn_ref = decoded.sn;
        self.ts_ref = decoded.ts;

        if repaired {
            // Successful repair commits, but the context stays on probation
            // until `correction_counter_max` further packets validate.
            self.correction_counter = self.correction_counter_max;
        } else if self.correction_counter > 0 {
            self.correction_counter -= 1;
        }
        self.repair_failures = 0;

        let elapsed = self.current_time.saturating_duration_since(self.last_ok_time);
        self.inter_arrival_time = if self.inter_arrival_time.is_zero() {
            elapsed
        } else {
            // Weighted mean, biased toward history.
            (self.inter_arrival_time * 3 + elapsed) / 4
        };
        self.last_ok_time = self.current_time;
        self.mode = DecompressorMode::FullContext;
    }

    /// Records an unrepairable CRC failure.
    ///
    /// Returns `true` when the repair budget is exhausted and the context
    /// was demoted to `StaticContext` (only IR / IR-DYN accepted until a
    /// refresh resynchronizes the dynamic chain).
    pub fn record_unrepairable_failure(&mut self) -> bool {
        self.repair_failures = self.repair_failures.saturating_add(1);
        if self.repair_failures > self.correction_counter_max {
            tracing::debug!(
                cid = %self.cid,
                failures = self.repair_failures,
                "repair budget exhausted, demoting context"
            );
            self.mode = DecompressorMode::StaticContext;
            self.repair_failures = 0;
            self.correction_counter = 0;
            true
        } else {
            false
        }
    }

    /// Whether the given reference SN still anchors a healthy flow; a
    /// context on probation reports `false` until the counter drains.
    pub fn is_on_probation(&self) -> bool {
        self.correction_counter > 0
    }
}
