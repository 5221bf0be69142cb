//! The ROHC decompression engine.
//!
//! `RohcDecompressor` owns the context registry and the channel-wide
//! configuration (CID encoding, enabled profiles, repair budget, list
//! window). Per packet it strips the CID framing, routes to the right
//! context — creating one when an IR packet arrives for a new CID — and
//! delegates to the generic profile pipeline. Decompression is a pure
//! function of (packet bytes, context state, time); the engine itself is a
//! value with no process-wide state.

use std::sync::Arc;
use std::time::Duration;

use crate::bitstream::sdvl_decode;
use crate::constants::{
    DEFAULT_CORRECTION_COUNTER_MAX, DEFAULT_LIST_WINDOW, MIN_LIST_WINDOW,
    ROHC_ADD_CID_PREFIX_MASK, ROHC_ADD_CID_PREFIX_VALUE, ROHC_IR_D_BIT_MASK,
    ROHC_IR_PACKET_TYPE_BASE, ROHC_SMALL_CID_MASK,
};
use crate::context_manager::ContextManager;
use crate::crc::CrcCalculators;
use crate::error::{DecompressionError, ParseContext, RohcError, RohcParsingError};
use crate::feedback::{build_feedback1, build_feedback2, FeedbackAckType};
use crate::packet_defs::{CidType, RohcProfile};
use crate::profiles::generic::{
    decompress_packet, CidFraming, DecompressorMode, GenericDecompressorContext,
};
use crate::time::{Clock, SystemClock};
use crate::types::{ContextId, SequenceNumber};

/// Channel-wide decompressor configuration.
#[derive(Debug, Clone)]
pub struct DecompressorConfig {
    /// CID encoding negotiated for the channel.
    pub cid_type: CidType,
    /// Upper bound on CID values (at most 15 for small CIDs).
    pub max_cid: ContextId,
    /// Profiles this channel accepts in IR packets.
    pub enabled_profiles: Vec<RohcProfile>,
    /// Repair budget before a context is demoted (RFC 3095 `e`/`f` bound).
    pub correction_counter_max: u8,
    /// Extension-header list generation window (at least 2).
    pub list_window: usize,
    /// Inactive contexts older than this are eligible for pruning.
    pub context_timeout: Duration,
}

impl Default for DecompressorConfig {
    fn default() -> Self {
        Self {
            cid_type: CidType::Small,
            max_cid: ContextId::MAX_SMALL_CID,
            enabled_profiles: vec![
                RohcProfile::Uncompressed,
                RohcProfile::Rtp,
                RohcProfile::Udp,
                RohcProfile::Ip,
                RohcProfile::UdpLite,
            ],
            correction_counter_max: DEFAULT_CORRECTION_COUNTER_MAX,
            list_window: DEFAULT_LIST_WINDOW,
            context_timeout: Duration::from_secs(60 * 5),
        }
    }
}

impl DecompressorConfig {
    fn validate(&self) -> Result<(), RohcError> {
        let cid_bound = match self.cid_type {
            CidType::Small => ContextId::MAX_SMALL_CID,
            CidType::Large => ContextId::MAX_LARGE_CID,
        };
        if self.max_cid > cid_bound {
            return Err(RohcError::Decompression(DecompressionError::CidOutOfRange {
                cid: self.max_cid,
                max_cid: cid_bound,
            }));
        }
        if self.list_window < MIN_LIST_WINDOW {
            return Err(RohcError::Parsing(RohcParsingError::InvalidFieldValue {
                field: crate::error::Field::BufferSize,
                context: ParseContext::ListEncoding,
                expected: MIN_LIST_WINDOW as u32,
                got: self.list_window as u32,
            }));
        }
        Ok(())
    }
}

/// The ROHC decompression engine for one channel.
#[derive(Debug)]
pub struct RohcDecompressor {
    config: DecompressorConfig,
    contexts: ContextManager,
    crc_calculators: CrcCalculators,
    clock: Arc<dyn Clock>,
}

impl RohcDecompressor {
    /// Creates an engine with the given configuration.
    ///
    /// # Errors
    /// - [`RohcError::Decompression`] - `max_cid` exceeds the CID encoding
    /// - [`RohcError::Parsing`] - `list_window` below the protocol minimum
    pub fn new(config: DecompressorConfig, clock: Arc<dyn Clock>) -> Result<Self, RohcError> {
        config.validate()?;
        Ok(Self {
            config,
            contexts: ContextManager::new(),
            crc_calculators: CrcCalculators::new(),
            clock,
        })
    }

    /// Engine with default configuration and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(DecompressorConfig::default(), Arc::new(SystemClock))
            .expect("default configuration is valid")
    }

    /// Channel configuration.
    pub fn config(&self) -> &DecompressorConfig {
        &self.config
    }

    /// Access to the context registry.
    pub fn contexts(&self) -> &ContextManager {
        &self.contexts
    }

    /// Mutable access to the context registry (teardown, inspection).
    pub fn contexts_mut(&mut self) -> &mut ContextManager {
        &mut self.contexts
    }

    /// Decompresses one ROHC packet into a full uncompressed packet
    /// (headers plus the payload from the ROHC trailer), stamping it with
    /// the engine clock's current time.
    ///
    /// # Errors
    /// - [`RohcError::Parsing`] - Malformed framing or packet
    /// - [`RohcError::Decompression`] - Unknown CID with a non-IR packet,
    ///   disabled profile, CRC exhaustion, missing list reference
    pub fn decompress(&mut self, packet: &[u8]) -> Result<Vec<u8>, RohcError> {
        let now = self.clock.now();
        self.decompress_at(packet, now)
    }

    /// Decompresses one ROHC packet with an explicit arrival timestamp.
    ///
    /// Decompression is a pure function of (packet bytes, context state,
    /// timestamp); callers that timestamp packets at the I/O boundary feed
    /// that instant here so clock-based repair sees arrival times rather
    /// than processing times.
    ///
    /// # Errors
    /// Same as [`decompress`](Self::decompress).
    pub fn decompress_at(
        &mut self,
        packet: &[u8],
        now: std::time::Instant,
    ) -> Result<Vec<u8>, RohcError> {
        if packet.is_empty() {
            return Err(RohcError::Parsing(RohcParsingError::NotEnoughData {
                needed: 1,
                got: 0,
                context: ParseContext::RohcPacketInput,
            }));
        }

        let framing = self.parse_cid_framing(packet)?;
        if framing.cid > self.config.max_cid {
            return Err(RohcError::Decompression(DecompressionError::CidOutOfRange {
                cid: framing.cid,
                max_cid: self.config.max_cid,
            }));
        }

        let type_octet = packet[framing.type_octet_index()];
        let is_ir = (type_octet & !ROHC_IR_D_BIT_MASK) == ROHC_IR_PACKET_TYPE_BASE;

        // An IR names its profile on the wire; anything else runs under
        // the context's established profile.
        let ir_profile = if is_ir {
            Some(self.peek_ir_profile(packet, &framing)?)
        } else {
            None
        };

        if !self.contexts.contains(framing.cid) {
            // Only an IR packet can create a context.
            let Some(profile) = ir_profile else {
                return Err(RohcError::Decompression(DecompressionError::NoContext {
                    cid: framing.cid,
                }));
            };
            let context = GenericDecompressorContext::new(
                framing.cid,
                profile,
                self.config.correction_counter_max,
                self.config.list_window,
                now,
            );
            self.contexts.add_context(framing.cid, context);
        }

        let context = self.contexts.get_context_mut(framing.cid)?;
        let effective_profile = ir_profile.unwrap_or(context.profile);
        if effective_profile == RohcProfile::Uncompressed {
            return Self::passthrough(context, packet, &framing, &self.crc_calculators, type_octet);
        }

        decompress_packet(context, packet, &framing, &self.crc_calculators, now)
    }

    /// Builds a FEEDBACK-1 acknowledgment for a context's current SN.
    ///
    /// # Errors
    /// - [`RohcError::Decompression`] - Unknown CID
    /// - [`RohcError::Building`] - CID not expressible in the feedback form
    pub fn build_feedback1(&self, cid: ContextId, out: &mut [u8]) -> Result<usize, RohcError> {
        let context = self.contexts.get_context(cid)?;
        Ok(build_feedback1(cid, context.sn_ref, out)?)
    }

    /// Builds a FEEDBACK-2 payload; the acknowledgment type is the
    /// caller's call (typically a NACK after a demotion). An unknown CID
    /// is acceptable — a STATIC-NACK may concern a context that was never
    /// established — and acknowledges SN 0.
    ///
    /// # Errors
    /// - [`RohcError::Building`] - CID out of range for the feedback form
    pub fn build_feedback2(
        &self,
        cid: ContextId,
        ack_type: FeedbackAckType,
        out: &mut [u8],
    ) -> Result<usize, RohcError> {
        let sn = self
            .contexts
            .get_context(cid)
            .map(|context| context.sn_ref)
            .unwrap_or(SequenceNumber::INITIAL);
        Ok(build_feedback2(cid, ack_type, 0, sn, out)?)
    }

    /// Removes contexts that have been inactive beyond the configured
    /// timeout. Call periodically from the channel's housekeeping.
    pub fn prune_stale_contexts(&mut self) {
        let now = self.clock.now();
        let timeout = self.config.context_timeout;
        let stale: Vec<ContextId> = self
            .contexts
            .iter()
            .filter_map(|(cid, context)| {
                (now.saturating_duration_since(context.last_accessed) > timeout).then_some(*cid)
            })
            .collect();
        for cid in stale {
            tracing::debug!(%cid, "pruning stale context");
            self.contexts.remove_context(cid);
        }
    }

    fn parse_cid_framing(&self, packet: &[u8]) -> Result<CidFraming, RohcError> {
        match self.config.cid_type {
            CidType::Small => {
                let first = packet[0];
                if first & ROHC_ADD_CID_PREFIX_MASK == ROHC_ADD_CID_PREFIX_VALUE {
                    if packet.len() < 2 {
                        return Err(RohcError::Parsing(RohcParsingError::NotEnoughData {
                            needed: 2,
                            got: packet.len(),
                            context: ParseContext::CidParsing,
                        }));
                    }
                    Ok(CidFraming {
                        cid: ContextId::new((first & ROHC_SMALL_CID_MASK) as u16),
                        add_cid_present: true,
                        large_cid_len: 0,
                    })
                } else {
                    Ok(CidFraming {
                        cid: ContextId::new(0),
                        add_cid_present: false,
                        large_cid_len: 0,
                    })
                }
            }
            CidType::Large => {
                // The SDVL CID follows the packet type octet.
                let after_type = packet.get(1..).ok_or(RohcError::Parsing(
                    RohcParsingError::NotEnoughData {
                        needed: 2,
                        got: packet.len(),
                        context: ParseContext::CidParsing,
                    },
                ))?;
                let (cid_value, cid_len) = sdvl_decode(after_type)?;
                if cid_value > ContextId::MAX_LARGE_CID.value() as u32 {
                    return Err(RohcError::Decompression(
                        DecompressionError::CidOutOfRange {
                            cid: ContextId::new(cid_value.min(u16::MAX as u32) as u16),
                            max_cid: ContextId::MAX_LARGE_CID,
                        },
                    ));
                }
                Ok(CidFraming {
                    cid: ContextId::new(cid_value as u16),
                    add_cid_present: false,
                    large_cid_len: cid_len,
                })
            }
        }
    }

    fn peek_ir_profile(
        &self,
        packet: &[u8],
        framing: &CidFraming,
    ) -> Result<RohcProfile, RohcError> {
        let profile_index = framing.fields_start();
        let profile_byte =
            *packet
                .get(profile_index)
                .ok_or(RohcError::Parsing(RohcParsingError::NotEnoughData {
                    needed: profile_index + 1,
                    got: packet.len(),
                    context: ParseContext::IrPacketHeader,
                }))?;
        let profile = RohcProfile::from(profile_byte);
        if !self.config.enabled_profiles.contains(&profile) {
            return Err(RohcError::Decompression(
                DecompressionError::UnsupportedProfile(profile_byte),
            ));
        }
        Ok(profile)
    }

    /// Profile 0: packets travel uncompressed. IR packets carry the
    /// original packet as payload behind a CRC-8-protected header; normal
    /// packets are the original bytes with only CID framing spliced in.
    fn passthrough(
        context: &mut GenericDecompressorContext,
        packet: &[u8],
        framing: &CidFraming,
        crc_calculators: &CrcCalculators,
        type_octet: u8,
    ) -> Result<Vec<u8>, RohcError> {
        if (type_octet & !ROHC_IR_D_BIT_MASK) == ROHC_IR_PACKET_TYPE_BASE {
            let fields_start = framing.fields_start();
            let header_len = fields_start + 2;
            if packet.len() < header_len {
                return Err(RohcError::Parsing(RohcParsingError::NotEnoughData {
                    needed: header_len,
                    got: packet.len(),
                    context: ParseContext::IrPacketHeader,
                }));
            }
            let received = packet[fields_start + 1];
            let mut input = packet[..header_len].to_vec();
            input[fields_start + 1] = 0;
            let calculated = crc_calculators.crc8(&input);
            if calculated != received {
                return Err(RohcError::Parsing(RohcParsingError::CrcMismatch {
                    expected: received,
                    calculated,
                    crc_type: crate::error::CrcType::Crc8,
                }));
            }
            context.profile = RohcProfile::Uncompressed;
            context.mode = DecompressorMode::FullContext;
            return Ok(packet[header_len..].to_vec());
        }

        if context.mode != DecompressorMode::FullContext {
            return Err(RohcError::Decompression(DecompressionError::NoContext {
                cid: context.cid,
            }));
        }
        // Reassemble around the CID bytes: the original first octet sits
        // at the type position, the rest follows the framing.
        let mut out = Vec::with_capacity(packet.len());
        out.push(type_octet);
        out.extend_from_slice(&packet[framing.fields_start()..]);
        Ok(out)
    }
}

impl Default for RohcDecompressor {
    fn default() -> Self {
        Self::with_defaults()
    }
}
