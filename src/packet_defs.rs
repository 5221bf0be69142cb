//! ROHC profile identifiers and channel-wide packet definitions.

use serde::{Deserialize, Serialize};

use crate::constants::{
    PROFILE_ID_ESP, PROFILE_ID_IP, PROFILE_ID_RTP, PROFILE_ID_UDP, PROFILE_ID_UDP_LITE,
    PROFILE_ID_UNCOMPRESSED,
};

/// Supported ROHC profile identifiers.
///
/// The numeric values correspond to the profile identifiers defined in
/// RFC 3095 (0x0000-0x0003), RFC 3843 (0x0004) and RFC 4019 (0x0008).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RohcProfile {
    /// Uncompressed passthrough (profile 0x0000).
    Uncompressed,
    /// RTP/UDP/IP compression (profile 0x0001).
    Rtp,
    /// UDP/IP compression (profile 0x0002).
    Udp,
    /// ESP/IP compression (profile 0x0003); recognized, not implemented.
    Esp,
    /// IP-only compression (profile 0x0004).
    Ip,
    /// UDP-Lite/IP compression (profile 0x0008).
    UdpLite,
    /// Unknown or unsupported profile byte.
    Unknown(u8),
}

impl From<u8> for RohcProfile {
    fn from(value: u8) -> Self {
        match value {
            PROFILE_ID_UNCOMPRESSED => RohcProfile::Uncompressed,
            PROFILE_ID_RTP => RohcProfile::Rtp,
            PROFILE_ID_UDP => RohcProfile::Udp,
            PROFILE_ID_ESP => RohcProfile::Esp,
            PROFILE_ID_IP => RohcProfile::Ip,
            PROFILE_ID_UDP_LITE => RohcProfile::UdpLite,
            unknown_id => RohcProfile::Unknown(unknown_id),
        }
    }
}

impl From<RohcProfile> for u8 {
    fn from(profile: RohcProfile) -> Self {
        match profile {
            RohcProfile::Uncompressed => PROFILE_ID_UNCOMPRESSED,
            RohcProfile::Rtp => PROFILE_ID_RTP,
            RohcProfile::Udp => PROFILE_ID_UDP,
            RohcProfile::Esp => PROFILE_ID_ESP,
            RohcProfile::Ip => PROFILE_ID_IP,
            RohcProfile::UdpLite => PROFILE_ID_UDP_LITE,
            RohcProfile::Unknown(val) => val,
        }
    }
}

/// CID encoding negotiated for a ROHC channel.
///
/// Small CIDs (0..15) travel in an optional Add-CID octet; large CIDs
/// (0..2^14-1) are SDVL-encoded after the packet type octet. The two
/// encodings never mix on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CidType {
    /// Add-CID framing, CIDs 0..=15.
    #[default]
    Small,
    /// SDVL framing, CIDs 0..=16383.
    Large,
}
