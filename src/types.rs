//! Core field types for the ROHC decompression engine.
//!
//! Wire counters and identifiers get thin `#[repr(transparent)]` wrappers
//! so an SN cannot be handed where an IP-ID or a gen_id is expected. The
//! macro generates only the shared surface every field needs (construction,
//! raw access, display, literal-friendly equality); wrapping arithmetic is
//! implemented per type, on the fields whose wire semantics are modular.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a transparent wrapper for one wire field, with the display
/// prefix used in logs and error messages.
macro_rules! field_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty), display $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Wraps a raw field value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw field value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        // Assertions and guards compare against plain literals.
        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }
    };
}

field_newtype!(
    /// Context identifier keying a decompression flow.
    ContextId(u16), display "CID"
);

field_newtype!(
    /// 16-bit ROHC sequence number.
    SequenceNumber(u16), display "SN"
);

field_newtype!(
    /// IP identification field for IPv4 headers.
    IpId(u16), display "IP_ID"
);

field_newtype!(
    /// RTP timestamp value.
    Timestamp(u32), display "TS"
);

field_newtype!(
    /// RTP Synchronization Source (SSRC) identifier.
    Ssrc(u32), display "SSRC"
);

field_newtype!(
    /// 8-bit generation identifier of an extension-header list.
    GenId(u8), display "GEN"
);

impl ContextId {
    /// Maximum valid context ID for small CID mode.
    pub const MAX_SMALL_CID: Self = Self::new(15);
    /// Maximum valid context ID for large CID mode (SDVL 14-bit bound).
    pub const MAX_LARGE_CID: Self = Self::new((1 << 14) - 1);
}

impl SequenceNumber {
    /// The initial sequence number.
    pub const INITIAL: Self = Self::new(0);

    /// Advances by `delta` packets, wrapping at the top of the SN space.
    #[inline]
    pub const fn wrapping_add(self, delta: u16) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    /// Wrapping distance from `earlier` up to this SN.
    #[inline]
    pub const fn wrapping_sub(self, earlier: Self) -> u16 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Big-endian wire form.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl IpId {
    /// The initial IP ID.
    pub const INITIAL: Self = Self::new(0);

    /// Big-endian wire form.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl Timestamp {
    /// The initial timestamp.
    pub const INITIAL: Self = Self::new(0);

    /// Wrapping difference between this timestamp and `other`.
    #[inline]
    pub const fn wrapping_diff(self, other: Timestamp) -> u32 {
        self.0.wrapping_sub(other.0)
    }

    /// Big-endian wire form.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl Ssrc {
    /// Big-endian wire form.
    #[inline]
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}
