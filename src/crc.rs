//! ROHC CRC (Cyclic Redundancy Check) calculation utilities.
//!
//! This module wraps the `crc` crate to provide the three CRC algorithms the
//! ROHC framework uses for packet validation (RFC 3095, Section 5.9):
//! the 3-bit CRC covering UO-0/UO-1 reconstructions, the 7-bit CRC covering
//! UOR-2 reconstructions, and the 8-bit CRC covering IR/IR-DYN headers.
//!
//! The CRC-STATIC / CRC-DYNAMIC field selections those CRCs run over are
//! assembled by the header builder; this module only computes checksums over
//! the byte slices it is handed.

use crc::{CRC_3_ROHC, CRC_7_ROHC, CRC_8_ROHC, Crc};
use std::fmt;

/// Pre-initialized CRC algorithm instances for ROHC.
///
/// Intended for reuse so that `Crc<u8>` instances are not re-created on
/// every packet.
pub struct CrcCalculators {
    crc3_calculator: Crc<u8>,
    crc7_calculator: Crc<u8>,
    crc8_calculator: Crc<u8>,
}

impl fmt::Debug for CrcCalculators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrcCalculators")
            .field("crc3_calculator", &format_args!("Crc<u8>(ROHC_CRC3_Algo)"))
            .field("crc7_calculator", &format_args!("Crc<u8>(ROHC_CRC7_Algo)"))
            .field("crc8_calculator", &format_args!("Crc<u8>(ROHC_CRC8_Algo)"))
            .finish()
    }
}

impl CrcCalculators {
    /// Creates a new `CrcCalculators`, initializing the ROHC CRC-3, CRC-7
    /// and CRC-8 algorithms.
    pub fn new() -> Self {
        Self {
            crc3_calculator: Crc::<u8>::new(&CRC_3_ROHC),
            crc7_calculator: Crc::<u8>::new(&CRC_7_ROHC),
            crc8_calculator: Crc::<u8>::new(&CRC_8_ROHC),
        }
    }

    /// Calculates the ROHC 3-bit CRC (CRC-3/ROHC) over `input`.
    ///
    /// # Returns
    /// The calculated 3-bit CRC value (`0x00` to `0x07`).
    #[inline]
    pub fn crc3(&self, input: &[u8]) -> u8 {
        self.crc3_calculator.checksum(input)
    }

    /// Calculates the ROHC 7-bit CRC (CRC-7/ROHC) over `input`.
    ///
    /// # Returns
    /// The calculated 7-bit CRC value (`0x00` to `0x7F`).
    #[inline]
    pub fn crc7(&self, input: &[u8]) -> u8 {
        self.crc7_calculator.checksum(input)
    }

    /// Calculates the ROHC 8-bit CRC (CRC-8/ROHC) over `input`.
    ///
    /// # Returns
    /// The calculated 8-bit CRC value (`0x00` to `0xFF`).
    #[inline]
    pub fn crc8(&self, input: &[u8]) -> u8 {
        self.crc8_calculator.checksum(input)
    }

    /// Computes a CRC over a split (static, dynamic) field selection.
    ///
    /// The dynamic pass continues from the static pass' intermediate value,
    /// so the result equals a single CRC over the concatenation of the two
    /// selections in order.
    pub fn crc_over_selections(&self, crc_type: crate::error::CrcType, parts: &[&[u8]]) -> u8 {
        let calc = match crc_type {
            crate::error::CrcType::Crc3 => &self.crc3_calculator,
            crate::error::CrcType::Crc7 => &self.crc7_calculator,
            crate::error::CrcType::Crc8 => &self.crc8_calculator,
        };
        let mut digest = calc.digest();
        for part in parts {
            digest.update(part);
        }
        digest.finalize()
    }
}

impl Default for CrcCalculators {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculates the ROHC 8-bit CRC directly, creating a fresh instance.
///
/// The ROHC CRC-8 parameters are polynomial `0x07`
/// (`x^8 + x^2 + x^1 + 1`), initial value `0xFF`, no reflection, no final
/// XOR. For frequent calculations prefer [`CrcCalculators`].
pub fn calculate_rohc_crc8(input: &[u8]) -> u8 {
    Crc::<u8>::new(&CRC_8_ROHC).checksum(input)
}

/// Calculates the ROHC 7-bit CRC directly, creating a fresh instance.
///
/// Polynomial `x^7 + x^6 + x^3 + x^2 + x + 1`, initial value `0x7F`.
pub fn calculate_rohc_crc7(input: &[u8]) -> u8 {
    Crc::<u8>::new(&CRC_7_ROHC).checksum(input)
}

/// Calculates the ROHC 3-bit CRC directly, creating a fresh instance.
///
/// Polynomial `x^3 + x^1 + 1`, initial value `0x07`.
pub fn calculate_rohc_crc3(input: &[u8]) -> u8 {
    Crc::<u8>::new(&CRC_3_ROHC).checksum(input)
}
