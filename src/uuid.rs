// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! 128-bit image identifiers.

use core::fmt;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// A UUID in the byte order used by firmware image packages.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(C)]
pub struct Uuid {
    time_low: [u8; 4],
    time_mid: [u8; 2],
    time_hi_and_version: [u8; 2],
    clock_seq_hi_and_reserved: u8,
    clock_seq_low: u8,
    node: [u8; 6],
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl Uuid {
    /// The all-zero identifier. Terminates identifier tables.
    pub const NULL: Uuid = Uuid::from_bytes([0; 16]);

    /// EL3 runtime firmware (BL31).
    pub const EL3_RUNTIME_FIRMWARE_BL31: Uuid = Uuid::from_bytes([
        0x47, 0xd4, 0x08, 0x6d, 0x4c, 0xfe, 0x98, 0x46, 0x9b, 0x95, 0x29, 0x50, 0xcb, 0xbd, 0x5a,
        0x00,
    ]);

    /// Secure payload (BL32).
    pub const SECURE_PAYLOAD_BL32: Uuid = Uuid::from_bytes([
        0x05, 0xd0, 0xe1, 0x89, 0x53, 0xdc, 0x13, 0x47, 0x8d, 0x2b, 0x50, 0x0a, 0x4b, 0x7a, 0x3e,
        0x38,
    ]);

    /// Second extra secure payload image. Carries the initial ramdisk on this board family.
    pub const SECURE_PAYLOAD_BL32_EXTRA2: Uuid = Uuid::from_bytes([
        0x8e, 0xa8, 0x7b, 0xb1, 0xcf, 0xa2, 0x3f, 0x4d, 0x85, 0xfd, 0xe7, 0xbb, 0xa5, 0x02, 0x20,
        0xd9,
    ]);

    /// Non-trusted firmware (BL33).
    pub const NON_TRUSTED_FIRMWARE_BL33: Uuid = Uuid::from_bytes([
        0xd6, 0xd0, 0xee, 0xa7, 0xfc, 0xea, 0xd5, 0x4b, 0x97, 0x82, 0x99, 0x34, 0xf2, 0x34, 0xb6,
        0xe4,
    ]);

    /// Non-trusted firmware configuration.
    pub const NT_FW_CONFIG: Uuid = Uuid::from_bytes([
        0x28, 0xda, 0x98, 0x15, 0x93, 0xe8, 0x7e, 0x44, 0xac, 0x66, 0x1a, 0xaf, 0x80, 0x15, 0x50,
        0xf9,
    ]);

    /// Create an instance from its 16 raw bytes.
    pub const fn from_bytes(b: [u8; 16]) -> Self {
        Self {
            time_low: [b[0], b[1], b[2], b[3]],
            time_mid: [b[4], b[5]],
            time_hi_and_version: [b[6], b[7]],
            clock_seq_hi_and_reserved: b[8],
            clock_seq_low: b[9],
            node: [b[10], b[11], b[12], b[13], b[14], b[15]],
        }
    }

    /// Whether this is the all-zero identifier.
    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.time_low {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "-{:02x}{:02x}", self.time_mid[0], self.time_mid[1])?;
        write!(
            f,
            "-{:02x}{:02x}",
            self.time_hi_and_version[0], self.time_hi_and_version[1]
        )?;
        write!(
            f,
            "-{:02x}{:02x}-",
            self.clock_seq_hi_and_reserved, self.clock_seq_low
        )?;
        for b in self.node {
            write!(f, "{:02x}", b)?;
        }

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_canonical() {
        assert_eq!(
            Uuid::EL3_RUNTIME_FIRMWARE_BL31.to_string(),
            "47d4086d-4cfe-9846-9b95-2950cbbd5a00"
        );
    }

    #[test]
    fn null_detection() {
        assert!(Uuid::NULL.is_null());
        assert!(Uuid::default().is_null());
        assert!(!Uuid::NT_FW_CONFIG.is_null());
    }
}
