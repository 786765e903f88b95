// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! BSP Memory Management.

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

// Symbols from the linker script, delimiting the built-in monitor image.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
extern "C" {
    static _binary_bl31_bin_start: u8;
    static _binary_bl31_bin_end: u8;
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The board's memory map.
#[rustfmt::skip]
pub mod map {
    pub const TZRAM_BASE:             usize =        0x4300_0000;
    pub const TZRAM_SIZE:             usize =        0x0004_0000;

    pub const BL31_BASE:              usize = TZRAM_BASE + 0x1000;
    pub const BL31_LIMIT:             usize = TZRAM_BASE + TZRAM_SIZE;

    pub const BL32_BASE:              usize =        0x4FC0_0000;
    pub const BL32_LIMIT:             usize =        0x5000_0000;

    pub const BL33_BASE:              usize =        0x41E0_0000;
    pub const BL33_MAX_SIZE:          usize =        0x0400_0000;

    /// The initrd goes right behind the non-secure payload.
    pub const BL32_EXTRA2_BASE:       usize = BL33_BASE + BL33_MAX_SIZE;
    pub const BL32_EXTRA2_MAX_SIZE:   usize =        0x0400_0000;

    /// Table of pre-positioned images, written by the ROM stage right behind the monitor.
    pub const PREPOSITIONED_TABLE:    usize = BL31_LIMIT;
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// The monitor image linked into the loader, if any.
///
/// # Safety
///
/// - Values are provided by the linker script and must be trusted as-is.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub fn fallback_monitor_image() -> Option<&'static [u8]> {
    let (start, end) = unsafe {
        (
            &_binary_bl31_bin_start as *const u8 as usize,
            &_binary_bl31_bin_end as *const u8 as usize,
        )
    };

    if end <= start {
        return None;
    }

    Some(unsafe { core::slice::from_raw_parts(start as *const u8, end - start) })
}

/// The monitor image linked into the loader, if any.
#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub fn fallback_monitor_image() -> Option<&'static [u8]> {
    None
}
