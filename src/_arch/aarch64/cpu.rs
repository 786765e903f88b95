// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2018-2023 Andre Richter <andre.o.richter@gmail.com>

//! Architectural processor code.
//!
//! # Orientation
//!
//! Since arch modules are imported into generic modules using the path attribute, the path of this
//! file is:
//!
//! crate::cpu::arch_cpu

use crate::common::{align_down, align_up};
use aarch64_cpu::asm::{self, barrier};
use core::arch::asm;

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

/// Smallest data cache line size of all caches the core controls, in bytes.
#[inline(always)]
fn dcache_line_size() -> usize {
    let ctr: u64;

    unsafe { asm!("mrs {}, ctr_el0", out(reg) ctr, options(nomem, nostack)) };

    // CTR_EL0.DminLine, log2 of the number of words.
    4 << ((ctr >> 16) & 0xf)
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Pause execution on the core.
#[inline(always)]
pub fn wait_forever() -> ! {
    loop {
        asm::wfe()
    }
}

/// Instruction synchronization barrier.
#[inline(always)]
pub fn isb() {
    barrier::isb(barrier::SY);
}

/// Clean and invalidate the data cache lines covering `[base, base + size)` to the point of
/// coherency.
pub fn flush_dcache_range(base: usize, size: usize) {
    if size == 0 {
        return;
    }

    let line = dcache_line_size();
    let end = align_up(base + size, line);
    let mut addr = align_down(base, line);

    while addr < end {
        unsafe { asm!("dc civac, {}", in(reg) addr, options(nostack)) };
        addr += line;
    }

    barrier::dsb(barrier::SY);
}
