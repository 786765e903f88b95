// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Hosted processor code.
//!
//! Lets the architecture independent parts of the loader build and run as unit tests on the
//! development machine.
//!
//! # Orientation
//!
//! Since arch modules are imported into generic modules using the path attribute, the path of this
//! file is:
//!
//! crate::cpu::arch_cpu

use core::sync::atomic::{compiler_fence, Ordering};

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Pause execution on the core.
pub fn wait_forever() -> ! {
    loop {
        core::hint::spin_loop()
    }
}

/// Instruction synchronization barrier.
pub fn isb() {
    compiler_fence(Ordering::SeqCst);
}

/// Host caches are coherent, so only prevent the compiler from reordering around the flush.
pub fn flush_dcache_range(_base: usize, _size: usize) {
    compiler_fence(Ordering::SeqCst);
}
