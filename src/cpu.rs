// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2020-2023 Andre Richter <andre.o.richter@gmail.com>

//! Processor code.

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[path = "_arch/aarch64/cpu.rs"]
mod arch_cpu;

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
#[path = "_arch/host/cpu.rs"]
mod arch_cpu;

//--------------------------------------------------------------------------------------------------
// Architectural Public Reexports
//--------------------------------------------------------------------------------------------------
pub use arch_cpu::{flush_dcache_range, isb, wait_forever};
