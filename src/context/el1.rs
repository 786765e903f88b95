// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! EL1 system register context.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::context::el1

use super::{
    features::{Capabilities, CpuFeatures},
    interface::SysRegs,
    regs::{SCTLR_AARCH32_EL1_RES1, SCTLR_EL1, SCTLR_EL1_RES1, Spsr},
    sysreg::{RegisterBank, SysReg},
};
use crate::image::{EntryPointInfo, EpAttributes};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const EL1_COMMON: &[SysReg] = &[
    SysReg::SPSR_EL1,
    SysReg::ELR_EL1,
    SysReg::SCTLR_EL1,
    SysReg::TCR_EL1,
    SysReg::CPACR_EL1,
    SysReg::CSSELR_EL1,
    SysReg::SP_EL1,
    SysReg::ESR_EL1,
    SysReg::TTBR0_EL1,
    SysReg::TTBR1_EL1,
    SysReg::MAIR_EL1,
    SysReg::AMAIR_EL1,
    SysReg::ACTLR_EL1,
    SysReg::TPIDR_EL1,
    SysReg::TPIDR_EL0,
    SysReg::TPIDRRO_EL0,
    SysReg::PAR_EL1,
    SysReg::FAR_EL1,
    SysReg::AFSR0_EL1,
    SysReg::AFSR1_EL1,
    SysReg::CONTEXTIDR_EL1,
    SysReg::VBAR_EL1,
    SysReg::CNTKCTL_EL1,
    SysReg::MDCCINT_EL1,
    SysReg::MDSCR_EL1,
];

const EL1_MTE: &[SysReg] = &[
    SysReg::TFSRE0_EL1,
    SysReg::TFSR_EL1,
    SysReg::RGSR_EL1,
    SysReg::GCR_EL1,
];

const EL1_PAUTH: &[SysReg] = &[
    SysReg::APIAKEYLO_EL1,
    SysReg::APIAKEYHI_EL1,
    SysReg::APIBKEYLO_EL1,
    SysReg::APIBKEYHI_EL1,
    SysReg::APDAKEYLO_EL1,
    SysReg::APDAKEYHI_EL1,
    SysReg::APDBKEYLO_EL1,
    SysReg::APDBKEYHI_EL1,
    SysReg::APGAKEYLO_EL1,
    SysReg::APGAKEYHI_EL1,
];

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Call `f` for every EL1 register that is part of a world's context on this CPU.
pub fn for_each_el1_reg(caps: &Capabilities, mut f: impl FnMut(SysReg)) {
    EL1_COMMON.iter().copied().for_each(&mut f);

    if caps.has(CpuFeatures::MTE2) {
        EL1_MTE.iter().copied().for_each(&mut f);
    }

    if caps.has(CpuFeatures::PAUTH) {
        EL1_PAUTH.iter().copied().for_each(&mut f);
    }
}

/// Copy the live EL1 registers into `bank`.
pub fn save(caps: &Capabilities, live: &impl SysRegs, bank: &mut RegisterBank) {
    for_each_el1_reg(caps, |r| bank.set(r, live.read(r)));
}

/// Program the live EL1 registers from `bank`.
pub fn restore(caps: &Capabilities, bank: &RegisterBank, live: &mut impl SysRegs) {
    for_each_el1_reg(caps, |r| live.write(r, bank.get(r)));
}

/// The SCTLR_EL1 value a lower world starts with.
///
/// Only endianness is taken from the entry point. An AArch32 EL1 additionally gets CP15 barriers
/// and untrapped WFI and WFE.
pub fn initial_sctlr(ep: &EntryPointInfo) -> u64 {
    let ee = if ep.attributes.contains(EpAttributes::EE_BIG) {
        SCTLR_EL1::EE::SET.value
    } else {
        0
    };

    if Spsr::new(ep.spsr).is_aarch64() {
        SCTLR_EL1_RES1 | ee
    } else {
        let aarch32_bits = SCTLR_EL1::CP15BEN::SET + SCTLR_EL1::nTWI::SET + SCTLR_EL1::nTWE::SET;

        SCTLR_AARCH32_EL1_RES1 | aarch32_bits.value | ee
    }
}

/// Seed the EL1 part of a fresh context.
pub fn setup(bank: &mut RegisterBank, ep: &EntryPointInfo, live: &impl SysRegs) {
    bank.set(SysReg::SCTLR_EL1, initial_sctlr(ep));

    // Implementation defined, whatever the platform configured for EL3 applies below as well.
    bank.set(SysReg::ACTLR_EL1, live.read(SysReg::ACTLR_EL1));
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
