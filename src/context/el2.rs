// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! EL2 system register context.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::context::el2

use super::{
    features::{Capabilities, CpuFeatures},
    interface::SysRegs,
    regs::{
        CNTHCTL_EL2, CNTHP_CTL_EL2, CPTR_EL2_NO_TRAPS, HCRX_EL2_INIT_VAL, HCR_EL2, ICC_SRE_EL2,
        MDCR_EL2, PMCR_EL0, SCR_EL3, SCTLR_EE, SCTLR_EL2_RES1,
    },
    sysreg::{RegisterBank, SysReg},
};
use crate::image::{EntryPointInfo, EpAttributes};
use tock_registers::{
    interfaces::{ReadWriteable, Readable, Writeable},
    registers::InMemoryRegister,
};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const EL2_COMMON: &[SysReg] = &[
    SysReg::ACTLR_EL2,
    SysReg::AFSR0_EL2,
    SysReg::AFSR1_EL2,
    SysReg::AMAIR_EL2,
    SysReg::CNTHCTL_EL2,
    SysReg::CNTVOFF_EL2,
    SysReg::CPTR_EL2,
    SysReg::ELR_EL2,
    SysReg::ESR_EL2,
    SysReg::FAR_EL2,
    SysReg::HACR_EL2,
    SysReg::HCR_EL2,
    SysReg::HPFAR_EL2,
    SysReg::HSTR_EL2,
    SysReg::ICC_SRE_EL2,
    SysReg::ICH_HCR_EL2,
    SysReg::ICH_VMCR_EL2,
    SysReg::MAIR_EL2,
    SysReg::MDCR_EL2,
    SysReg::SCTLR_EL2,
    SysReg::SPSR_EL2,
    SysReg::SP_EL2,
    SysReg::TCR_EL2,
    SysReg::TPIDR_EL2,
    SysReg::TTBR0_EL2,
    SysReg::VBAR_EL2,
    SysReg::VMPIDR_EL2,
    SysReg::VPIDR_EL2,
    SysReg::VTCR_EL2,
    SysReg::VTTBR_EL2,
];

/// Registers that exist when a single feature is implemented, in save order.
const EL2_GATED: &[(CpuFeatures, &[SysReg])] = &[
    (CpuFeatures::ECV_V2, &[SysReg::CNTPOFF_EL2]),
    (CpuFeatures::VHE, &[SysReg::CONTEXTIDR_EL2, SysReg::TTBR1_EL2]),
    (CpuFeatures::RAS, &[SysReg::VDISR_EL2, SysReg::VSESR_EL2]),
    (CpuFeatures::NV2, &[SysReg::VNCR_EL2]),
    (CpuFeatures::TRF, &[SysReg::TRFCR_EL2]),
    (CpuFeatures::CSV2_2, &[SysReg::SCXTNUM_EL2]),
    (CpuFeatures::HCX, &[SysReg::HCRX_EL2]),
    (CpuFeatures::TCR2, &[SysReg::TCR2_EL2]),
    (CpuFeatures::S1PIE, &[SysReg::PIRE0_EL2, SysReg::PIR_EL2]),
    (CpuFeatures::S2PIE, &[SysReg::S2PIR_EL2]),
    (CpuFeatures::S1POE, &[SysReg::POR_EL2]),
    (CpuFeatures::GCS, &[SysReg::GCSCR_EL2, SysReg::GCSPR_EL2]),
];

fn for_each_mpam_reg(caps: &Capabilities, f: &mut impl FnMut(SysReg)) {
    f(SysReg::MPAM2_EL2);

    if !caps.has(CpuFeatures::MPAM_HAS_HCR) {
        return;
    }

    f(SysReg::MPAMHCR_EL2);
    f(SysReg::MPAMVPM0_EL2);
    f(SysReg::MPAMVPMV_EL2);

    for n in 1..=caps.mpam_vpmr_max {
        match SysReg::mpam_vpm(n) {
            Some(r) => f(r),
            None => break,
        }
    }
}

fn for_each_fgt_reg(caps: &Capabilities, f: &mut impl FnMut(SysReg)) {
    f(SysReg::HDFGRTR_EL2);
    if caps.has(CpuFeatures::AMU) {
        f(SysReg::HAFGRTR_EL2);
    }
    f(SysReg::HDFGWTR_EL2);
    f(SysReg::HFGITR_EL2);
    f(SysReg::HFGRTR_EL2);
    f(SysReg::HFGWTR_EL2);
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// Call `f` for every EL2 register that is part of a world's context on this CPU.
///
/// Nothing is visited if EL2 is not implemented.
pub fn for_each_el2_reg(caps: &Capabilities, mut f: impl FnMut(SysReg)) {
    if !caps.has(CpuFeatures::EL2) {
        return;
    }

    EL2_COMMON.iter().copied().for_each(&mut f);

    if caps.has(CpuFeatures::MTE2) {
        f(SysReg::TFSR_EL2);
    }

    if caps.has(CpuFeatures::MPAM) {
        for_each_mpam_reg(caps, &mut f);
    }

    if caps.has(CpuFeatures::FGT) {
        for_each_fgt_reg(caps, &mut f);
    }

    for (feature, regs) in EL2_GATED {
        if caps.has(*feature) {
            regs.iter().copied().for_each(&mut f);
        }
    }
}

/// Copy the live EL2 registers into `bank`.
pub fn save(caps: &Capabilities, live: &impl SysRegs, bank: &mut RegisterBank) {
    for_each_el2_reg(caps, |r| bank.set(r, live.read(r)));
}

/// Program the live EL2 registers from `bank`.
pub fn restore(caps: &Capabilities, bank: &RegisterBank, live: &mut impl SysRegs) {
    for_each_el2_reg(caps, |r| live.write(r, bank.get(r)));
}

/// Seed the EL2 part of a fresh non-secure context.
pub fn setup_nonsecure(caps: &Capabilities, bank: &mut RegisterBank, ep: &EntryPointInfo) {
    if !caps.has(CpuFeatures::EL2) {
        return;
    }

    let ee = if ep.attributes.contains(EpAttributes::EE_BIG) {
        SCTLR_EE
    } else {
        0
    };
    bank.set(SysReg::SCTLR_EL2, SCTLR_EL2_RES1 | ee);

    let sre = InMemoryRegister::<u64, ICC_SRE_EL2::Register>::new(0);
    sre.write(
        ICC_SRE_EL2::DIB::SET
            + ICC_SRE_EL2::DFB::SET
            + ICC_SRE_EL2::EN::SET
            + ICC_SRE_EL2::SRE::SET,
    );
    bank.set(SysReg::ICC_SRE_EL2, sre.get());

    if caps.has(CpuFeatures::HCX) {
        bank.set(SysReg::HCRX_EL2, HCRX_EL2_INIT_VAL);
    }
}

/// The live SCTLR_EL2 for a non-secure world that runs its own EL2: endianness follows EL1.
pub fn hyp_sctlr(sctlr_el1: u64) -> u64 {
    (sctlr_el1 & SCTLR_EE) | SCTLR_EL2_RES1
}

/// Put an implemented but unused EL2 into a state where it neither traps nor disturbs EL1.
///
/// `scr_el3` is the SCR_EL3 of the world about to run.
pub fn neutralize(caps: &Capabilities, scr_el3: u64, live: &mut impl SysRegs) {
    let scr = InMemoryRegister::<u64, SCR_EL3::Register>::new(scr_el3);

    let hcr = InMemoryRegister::<u64, HCR_EL2::Register>::new(0);
    if scr.matches_all(SCR_EL3::RW::AArch64) {
        hcr.modify(HCR_EL2::RW::AArch64);
    }
    hcr.modify(HCR_EL2::API::SET + HCR_EL2::APK::SET);
    live.write(SysReg::HCR_EL2, hcr.get());

    live.write(SysReg::CPTR_EL2, CPTR_EL2_NO_TRAPS);

    let cnthctl = InMemoryRegister::<u64, CNTHCTL_EL2::Register>::new(0);
    cnthctl.write(CNTHCTL_EL2::EL1PCEN::SET + CNTHCTL_EL2::EL1PCTEN::SET);
    live.write(SysReg::CNTHCTL_EL2, cnthctl.get());

    live.write(SysReg::CNTVOFF_EL2, 0);

    let midr = live.read(SysReg::MIDR_EL1);
    let mpidr = live.read(SysReg::MPIDR_EL1);
    live.write(SysReg::VPIDR_EL2, midr);
    live.write(SysReg::VMPIDR_EL2, mpidr);

    // Stage 2 is off, but cache maintenance still depends on the VMID.
    live.write(SysReg::VTTBR_EL2, 0);

    let mdcr = InMemoryRegister::<u64, MDCR_EL2::Register>::new(0);
    if caps.has(CpuFeatures::PMUV3) {
        let pmcr = InMemoryRegister::<u64, PMCR_EL0::Register>::new(live.read(SysReg::PMCR_EL0));
        mdcr.modify(MDCR_EL2::HPMN.val(pmcr.read(PMCR_EL0::N)));
    }
    mdcr.modify(
        MDCR_EL2::TDRA::CLEAR
            + MDCR_EL2::TDOSA::CLEAR
            + MDCR_EL2::TDA::CLEAR
            + MDCR_EL2::TDE::CLEAR,
    );
    live.write(SysReg::MDCR_EL2, mdcr.get());

    live.write(SysReg::HSTR_EL2, 0);

    let cnthp =
        InMemoryRegister::<u64, CNTHP_CTL_EL2::Register>::new(live.read(SysReg::CNTHP_CTL_EL2));
    cnthp.modify(CNTHP_CTL_EL2::ENABLE::CLEAR);
    live.write(SysReg::CNTHP_CTL_EL2, cnthp.get());
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
