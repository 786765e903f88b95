// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Optional architecture features.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::context::features

use super::{interface::SysRegs, sysreg::SysReg};
use bitflags::bitflags;
use tock_registers::{interfaces::Readable, register_bitfields, registers::InMemoryRegister};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

register_bitfields! {u64,
    ID_AA64PFR0_EL1 [
        CSV2 OFFSET(56) NUMBITS(4) [],
        RME OFFSET(52) NUMBITS(4) [],
        AMU OFFSET(44) NUMBITS(4) [],
        MPAM OFFSET(40) NUMBITS(4) [],
        SEL2 OFFSET(36) NUMBITS(4) [],
        SVE OFFSET(32) NUMBITS(4) [],
        RAS OFFSET(28) NUMBITS(4) [],
        EL2 OFFSET(8) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64PFR1_EL1 [
        GCS OFFSET(44) NUMBITS(4) [],
        SME OFFSET(24) NUMBITS(4) [],
        MTE OFFSET(8) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64MMFR0_EL1 [
        ECV OFFSET(60) NUMBITS(4) [],
        FGT OFFSET(56) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64MMFR1_EL1 [
        HCX OFFSET(40) NUMBITS(4) [],
        TWED OFFSET(32) NUMBITS(4) [],
        VH OFFSET(8) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64MMFR2_EL1 [
        NV OFFSET(24) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64MMFR3_EL1 [
        S1POE OFFSET(16) NUMBITS(4) [],
        S2PIE OFFSET(12) NUMBITS(4) [],
        S1PIE OFFSET(8) NUMBITS(4) [],
        TCRX OFFSET(0) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64DFR0_EL1 [
        TraceFilt OFFSET(40) NUMBITS(4) [],
        PMUVer OFFSET(8) NUMBITS(4) [],
        TraceVer OFFSET(4) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64ISAR1_EL1 [
        GPI OFFSET(28) NUMBITS(4) [],
        GPA OFFSET(24) NUMBITS(4) [],
        API OFFSET(8) NUMBITS(4) [],
        APA OFFSET(4) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    ID_AA64ISAR2_EL1 [
        APA3 OFFSET(12) NUMBITS(4) [],
        GPA3 OFFSET(8) NUMBITS(4) []
    ]
}

register_bitfields! {u64,
    MPAMIDR_EL1 [
        VPMR_MAX OFFSET(18) NUMBITS(3) [],
        HAS_HCR OFFSET(17) NUMBITS(1) []
    ]
}

// PMUVer value for an implementation defined, non-architectural PMU.
const PMUVER_IMP_DEF: u64 = 0xf;

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

bitflags! {
    /// Features the context manager conditionally enables or saves state for.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
    pub struct CpuFeatures: u64 {
        /// EL2 is implemented.
        const EL2 = 1 << 0;
        /// Secure EL2.
        const SEL2 = 1 << 1;
        /// Realm management extension.
        const RME = 1 << 2;
        /// Virtualization host extensions.
        const VHE = 1 << 3;
        /// Memory tagging, EL0 instructions only.
        const MTE_EL0 = 1 << 4;
        /// Memory tagging with tag storage (MTE2).
        const MTE2 = 1 << 5;
        /// Pointer authentication.
        const PAUTH = 1 << 6;
        const SVE = 1 << 7;
        const SME = 1 << 8;
        /// Extended hypervisor configuration, HCRX_EL2.
        const HCX = 1 << 9;
        /// Extended translation control, TCR2_ELx.
        const TCR2 = 1 << 10;
        /// Stage 1 permission indirection.
        const S1PIE = 1 << 11;
        /// Stage 2 permission indirection.
        const S2PIE = 1 << 12;
        /// Stage 1 permission overlay.
        const S1POE = 1 << 13;
        /// Guarded control stack.
        const GCS = 1 << 14;
        /// Fine grained traps.
        const FGT = 1 << 15;
        /// Enhanced counter virtualization.
        const ECV = 1 << 16;
        /// Enhanced counter virtualization with CNTPOFF_EL2.
        const ECV_V2 = 1 << 17;
        /// Delayed trapping of WFE.
        const TWED = 1 << 18;
        /// SCXTNUM_ELx context numbers.
        const CSV2_2 = 1 << 19;
        /// Memory partitioning and monitoring.
        const MPAM = 1 << 20;
        /// MPAM with MPAMHCR_EL2 and virtual partition mapping.
        const MPAM_HAS_HCR = 1 << 21;
        /// Activity monitors.
        const AMU = 1 << 22;
        /// Reliability, availability and serviceability.
        const RAS = 1 << 23;
        /// Enhanced nested virtualization.
        const NV2 = 1 << 24;
        /// Self hosted trace filtering.
        const TRF = 1 << 25;
        /// System register trace interface.
        const SYS_REG_TRACE = 1 << 26;
        /// Architectural performance monitors.
        const PMUV3 = 1 << 27;
    }
}

/// What the running CPU implements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub features: CpuFeatures,
    /// Highest implemented MPAMVPM<n>_EL2 index.
    ///
    /// Only meaningful with [`CpuFeatures::MPAM_HAS_HCR`].
    pub mpam_vpmr_max: u8,
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

fn id_reg<R: tock_registers::RegisterLongName>(
    regs: &impl SysRegs,
    reg: SysReg,
) -> InMemoryRegister<u64, R> {
    InMemoryRegister::new(regs.read(reg))
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl Capabilities {
    /// Nothing optional is implemented.
    pub const fn none() -> Self {
        Self {
            features: CpuFeatures::empty(),
            mpam_vpmr_max: 0,
        }
    }

    /// Everything is implemented, with all eight virtual partition mapping registers.
    pub const fn all() -> Self {
        Self {
            features: CpuFeatures::all(),
            mpam_vpmr_max: 7,
        }
    }

    /// Create an instance.
    pub const fn new(features: CpuFeatures, mpam_vpmr_max: u8) -> Self {
        Self {
            features,
            mpam_vpmr_max,
        }
    }

    /// Whether all of `f` are implemented.
    pub fn has(&self, f: CpuFeatures) -> bool {
        self.features.contains(f)
    }

    /// Whether any memory tagging support is implemented.
    pub fn has_mte(&self) -> bool {
        self.features.intersects(CpuFeatures::MTE_EL0 | CpuFeatures::MTE2)
    }

    /// Decode the ID registers of the running CPU.
    pub fn detect(regs: &impl SysRegs) -> Self {
        let pfr0 = id_reg::<ID_AA64PFR0_EL1::Register>(regs, SysReg::ID_AA64PFR0_EL1);
        let pfr1 = id_reg::<ID_AA64PFR1_EL1::Register>(regs, SysReg::ID_AA64PFR1_EL1);
        let mmfr0 = id_reg::<ID_AA64MMFR0_EL1::Register>(regs, SysReg::ID_AA64MMFR0_EL1);
        let mmfr1 = id_reg::<ID_AA64MMFR1_EL1::Register>(regs, SysReg::ID_AA64MMFR1_EL1);
        let mmfr2 = id_reg::<ID_AA64MMFR2_EL1::Register>(regs, SysReg::ID_AA64MMFR2_EL1);
        let mmfr3 = id_reg::<ID_AA64MMFR3_EL1::Register>(regs, SysReg::ID_AA64MMFR3_EL1);
        let dfr0 = id_reg::<ID_AA64DFR0_EL1::Register>(regs, SysReg::ID_AA64DFR0_EL1);
        let isar1 = id_reg::<ID_AA64ISAR1_EL1::Register>(regs, SysReg::ID_AA64ISAR1_EL1);
        let isar2 = id_reg::<ID_AA64ISAR2_EL1::Register>(regs, SysReg::ID_AA64ISAR2_EL1);

        let mut f = CpuFeatures::empty();

        f.set(CpuFeatures::EL2, pfr0.read(ID_AA64PFR0_EL1::EL2) != 0);
        f.set(CpuFeatures::SEL2, pfr0.read(ID_AA64PFR0_EL1::SEL2) != 0);
        f.set(CpuFeatures::RME, pfr0.read(ID_AA64PFR0_EL1::RME) != 0);
        f.set(CpuFeatures::SVE, pfr0.read(ID_AA64PFR0_EL1::SVE) != 0);
        f.set(CpuFeatures::RAS, pfr0.read(ID_AA64PFR0_EL1::RAS) != 0);
        f.set(CpuFeatures::AMU, pfr0.read(ID_AA64PFR0_EL1::AMU) != 0);
        f.set(CpuFeatures::MPAM, pfr0.read(ID_AA64PFR0_EL1::MPAM) != 0);
        f.set(CpuFeatures::CSV2_2, pfr0.read(ID_AA64PFR0_EL1::CSV2) >= 2);

        let mte = pfr1.read(ID_AA64PFR1_EL1::MTE);
        f.set(CpuFeatures::MTE_EL0, mte == 1);
        f.set(CpuFeatures::MTE2, mte >= 2);
        f.set(CpuFeatures::SME, pfr1.read(ID_AA64PFR1_EL1::SME) != 0);
        f.set(CpuFeatures::GCS, pfr1.read(ID_AA64PFR1_EL1::GCS) != 0);

        let ecv = mmfr0.read(ID_AA64MMFR0_EL1::ECV);
        f.set(CpuFeatures::ECV, ecv >= 1);
        f.set(CpuFeatures::ECV_V2, ecv >= 2);
        f.set(CpuFeatures::FGT, mmfr0.read(ID_AA64MMFR0_EL1::FGT) != 0);

        f.set(CpuFeatures::VHE, mmfr1.read(ID_AA64MMFR1_EL1::VH) != 0);
        f.set(CpuFeatures::TWED, mmfr1.read(ID_AA64MMFR1_EL1::TWED) != 0);
        f.set(CpuFeatures::HCX, mmfr1.read(ID_AA64MMFR1_EL1::HCX) != 0);

        f.set(CpuFeatures::NV2, mmfr2.read(ID_AA64MMFR2_EL1::NV) >= 2);

        f.set(CpuFeatures::TCR2, mmfr3.read(ID_AA64MMFR3_EL1::TCRX) != 0);
        f.set(CpuFeatures::S1PIE, mmfr3.read(ID_AA64MMFR3_EL1::S1PIE) != 0);
        f.set(CpuFeatures::S2PIE, mmfr3.read(ID_AA64MMFR3_EL1::S2PIE) != 0);
        f.set(CpuFeatures::S1POE, mmfr3.read(ID_AA64MMFR3_EL1::S1POE) != 0);

        let pmuver = dfr0.read(ID_AA64DFR0_EL1::PMUVer);
        f.set(CpuFeatures::PMUV3, pmuver != 0 && pmuver != PMUVER_IMP_DEF);
        f.set(CpuFeatures::SYS_REG_TRACE, dfr0.read(ID_AA64DFR0_EL1::TraceVer) != 0);
        f.set(CpuFeatures::TRF, dfr0.read(ID_AA64DFR0_EL1::TraceFilt) != 0);

        let pauth = isar1.read(ID_AA64ISAR1_EL1::APA)
            | isar1.read(ID_AA64ISAR1_EL1::API)
            | isar1.read(ID_AA64ISAR1_EL1::GPA)
            | isar1.read(ID_AA64ISAR1_EL1::GPI)
            | isar2.read(ID_AA64ISAR2_EL1::APA3)
            | isar2.read(ID_AA64ISAR2_EL1::GPA3);
        f.set(CpuFeatures::PAUTH, pauth != 0);

        let mut vpmr_max = 0;
        if f.contains(CpuFeatures::MPAM) {
            let idr = id_reg::<MPAMIDR_EL1::Register>(regs, SysReg::MPAMIDR_EL1);

            if idr.is_set(MPAMIDR_EL1::HAS_HCR) {
                f.insert(CpuFeatures::MPAM_HAS_HCR);
                vpmr_max = idr.read(MPAMIDR_EL1::VPMR_MAX) as u8;
            }
        }

        Self::new(f, vpmr_max)
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
