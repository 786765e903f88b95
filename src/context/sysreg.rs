// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! System register identifiers and the in-memory register bank.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::context::sysreg

use super::interface;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

/// Hands the full system register list to `$callback`.
///
/// Every entry names the register, its assembler spelling and whether it is writable. Newer
/// registers are spelled with their generic encoding so that older assemblers accept them.
macro_rules! with_sys_reg_list {
    ($callback:ident) => {
        $callback! {
            // Identification, read-only.
            MIDR_EL1 = "midr_el1", ro;
            MPIDR_EL1 = "mpidr_el1", ro;
            ID_AA64PFR0_EL1 = "id_aa64pfr0_el1", ro;
            ID_AA64PFR1_EL1 = "S3_0_C0_C4_1", ro;
            ID_AA64DFR0_EL1 = "id_aa64dfr0_el1", ro;
            ID_AA64ISAR1_EL1 = "id_aa64isar1_el1", ro;
            ID_AA64ISAR2_EL1 = "S3_0_C0_C6_2", ro;
            ID_AA64MMFR0_EL1 = "id_aa64mmfr0_el1", ro;
            ID_AA64MMFR1_EL1 = "id_aa64mmfr1_el1", ro;
            ID_AA64MMFR2_EL1 = "S3_0_C0_C7_2", ro;
            ID_AA64MMFR3_EL1 = "S3_0_C0_C7_3", ro;
            MPAMIDR_EL1 = "S3_0_C10_C4_4", ro;

            // EL3 state.
            SCR_EL3 = "scr_el3", rw;
            CPTR_EL3 = "cptr_el3", rw;
            MDCR_EL3 = "mdcr_el3", rw;
            ELR_EL3 = "elr_el3", rw;
            SPSR_EL3 = "spsr_el3", rw;

            // EL1 and EL0.
            SPSR_EL1 = "spsr_el1", rw;
            ELR_EL1 = "elr_el1", rw;
            SCTLR_EL1 = "sctlr_el1", rw;
            TCR_EL1 = "tcr_el1", rw;
            CPACR_EL1 = "cpacr_el1", rw;
            CSSELR_EL1 = "csselr_el1", rw;
            SP_EL1 = "sp_el1", rw;
            ESR_EL1 = "esr_el1", rw;
            TTBR0_EL1 = "ttbr0_el1", rw;
            TTBR1_EL1 = "ttbr1_el1", rw;
            MAIR_EL1 = "mair_el1", rw;
            AMAIR_EL1 = "amair_el1", rw;
            ACTLR_EL1 = "actlr_el1", rw;
            TPIDR_EL1 = "tpidr_el1", rw;
            TPIDR_EL0 = "tpidr_el0", rw;
            TPIDRRO_EL0 = "tpidrro_el0", rw;
            PAR_EL1 = "par_el1", rw;
            FAR_EL1 = "far_el1", rw;
            AFSR0_EL1 = "afsr0_el1", rw;
            AFSR1_EL1 = "afsr1_el1", rw;
            CONTEXTIDR_EL1 = "contextidr_el1", rw;
            VBAR_EL1 = "vbar_el1", rw;
            CNTKCTL_EL1 = "cntkctl_el1", rw;
            MDCCINT_EL1 = "mdccint_el1", rw;
            MDSCR_EL1 = "mdscr_el1", rw;
            PMCR_EL0 = "pmcr_el0", rw;

            // EL1 memory tagging.
            TFSRE0_EL1 = "S3_0_C5_C6_1", rw;
            TFSR_EL1 = "S3_0_C5_C6_0", rw;
            RGSR_EL1 = "S3_0_C1_C0_5", rw;
            GCR_EL1 = "S3_0_C1_C0_6", rw;

            // Pointer authentication keys.
            APIAKEYLO_EL1 = "S3_0_C2_C1_0", rw;
            APIAKEYHI_EL1 = "S3_0_C2_C1_1", rw;
            APIBKEYLO_EL1 = "S3_0_C2_C1_2", rw;
            APIBKEYHI_EL1 = "S3_0_C2_C1_3", rw;
            APDAKEYLO_EL1 = "S3_0_C2_C2_0", rw;
            APDAKEYHI_EL1 = "S3_0_C2_C2_1", rw;
            APDBKEYLO_EL1 = "S3_0_C2_C2_2", rw;
            APDBKEYHI_EL1 = "S3_0_C2_C2_3", rw;
            APGAKEYLO_EL1 = "S3_0_C2_C3_0", rw;
            APGAKEYHI_EL1 = "S3_0_C2_C3_1", rw;

            // EL2, always present when EL2 is implemented.
            ACTLR_EL2 = "actlr_el2", rw;
            AFSR0_EL2 = "afsr0_el2", rw;
            AFSR1_EL2 = "afsr1_el2", rw;
            AMAIR_EL2 = "amair_el2", rw;
            CNTHCTL_EL2 = "cnthctl_el2", rw;
            CNTVOFF_EL2 = "cntvoff_el2", rw;
            CPTR_EL2 = "cptr_el2", rw;
            ELR_EL2 = "elr_el2", rw;
            ESR_EL2 = "esr_el2", rw;
            FAR_EL2 = "far_el2", rw;
            HACR_EL2 = "hacr_el2", rw;
            HCR_EL2 = "hcr_el2", rw;
            HPFAR_EL2 = "hpfar_el2", rw;
            HSTR_EL2 = "hstr_el2", rw;
            ICC_SRE_EL2 = "S3_4_C12_C9_5", rw;
            ICH_HCR_EL2 = "S3_4_C12_C11_0", rw;
            ICH_VMCR_EL2 = "S3_4_C12_C11_7", rw;
            MAIR_EL2 = "mair_el2", rw;
            MDCR_EL2 = "mdcr_el2", rw;
            SCTLR_EL2 = "sctlr_el2", rw;
            SPSR_EL2 = "spsr_el2", rw;
            SP_EL2 = "sp_el2", rw;
            TCR_EL2 = "tcr_el2", rw;
            TPIDR_EL2 = "tpidr_el2", rw;
            TTBR0_EL2 = "ttbr0_el2", rw;
            VBAR_EL2 = "vbar_el2", rw;
            VMPIDR_EL2 = "vmpidr_el2", rw;
            VPIDR_EL2 = "vpidr_el2", rw;
            VTCR_EL2 = "vtcr_el2", rw;
            VTTBR_EL2 = "vttbr_el2", rw;
            CNTHP_CTL_EL2 = "cnthp_ctl_el2", rw;

            // EL2, feature gated.
            TFSR_EL2 = "S3_4_C5_C6_0", rw;
            MPAM2_EL2 = "S3_4_C10_C5_0", rw;
            MPAMHCR_EL2 = "S3_4_C10_C4_0", rw;
            MPAMVPMV_EL2 = "S3_4_C10_C4_1", rw;
            MPAMVPM0_EL2 = "S3_4_C10_C6_0", rw;
            MPAMVPM1_EL2 = "S3_4_C10_C6_1", rw;
            MPAMVPM2_EL2 = "S3_4_C10_C6_2", rw;
            MPAMVPM3_EL2 = "S3_4_C10_C6_3", rw;
            MPAMVPM4_EL2 = "S3_4_C10_C6_4", rw;
            MPAMVPM5_EL2 = "S3_4_C10_C6_5", rw;
            MPAMVPM6_EL2 = "S3_4_C10_C6_6", rw;
            MPAMVPM7_EL2 = "S3_4_C10_C6_7", rw;
            HDFGRTR_EL2 = "S3_4_C3_C1_4", rw;
            HAFGRTR_EL2 = "S3_4_C3_C1_6", rw;
            HDFGWTR_EL2 = "S3_4_C3_C1_5", rw;
            HFGITR_EL2 = "S3_4_C1_C1_6", rw;
            HFGRTR_EL2 = "S3_4_C1_C1_4", rw;
            HFGWTR_EL2 = "S3_4_C1_C1_5", rw;
            CNTPOFF_EL2 = "S3_4_C14_C0_6", rw;
            CONTEXTIDR_EL2 = "S3_4_C13_C0_1", rw;
            TTBR1_EL2 = "S3_4_C2_C0_1", rw;
            VDISR_EL2 = "S3_4_C12_C1_1", rw;
            VSESR_EL2 = "S3_4_C5_C2_3", rw;
            VNCR_EL2 = "S3_4_C2_C2_0", rw;
            TRFCR_EL2 = "S3_4_C1_C2_1", rw;
            SCXTNUM_EL2 = "S3_4_C13_C0_7", rw;
            HCRX_EL2 = "S3_4_C1_C2_2", rw;
            TCR2_EL2 = "S3_4_C2_C0_3", rw;
            PIRE0_EL2 = "S3_4_C10_C2_2", rw;
            PIR_EL2 = "S3_4_C10_C2_3", rw;
            S2PIR_EL2 = "S3_4_C10_C2_5", rw;
            POR_EL2 = "S3_4_C10_C2_4", rw;
            GCSCR_EL2 = "S3_4_C2_C5_0", rw;
            GCSPR_EL2 = "S3_4_C2_C5_1", rw;
        }
    };
}
pub(crate) use with_sys_reg_list;

macro_rules! define_sys_regs {
    ($($name:ident = $asm:literal, $access:ident;)*) => {
        /// A system register the context manager reads or writes.
        #[allow(non_camel_case_types)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum SysReg {
            $($name,)*
        }

        impl SysReg {
            /// Every register, in declaration order.
            pub const ALL: &'static [SysReg] = &[$(SysReg::$name,)*];

            /// Number of registers.
            pub const COUNT: usize = Self::ALL.len();

            /// The assembler spelling.
            pub const fn asm_name(self) -> &'static str {
                match self {
                    $(SysReg::$name => $asm,)*
                }
            }

            /// Whether software can write the register.
            pub const fn is_writable(self) -> bool {
                match self {
                    $(SysReg::$name => define_sys_regs!(@writable $access),)*
                }
            }
        }
    };
    (@writable rw) => { true };
    (@writable ro) => { false };
}

with_sys_reg_list!(define_sys_regs);

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Saved values of all system registers, one slot per [`SysReg`].
///
/// Also serves as a register file for simulated CPUs: writes to read-only registers through
/// [`interface::SysRegs`] are dropped, while [`RegisterBank::set`] can preset them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterBank {
    values: [u64; SysReg::COUNT],
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl SysReg {
    /// The MPAM virtual partition mapping register with index `n`, `0..=7`.
    pub const fn mpam_vpm(n: u8) -> Option<SysReg> {
        Some(match n {
            0 => SysReg::MPAMVPM0_EL2,
            1 => SysReg::MPAMVPM1_EL2,
            2 => SysReg::MPAMVPM2_EL2,
            3 => SysReg::MPAMVPM3_EL2,
            4 => SysReg::MPAMVPM4_EL2,
            5 => SysReg::MPAMVPM5_EL2,
            6 => SysReg::MPAMVPM6_EL2,
            7 => SysReg::MPAMVPM7_EL2,
            _ => return None,
        })
    }
}

impl RegisterBank {
    /// Create an instance with every register zeroed.
    pub const fn new() -> Self {
        Self {
            values: [0; SysReg::COUNT],
        }
    }

    /// The saved value of `reg`.
    pub fn get(&self, reg: SysReg) -> u64 {
        self.values[reg as usize]
    }

    /// Overwrite the saved value of `reg`.
    pub fn set(&mut self, reg: SysReg, value: u64) {
        self.values[reg as usize] = value;
    }

    /// Read-modify-write the saved value of `reg`.
    pub fn modify(&mut self, reg: SysReg, f: impl FnOnce(u64) -> u64) {
        let v = self.get(reg);
        self.set(reg, f(v));
    }

    /// Zero every register.
    pub fn clear(&mut self) {
        self.values.fill(0);
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl interface::SysRegs for RegisterBank {
    fn read(&self, reg: SysReg) -> u64 {
        self.get(reg)
    }

    fn write(&mut self, reg: SysReg, value: u64) {
        if reg.is_writable() {
            self.set(reg, value);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
