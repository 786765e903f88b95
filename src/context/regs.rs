// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Register field layouts used when composing context register values.
//!
//! The layouts follow the ARMv8-A Architecture Reference Manual. Only fields the context manager
//! touches are described.
//!
//! # Orientation
//!
//! The path of this file is:
//!
//! crate::context::regs

use tock_registers::{interfaces::Readable, register_bitfields, registers::InMemoryRegister};

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

register_bitfields! {u64,
    /// Secure Configuration Register.
    pub SCR_EL3 [
        /// Security state of EL0 and EL1 (with NSE).
        NS OFFSET(0) NUMBITS(1) [],
        /// Route physical IRQs to EL3.
        IRQ OFFSET(1) NUMBITS(1) [],
        /// Route physical FIQs to EL3.
        FIQ OFFSET(2) NUMBITS(1) [],
        /// Route external aborts and SErrors to EL3.
        EA OFFSET(3) NUMBITS(1) [],
        SMD OFFSET(7) NUMBITS(1) [],
        /// Hypervisor call enable.
        HCE OFFSET(8) NUMBITS(1) [],
        SIF OFFSET(9) NUMBITS(1) [],
        /// Execution state of the next lower level.
        RW OFFSET(10) NUMBITS(1) [
            AArch32 = 0,
            AArch64 = 1
        ],
        /// Secure EL1 physical timer access.
        ST OFFSET(11) NUMBITS(1) [],
        TWI OFFSET(12) NUMBITS(1) [],
        TWE OFFSET(13) NUMBITS(1) [],
        TLOR OFFSET(14) NUMBITS(1) [],
        TERR OFFSET(15) NUMBITS(1) [],
        /// Do not trap pointer authentication key accesses.
        APK OFFSET(16) NUMBITS(1) [],
        /// Do not trap pointer authentication instructions.
        API OFFSET(17) NUMBITS(1) [],
        /// Secure EL2 enable.
        EEL2 OFFSET(18) NUMBITS(1) [],
        EASE OFFSET(19) NUMBITS(1) [],
        NMEA OFFSET(20) NUMBITS(1) [],
        FIEN OFFSET(21) NUMBITS(1) [],
        /// Access to SCXTNUM_ELx.
        EnSCXT OFFSET(25) NUMBITS(1) [],
        /// Allocation tag access.
        ATA OFFSET(26) NUMBITS(1) [],
        /// Fine grained trap registers enable.
        FGTEN OFFSET(27) NUMBITS(1) [],
        /// Enhanced counter virtualization enable.
        ECVEN OFFSET(28) NUMBITS(1) [],
        /// Delayed trapping of WFE.
        TWEDEn OFFSET(29) NUMBITS(1) [],
        TWEDEL OFFSET(30) NUMBITS(4) [],
        AMVOFFEN OFFSET(35) NUMBITS(1) [],
        /// HCRX_EL2 enable.
        HXEn OFFSET(38) NUMBITS(1) [],
        /// Guarded control stack enable.
        GCSEn OFFSET(39) NUMBITS(1) [],
        /// TCR2_ELx enable.
        TCR2EN OFFSET(43) NUMBITS(1) [],
        /// Permission indirection and overlay enable.
        PIEN OFFSET(45) NUMBITS(1) [],
        /// Non-secure extension, selects realm and root state together with NS.
        NSE OFFSET(62) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Saved Program Status Register, as seen by an exception return.
    pub SPSR [
        D OFFSET(9) NUMBITS(1) [],
        A OFFSET(8) NUMBITS(1) [],
        I OFFSET(7) NUMBITS(1) [],
        F OFFSET(6) NUMBITS(1) [],
        /// Execution state of the exception return target.
        M_WIDTH OFFSET(4) NUMBITS(1) [
            AArch64 = 0,
            AArch32 = 1
        ],
        /// AArch64 target exception level.
        M_EL OFFSET(2) NUMBITS(2) [],
        /// AArch64 stack pointer select.
        M_SP OFFSET(0) NUMBITS(1) [
            SP_EL0 = 0,
            SP_ELx = 1
        ],
        /// AArch32 mode.
        M_AARCH32 OFFSET(0) NUMBITS(4) [
            User = 0x0,
            Svc = 0x3,
            Hyp = 0xA
        ]
    ]
}

register_bitfields! {u64,
    /// System Control Register, EL1.
    pub SCTLR_EL1 [
        /// Big endian data accesses at EL1.
        EE OFFSET(25) NUMBITS(1) [],
        /// AArch32: do not trap WFE.
        nTWE OFFSET(18) NUMBITS(1) [],
        /// AArch32: do not trap WFI.
        nTWI OFFSET(16) NUMBITS(1) [],
        /// AArch32: CP15 barrier enable.
        CP15BEN OFFSET(5) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Hypervisor Configuration Register.
    pub HCR_EL2 [
        API OFFSET(41) NUMBITS(1) [],
        APK OFFSET(40) NUMBITS(1) [],
        /// Execution state of EL1.
        RW OFFSET(31) NUMBITS(1) [
            AArch32 = 0,
            AArch64 = 1
        ]
    ]
}

register_bitfields! {u64,
    /// Architectural Feature Trap Register, EL3.
    pub CPTR_EL3 [
        /// Trap CPTR_EL2 and CPACR_EL1 accesses.
        TCPAC OFFSET(31) NUMBITS(1) [],
        /// Trap activity monitor accesses.
        TAM OFFSET(30) NUMBITS(1) [],
        /// Trap trace register accesses.
        TTA OFFSET(20) NUMBITS(1) [],
        /// Do not trap SME.
        ESM OFFSET(12) NUMBITS(1) [],
        /// Trap floating point and SIMD.
        TFP OFFSET(10) NUMBITS(1) [],
        /// Do not trap SVE.
        EZ OFFSET(8) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Monitor Debug Configuration Register, EL3.
    pub MDCR_EL3 [
        /// Monitor performance counters are disabled in EL3.
        MPMX OFFSET(35) NUMBITS(1) [],
        /// Cycle counter disabled in EL3.
        MCCD OFFSET(34) NUMBITS(1) [],
        /// Cycle counter disabled in secure state.
        SCCD OFFSET(23) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Monitor Debug Configuration Register, EL2.
    pub MDCR_EL2 [
        TDRA OFFSET(11) NUMBITS(1) [],
        TDOSA OFFSET(10) NUMBITS(1) [],
        TDA OFFSET(9) NUMBITS(1) [],
        TDE OFFSET(8) NUMBITS(1) [],
        /// Event counters accessible from EL1 and EL0.
        HPMN OFFSET(0) NUMBITS(5) []
    ]
}

register_bitfields! {u64,
    /// Performance Monitors Control Register.
    pub PMCR_EL0 [
        /// Number of implemented event counters.
        N OFFSET(11) NUMBITS(5) []
    ]
}

register_bitfields! {u64,
    /// Counter-timer Hypervisor Control Register.
    pub CNTHCTL_EL2 [
        EL1PCEN OFFSET(1) NUMBITS(1) [],
        EL1PCTEN OFFSET(0) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Counter-timer Hypervisor Physical Timer Control.
    pub CNTHP_CTL_EL2 [
        ENABLE OFFSET(0) NUMBITS(1) []
    ]
}

register_bitfields! {u64,
    /// Interrupt Controller System Register Enable, EL2.
    pub ICC_SRE_EL2 [
        EN OFFSET(3) NUMBITS(1) [],
        DIB OFFSET(2) NUMBITS(1) [],
        DFB OFFSET(1) NUMBITS(1) [],
        SRE OFFSET(0) NUMBITS(1) []
    ]
}

/// SCTLR_EL1 bits that are RES1 in AArch64.
pub const SCTLR_EL1_RES1: u64 =
    (1 << 29) | (1 << 28) | (1 << 23) | (1 << 22) | (1 << 20) | (1 << 11);

/// SCTLR bits that are RES1 when EL1 runs AArch32.
pub const SCTLR_AARCH32_EL1_RES1: u64 = (1 << 23) | (1 << 22) | (1 << 11) | (1 << 4) | (1 << 3);

/// SCTLR_EL2 bits that are RES1.
pub const SCTLR_EL2_RES1: u64 = (1 << 29)
    | (1 << 28)
    | (1 << 23)
    | (1 << 22)
    | (1 << 18)
    | (1 << 16)
    | (1 << 11)
    | (1 << 5)
    | (1 << 4);

/// SCTLR_ELx endianness bit.
pub const SCTLR_EE: u64 = 1 << 25;

/// CPTR_EL2 with no traps enabled: only the RES1 bits.
pub const CPTR_EL2_NO_TRAPS: u64 = (1 << 13) | (1 << 12) | 0x3ff;

/// HCRX_EL2 value a fresh context starts with.
pub const HCRX_EL2_INIT_VAL: u64 = 0;

/// DAIF mask with all exceptions masked.
pub const DAIF_ALL: u64 = 0xf;

/// A copy of an SPSR value.
#[repr(transparent)]
pub struct Spsr(InMemoryRegister<u64, SPSR::Register>);

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

/// SPSR for an AArch64 target at `el`, using SP_ELx if `sp_elx`, with `daif` masked.
pub const fn spsr_64(el: u64, sp_elx: bool, daif: u64) -> u64 {
    ((daif & DAIF_ALL) << 6) | ((el & 0x3) << 2) | (sp_elx as u64)
}

/// SPSR for an AArch32 target in `mode`, with `daif` masked (the D bit is ignored).
pub const fn spsr_mode32(mode: u64, daif: u64) -> u64 {
    ((daif & 0x7) << 6) | (1 << 4) | (mode & 0xf)
}

impl Spsr {
    /// Create an instance.
    pub fn new(value: u64) -> Self {
        Self(InMemoryRegister::new(value))
    }

    /// Whether the exception return targets AArch64.
    pub fn is_aarch64(&self) -> bool {
        self.0.matches_all(SPSR::M_WIDTH::AArch64)
    }

    /// The AArch64 target exception level.
    pub fn target_el(&self) -> u64 {
        self.0.read(SPSR::M_EL)
    }

    /// Whether the exception return targets EL2, or Hyp mode in AArch32.
    pub fn targets_el2(&self) -> bool {
        if self.is_aarch64() {
            self.target_el() == 2
        } else {
            self.0.matches_all(SPSR::M_AARCH32::Hyp)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
