// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Architectural system register access.
//!
//! # Orientation
//!
//! Since arch modules are imported into generic modules using the path attribute, the path of this
//! file is:
//!
//! crate::context::arch_context

use super::{
    interface,
    sysreg::{with_sys_reg_list, SysReg},
};
use core::arch::asm;

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

macro_rules! impl_hw_sys_regs {
    ($($name:ident = $asm:literal, $access:ident;)*) => {
        impl interface::SysRegs for HwSysRegs {
            fn read(&self, reg: SysReg) -> u64 {
                match reg {
                    $(SysReg::$name => {
                        let value: u64;
                        unsafe {
                            asm!(
                                concat!("mrs {}, ", $asm),
                                out(reg) value,
                                options(nomem, nostack)
                            )
                        };
                        value
                    })*
                }
            }

            fn write(&mut self, reg: SysReg, value: u64) {
                match reg {
                    $(SysReg::$name => impl_hw_sys_regs!(@write $access, $asm, value),)*
                }
            }
        }
    };
    (@write ro, $asm:literal, $value:ident) => {
        {
            let _ = $value;
        }
    };
    (@write rw, $asm:literal, $value:ident) => {
        unsafe { asm!(concat!("msr ", $asm, ", {}"), in(reg) $value, options(nostack)) }
    };
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// The system registers of the executing core.
pub struct HwSysRegs {
    _private: (),
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl HwSysRegs {
    /// Create an instance.
    ///
    /// # Safety
    ///
    /// - Must only be used while executing at EL3.
    /// - Only one instance may exist, register writes are not coordinated between instances.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

//------------------------------------------------------------------------------
// OS Interface Code
//------------------------------------------------------------------------------

with_sys_reg_list!(impl_hw_sys_regs);
