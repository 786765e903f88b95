// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023 Andre Richter <andre.o.richter@gmail.com>

//! Execution context management.
//!
//! One [`CpuContext`] exists per security state. A context is first populated from an entry point
//! ([`ContextManager::setup_common`] followed by [`ContextManager::setup_security_state`]), and
//! later selected for the next exception return with [`ContextManager::prepare_exit_to_state`].
//! EL1 and EL2 system register banks can be saved from and restored to the live CPU at any time.
//!
//! All register traffic goes through [`interface::SysRegs`]. On bare-metal AArch64 this is the
//! real CPU, elsewhere a [`RegisterBank`] acts as a simulated one.

mod el1;
mod el2;
mod features;
mod regs;
mod sysreg;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[path = "_arch/aarch64/context.rs"]
mod arch_context;

use crate::{
    cpu,
    error::Error,
    image::{EntryPointInfo, EpAttributes, SecurityState},
    info, warn,
};
use interface::{SysRegs, WorldObserver};
use regs::{Spsr, CPTR_EL3, HCRX_EL2_INIT_VAL, MDCR_EL3, SCR_EL3};
use tock_registers::{
    interfaces::{ReadWriteable, Readable},
    registers::InMemoryRegister,
};

//--------------------------------------------------------------------------------------------------
// Architectural Public Reexports
//--------------------------------------------------------------------------------------------------
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use arch_context::HwSysRegs;

pub use features::{Capabilities, CpuFeatures};
pub use regs::{spsr_64, spsr_mode32, DAIF_ALL};
pub use sysreg::{RegisterBank, SysReg};

//--------------------------------------------------------------------------------------------------
// Private Definitions
//--------------------------------------------------------------------------------------------------

const MAX_OBSERVERS: usize = 4;

/// SCR_EL3 bits that may be changed individually after setup.
const SCR_VALID_BIT_MASK: u64 = 0x2f8f;

type ScrEl3 = InMemoryRegister<u64, SCR_EL3::Register>;

const fn world_index(state: SecurityState) -> usize {
    match state {
        SecurityState::Secure => 0,
        SecurityState::NonSecure => 1,
        SecurityState::Realm => 2,
    }
}

//--------------------------------------------------------------------------------------------------
// Public Definitions
//--------------------------------------------------------------------------------------------------

/// Context Management interfaces.
pub mod interface {
    use super::{SysReg, WorldEvent};

    /// Access to system registers.
    pub trait SysRegs {
        /// Read `reg`.
        fn read(&self, reg: SysReg) -> u64;

        /// Write `reg`. Writes to read-only registers are ignored.
        fn write(&mut self, reg: SysReg, value: u64);
    }

    /// Gets told when a world's EL1 state leaves or enters the CPU.
    pub trait WorldObserver {
        fn on_world_event(&self, event: WorldEvent);
    }
}

/// Notification sent to [`interface::WorldObserver`]s.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// The world's EL1 registers were saved.
    ExitedWorld(SecurityState),
    /// The world's EL1 registers were restored.
    EnteringWorld(SecurityState),
}

/// The register bank a save or restore operates on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExceptionLevel {
    El1,
    El2,
}

/// Lifecycle of one world's context.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    CommonInitialized,
    StateSpecificInitialized,
    /// Selected for the next exception return.
    Live,
}

/// Register image of one world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuContext {
    gpregs: [u64; 32],
    sysregs: RegisterBank,
}

/// One value per security state.
#[derive(Clone, Debug)]
pub struct PerWorld<T>([T; 3]);

/// Build options that shape how worlds are configured.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Delay applied to trapped WFE instructions, as a power of two, if delayed trapping exists.
    pub twed_delay: u8,
    /// Give the secure world access to SVE.
    pub sve_for_secure: bool,
    /// Give the secure world access to SME.
    pub sme_for_secure: bool,
    /// Route external aborts and SErrors from the non-secure world to EL3.
    pub ea_el3_first_ns: bool,
}

/// Owner of the per-world contexts.
pub struct ContextManager<'o, R: SysRegs> {
    regs: R,
    caps: Capabilities,
    config: ContextConfig,
    contexts: PerWorld<CpuContext>,
    states: PerWorld<ContextState>,
    next: Option<SecurityState>,
    observers: heapless::Vec<&'o dyn WorldObserver, MAX_OBSERVERS>,
}

//--------------------------------------------------------------------------------------------------
// Public Code
//--------------------------------------------------------------------------------------------------

impl CpuContext {
    /// Create an instance with everything zeroed.
    pub const fn new() -> Self {
        Self {
            gpregs: [0; 32],
            sysregs: RegisterBank::new(),
        }
    }

    /// Saved general purpose register `n`.
    pub fn gpreg(&self, n: usize) -> u64 {
        self.gpregs[n]
    }

    /// Saved system register.
    pub fn sysreg(&self, reg: SysReg) -> u64 {
        self.sysregs.get(reg)
    }

    /// The SCR_EL3 this world runs with.
    pub fn scr_el3(&self) -> u64 {
        self.sysregs.get(SysReg::SCR_EL3)
    }

    /// The address execution resumes at.
    pub fn elr_el3(&self) -> u64 {
        self.sysregs.get(SysReg::ELR_EL3)
    }

    /// The processor state execution resumes with.
    pub fn spsr_el3(&self) -> u64 {
        self.sysregs.get(SysReg::SPSR_EL3)
    }

    fn clear(&mut self) {
        self.gpregs = [0; 32];
        self.sysregs.clear();
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PerWorld<T> {
    pub const fn new(secure: T, non_secure: T, realm: T) -> Self {
        Self([secure, non_secure, realm])
    }

    pub fn get(&self, state: SecurityState) -> &T {
        &self.0[world_index(state)]
    }

    pub fn get_mut(&mut self, state: SecurityState) -> &mut T {
        &mut self.0[world_index(state)]
    }
}

impl ContextConfig {
    pub const fn new() -> Self {
        Self {
            twed_delay: 0,
            sve_for_secure: false,
            sme_for_secure: false,
            ea_el3_first_ns: false,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl<'o, R: SysRegs> ContextManager<'o, R> {
    /// Create an instance, probing the CPU behind `regs` for optional features.
    pub fn new(regs: R, config: ContextConfig) -> Self {
        let caps = Capabilities::detect(&regs);

        Self::with_capabilities(regs, caps, config)
    }

    /// Create an instance with known capabilities.
    pub fn with_capabilities(regs: R, caps: Capabilities, config: ContextConfig) -> Self {
        Self {
            regs,
            caps,
            config,
            contexts: PerWorld::new(CpuContext::new(), CpuContext::new(), CpuContext::new()),
            states: PerWorld::new(
                ContextState::Uninitialized,
                ContextState::Uninitialized,
                ContextState::Uninitialized,
            ),
            next: None,
            observers: heapless::Vec::new(),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// The context of `state`.
    pub fn context(&self, state: SecurityState) -> &CpuContext {
        self.contexts.get(state)
    }

    /// Where the context of `state` is in its lifecycle.
    pub fn state(&self, state: SecurityState) -> ContextState {
        *self.states.get(state)
    }

    /// The world the next exception return enters, if one was prepared.
    pub fn next_eret_context(&self) -> Option<SecurityState> {
        self.next
    }

    /// Subscribe to [`WorldEvent`]s.
    pub fn register_observer(&mut self, observer: &'o dyn WorldObserver) -> Result<(), Error> {
        self.observers
            .push(observer)
            .map_err(|_| Error::InvalidState)
    }

    /// Zero the context of the entry point's world and populate what all worlds share.
    pub fn setup_common(&mut self, ep: &EntryPointInfo) -> Result<(), Error> {
        let state = ep.attributes.security_state()?;
        let spsr = Spsr::new(ep.spsr);
        let aarch64 = spsr.is_aarch64();
        let caps = self.caps;

        let scr = ScrEl3::new(self.regs.read(SysReg::SCR_EL3));
        scr.modify(
            SCR_EL3::NS::CLEAR
                + SCR_EL3::RW::CLEAR
                + SCR_EL3::EA::CLEAR
                + SCR_EL3::FIQ::CLEAR
                + SCR_EL3::IRQ::CLEAR
                + SCR_EL3::ST::CLEAR
                + SCR_EL3::HCE::CLEAR
                + SCR_EL3::NSE::CLEAR,
        );

        if aarch64 {
            scr.modify(SCR_EL3::RW::AArch64);
        }

        if ep.attributes.contains(EpAttributes::ST_ENABLE) {
            scr.modify(SCR_EL3::ST::SET);
        }

        if caps.has(CpuFeatures::HCX) {
            scr.modify(SCR_EL3::HXEn::SET);
        }

        if caps.has(CpuFeatures::TCR2) && aarch64 {
            scr.modify(SCR_EL3::TCR2EN::SET);
        }

        if caps
            .features
            .intersects(CpuFeatures::S1PIE | CpuFeatures::S2PIE | CpuFeatures::S1POE)
        {
            scr.modify(SCR_EL3::PIEN::SET);
        }

        if caps.has(CpuFeatures::GCS) && aarch64 {
            scr.modify(SCR_EL3::GCSEn::SET);
        }

        if spsr.targets_el2() {
            scr.modify(SCR_EL3::HCE::SET);

            if caps.has(CpuFeatures::FGT) {
                scr.modify(SCR_EL3::FGTEN::SET);
            }

            if caps.has(CpuFeatures::ECV) {
                scr.modify(SCR_EL3::ECVEN::SET);
            }
        }

        if caps.has(CpuFeatures::TWED) {
            scr.modify(
                SCR_EL3::TWEDEL.val(u64::from(self.config.twed_delay) & 0xf)
                    + SCR_EL3::TWEDEn::SET,
            );
        }

        let cptr = self.regs.read(SysReg::CPTR_EL3);
        let mdcr = self.regs.read(SysReg::MDCR_EL3);

        let ctx = self.contexts.get_mut(state);
        ctx.clear();
        ctx.sysregs.set(SysReg::SCR_EL3, scr.get());
        ctx.sysregs.set(SysReg::CPTR_EL3, cptr);
        ctx.sysregs.set(SysReg::MDCR_EL3, mdcr);
        ctx.sysregs.set(SysReg::ELR_EL3, ep.pc);
        ctx.sysregs.set(SysReg::SPSR_EL3, ep.spsr);
        ctx.gpregs[..ep.args.len()].copy_from_slice(&ep.args);

        *self.states.get_mut(state) = ContextState::CommonInitialized;

        Ok(())
    }

    /// Apply the policy of the entry point's security state to its context.
    pub fn setup_security_state(&mut self, ep: &EntryPointInfo) -> Result<(), Error> {
        let state = ep.attributes.security_state()?;

        if self.state(state) != ContextState::CommonInitialized {
            crate::error!("{:?} context set up out of order", state);
            return Err(Error::InvalidState);
        }

        match state {
            SecurityState::Secure => self.setup_secure(ep)?,
            SecurityState::Realm => self.setup_realm()?,
            SecurityState::NonSecure => self.setup_non_secure(ep),
        }

        *self.states.get_mut(state) = ContextState::StateSpecificInitialized;

        Ok(())
    }

    /// Fully initialize the context of the entry point's world.
    pub fn setup_context(&mut self, ep: &EntryPointInfo) -> Result<(), Error> {
        self.setup_common(ep)?;
        self.setup_security_state(ep)
    }

    /// Copy the live registers of `level` into the context of `state`.
    pub fn save_registers(
        &mut self,
        state: SecurityState,
        level: ExceptionLevel,
    ) -> Result<(), Error> {
        self.ensure_initialized(state)?;

        let ctx = self.contexts.get_mut(state);
        match level {
            ExceptionLevel::El1 => {
                el1::save(&self.caps, &self.regs, &mut ctx.sysregs);
                self.notify(WorldEvent::ExitedWorld(state));
            }
            ExceptionLevel::El2 => {
                if Self::el2_owned_by(&self.regs, state) {
                    el2::save(&self.caps, &self.regs, &mut ctx.sysregs);
                }
            }
        }

        Ok(())
    }

    /// Program the live registers of `level` from the context of `state`.
    pub fn restore_registers(
        &mut self,
        state: SecurityState,
        level: ExceptionLevel,
    ) -> Result<(), Error> {
        self.ensure_initialized(state)?;

        let ctx = self.contexts.get(state);
        match level {
            ExceptionLevel::El1 => {
                el1::restore(&self.caps, &ctx.sysregs, &mut self.regs);
                self.notify(WorldEvent::EnteringWorld(state));
            }
            ExceptionLevel::El2 => {
                if Self::el2_owned_by(&self.regs, state) {
                    el2::restore(&self.caps, &ctx.sysregs, &mut self.regs);
                }
            }
        }

        Ok(())
    }

    /// Make `state` the world the next exception return enters.
    ///
    /// For the non-secure world, an implemented EL2 that the world does not use is first put
    /// into a neutral state on the live CPU.
    pub fn prepare_exit_to_state(&mut self, state: SecurityState) -> Result<(), Error> {
        self.ensure_initialized(state)?;

        let scr = ScrEl3::new(self.contexts.get(state).scr_el3());
        let hce = scr.is_set(SCR_EL3::HCE);

        if state == SecurityState::NonSecure {
            let el2 = self.caps.has(CpuFeatures::EL2);

            if (hce || el2) && self.caps.has(CpuFeatures::HCX) {
                self.regs.write(SysReg::HCRX_EL2, HCRX_EL2_INIT_VAL);
            }

            if hce {
                el2::restore(&self.caps, &self.contexts.get(state).sysregs, &mut self.regs);

                let sctlr_el1 = self.contexts.get(state).sysreg(SysReg::SCTLR_EL1);
                self.regs.write(SysReg::SCTLR_EL2, el2::hyp_sctlr(sctlr_el1));
            } else if el2 {
                el2::neutralize(&self.caps, scr.get(), &mut self.regs);
            }
        }

        self.restore_registers(state, ExceptionLevel::El1)?;
        cpu::isb();

        if let Some(prev) = self.next.filter(|prev| *prev != state) {
            *self.states.get_mut(prev) = ContextState::StateSpecificInitialized;
        }
        *self.states.get_mut(state) = ContextState::Live;
        self.next = Some(state);

        info!("Next exception return enters {:?} world", state);

        Ok(())
    }

    /// Set the address the world of `state` resumes at.
    pub fn set_elr(&mut self, state: SecurityState, entrypoint: u64) -> Result<(), Error> {
        self.ensure_initialized(state)?;
        self.contexts
            .get_mut(state)
            .sysregs
            .set(SysReg::ELR_EL3, entrypoint);

        Ok(())
    }

    /// Set the address and processor state the world of `state` resumes with.
    pub fn set_elr_spsr(
        &mut self,
        state: SecurityState,
        entrypoint: u64,
        spsr: u64,
    ) -> Result<(), Error> {
        self.set_elr(state, entrypoint)?;
        self.contexts.get_mut(state).sysregs.set(SysReg::SPSR_EL3, spsr);

        Ok(())
    }

    /// Change a single SCR_EL3 bit of the world of `state`, leaving all others alone.
    pub fn write_scr_el3_bit(
        &mut self,
        state: SecurityState,
        bit: u32,
        value: u32,
    ) -> Result<(), Error> {
        self.ensure_initialized(state)?;

        if bit >= u64::BITS || (1 << bit) & SCR_VALID_BIT_MASK == 0 || value > 1 {
            crate::error!("Refusing to write {} to SCR_EL3 bit {}", value, bit);
            return Err(Error::InvalidState);
        }

        self.contexts.get_mut(state).sysregs.modify(SysReg::SCR_EL3, |scr| {
            (scr & !(1 << bit)) | (u64::from(value) << bit)
        });

        Ok(())
    }

    /// The SCR_EL3 of the world of `state`.
    pub fn scr_el3(&self, state: SecurityState) -> Result<u64, Error> {
        self.ensure_initialized(state)?;

        Ok(self.contexts.get(state).scr_el3())
    }
}

//--------------------------------------------------------------------------------------------------
// Private Code
//--------------------------------------------------------------------------------------------------

impl<'o, R: SysRegs> ContextManager<'o, R> {
    fn ensure_initialized(&self, state: SecurityState) -> Result<(), Error> {
        match self.state(state) {
            ContextState::StateSpecificInitialized | ContextState::Live => Ok(()),
            other => {
                crate::error!("{:?} context used while {:?}", state, other);
                Err(Error::InvalidState)
            }
        }
    }

    fn notify(&self, event: WorldEvent) {
        for o in self.observers.iter() {
            o.on_world_event(event);
        }
    }

    /// The secure world only owns EL2 while secure EL2 is enabled.
    fn el2_owned_by(regs: &R, state: SecurityState) -> bool {
        state != SecurityState::Secure
            || ScrEl3::new(regs.read(SysReg::SCR_EL3)).is_set(SCR_EL3::EEL2)
    }

    fn setup_secure(&mut self, ep: &EntryPointInfo) -> Result<(), Error> {
        let caps = self.caps;
        let spsr = Spsr::new(ep.spsr);
        let ctx = self.contexts.get_mut(SecurityState::Secure);
        let scr = ScrEl3::new(ctx.scr_el3());

        // Tag access can only be isolated if the tag registers are switched as well.
        if caps.has(CpuFeatures::MTE_EL0) {
            scr.modify(SCR_EL3::ATA::SET);
        }

        if spsr.targets_el2() && caps.has(CpuFeatures::SEL2) {
            if !spsr.is_aarch64() {
                crate::error!("Secure EL2 can not be used in AArch32");
                return Err(Error::InvalidState);
            }

            scr.modify(SCR_EL3::EEL2::SET);
        }

        ctx.sysregs.set(SysReg::SCR_EL3, scr.get());
        el1::setup(&mut ctx.sysregs, ep, &self.regs);

        let cptr = InMemoryRegister::<u64, CPTR_EL3::Register>::new(ctx.sysreg(SysReg::CPTR_EL3));
        if caps.has(CpuFeatures::SVE) {
            if self.config.sve_for_secure {
                cptr.modify(CPTR_EL3::EZ::SET + CPTR_EL3::TFP::CLEAR);
            } else {
                cptr.modify(CPTR_EL3::EZ::CLEAR + CPTR_EL3::TFP::SET);
            }
        }
        if caps.has(CpuFeatures::SME) {
            if self.config.sme_for_secure {
                cptr.modify(CPTR_EL3::ESM::SET);
            } else {
                cptr.modify(CPTR_EL3::ESM::CLEAR);
            }
        }
        ctx.sysregs.set(SysReg::CPTR_EL3, cptr.get());

        Ok(())
    }

    fn setup_realm(&mut self) -> Result<(), Error> {
        if !self.caps.has(CpuFeatures::RME) {
            crate::error!("Realm world requested without RME");
            return Err(Error::InvalidState);
        }

        let ctx = self.contexts.get_mut(SecurityState::Realm);
        let scr = ScrEl3::new(ctx.scr_el3());

        scr.modify(SCR_EL3::NS::SET + SCR_EL3::NSE::SET);
        if self.caps.has(CpuFeatures::CSV2_2) {
            scr.modify(SCR_EL3::EnSCXT::SET);
        }

        ctx.sysregs.set(SysReg::SCR_EL3, scr.get());

        Ok(())
    }

    fn setup_non_secure(&mut self, ep: &EntryPointInfo) {
        let caps = self.caps;
        let ctx = self.contexts.get_mut(SecurityState::NonSecure);
        let scr = ScrEl3::new(ctx.scr_el3());

        scr.modify(SCR_EL3::NS::SET);

        // Key registers are not switched, so only the non-secure world gets to use them.
        if caps.has(CpuFeatures::PAUTH) {
            scr.modify(SCR_EL3::API::SET + SCR_EL3::APK::SET);
        }

        if caps.has_mte() {
            scr.modify(SCR_EL3::ATA::SET);
        }

        if self.config.ea_el3_first_ns {
            scr.modify(SCR_EL3::EA::SET);
        }

        if caps.has(CpuFeatures::CSV2_2) {
            scr.modify(SCR_EL3::EnSCXT::SET);
        }

        ctx.sysregs.set(SysReg::SCR_EL3, scr.get());

        el1::setup(&mut ctx.sysregs, ep, &self.regs);
        el2::setup_nonsecure(&caps, &mut ctx.sysregs, ep);

        let cptr = InMemoryRegister::<u64, CPTR_EL3::Register>::new(ctx.sysreg(SysReg::CPTR_EL3));
        if caps.has(CpuFeatures::SVE) {
            cptr.modify(CPTR_EL3::EZ::SET + CPTR_EL3::TFP::CLEAR);
        }
        if caps.has(CpuFeatures::SME) {
            cptr.modify(CPTR_EL3::ESM::SET);
        }
        if caps.has(CpuFeatures::SYS_REG_TRACE) {
            cptr.modify(CPTR_EL3::TTA::CLEAR);
        }
        ctx.sysregs.set(SysReg::CPTR_EL3, cptr.get());

        if caps.has(CpuFeatures::PMUV3) {
            let mdcr =
                InMemoryRegister::<u64, MDCR_EL3::Register>::new(ctx.sysreg(SysReg::MDCR_EL3));
            mdcr.modify(MDCR_EL3::SCCD::SET + MDCR_EL3::MCCD::SET + MDCR_EL3::MPMX::CLEAR);
            ctx.sysregs.set(SysReg::MDCR_EL3, mdcr.get());
        }

        if !caps.has(CpuFeatures::EL2) && Spsr::new(ep.spsr).targets_el2() {
            warn!("Non-secure entry targets EL2, which is not implemented");
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Testing
//--------------------------------------------------------------------------------------------------
