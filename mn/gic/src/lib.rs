#![no_std]
#![forbid(unsafe_code)]

//! # Metal Node GIC
//!
//! Priority-based interrupt controller abstraction. Owns global
//! enable/disable, per-line priority and enable state, and the two-phase
//! acknowledge / end-of-interrupt protocol by which a handler claims and
//! then releases a pending line.
//!
//! Callers must treat acknowledge-before-handler and
//! end-of-interrupt-after-handler as a non-skippable bracket: the hardware
//! will never re-trigger a line whose service was not signalled complete.

use mn_core::{Error, RegisterAccess, Result};

/// Number of addressable interrupt lines
pub const MAX_IRQ: u32 = 256;

/// Lines covered by one enable bank
pub const IRQS_PER_BANK: u32 = 32;

/// Priority fields packed into one priority word
const IRQS_PER_PRIORITY_WORD: u32 = 4;

/// Lowest urgency priority value
pub const PRIORITY_LOWEST: u8 = 0xFF;

/// Mask applied to the raw acknowledge value (reserved high bits stripped)
const ACK_IRQ_MASK: u32 = 0x3FF;

/// Distributor and CPU-interface register identifiers
///
/// Banked registers carry their word index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicReg {
    /// Distributor control
    DistCtrl,
    /// Set-enable bank
    SetEnable(u32),
    /// Clear-enable bank
    ClearEnable(u32),
    /// Priority word (four 8-bit fields)
    Priority(u32),
    /// Target-CPU word (four 8-bit fields)
    Target(u32),
    /// Trigger-configuration word
    TriggerConfig(u32),
    /// CPU interface control
    CpuCtrl,
    /// CPU interface priority mask
    PriorityMask,
    /// Interrupt acknowledge
    Ack,
    /// End of interrupt
    EndOfIrq,
}

#[cfg(feature = "defmt")]
impl defmt::Format for GicReg {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            GicReg::DistCtrl => defmt::write!(fmt, "DistCtrl"),
            GicReg::SetEnable(n) => defmt::write!(fmt, "SetEnable[{}]", n),
            GicReg::ClearEnable(n) => defmt::write!(fmt, "ClearEnable[{}]", n),
            GicReg::Priority(n) => defmt::write!(fmt, "Priority[{}]", n),
            GicReg::Target(n) => defmt::write!(fmt, "Target[{}]", n),
            GicReg::TriggerConfig(n) => defmt::write!(fmt, "TriggerConfig[{}]", n),
            GicReg::CpuCtrl => defmt::write!(fmt, "CpuCtrl"),
            GicReg::PriorityMask => defmt::write!(fmt, "PriorityMask"),
            GicReg::Ack => defmt::write!(fmt, "Ack"),
            GicReg::EndOfIrq => defmt::write!(fmt, "EndOfIrq"),
        }
    }
}

/// Global CPU-side interrupt accept flag
///
/// Two idempotent operations mapping to `cpsie i` / `cpsid i` on the
/// production port. Provided by the boot collaborator, faked in tests.
pub trait IrqMask {
    /// Accept interrupts on the execution core
    fn enable(&mut self);

    /// Stop accepting interrupts on the execution core
    fn disable(&mut self);
}

/// Interrupt controller bound to a register-access capability
pub struct Gic<B> {
    regs: B,
}

impl<B: RegisterAccess<GicReg>> Gic<B> {
    /// Wrap a register block; call [`Gic::init`] before use
    pub const fn new(regs: B) -> Self {
        Self { regs }
    }

    /// Access the underlying register capability
    pub fn regs(&self) -> &B {
        &self.regs
    }

    /// Initialize the distributor and CPU interface
    ///
    /// All lines are set to the lowest priority, routed to CPU0 and
    /// level-triggered; global dispatch is disabled during setup and
    /// re-enabled with the priority mask fully open before returning.
    pub fn init(&mut self) -> Result<()> {
        self.regs.write(GicReg::DistCtrl, 0);

        for word in 0..(MAX_IRQ / IRQS_PER_PRIORITY_WORD) {
            self.regs.write(GicReg::Priority(word), 0xFFFF_FFFF);
        }

        // Words 0..8 cover banked per-core lines; only SPIs are routed
        for word in 8..(MAX_IRQ / IRQS_PER_PRIORITY_WORD) {
            self.regs.write(GicReg::Target(word), 0x0101_0101);
        }

        // Words 0..2 are fixed by hardware
        for word in 2..(MAX_IRQ / 16) {
            self.regs.write(GicReg::TriggerConfig(word), 0);
        }

        self.regs.write(GicReg::DistCtrl, 1);
        self.regs.write(GicReg::PriorityMask, 0xFF);
        self.regs.write(GicReg::CpuCtrl, 1);
        self.regs.barrier();

        Ok(())
    }

    /// Enable one interrupt line
    pub fn enable_irq(&mut self, irq: u32) -> Result<()> {
        if irq >= MAX_IRQ {
            return Err(Error::InvalidParameter);
        }
        let bank = irq / IRQS_PER_BANK;
        let bit = irq % IRQS_PER_BANK;
        self.regs.write(GicReg::SetEnable(bank), 1 << bit);
        self.regs.barrier();
        Ok(())
    }

    /// Disable one interrupt line
    pub fn disable_irq(&mut self, irq: u32) -> Result<()> {
        if irq >= MAX_IRQ {
            return Err(Error::InvalidParameter);
        }
        let bank = irq / IRQS_PER_BANK;
        let bit = irq % IRQS_PER_BANK;
        self.regs.write(GicReg::ClearEnable(bank), 1 << bit);
        self.regs.barrier();
        Ok(())
    }

    /// Set one line's priority (lower value = more urgent)
    ///
    /// Only the addressed 8-bit field is touched.
    pub fn set_priority(&mut self, irq: u32, priority: u8) -> Result<()> {
        if irq >= MAX_IRQ {
            return Err(Error::InvalidParameter);
        }
        let word = irq / IRQS_PER_PRIORITY_WORD;
        let shift = (irq % IRQS_PER_PRIORITY_WORD) * 8;

        let mut value = self.regs.read(GicReg::Priority(word));
        value &= !(0xFF << shift);
        value |= u32::from(priority) << shift;
        self.regs.write(GicReg::Priority(word), value);
        Ok(())
    }

    /// Claim the pending, highest-priority enabled interrupt
    ///
    /// Called exactly once per interrupt entry. Reserved high bits of the
    /// raw acknowledge value are masked off.
    pub fn acknowledge(&mut self) -> u32 {
        self.regs.read(GicReg::Ack) & ACK_IRQ_MASK
    }

    /// Release a claimed line after its handler has finished
    ///
    /// Must be called exactly once per acknowledged interrupt or the line
    /// will never re-trigger.
    pub fn end_of_irq(&mut self, irq: u32) {
        self.regs.write(GicReg::EndOfIrq, irq);
        self.regs.barrier();
    }
}
