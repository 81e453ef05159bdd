#![no_std]
#![forbid(unsafe_code)]

//! # Metal Node I2C
//!
//! Single-master two-wire bus driver. Each bus instance is an explicit
//! context object bound to a register-access capability; transfers run
//! either as blocking, timeout-bounded foreground calls or as
//! interrupt-driven asynchronous transfers completed through an injected
//! sink.
//!
//! At most one asynchronous transfer is outstanding per instance; a new
//! request while one is pending is rejected with [`Error::Busy`] rather
//! than queued. Because of that rejection, the transfer fields are only
//! ever touched by one context at a time: foreground to start a transfer,
//! interrupt context to drive it to completion.

use heapless::Vec;
use mn_core::{spin_until, Error, RegisterAccess, Result, SpinBudget, DEFAULT_SPINS_PER_MS};
use mn_gic::{Gic, GicReg};

pub mod registers;

pub use registers::*;

/// Peripheral input clock
pub const SYSTEM_CLOCK_HZ: u32 = 100_000_000;

/// Largest asynchronous transfer held in the driver-owned buffer
pub const MAX_TRANSFER: usize = 64;

/// Interrupt line of bus instance 0
pub const IRQ_I2C0: u32 = 23;

/// Interrupt line of bus instance 1
pub const IRQ_I2C1: u32 = 24;

/// Priority programmed for bus interrupt lines
const IRQ_PRIORITY: u8 = 0x80;

/// Bus instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cInstance {
    I2c0,
    I2c1,
}

impl I2cInstance {
    /// Interrupt line wired to this instance
    pub const fn irq(self) -> u32 {
        match self {
            I2cInstance::I2c0 => IRQ_I2C0,
            I2cInstance::I2c1 => IRQ_I2C1,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for I2cInstance {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            I2cInstance::I2c0 => defmt::write!(fmt, "I2c0"),
            I2cInstance::I2c1 => defmt::write!(fmt, "I2c1"),
        }
    }
}

/// Transfer direction, encoded as the address R/W bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// Per-instance bus state
///
/// `Error` is reached from either busy state and is cleared implicitly by
/// the next accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cState {
    Idle,
    BusyTx,
    BusyRx,
    Error,
}

#[cfg(feature = "defmt")]
impl defmt::Format for I2cState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            I2cState::Idle => defmt::write!(fmt, "Idle"),
            I2cState::BusyTx => defmt::write!(fmt, "BusyTx"),
            I2cState::BusyRx => defmt::write!(fmt, "BusyRx"),
            I2cState::Error => defmt::write!(fmt, "Error"),
        }
    }
}

/// Bus instance configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct I2cConfig {
    /// Bus clock in Hz; ≤100 kHz selects standard-mode timing, anything
    /// above selects fast-mode timing
    pub clock_speed: u32,
    /// Own 7-bit address for address-match (0 = none)
    pub own_address: u8,
    /// Drive transfers from the interrupt handler
    pub use_interrupts: bool,
    /// Spin iterations assumed per millisecond of blocking timeout
    pub spins_per_ms: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            clock_speed: 100_000,
            own_address: 0,
            use_interrupts: false,
            spins_per_ms: DEFAULT_SPINS_PER_MS,
        }
    }
}

/// Completion capability for asynchronous transfers
///
/// Invoked from interrupt context; implementations must not block or
/// allocate.
pub trait TransferSink {
    fn on_complete(&mut self, instance: I2cInstance, result: Result<()>);
}

/// Two-wire bus master driver for one peripheral instance
pub struct I2cBus<B, S> {
    instance: I2cInstance,
    regs: B,
    sink: S,
    state: I2cState,
    initialized: bool,
    spins_per_ms: u32,
    dev_address: u8,
    tx: Vec<u8, MAX_TRANSFER>,
    tx_index: usize,
    rx: Vec<u8, MAX_TRANSFER>,
    rx_requested: usize,
}

impl<B, S> I2cBus<B, S>
where
    B: RegisterAccess<I2cReg>,
    S: TransferSink,
{
    /// Wrap a register block and completion sink; call [`I2cBus::init`]
    /// before issuing transfers
    pub const fn new(instance: I2cInstance, regs: B, sink: S) -> Self {
        Self {
            instance,
            regs,
            sink,
            state: I2cState::Idle,
            initialized: false,
            spins_per_ms: DEFAULT_SPINS_PER_MS,
            dev_address: 0,
            tx: Vec::new(),
            tx_index: 0,
            rx: Vec::new(),
            rx_requested: 0,
        }
    }

    /// Instance identifier
    pub const fn instance(&self) -> I2cInstance {
        self.instance
    }

    /// Current bus state
    pub const fn state(&self) -> I2cState {
        self.state
    }

    /// Data delivered by the last completed asynchronous read
    pub fn rx_data(&self) -> &[u8] {
        &self.rx
    }

    /// Reset and configure the peripheral
    ///
    /// Derives the clock-control and rise-time fields from the configured
    /// bus speed (standard-mode formula at or below 100 kHz, fast-mode
    /// 2:1 duty formula above), and in interrupt mode registers and
    /// enables the instance's line at mid priority.
    pub fn init<G>(&mut self, config: &I2cConfig, gic: &mut Gic<G>) -> Result<()>
    where
        G: RegisterAccess<GicReg>,
    {
        if config.clock_speed == 0 {
            return Err(Error::InvalidParameter);
        }

        self.regs.set_bits(I2cReg::Cr1, cr1::SWRST);
        self.regs.clear_bits(I2cReg::Cr1, cr1::SWRST);

        // Peripheral clock in MHz, clamped to the register field width
        let pclk_mhz = SYSTEM_CLOCK_HZ / 1_000_000;
        self.regs.write(I2cReg::Cr2, pclk_mhz & 0x3F);

        let (ccr, trise) = if config.clock_speed <= 100_000 {
            (
                SYSTEM_CLOCK_HZ / (config.clock_speed * 2),
                pclk_mhz + 1,
            )
        } else {
            (
                (SYSTEM_CLOCK_HZ / (config.clock_speed * 3)) | ccr::FAST_MODE,
                (pclk_mhz * 300) / 1000 + 1,
            )
        };
        self.regs.write(I2cReg::Ccr, ccr);
        self.regs.write(I2cReg::Trise, trise);

        if config.own_address != 0 {
            self.regs
                .write(I2cReg::Oar1, (u32::from(config.own_address) << 1) | oar1::ADDR_MODE_7BIT);
        }

        self.regs.set_bits(I2cReg::Cr1, cr1::PE);
        self.regs.set_bits(I2cReg::Cr1, cr1::ACK);

        if config.use_interrupts {
            let _ = gic.set_priority(self.instance.irq(), IRQ_PRIORITY);
            let _ = gic.enable_irq(self.instance.irq());
            self.regs.set_bits(I2cReg::Cr2, cr2::ITEVTEN | cr2::ITBUFEN);
        }

        self.spins_per_ms = config.spins_per_ms;
        self.initialized = true;
        self.state = I2cState::Idle;
        Ok(())
    }

    /// Disable the peripheral and its interrupt line
    pub fn deinit<G>(&mut self, gic: &mut Gic<G>) -> Result<()>
    where
        G: RegisterAccess<GicReg>,
    {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        self.regs.clear_bits(I2cReg::Cr1, cr1::PE);
        let _ = gic.disable_irq(self.instance.irq());
        self.initialized = false;
        self.state = I2cState::Idle;
        Ok(())
    }

    /// Write `data` to `dev_addr`, blocking with per-wait timeouts
    pub fn write_blocking(&mut self, dev_addr: u8, data: &[u8], timeout_ms: u32) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParameter);
        }
        if !self.initialized {
            return Err(Error::NotReady);
        }

        self.state = I2cState::BusyTx;

        let result = self.write_transaction(dev_addr, data, timeout_ms);
        self.state = if result.is_ok() {
            I2cState::Idle
        } else {
            I2cState::Error
        };
        result
    }

    fn write_transaction(&mut self, dev_addr: u8, data: &[u8], timeout_ms: u32) -> Result<()> {
        self.wait_bus_free(timeout_ms).map_err(|_| Error::Busy)?;

        self.generate_start();
        let result = self.send_address(dev_addr, Direction::Write, timeout_ms).and_then(|()| {
            for &byte in data {
                self.wait_flag(sr1::TXE, timeout_ms)?;
                self.regs.write(I2cReg::Dr, u32::from(byte));
            }
            self.wait_flag(sr1::BTF, timeout_ms)
        });

        // stop is issued whether the transfer succeeded or timed out
        self.generate_stop();
        result
    }

    /// Read `data.len()` bytes from `dev_addr`, blocking with per-wait
    /// timeouts
    ///
    /// The final byte is NACKed: acknowledgment is disabled and the stop
    /// condition issued before the last byte is latched.
    pub fn read_blocking(&mut self, dev_addr: u8, data: &mut [u8], timeout_ms: u32) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParameter);
        }
        if !self.initialized {
            return Err(Error::NotReady);
        }

        self.state = I2cState::BusyRx;

        self.regs.set_bits(I2cReg::Cr1, cr1::ACK);
        self.generate_start();

        let mut result = self.send_address(dev_addr, Direction::Read, timeout_ms);
        if result.is_ok() {
            let last = data.len() - 1;
            for (i, slot) in data.iter_mut().enumerate() {
                if i == last {
                    self.regs.clear_bits(I2cReg::Cr1, cr1::ACK);
                    self.generate_stop();
                }
                result = self.wait_flag(sr1::RXNE, timeout_ms);
                if result.is_err() {
                    self.generate_stop();
                    break;
                }
                *slot = (self.regs.read(I2cReg::Dr) & 0xFF) as u8;
            }
        } else {
            self.generate_stop();
        }

        self.state = if result.is_ok() {
            I2cState::Idle
        } else {
            I2cState::Error
        };
        result
    }

    /// Start an interrupt-driven write; completion arrives at the sink
    ///
    /// The payload is copied into the driver-owned transfer buffer so no
    /// caller borrow is held across interrupt context.
    pub fn write_async(&mut self, dev_addr: u8, data: &[u8]) -> Result<()> {
        if data.is_empty() || data.len() > MAX_TRANSFER {
            return Err(Error::InvalidParameter);
        }
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != I2cState::Idle {
            return Err(Error::Busy);
        }

        self.tx.clear();
        // length already validated against the buffer capacity
        let _ = self.tx.extend_from_slice(data);
        self.tx_index = 0;
        self.dev_address = dev_addr;
        self.state = I2cState::BusyTx;

        self.generate_start();
        Ok(())
    }

    /// Start an interrupt-driven read of `len` bytes; completion arrives
    /// at the sink and the data at [`I2cBus::rx_data`]
    pub fn read_async(&mut self, dev_addr: u8, len: usize) -> Result<()> {
        if len == 0 || len > MAX_TRANSFER {
            return Err(Error::InvalidParameter);
        }
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != I2cState::Idle {
            return Err(Error::Busy);
        }

        self.rx.clear();
        self.rx_requested = len;
        self.dev_address = dev_addr;
        self.state = I2cState::BusyRx;

        self.regs.set_bits(I2cReg::Cr1, cr1::ACK);
        self.generate_start();
        Ok(())
    }

    /// Drive one step of a pending asynchronous transfer
    ///
    /// Reacts to the peripheral status in priority order; exactly one
    /// branch fires per invocation and unrecognized status is a no-op.
    pub fn irq_handler(&mut self) {
        let status = self.regs.read(I2cReg::Sr1);

        if status & sr1::SB != 0 {
            // start sent: follow with address + direction bit
            let dir = match self.state {
                I2cState::BusyTx => Direction::Write,
                _ => Direction::Read,
            };
            let byte = (u32::from(self.dev_address) << 1) | dir as u32;
            self.regs.write(I2cReg::Dr, byte);
        } else if status & sr1::ADDR != 0 {
            // address acknowledged: cleared by the SR2 read
            let _ = self.regs.read(I2cReg::Sr2);
            if self.state == I2cState::BusyRx && self.rx_requested == 1 {
                self.regs.clear_bits(I2cReg::Cr1, cr1::ACK);
            }
        } else if status & sr1::TXE != 0 && self.state == I2cState::BusyTx {
            if self.tx_index < self.tx.len() {
                let byte = self.tx[self.tx_index];
                self.regs.write(I2cReg::Dr, u32::from(byte));
                self.tx_index += 1;
            } else if status & sr1::BTF != 0 {
                self.generate_stop();
                self.state = I2cState::Idle;
                self.sink.on_complete(self.instance, Ok(()));
            }
            // otherwise the final byte is still shifting out
        } else if status & sr1::RXNE != 0 && self.state == I2cState::BusyRx {
            let byte = (self.regs.read(I2cReg::Dr) & 0xFF) as u8;
            let _ = self.rx.push(byte);

            if self.rx.len() == self.rx_requested - 1 {
                self.regs.clear_bits(I2cReg::Cr1, cr1::ACK);
                self.generate_stop();
            }
            if self.rx.len() >= self.rx_requested {
                self.state = I2cState::Idle;
                self.sink.on_complete(self.instance, Ok(()));
            }
        } else if status & sr1::AF != 0 {
            self.regs.write(I2cReg::Sr1, !sr1::AF);
            self.generate_stop();
            self.state = I2cState::Error;
            self.sink.on_complete(self.instance, Err(Error::Generic));
        }
    }

    fn generate_start(&mut self) {
        self.regs.set_bits(I2cReg::Cr1, cr1::START);
    }

    fn generate_stop(&mut self) {
        self.regs.set_bits(I2cReg::Cr1, cr1::STOP);
    }

    fn budget(&self, timeout_ms: u32) -> SpinBudget {
        SpinBudget::from_millis(timeout_ms, self.spins_per_ms)
    }

    fn wait_flag(&mut self, flag: u32, timeout_ms: u32) -> Result<()> {
        let budget = self.budget(timeout_ms);
        let regs = &mut self.regs;
        spin_until(budget, || regs.read(I2cReg::Sr1) & flag != 0)
    }

    fn wait_bus_free(&mut self, timeout_ms: u32) -> Result<()> {
        let budget = self.budget(timeout_ms);
        let regs = &mut self.regs;
        spin_until(budget, || regs.read(I2cReg::Sr2) & sr2::BUSY == 0)
    }

    fn send_address(&mut self, addr: u8, dir: Direction, timeout_ms: u32) -> Result<()> {
        self.wait_flag(sr1::SB, timeout_ms)?;

        let byte = (u32::from(addr) << 1) | dir as u32;
        self.regs.write(I2cReg::Dr, byte);

        self.wait_flag(sr1::ADDR, timeout_ms)?;

        // ADDR is cleared by reading SR1 followed by SR2
        let _ = self.regs.read(I2cReg::Sr1);
        let _ = self.regs.read(I2cReg::Sr2);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
