#![no_std]
#![forbid(unsafe_code)]

//! # Metal Node App
//!
//! Single cooperative foreground loop over the interrupt controller, the
//! sensor bus and the radio. Interrupt handlers stage flags and records
//! into a [`SharedCell`]; [`Node::poll`] drains the radio event queue,
//! dispatches decoded commands and forwards completed sensor reads to the
//! connected peer. There is no scheduler: one pass of work, then wait for
//! the next interrupt.

use heapless::String;
use mn_ble::{BleConfig, BleRadio, BleReg, BleState, IRQ_BLE};
use mn_core::{Error, RegisterAccess, Result, SpinBudget, DEFAULT_SPINS_PER_MS};
use mn_gic::{Gic, GicReg, IrqMask};
use mn_i2c::{I2cBus, I2cConfig, I2cInstance, I2cReg, I2cState, IRQ_I2C0};

pub mod board;
pub mod shared;

pub use shared::{decode_command, BusSink, Command, RadioSink, Shared, SharedCell};

/// Top-level application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Drivers not yet brought up
    Init,
    /// Advertising or connected, no transfer in flight
    Idle,
    /// Sensor read in flight
    Processing,
    /// Fault observed and recovery could not restore the node
    Error,
}

#[cfg(feature = "defmt")]
impl defmt::Format for AppState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            AppState::Init => defmt::write!(fmt, "Init"),
            AppState::Idle => defmt::write!(fmt, "Idle"),
            AppState::Processing => defmt::write!(fmt, "Processing"),
            AppState::Error => defmt::write!(fmt, "Error"),
        }
    }
}

/// The assembled node: one interrupt controller, one sensor bus, one radio
///
/// Generic over the register-access capabilities and the CPU interrupt
/// mask so the whole dispatch path runs against in-memory fakes in tests.
pub struct Node<'a, GB, IB, BB, M> {
    gic: Gic<GB>,
    i2c: I2cBus<IB, BusSink<'a>>,
    ble: BleRadio<BB, RadioSink<'a>>,
    irq_mask: M,
    shared: &'a SharedCell,
    state: AppState,
    spins_per_ms: u32,
    recoveries: u32,
}

impl<'a, GB, IB, BB, M> Node<'a, GB, IB, BB, M>
where
    GB: RegisterAccess<GicReg>,
    IB: RegisterAccess<I2cReg>,
    BB: RegisterAccess<BleReg>,
    M: IrqMask,
{
    /// Assemble the node from its register blocks; call [`Node::init`]
    /// before polling
    pub fn new(
        gic_regs: GB,
        i2c_regs: IB,
        ble_regs: BB,
        irq_mask: M,
        shared: &'a SharedCell,
    ) -> Self {
        Self {
            gic: Gic::new(gic_regs),
            i2c: I2cBus::new(I2cInstance::I2c0, i2c_regs, BusSink::new(shared)),
            ble: BleRadio::new(ble_regs, RadioSink::new(shared)),
            irq_mask,
            shared,
            state: AppState::Init,
            spins_per_ms: DEFAULT_SPINS_PER_MS,
            recoveries: 0,
        }
    }

    /// Override the spin calibration used for delays and bus timeouts
    pub fn with_spin_rate(mut self, spins_per_ms: u32) -> Self {
        self.spins_per_ms = spins_per_ms;
        self
    }

    /// Current application state
    pub const fn state(&self) -> AppState {
        self.state
    }

    /// Current radio connection state
    pub const fn radio_state(&self) -> BleState {
        self.ble.state()
    }

    /// Current sensor bus state
    pub const fn bus_state(&self) -> I2cState {
        self.i2c.state()
    }

    /// Fault recoveries performed since [`Node::init`]
    pub const fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// Bring up the interrupt controller, both drivers and advertising,
    /// then open the CPU interrupt mask
    pub fn init(&mut self) -> Result<()> {
        self.gic.init()?;

        let bus_config = self.bus_config();
        self.i2c.init(&bus_config, &mut self.gic)?;

        let radio_config = self.radio_config()?;
        self.ble.init(&radio_config, &mut self.gic)?;
        self.ble.start_advertising()?;

        self.irq_mask.enable();
        self.state = AppState::Idle;
        self.recoveries = 0;
        Ok(())
    }

    /// Close the CPU interrupt mask and take both drivers down
    ///
    /// Both drivers are taken down even if one refuses; the first failure
    /// is reported.
    pub fn shutdown(&mut self) -> Result<()> {
        self.irq_mask.disable();
        let radio = self.ble.deinit(&mut self.gic);
        let bus = self.i2c.deinit(&mut self.gic);
        self.state = AppState::Init;
        radio.and(bus)
    }

    /// Interrupt entry point: claim, dispatch, release
    ///
    /// Every claimed line is released, including lines with no handler
    /// attached; skipping the release would wedge that line forever.
    pub fn handle_irq(&mut self) {
        let irq = self.gic.acknowledge();
        match irq {
            IRQ_I2C0 => self.i2c.irq_handler(),
            IRQ_BLE => self.ble.irq_handler(),
            _ => {}
        }
        self.gic.end_of_irq(irq);
    }

    /// One pass of the foreground loop
    ///
    /// Drains the radio event queue, folds the shared flags, finishes any
    /// completed sensor transfer and dispatches at most one pending
    /// command. A fault observed anywhere in the pass triggers recovery
    /// before the pass ends, so a poll only leaves the node in `Error`
    /// when recovery itself failed.
    pub fn poll(&mut self) {
        self.ble.process();

        let (command, transfer, connected, fault) = critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            (
                shared.pending_command.take(),
                shared.transfer_done.take(),
                shared.connected,
                core::mem::take(&mut shared.radio_fault),
            )
        });

        if fault || self.ble.state() == BleState::Error {
            self.state = AppState::Error;
        }

        if self.state != AppState::Error {
            if let Some(result) = transfer {
                match result {
                    Ok(()) => {
                        self.state = AppState::Idle;
                        if connected && self.ble.send_data(self.i2c.rx_data()).is_err() {
                            self.state = AppState::Error;
                        }
                    }
                    Err(_) => self.state = AppState::Error,
                }
            }
        }

        if self.state != AppState::Error {
            if let Some(command) = command {
                self.dispatch(command, connected);
            }
        }

        if self.state == AppState::Error {
            self.recover();
        }
    }

    /// Foreground loop: poll and sleep until recovery can no longer
    /// restore the node, then take everything down
    ///
    /// Every poll ends either healthy or with recovery already attempted,
    /// so leaving the loop means recovery failed.
    pub fn run(&mut self) -> Result<()> {
        while self.state != AppState::Error {
            self.poll();
            #[cfg(target_arch = "arm")]
            cortex_m::asm::wfi();
        }
        self.shutdown()
    }

    fn dispatch(&mut self, command: Command, connected: bool) {
        match command {
            Command::ReadTemperature => {
                self.start_read(board::SENSOR_TEMP_ADDR, board::SENSOR_TEMP_LEN)
            }
            Command::ReadAcceleration => {
                self.start_read(board::SENSOR_ACCEL_ADDR, board::SENSOR_ACCEL_LEN)
            }
            Command::Echo(payload) => {
                if connected && self.ble.send_data(&payload).is_err() {
                    self.state = AppState::Error;
                }
            }
        }
    }

    fn start_read(&mut self, addr: u8, len: usize) {
        match self.i2c.read_async(addr, len) {
            Ok(()) => self.state = AppState::Processing,
            Err(_) => self.state = AppState::Error,
        }
    }

    /// Fault recovery: restart advertising after a short backoff
    ///
    /// A driver sitting in its terminal error state is re-initialized
    /// first; for the radio that also invalidates any link the peer
    /// believed it still had.
    fn recover(&mut self) {
        self.recoveries = self.recoveries.saturating_add(1);

        if self.i2c.state() == I2cState::Error {
            let bus_config = self.bus_config();
            if self.i2c.init(&bus_config, &mut self.gic).is_err() {
                return;
            }
        }

        if self.ble.state() == BleState::Error {
            let Ok(radio_config) = self.radio_config() else {
                return;
            };
            if self.ble.init(&radio_config, &mut self.gic).is_err() {
                return;
            }
            critical_section::with(|cs| {
                let mut shared = self.shared.borrow_ref_mut(cs);
                shared.connected = false;
                shared.pending_command = None;
                shared.transfer_done = None;
            });
        } else {
            let _ = self.ble.stop_advertising();
        }

        self.delay(board::RECOVERY_DELAY_MS);

        if self.ble.start_advertising().is_ok() {
            self.state = AppState::Idle;
        }
    }

    fn bus_config(&self) -> I2cConfig {
        I2cConfig {
            clock_speed: board::I2C_CLOCK_HZ,
            own_address: 0,
            use_interrupts: true,
            spins_per_ms: self.spins_per_ms,
        }
    }

    fn radio_config(&self) -> Result<BleConfig> {
        Ok(BleConfig {
            device_name: String::try_from(board::DEVICE_NAME)
                .map_err(|_| Error::InvalidParameter)?,
            adv_interval_ms: board::ADV_INTERVAL_MS,
            conn_interval_min_ms: board::CONN_INTERVAL_MIN_MS,
            conn_interval_max_ms: board::CONN_INTERVAL_MAX_MS,
            tx_power_dbm: board::TX_POWER_DBM,
            use_interrupts: true,
            spins_per_ms: self.spins_per_ms,
        })
    }

    fn delay(&self, ms: u32) {
        let mut budget = SpinBudget::from_millis(ms, self.spins_per_ms);
        while !budget.tick() {
            core::hint::spin_loop();
        }
    }
}
