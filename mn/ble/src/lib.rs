#![no_std]
#![forbid(unsafe_code)]

//! # Metal Node BLE
//!
//! Short-range radio driver managing one controller's connection and
//! advertising lifecycle plus bidirectional payload transfer. Interrupt
//! context produces event records into a bounded FIFO queue; the
//! foreground loop consumes them through [`BleRadio::process`], which
//! invokes the injected event sink once per record.
//!
//! The queue drops on overflow rather than escalating; drops are counted
//! and observable through [`BleRadio::dropped_events`].

use heapless::{Deque, String};
use mn_core::{spin_until, Error, RegisterAccess, Result, SpinBudget, DEFAULT_SPINS_PER_MS};
use mn_gic::{Gic, GicReg};

pub mod events;
pub mod registers;

pub use events::*;
pub use registers::*;

/// Largest payload carried by one event or transmission
pub const MAX_PAYLOAD: usize = 244;

/// Longest configurable device name
pub const MAX_DEVICE_NAME: usize = 32;

/// Event queue depth
pub const EVENT_QUEUE_SIZE: usize = 8;

/// Interrupt line of the radio controller
pub const IRQ_BLE: u32 = 48;

/// Priority programmed for the radio interrupt line
const IRQ_PRIORITY: u8 = 0x80;

/// Reset settle time before polling the ready flag
const RESET_SETTLE_MS: u32 = 1;

/// Allowance for the post-reset ready flag
const READY_TIMEOUT_MS: u32 = 10;

/// Allowance for the transmit path to drain before a new transmission
const TX_READY_TIMEOUT_MS: u32 = 10;

/// Radio connection state
///
/// `Off` is initial and terminal until re-initialization; `Error` is
/// entered from any state on a hardware error event and exits only
/// through re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Off,
    Idle,
    Advertising,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

#[cfg(feature = "defmt")]
impl defmt::Format for BleState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            BleState::Off => defmt::write!(fmt, "Off"),
            BleState::Idle => defmt::write!(fmt, "Idle"),
            BleState::Advertising => defmt::write!(fmt, "Advertising"),
            BleState::Scanning => defmt::write!(fmt, "Scanning"),
            BleState::Connecting => defmt::write!(fmt, "Connecting"),
            BleState::Connected => defmt::write!(fmt, "Connected"),
            BleState::Disconnecting => defmt::write!(fmt, "Disconnecting"),
            BleState::Error => defmt::write!(fmt, "Error"),
        }
    }
}

/// Radio configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleConfig {
    pub device_name: String<MAX_DEVICE_NAME>,
    pub adv_interval_ms: u16,
    pub conn_interval_min_ms: u16,
    pub conn_interval_max_ms: u16,
    pub tx_power_dbm: i8,
    pub use_interrupts: bool,
    /// Spin iterations assumed per millisecond of bounded waiting
    pub spins_per_ms: u32,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            adv_interval_ms: 100,
            conn_interval_min_ms: 20,
            conn_interval_max_ms: 40,
            tx_power_dbm: 0,
            use_interrupts: true,
            spins_per_ms: DEFAULT_SPINS_PER_MS,
        }
    }
}

/// Radio driver bound to a register-access capability and an event sink
pub struct BleRadio<B, S> {
    regs: B,
    sink: S,
    state: BleState,
    config: BleConfig,
    local_addr: MacAddr,
    peer_addr: MacAddr,
    queue: Deque<BleEvent, EVENT_QUEUE_SIZE>,
    dropped: u32,
    rx_buffer: [u8; MAX_PAYLOAD],
    rx_len: usize,
    rx_pending: bool,
    tx_complete: bool,
    initialized: bool,
}

impl<B, S> BleRadio<B, S>
where
    B: RegisterAccess<BleReg>,
    S: EventSink,
{
    /// Wrap a register block and event sink; call [`BleRadio::init`]
    /// before use
    pub fn new(regs: B, sink: S) -> Self {
        Self {
            regs,
            sink,
            state: BleState::Off,
            config: BleConfig::default(),
            local_addr: MacAddr::default(),
            peer_addr: MacAddr::default(),
            queue: Deque::new(),
            dropped: 0,
            rx_buffer: [0; MAX_PAYLOAD],
            rx_len: 0,
            rx_pending: false,
            tx_complete: false,
            initialized: false,
        }
    }

    /// Current connection state
    pub const fn state(&self) -> BleState {
        self.state
    }

    /// Local device address read back from the controller
    pub fn mac_address(&self) -> Result<MacAddr> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        Ok(self.local_addr)
    }

    /// Events lost to queue overflow since initialization
    pub const fn dropped_events(&self) -> u32 {
        self.dropped
    }

    /// Whether the last transmission has been confirmed complete
    pub const fn tx_complete(&self) -> bool {
        self.tx_complete
    }

    /// Reset and configure the controller
    ///
    /// Pulses reset, waits (bounded) for the ready flag, programs transmit
    /// power and advertising interval, reads back the local address and,
    /// in interrupt mode, registers the radio line at mid priority with
    /// the lifecycle and data interrupts enabled.
    pub fn init<G>(&mut self, config: &BleConfig, gic: &mut Gic<G>) -> Result<()>
    where
        G: RegisterAccess<GicReg>,
    {
        if config.device_name.is_empty()
            || config.conn_interval_min_ms > config.conn_interval_max_ms
        {
            return Err(Error::InvalidParameter);
        }

        self.regs.set_bits(BleReg::Ctrl, ctrl::RESET);
        let mut settle = SpinBudget::from_millis(RESET_SETTLE_MS, config.spins_per_ms);
        while !settle.tick() {
            core::hint::spin_loop();
        }
        self.regs.clear_bits(BleReg::Ctrl, ctrl::RESET);

        let ready = SpinBudget::from_millis(READY_TIMEOUT_MS, config.spins_per_ms);
        let regs = &mut self.regs;
        spin_until(ready, || regs.read(BleReg::Status) & status::READY != 0)?;

        self.config = config.clone();

        // controller expects power as an offset-20 field
        let power = i32::from(config.tx_power_dbm) + 20;
        self.regs.write(BleReg::TxPower, power as u32);
        self.regs
            .write(BleReg::AdvCtrl, u32::from(config.adv_interval_ms));

        let low = self.regs.read(BleReg::MacLow);
        let high = self.regs.read(BleReg::MacHigh);
        self.local_addr = MacAddr::from_words(low, high);

        if config.use_interrupts {
            self.regs.write(
                BleReg::IntEnable,
                intr::CONNECTED | intr::DISCONNECTED | intr::RX_DONE | intr::TX_DONE | intr::ERROR,
            );
            let _ = gic.set_priority(IRQ_BLE, IRQ_PRIORITY);
            let _ = gic.enable_irq(IRQ_BLE);
        }

        self.regs.set_bits(BleReg::Ctrl, ctrl::ENABLE);

        self.queue.clear();
        self.dropped = 0;
        self.rx_pending = false;
        self.tx_complete = false;
        self.state = BleState::Idle;
        self.initialized = true;
        Ok(())
    }

    /// Disable the controller and its interrupt line
    pub fn deinit<G>(&mut self, gic: &mut Gic<G>) -> Result<()>
    where
        G: RegisterAccess<GicReg>,
    {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        self.regs.write(BleReg::IntEnable, 0);
        let _ = gic.disable_irq(IRQ_BLE);
        self.regs.clear_bits(BleReg::Ctrl, ctrl::ENABLE);
        self.state = BleState::Off;
        self.initialized = false;
        Ok(())
    }

    /// Start advertising; allowed from Idle or Connected
    pub fn start_advertising(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Idle && self.state != BleState::Connected {
            return Err(Error::Busy);
        }
        self.regs.set_bits(BleReg::Ctrl, ctrl::ADV_START);
        self.state = BleState::Advertising;
        self.enqueue(BleEvent::new(BleEventKind::AdvStarted));
        Ok(())
    }

    /// Stop advertising; allowed only while Advertising
    pub fn stop_advertising(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Advertising {
            return Err(Error::InvalidParameter);
        }
        self.regs.clear_bits(BleReg::Ctrl, ctrl::ADV_START);
        self.state = BleState::Idle;
        self.enqueue(BleEvent::new(BleEventKind::AdvStopped));
        Ok(())
    }

    /// Start scanning for `duration_ms` (0 = continuous)
    pub fn start_scan(&mut self, duration_ms: u32) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Idle {
            return Err(Error::Busy);
        }
        self.regs.write(BleReg::ScanCtrl, duration_ms & 0xFFFF);
        self.regs.set_bits(BleReg::Ctrl, ctrl::SCAN_START);
        self.state = BleState::Scanning;
        Ok(())
    }

    /// Stop scanning; allowed only while Scanning
    pub fn stop_scan(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Scanning {
            return Err(Error::InvalidParameter);
        }
        self.regs.clear_bits(BleReg::Ctrl, ctrl::SCAN_START);
        self.state = BleState::Idle;
        Ok(())
    }

    /// Initiate a connection to `peer`; allowed from Idle or Scanning
    pub fn connect(&mut self, peer: MacAddr) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Idle && self.state != BleState::Scanning {
            return Err(Error::Busy);
        }
        self.peer_addr = peer;
        self.regs.write(BleReg::ConnCtrl, peer.low_word());
        self.regs.set_bits(BleReg::Ctrl, ctrl::CONN_INIT);
        self.state = BleState::Connecting;
        Ok(())
    }

    /// Drop the current connection; allowed only while Connected
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::NotReady);
        }
        if self.state != BleState::Connected {
            return Err(Error::InvalidParameter);
        }
        self.regs.clear_bits(BleReg::Ctrl, ctrl::CONN_INIT);
        self.state = BleState::Disconnecting;
        Ok(())
    }

    /// Transmit `data` on the current connection
    ///
    /// Waits (bounded) for the transmit path to drain, then writes the
    /// length and payload and triggers transmission; completion is
    /// signalled later by the transmit-done interrupt.
    pub fn send_data(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PAYLOAD {
            return Err(Error::InvalidParameter);
        }
        if !self.initialized || self.state != BleState::Connected {
            return Err(Error::NotReady);
        }

        let budget = SpinBudget::from_millis(TX_READY_TIMEOUT_MS, self.config.spins_per_ms);
        let regs = &mut self.regs;
        spin_until(budget, || regs.read(BleReg::Status) & status::TX_BUSY == 0)?;

        self.regs.write(BleReg::TxLen, data.len() as u32);
        for &byte in data {
            self.regs.write(BleReg::TxData, u32::from(byte));
        }
        self.tx_complete = false;
        self.regs.set_bits(BleReg::Ctrl, ctrl::TX_START);
        Ok(())
    }

    /// Deliver pending events to the sink; foreground only
    ///
    /// A receive flagged by the interrupt handler is synthesized into a
    /// DataReceived event and delivered first, bypassing the queue; the
    /// queue is then drained in FIFO order until empty.
    pub fn process(&mut self) {
        if self.rx_pending {
            self.rx_pending = false;

            let mut event = BleEvent::with_peer(BleEventKind::DataReceived, self.peer_addr);
            // clamped to MAX_PAYLOAD when captured
            let _ = event.data.extend_from_slice(&self.rx_buffer[..self.rx_len]);
            self.sink.on_event(&event);
        }

        while let Some(event) = self.queue.pop_front() {
            self.sink.on_event(&event);
        }
    }

    /// React to the controller's latched interrupt flags
    ///
    /// Flags are handled in a fixed priority order and each handled flag
    /// is cleared before moving to the next condition.
    pub fn irq_handler(&mut self) {
        let flags = self.regs.read(BleReg::IntFlag);

        if flags & intr::CONNECTED != 0 {
            self.regs.write(BleReg::IntFlag, intr::CONNECTED);
            self.state = BleState::Connected;
            self.enqueue(BleEvent::with_peer(BleEventKind::Connected, self.peer_addr));
        }

        if flags & intr::DISCONNECTED != 0 {
            self.regs.write(BleReg::IntFlag, intr::DISCONNECTED);
            self.state = BleState::Idle;
            self.enqueue(BleEvent::new(BleEventKind::Disconnected));
        }

        if flags & intr::RX_DONE != 0 {
            self.regs.write(BleReg::IntFlag, intr::RX_DONE);
            self.capture_rx();
        }

        if flags & intr::TX_DONE != 0 {
            self.regs.write(BleReg::IntFlag, intr::TX_DONE);
            self.tx_complete = true;
            self.enqueue(BleEvent::new(BleEventKind::DataSent));
        }

        if flags & intr::ERROR != 0 {
            self.regs.write(BleReg::IntFlag, intr::ERROR);
            self.state = BleState::Error;
            self.enqueue(BleEvent::new(BleEventKind::Error));
        }
    }

    /// Copy the controller's receive FIFO into the internal buffer and
    /// flag it for the next `process` call
    fn capture_rx(&mut self) {
        let len = (self.regs.read(BleReg::RxLen) as usize).min(MAX_PAYLOAD);
        for slot in self.rx_buffer[..len].iter_mut() {
            *slot = (self.regs.read(BleReg::RxData) & 0xFF) as u8;
        }
        self.rx_len = len;
        self.rx_pending = true;
    }

    /// Queue an event for the foreground drain, counting drops on overflow
    fn enqueue(&mut self, event: BleEvent) {
        if self.queue.push_back(event).is_err() {
            self.dropped = self.dropped.saturating_add(1);
        }
    }
}
