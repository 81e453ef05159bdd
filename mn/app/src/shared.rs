//! State crossing the interrupt/foreground boundary
//!
//! Interrupt context only raises flags and stages small records here; all
//! driver calls happen from the foreground loop. Every access goes through
//! a critical section.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;
use mn_ble::{BleEvent, BleEventKind, EventSink, MAX_PAYLOAD};
use mn_core::Result;
use mn_i2c::{I2cInstance, TransferSink};

use crate::board;

/// Command decoded from a received radio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ReadTemperature,
    ReadAcceleration,
    Echo(Vec<u8, MAX_PAYLOAD>),
}

/// Decode the leading opcode byte of a payload
///
/// Unknown opcodes and empty payloads are ignored rather than faulted.
pub fn decode_command(data: &[u8]) -> Option<Command> {
    let (&opcode, rest) = data.split_first()?;
    match opcode {
        board::CMD_READ_TEMP => Some(Command::ReadTemperature),
        board::CMD_READ_ACCEL => Some(Command::ReadAcceleration),
        board::CMD_ECHO => {
            let mut payload = Vec::new();
            // bounded by the event record it was carried in
            let _ = payload.extend_from_slice(rest);
            Some(Command::Echo(payload))
        }
        _ => None,
    }
}

/// Flags and staging records shared between contexts
#[derive(Debug, Default)]
pub struct Shared {
    /// A peer link is up
    pub connected: bool,
    /// Command awaiting foreground dispatch; later commands overwrite
    /// earlier undispatched ones
    pub pending_command: Option<Command>,
    /// Outcome of the last asynchronous bus transfer
    pub transfer_done: Option<Result<()>>,
    /// Radio controller reported a hardware error
    pub radio_fault: bool,
}

impl Shared {
    pub const fn new() -> Self {
        Self {
            connected: false,
            pending_command: None,
            transfer_done: None,
            radio_fault: false,
        }
    }
}

/// Shared cell suitable for a `static`
pub type SharedCell = Mutex<RefCell<Shared>>;

/// Radio event sink: folds event records into the shared flags
pub struct RadioSink<'a> {
    shared: &'a SharedCell,
}

impl<'a> RadioSink<'a> {
    pub const fn new(shared: &'a SharedCell) -> Self {
        Self { shared }
    }
}

impl EventSink for RadioSink<'_> {
    fn on_event(&mut self, event: &BleEvent) {
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            match event.kind {
                BleEventKind::Connected => shared.connected = true,
                BleEventKind::Disconnected => shared.connected = false,
                BleEventKind::DataReceived => {
                    if let Some(command) = decode_command(&event.data) {
                        shared.pending_command = Some(command);
                    }
                }
                BleEventKind::Error => shared.radio_fault = true,
                _ => {}
            }
        });
    }
}

/// Bus completion sink: records the transfer outcome for the next poll
pub struct BusSink<'a> {
    shared: &'a SharedCell,
}

impl<'a> BusSink<'a> {
    pub const fn new(shared: &'a SharedCell) -> Self {
        Self { shared }
    }
}

impl TransferSink for BusSink<'_> {
    fn on_complete(&mut self, _instance: I2cInstance, result: Result<()>) {
        critical_section::with(|cs| {
            self.shared.borrow_ref_mut(cs).transfer_done = Some(result);
        });
    }
}
