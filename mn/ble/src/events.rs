//! Radio event records and the application event capability

use heapless::Vec;

use crate::MAX_PAYLOAD;

/// 48-bit device address
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const LEN: usize = 6;

    /// Assemble from the controller's low/high address words
    pub const fn from_words(low: u32, high: u32) -> Self {
        Self([
            low as u8,
            (low >> 8) as u8,
            (low >> 16) as u8,
            (low >> 24) as u8,
            high as u8,
            (high >> 8) as u8,
        ])
    }

    /// Lower four bytes packed little-endian
    pub const fn low_word(self) -> u32 {
        (self.0[0] as u32)
            | (self.0[1] as u32) << 8
            | (self.0[2] as u32) << 16
            | (self.0[3] as u32) << 24
    }

    /// Upper two bytes packed little-endian
    pub const fn high_word(self) -> u32 {
        (self.0[4] as u32) | (self.0[5] as u32) << 8
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MacAddr {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[5],
            self.0[4],
            self.0[3],
            self.0[2],
            self.0[1],
            self.0[0]
        );
    }
}

/// Kind of radio event delivered to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleEventKind {
    None,
    Connected,
    Disconnected,
    DataReceived,
    DataSent,
    AdvStarted,
    AdvStopped,
    ScanResult,
    Error,
}

#[cfg(feature = "defmt")]
impl defmt::Format for BleEventKind {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            BleEventKind::None => defmt::write!(fmt, "None"),
            BleEventKind::Connected => defmt::write!(fmt, "Connected"),
            BleEventKind::Disconnected => defmt::write!(fmt, "Disconnected"),
            BleEventKind::DataReceived => defmt::write!(fmt, "DataReceived"),
            BleEventKind::DataSent => defmt::write!(fmt, "DataSent"),
            BleEventKind::AdvStarted => defmt::write!(fmt, "AdvStarted"),
            BleEventKind::AdvStopped => defmt::write!(fmt, "AdvStopped"),
            BleEventKind::ScanResult => defmt::write!(fmt, "ScanResult"),
            BleEventKind::Error => defmt::write!(fmt, "Error"),
        }
    }
}

/// One radio event record
///
/// Carries the peer address, a bounded payload and a signal-strength
/// value where the event kind makes them meaningful.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleEvent {
    pub kind: BleEventKind,
    pub peer: MacAddr,
    pub data: Vec<u8, MAX_PAYLOAD>,
    pub rssi: i8,
}

impl BleEvent {
    /// Event with no payload, no peer, no signal strength
    pub fn new(kind: BleEventKind) -> Self {
        Self {
            kind,
            peer: MacAddr::default(),
            data: Vec::new(),
            rssi: 0,
        }
    }

    /// Event tagged with a peer address
    pub fn with_peer(kind: BleEventKind, peer: MacAddr) -> Self {
        Self {
            kind,
            peer,
            data: Vec::new(),
            rssi: 0,
        }
    }
}

/// Application event capability
///
/// Invoked synchronously by the radio driver's foreground `process`
/// drain; implementations must not block or allocate.
pub trait EventSink {
    fn on_event(&mut self, event: &BleEvent);
}
