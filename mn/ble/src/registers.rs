//! Radio controller register map and bit fields

use mn_core::bit;

/// Named registers of the radio controller block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleReg {
    /// Control register
    Ctrl,
    /// Status register
    Status,
    /// Interrupt enable
    IntEnable,
    /// Interrupt flags (write one to clear)
    IntFlag,
    /// Transmit data FIFO
    TxData,
    /// Receive data FIFO
    RxData,
    /// Transmit length
    TxLen,
    /// Receive length
    RxLen,
    /// Advertising control
    AdvCtrl,
    /// Connection control
    ConnCtrl,
    /// Scan control
    ScanCtrl,
    /// Transmit power control
    TxPower,
    /// Local address, low word
    MacLow,
    /// Local address, high word
    MacHigh,
}

/// Control register bits
pub mod ctrl {
    use super::bit;

    /// Controller enable
    pub const ENABLE: u32 = bit(0);
    /// Controller reset
    pub const RESET: u32 = bit(1);
    /// Start advertising
    pub const ADV_START: u32 = bit(4);
    /// Start scanning
    pub const SCAN_START: u32 = bit(5);
    /// Initiate connection
    pub const CONN_INIT: u32 = bit(6);
    /// Start transmission
    pub const TX_START: u32 = bit(8);
}

/// Status register bits
pub mod status {
    use super::bit;

    /// Controller ready after reset
    pub const READY: u32 = bit(0);
    /// Link established
    pub const CONNECTED: u32 = bit(1);
    /// Advertising active
    pub const ADV_ACTIVE: u32 = bit(2);
    /// Scan active
    pub const SCAN_ACTIVE: u32 = bit(3);
    /// Transmit path busy
    pub const TX_BUSY: u32 = bit(4);
    /// Receive data available
    pub const RX_READY: u32 = bit(5);
}

/// Interrupt flag bits, in handler priority order
pub mod intr {
    use super::bit;

    /// Peer connected
    pub const CONNECTED: u32 = bit(0);
    /// Peer disconnected
    pub const DISCONNECTED: u32 = bit(1);
    /// Receive complete
    pub const RX_DONE: u32 = bit(2);
    /// Transmit complete
    pub const TX_DONE: u32 = bit(3);
    /// Advertising window finished
    pub const ADV_DONE: u32 = bit(4);
    /// Scan result available
    pub const SCAN_RESULT: u32 = bit(5);
    /// Controller error
    pub const ERROR: u32 = bit(7);
}
