//! Two-wire bus peripheral register map and bit fields

use mn_core::bit;

/// Named registers of one bus peripheral instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cReg {
    /// Control register 1
    Cr1,
    /// Control register 2
    Cr2,
    /// Own address register 1
    Oar1,
    /// Own address register 2
    Oar2,
    /// Data register
    Dr,
    /// Status register 1
    Sr1,
    /// Status register 2
    Sr2,
    /// Clock control register
    Ccr,
    /// Rise-time register
    Trise,
}

/// Control register 1 bits
pub mod cr1 {
    use super::bit;

    /// Peripheral enable
    pub const PE: u32 = bit(0);
    /// Generate start condition
    pub const START: u32 = bit(8);
    /// Generate stop condition
    pub const STOP: u32 = bit(9);
    /// Acknowledge received bytes
    pub const ACK: u32 = bit(10);
    /// Software reset
    pub const SWRST: u32 = bit(15);
}

/// Control register 2 bits
pub mod cr2 {
    use super::bit;

    /// Event interrupt enable
    pub const ITEVTEN: u32 = bit(9);
    /// Buffer interrupt enable
    pub const ITBUFEN: u32 = bit(10);
}

/// Status register 1 bits
pub mod sr1 {
    use super::bit;

    /// Start condition sent
    pub const SB: u32 = bit(0);
    /// Address sent and acknowledged
    pub const ADDR: u32 = bit(1);
    /// Byte transfer finished
    pub const BTF: u32 = bit(2);
    /// Receive register not empty
    pub const RXNE: u32 = bit(6);
    /// Transmit register empty
    pub const TXE: u32 = bit(7);
    /// Acknowledge failure
    pub const AF: u32 = bit(10);
}

/// Status register 2 bits
pub mod sr2 {
    use super::bit;

    /// Master mode selected
    pub const MSL: u32 = bit(0);
    /// Bus busy
    pub const BUSY: u32 = bit(1);
}

/// Clock control register bits
pub mod ccr {
    use super::bit;

    /// Fast-mode select (2:1 duty)
    pub const FAST_MODE: u32 = bit(15);
}

/// Own address register 1 bits
pub mod oar1 {
    use super::bit;

    /// 7-bit addressing mode marker
    pub const ADDR_MODE_7BIT: u32 = bit(14);
}
