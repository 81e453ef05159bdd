//! Register-access capability
//!
//! Each driver names its peripheral's control/status/data words with a
//! small `Copy` enum and performs all hardware traffic through this trait.
//! Production code binds it to the real memory-mapped block in the board
//! port; tests bind it to an in-memory fake that scripts raw status
//! sequences to drive the interrupt handlers deterministically.

/// Build a single-bit mask
pub const fn bit(n: u32) -> u32 {
    1 << n
}

/// Word-granular access to one peripheral's named registers
///
/// Reads take `&mut self`: on real hardware, reading an acknowledge or
/// data register has side effects, and the fakes used in tests consume
/// scripted values on every read.
pub trait RegisterAccess<R: Copy> {
    /// Read a 32-bit register
    fn read(&mut self, reg: R) -> u32;

    /// Write a 32-bit register
    fn write(&mut self, reg: R, value: u32);

    /// Data-synchronization barrier
    ///
    /// Guarantees prior register writes are visible to the peripheral
    /// before the call returns.
    fn barrier(&mut self);

    /// Read-modify-write: set the bits in `mask`
    fn set_bits(&mut self, reg: R, mask: u32) {
        let value = self.read(reg);
        self.write(reg, value | mask);
    }

    /// Read-modify-write: clear the bits in `mask`
    fn clear_bits(&mut self, reg: R, mask: u32) {
        let value = self.read(reg);
        self.write(reg, value & !mask);
    }
}
