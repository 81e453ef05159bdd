#![no_std]
#![forbid(unsafe_code)]

//! # Metal Node Core
//!
//! Shared types and capability traits for the metal-node peripheral
//! subsystem: the status taxonomy every driver reports through, the
//! register-access capability that drivers bind to instead of raw
//! memory-mapped I/O, and the bounded busy-wait budget used by every
//! blocking code path.

#[cfg(feature = "std")]
extern crate std;

use core::fmt;

pub mod regs;
pub mod wait;

pub use regs::*;
pub use wait::*;

/// Subsystem version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the peripheral subsystem
pub type Result<T> = core::result::Result<T, Error>;

/// Error taxonomy shared by every driver operation
///
/// Parameter and state-precondition violations are returned synchronously
/// at the call boundary. Hardware-protocol failures inside an asynchronous
/// transfer are delivered only through the registered completion sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Unspecified hardware or protocol failure
    Generic,
    /// Resource already in use
    Busy,
    /// Bounded wait exceeded
    Timeout,
    /// Precondition violated by the caller
    InvalidParameter,
    /// Operation attempted before required initialization or state
    NotReady,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Generic => write!(f, "hardware error"),
            Error::Busy => write!(f, "resource busy"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::InvalidParameter => write!(f, "invalid parameter"),
            Error::NotReady => write!(f, "not ready"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::Generic => defmt::write!(fmt, "Generic"),
            Error::Busy => defmt::write!(fmt, "Busy"),
            Error::Timeout => defmt::write!(fmt, "Timeout"),
            Error::InvalidParameter => defmt::write!(fmt, "InvalidParameter"),
            Error::NotReady => defmt::write!(fmt, "NotReady"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let mut buf = heapless_fmt(Error::Timeout);
        assert_eq!(buf.as_str(), "operation timed out");
        buf = heapless_fmt(Error::Busy);
        assert_eq!(buf.as_str(), "resource busy");
    }

    fn heapless_fmt(e: Error) -> FmtBuf {
        use fmt::Write;
        let mut buf = FmtBuf::default();
        write!(&mut buf, "{}", e).unwrap();
        buf
    }

    struct FmtBuf {
        data: [u8; 64],
        len: usize,
    }

    impl Default for FmtBuf {
        fn default() -> Self {
            Self { data: [0; 64], len: 0 }
        }
    }

    impl FmtBuf {
        fn as_str(&self) -> &str {
            core::str::from_utf8(&self.data[..self.len]).unwrap()
        }
    }

    impl fmt::Write for FmtBuf {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let bytes = s.as_bytes();
            if self.len + bytes.len() > self.data.len() {
                return Err(fmt::Error);
            }
            self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }
}
