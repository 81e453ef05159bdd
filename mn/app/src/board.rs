//! Board wiring constants
//!
//! Addresses, intervals and command opcodes fixed by the board and its
//! companion tooling.

/// Temperature sensor, 7-bit bus address
pub const SENSOR_TEMP_ADDR: u8 = 0x48;

/// Accelerometer, 7-bit bus address
pub const SENSOR_ACCEL_ADDR: u8 = 0x1D;

/// Bytes per temperature sample
pub const SENSOR_TEMP_LEN: usize = 2;

/// Bytes per acceleration sample (three 16-bit axes)
pub const SENSOR_ACCEL_LEN: usize = 6;

/// Sensor bus clock
pub const I2C_CLOCK_HZ: u32 = 400_000;

/// Advertised device name
pub const DEVICE_NAME: &str = "metal-node";

/// Advertising interval
pub const ADV_INTERVAL_MS: u16 = 100;

/// Connection interval window
pub const CONN_INTERVAL_MIN_MS: u16 = 20;
pub const CONN_INTERVAL_MAX_MS: u16 = 40;

/// Radiated power
pub const TX_POWER_DBM: i8 = 0;

/// Backoff before advertising is restarted after a fault
pub const RECOVERY_DELAY_MS: u32 = 10;

/// Request a temperature sample
pub const CMD_READ_TEMP: u8 = 0x01;

/// Request an acceleration sample
pub const CMD_READ_ACCEL: u8 = 0x02;

/// Echo the remaining payload back to the peer
pub const CMD_ECHO: u8 = 0xFF;
