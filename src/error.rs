use crate::types::{Command, SensorStatus, SessionState};

/// Transport-level fault raised by the bus binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BusFault {
    #[error("I2C transfer failed: {0:?}")]
    I2c(embedded_hal::i2c::ErrorKind),

    #[error("reset line could not be driven: {0:?}")]
    Pin(embedded_hal::digital::ErrorKind),
}

/// Bus or device registration failure. Fatal at start-up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("0x{0:02x} is not a usable 7-bit I2C address")]
    InvalidAddress(u8),

    #[error("bus clock {0} Hz exceeds the sensor maximum of 1 MHz")]
    ClockTooFast(u32),

    #[error("VL53L5CX not detected at the requested address")]
    NotDetected,

    #[error("bus fault while registering the sensor: {0}")]
    Bus(BusFault),
}

/// Firmware/calibration load failure. Fatal at start-up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("sensor is already initialized")]
    AlreadyInitialized,

    #[error("ULD loading failed (status {0:?})")]
    Load(SensorStatus),

    #[error("sensor reset failed: {0}")]
    Reset(BusFault),
}

/// Transient fault while polling or fetching a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommError {
    #[error("driver returned status {0:?}")]
    Status(SensorStatus),

    #[error("result frame truncated: expected {expected} entries, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },
}

/// Errors that can occur while driving a VL53L5CX ranging session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("initialization error: {0}")]
    Init(#[from] InitError),

    #[error("sensor rejected {command} (status {status:?})")]
    Hardware {
        command: Command,
        status: SensorStatus,
    },

    #[error("communication error: {0}")]
    Comm(#[from] CommError),

    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("fetch called without a ready frame")]
    NotReady,

    #[error("sensor has not been initialized")]
    NotInitialized,

    #[error("failed to spawn acquisition worker: {0}")]
    Spawn(String),

    #[error("acquisition worker panicked")]
    WorkerPanicked,

    #[error("frame stream ended")]
    StreamEnded,

    #[error("timeout waiting for a frame")]
    Timeout,
}

impl Error {
    /// True for faults the acquisition loop skips over instead of aborting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Comm(_))
    }
}
