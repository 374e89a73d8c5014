//! # vl53l5cx-ranging - session lifecycle and acquisition loop for the VL53L5CX
//!
//! Drives a VL53L5CX multi-zone time-of-flight sensor in its 4x4 configuration:
//! - Bus binding over any `embedded-hal` I2C bus, with optional reset line
//! - Firmware load through the vendor Ultra Lite Driver (behind the [`Uld`] trait)
//! - A checked `Initialized -> Ranging -> Stopped` state machine
//! - Fixed-cadence polling on a dedicated worker thread, frames delivered to a sink
//!
//! ## Quick Start
//! ```no_run
//! use std::time::Duration;
//! use vl53l5cx_ranging::sim::{self, SimPlatform, SimulatedUld};
//! use vl53l5cx_ranging::{
//!     AcquisitionConfig, DeviceConfig, FrameStream, RangingSession, WorkerConfig,
//! };
//!
//! let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
//! let mut device = DeviceConfig::new(SimPlatform::default(), uld);
//! device.initialize().unwrap();
//!
//! let session = RangingSession::new(device);
//! let stream = FrameStream::start(session, AcquisitionConfig::default(), &WorkerConfig::default()).unwrap();
//! for _ in 0..10 {
//!     let frame = stream.recv_timeout(Duration::from_secs(1)).unwrap();
//!     println!("{}", frame);
//! }
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod bus;
pub mod uld;
pub mod device;
pub mod session;
pub mod acquisition;
pub mod sim;

pub use acquisition::{
    AcquisitionConfig, AcquisitionLoop, AcquisitionReport, AcquisitionWorker, ExitReason,
    FnSink, FrameBudget, FrameSink, FrameStream, LogSink, StopFlag, WorkerConfig,
};
pub use bus::{BusBinding, NoResetPin, Platform};
pub use device::DeviceConfig;
pub use error::{BusFault, CommError, ConfigError, Error, InitError};
pub use session::RangingSession;
pub use types::*;
pub use uld::{RawResults, Uld, UldStatus};

/// Result type alias for ranging operations.
pub type Result<T> = std::result::Result<T, Error>;
