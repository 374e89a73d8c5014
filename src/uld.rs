//! Seam to the vendor Ultra Lite Driver.
//!
//! The ULD owns the sensor firmware image, calibration tables and its
//! internal working buffer. None of that is visible here: the crate only
//! calls the five entry points below and interprets their status codes.
//! Every call returns the raw vendor status (`0` = OK), matching the C API.

use crate::bus::Platform;
use crate::protocol::{DEFAULT_TARGETS_PER_ZONE, ZONE_COUNT};

/// Raw vendor status code.
pub type UldStatus = u8;

/// Flat per-target result arrays filled by [`Uld::get_ranging_data`].
///
/// Entry `zone * targets_per_zone + target` holds one target of one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResults {
    pub stream_count: u8,
    pub target_status: Vec<u8>,
    pub distance_mm: Vec<i16>,
}

impl RawResults {
    pub fn with_len(len: usize) -> Self {
        RawResults {
            stream_count: 0,
            target_status: vec![0; len],
            distance_mm: vec![0; len],
        }
    }

    /// Buffer sized for a 4x4 frame with `targets_per_zone` targets.
    pub fn for_targets(targets_per_zone: usize) -> Self {
        Self::with_len(ZONE_COUNT * targets_per_zone)
    }
}

/// The vendor driver entry points used by a ranging session.
///
/// `P` is the platform the driver talks through; implementations own their
/// working buffer and release it on drop.
pub trait Uld<P: Platform> {
    /// Version string of the driver, e.g. `"VL53L5CX_2.0.0"`.
    fn revision(&self) -> &'static str;

    /// Targets per zone the driver was built with.
    fn targets_per_zone(&self) -> usize {
        DEFAULT_TARGETS_PER_ZONE
    }

    /// Upload firmware and calibration to the sensor.
    fn init(&mut self, platform: &mut P) -> UldStatus;

    fn start_ranging(&mut self, platform: &mut P) -> UldStatus;

    fn stop_ranging(&mut self, platform: &mut P) -> UldStatus;

    /// Returns `(status, is_ready)`.
    fn check_data_ready(&mut self, platform: &mut P) -> (UldStatus, bool);

    /// Read the latest frame into `results`.
    fn get_ranging_data(&mut self, platform: &mut P, results: &mut RawResults) -> UldStatus;
}
