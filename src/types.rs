use std::fmt;

use crate::protocol::ZONE_COUNT;

/// Return code of a vendor driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorStatus {
    Ok,
    Timeout,
    CorruptedFrame,
    CrcChecksumFailed,
    XtalkFailed,
    McuError,
    InvalidParam,
    /// Generic failure; the platform layer reports bus faults this way.
    BusError,
    Unknown(u8),
}

impl From<u8> for SensorStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => SensorStatus::Ok,
            1 => SensorStatus::Timeout,
            2 => SensorStatus::CorruptedFrame,
            3 => SensorStatus::CrcChecksumFailed,
            4 => SensorStatus::XtalkFailed,
            66 => SensorStatus::McuError,
            127 => SensorStatus::InvalidParam,
            255 => SensorStatus::BusError,
            c => SensorStatus::Unknown(c),
        }
    }
}

/// Hardware command issued by a ranging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartRanging,
    StopRanging,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StartRanging => f.write_str("start ranging"),
            Command::StopRanging => f.write_str("stop ranging"),
        }
    }
}

/// Lifecycle state of a [`RangingSession`](crate::RangingSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Ranging,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Ranging => "ranging",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Per-target measurement status reported by the sensor firmware.
///
/// Codes follow the VL53L5CX user manual. Codes the manual does not list are
/// kept as `Unknown(raw)` so newer firmware never fails decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// 0: ranging data not updated.
    NotUpdated,
    /// 1: signal rate too low on the SPAD array.
    SignalFailure,
    /// 2: target phase.
    TargetPhase,
    /// 3: sigma estimator too high.
    SigmaTooHigh,
    /// 4: target consistency failed.
    ConsistencyFailed,
    /// 5: range valid.
    ValidMeasurement,
    /// 6: wrap-around not performed, typically the first range.
    WrapAroundNotPerformed,
    /// 7: rate consistency failed.
    RateConsistencyFailed,
    /// 8: signal rate too low for the current target.
    LowSignalRate,
    /// 9: range valid with a large pulse, possibly merged targets.
    ValidLargePulse,
    /// 10: range valid but no target detected at the previous range.
    ValidNoPreviousTarget,
    /// 11: measurement consistency failed.
    MeasurementConsistencyFailed,
    /// 12: target blurred by another one due to the sharpener.
    BlurredTarget,
    /// 13: target detected but inconsistent data.
    InconsistentData,
    /// 255: no target detected, out of range.
    OutOfRange,
    Unknown(u8),
}

impl From<u8> for TargetStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => TargetStatus::NotUpdated,
            1 => TargetStatus::SignalFailure,
            2 => TargetStatus::TargetPhase,
            3 => TargetStatus::SigmaTooHigh,
            4 => TargetStatus::ConsistencyFailed,
            5 => TargetStatus::ValidMeasurement,
            6 => TargetStatus::WrapAroundNotPerformed,
            7 => TargetStatus::RateConsistencyFailed,
            8 => TargetStatus::LowSignalRate,
            9 => TargetStatus::ValidLargePulse,
            10 => TargetStatus::ValidNoPreviousTarget,
            11 => TargetStatus::MeasurementConsistencyFailed,
            12 => TargetStatus::BlurredTarget,
            13 => TargetStatus::InconsistentData,
            255 => TargetStatus::OutOfRange,
            c => TargetStatus::Unknown(c),
        }
    }
}

impl TargetStatus {
    /// The raw firmware code.
    pub fn code(self) -> u8 {
        match self {
            TargetStatus::NotUpdated => 0,
            TargetStatus::SignalFailure => 1,
            TargetStatus::TargetPhase => 2,
            TargetStatus::SigmaTooHigh => 3,
            TargetStatus::ConsistencyFailed => 4,
            TargetStatus::ValidMeasurement => 5,
            TargetStatus::WrapAroundNotPerformed => 6,
            TargetStatus::RateConsistencyFailed => 7,
            TargetStatus::LowSignalRate => 8,
            TargetStatus::ValidLargePulse => 9,
            TargetStatus::ValidNoPreviousTarget => 10,
            TargetStatus::MeasurementConsistencyFailed => 11,
            TargetStatus::BlurredTarget => 12,
            TargetStatus::InconsistentData => 13,
            TargetStatus::OutOfRange => 255,
            TargetStatus::Unknown(c) => c,
        }
    }

    /// Whether the distance can be trusted. ST considers 5 and 9 valid.
    pub fn is_valid(self) -> bool {
        matches!(
            self,
            TargetStatus::ValidMeasurement | TargetStatus::ValidLargePulse
        )
    }
}

/// One cell of the 4x4 measurement grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    /// Zone index, 0..16.
    pub index: u8,
    /// Index of the reported target within the zone.
    pub target: u8,
    pub target_status: TargetStatus,
    /// Distance in millimeters, untransformed. Only meaningful when
    /// `target_status.is_valid()`.
    pub distance_mm: i16,
}

/// Decoded snapshot of one ranging cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFrame {
    /// Monotonic per-session frame counter, starting at 0.
    pub sequence: u32,
    /// Stream counter maintained by the sensor firmware (wraps).
    pub stream_count: u8,
    pub zones: [Zone; ZONE_COUNT],
}

impl ResultFrame {
    pub fn zone(&self, index: usize) -> Option<&Zone> {
        self.zones.get(index)
    }

    /// Distances of all zones in index order.
    pub fn distances_mm(&self) -> [i16; ZONE_COUNT] {
        self.zones.map(|z| z.distance_mm)
    }
}

impl fmt::Display for ResultFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Print data no: {:3}", self.sequence)?;
        for zone in &self.zones {
            writeln!(
                f,
                "Zone: {:3}, Status: {:3}, Distance: {:4} mm",
                zone.index,
                zone.target_status.code(),
                zone.distance_mm
            )?;
        }
        Ok(())
    }
}

/// Bus parameters supplied by the host when the sensor is registered.
///
/// The bus itself is built by the host; these values are validated and
/// kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// SCL frequency in Hz.
    pub clock_hz: u32,
    pub internal_pullup: bool,
    /// Glitch filter length in bus clock cycles.
    pub glitch_filter: u8,
    pub sda_pin: u8,
    pub scl_pin: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            clock_hz: crate::protocol::MAX_CLOCK_HZ,
            internal_pullup: true,
            glitch_filter: 7,
            sda_pin: 1,
            scl_pin: 2,
        }
    }
}

impl BusConfig {
    pub fn clock_hz(mut self, clock_hz: u32) -> Self {
        self.clock_hz = clock_hz;
        self
    }

    pub fn internal_pullup(mut self, enabled: bool) -> Self {
        self.internal_pullup = enabled;
        self
    }

    pub fn glitch_filter(mut self, cycles: u8) -> Self {
        self.glitch_filter = cycles;
        self
    }
}
