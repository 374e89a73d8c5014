//! Scripted stand-in for the vendor driver.
//!
//! Used by the demo and the test suites to run a full session without a
//! sensor attached. Each call to `check_data_ready` consumes one [`Tick`].

use crate::bus::Platform;
use crate::error::BusFault;
use crate::protocol::{EXPECTED_DEVICE_ID, EXPECTED_REVISION_ID, REG_DEVICE_ID, ZONE_COUNT};
use crate::uld::{RawResults, Uld, UldStatus};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const SIM_REVISION: &str = "VL53L5CX_2.0.0 (simulated)";

/// Outcome of one readiness poll.
#[derive(Debug, Clone)]
pub enum Tick {
    /// No new frame.
    Idle,
    /// A frame is ready and will be returned by the next fetch.
    Ready(RawResults),
    /// The readiness query fails with this status.
    Fault(UldStatus),
    /// Readiness is reported, but the fetch fails with this status.
    FetchFault(UldStatus),
}

/// Call counters shared between a [`SimulatedUld`] and the test observing it.
#[derive(Debug, Default)]
pub struct SimCounters {
    init: AtomicU32,
    start: AtomicU32,
    stop: AtomicU32,
    poll: AtomicU32,
    fetch: AtomicU32,
}

impl SimCounters {
    pub fn init_calls(&self) -> u32 {
        self.init.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> u32 {
        self.start.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> u32 {
        self.poll.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SimulatedUld {
    script: VecDeque<Tick>,
    repeat: Option<RawResults>,
    pending: Option<Result<RawResults, UldStatus>>,
    stream_count: u8,
    targets_per_zone: usize,
    init_status: UldStatus,
    start_status: UldStatus,
    stop_status: UldStatus,
    counters: Arc<SimCounters>,
}

impl Default for SimulatedUld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedUld {
    pub fn new() -> Self {
        SimulatedUld {
            script: VecDeque::new(),
            repeat: None,
            pending: None,
            stream_count: 0,
            targets_per_zone: 1,
            init_status: 0,
            start_status: 0,
            stop_status: 0,
            counters: Arc::new(SimCounters::default()),
        }
    }

    /// Append ticks to the script.
    pub fn script(mut self, ticks: impl IntoIterator<Item = Tick>) -> Self {
        self.script.extend(ticks);
        self
    }

    /// Once the script is exhausted, report `frame` on every poll.
    pub fn always_ready(mut self, frame: RawResults) -> Self {
        self.repeat = Some(frame);
        self
    }

    pub fn with_targets_per_zone(mut self, targets_per_zone: usize) -> Self {
        self.targets_per_zone = targets_per_zone;
        self
    }

    pub fn fail_init(mut self, status: UldStatus) -> Self {
        self.init_status = status;
        self
    }

    pub fn fail_start(mut self, status: UldStatus) -> Self {
        self.start_status = status;
        self
    }

    pub fn fail_stop(mut self, status: UldStatus) -> Self {
        self.stop_status = status;
        self
    }

    pub fn counters(&self) -> Arc<SimCounters> {
        self.counters.clone()
    }

    fn next_tick(&mut self) -> Tick {
        match self.script.pop_front() {
            Some(tick) => tick,
            None => match &self.repeat {
                Some(frame) => Tick::Ready(frame.clone()),
                None => Tick::Idle,
            },
        }
    }
}

impl<P: Platform> Uld<P> for SimulatedUld {
    fn revision(&self) -> &'static str {
        SIM_REVISION
    }

    fn targets_per_zone(&self) -> usize {
        self.targets_per_zone
    }

    fn init(&mut self, platform: &mut P) -> UldStatus {
        self.counters.init.fetch_add(1, Ordering::SeqCst);
        platform.wait_ms(1);
        self.init_status
    }

    fn start_ranging(&mut self, _platform: &mut P) -> UldStatus {
        self.counters.start.fetch_add(1, Ordering::SeqCst);
        self.start_status
    }

    fn stop_ranging(&mut self, _platform: &mut P) -> UldStatus {
        self.counters.stop.fetch_add(1, Ordering::SeqCst);
        self.pending = None;
        self.stop_status
    }

    fn check_data_ready(&mut self, _platform: &mut P) -> (UldStatus, bool) {
        self.counters.poll.fetch_add(1, Ordering::SeqCst);
        match self.next_tick() {
            Tick::Idle => (0, false),
            Tick::Fault(status) => (status, false),
            Tick::Ready(frame) => {
                self.pending = Some(Ok(frame));
                (0, true)
            }
            Tick::FetchFault(status) => {
                self.pending = Some(Err(status));
                (0, true)
            }
        }
    }

    fn get_ranging_data(&mut self, _platform: &mut P, results: &mut RawResults) -> UldStatus {
        self.counters.fetch.fetch_add(1, Ordering::SeqCst);
        match self.pending.take() {
            Some(Ok(frame)) => {
                *results = frame;
                results.stream_count = self.stream_count;
                self.stream_count = self.stream_count.wrapping_add(1);
                0
            }
            Some(Err(status)) => status,
            // Nothing was announced; the real driver returns a stale frame.
            None => 2,
        }
    }
}

/// No-op platform. Reads of the id registers answer like a real sensor.
#[derive(Debug, Clone, Default)]
pub struct SimPlatform {
    pub waited_ms: u64,
    pub writes: usize,
}

impl Platform for SimPlatform {
    fn read(&mut self, index: u16, buf: &mut [u8]) -> Result<(), BusFault> {
        buf.fill(0);
        if index == REG_DEVICE_ID && buf.len() >= 2 {
            buf[0] = EXPECTED_DEVICE_ID;
            buf[1] = EXPECTED_REVISION_ID;
        }
        Ok(())
    }

    fn write(&mut self, _index: u16, _data: &[u8]) -> Result<(), BusFault> {
        self.writes += 1;
        Ok(())
    }

    fn wait_ms(&mut self, ms: u32) {
        self.waited_ms += u64::from(ms);
    }
}

/// Build raw results from per-zone distances, all with the same status.
///
/// Only target 0 of each zone is filled; other targets report "no target".
pub fn frame(distances_mm: &[i16; ZONE_COUNT], status: u8, targets_per_zone: usize) -> RawResults {
    let mut raw = RawResults::for_targets(targets_per_zone);
    raw.target_status.fill(255);
    for (zone, &distance) in distances_mm.iter().enumerate() {
        let offset = zone * targets_per_zone;
        raw.target_status[offset] = status;
        raw.distance_mm[offset] = distance;
    }
    raw
}

/// Valid frame with distances 100, 200, ... 1600 mm.
pub fn ramp_frame(targets_per_zone: usize) -> RawResults {
    let distances = std::array::from_fn(|i| ((i + 1) * 100) as i16);
    frame(&distances, 5, targets_per_zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_frame_layout() {
        let raw = ramp_frame(2);
        assert_eq!(raw.distance_mm.len(), 32);
        assert_eq!(raw.distance_mm[0], 100);
        assert_eq!(raw.distance_mm[2], 200);
        assert_eq!(raw.target_status[1], 255);
    }

    #[test]
    fn test_script_then_idle() {
        let mut uld = SimulatedUld::new().script([Tick::Ready(ramp_frame(1)), Tick::Fault(1)]);
        let mut p = SimPlatform::default();
        assert_eq!(Uld::check_data_ready(&mut uld, &mut p), (0, true));
        let mut raw = RawResults::default();
        assert_eq!(Uld::get_ranging_data(&mut uld, &mut p, &mut raw), 0);
        assert_eq!(raw.distance_mm[15], 1600);
        assert_eq!(Uld::check_data_ready(&mut uld, &mut p), (1, false));
        assert_eq!(Uld::check_data_ready(&mut uld, &mut p), (0, false));
        assert_eq!(uld.counters().poll_calls(), 3);
    }

    #[test]
    fn test_sim_platform_is_alive() {
        assert!(SimPlatform::default().is_alive().unwrap());
    }
}
