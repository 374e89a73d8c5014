use crate::bus::Platform;
use crate::device::DeviceConfig;
use crate::error::{CommError, Error, InitError};
use crate::protocol;
use crate::types::{Command, ResultFrame, SensorStatus, SessionState};
use crate::uld::{RawResults, Uld};
use crate::Result;

/// State machine over an exclusively owned [`DeviceConfig`].
///
/// ```text
/// Uninitialized -> Initialized -> Ranging <-> Stopped
/// ```
///
/// Every transition goes through a method on this type. A frame can only be
/// fetched after [`poll_ready`](Self::poll_ready) reported it; use
/// [`try_next`](Self::try_next) to do both in one call.
///
/// Dropping a session that is still ranging issues a best-effort stop,
/// unless an explicit [`stop`](Self::stop) was already rejected by the sensor.
pub struct RangingSession<B, U>
where
    B: Platform,
    U: Uld<B>,
{
    device: DeviceConfig<B, U>,
    state: SessionState,
    ready: bool,
    stop_rejected: bool,
    sequence: u32,
    raw: RawResults,
}

impl<B, U> RangingSession<B, U>
where
    B: Platform,
    U: Uld<B>,
{
    pub fn new(device: DeviceConfig<B, U>) -> Self {
        let state = if device.is_initialized() {
            SessionState::Initialized
        } else {
            SessionState::Uninitialized
        };
        let raw = RawResults::for_targets(device.targets_per_zone());

        RangingSession {
            device,
            state,
            ready: false,
            stop_rejected: false,
            sequence: 0,
            raw,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> &DeviceConfig<B, U> {
        &self.device
    }

    /// Number of frames fetched so far; also the sequence of the next frame.
    pub fn frames_fetched(&self) -> u32 {
        self.sequence
    }

    /// Pulse the reset line. Only meaningful before the firmware is loaded.
    pub fn reset(&mut self) -> Result<()> {
        self.require("reset", &[SessionState::Uninitialized])?;
        Ok(self.device.reset()?)
    }

    /// Load the sensor firmware. Moves `Uninitialized -> Initialized`.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(InitError::AlreadyInitialized.into());
        }
        self.device.initialize()?;
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Issue "begin ranging". Legal from `Initialized` or `Stopped`.
    pub fn start(&mut self) -> Result<()> {
        self.require(
            "start",
            &[SessionState::Initialized, SessionState::Stopped],
        )?;

        let status = self.device.with_uld(|uld, p| uld.start_ranging(p))?;
        check_command(Command::StartRanging, status)?;

        self.state = SessionState::Ranging;
        self.ready = false;
        log::info!("Ranging started");
        Ok(())
    }

    /// Non-blocking check for a new frame.
    ///
    /// A reported frame stays pending until fetched, so repeated calls keep
    /// returning `true` until [`fetch`](Self::fetch) consumes it.
    pub fn poll_ready(&mut self) -> Result<bool> {
        self.require("poll_ready", &[SessionState::Ranging])?;
        if self.ready {
            return Ok(true);
        }

        let (status, is_ready) = self.device.with_uld(|uld, p| uld.check_data_ready(p))?;
        check_transfer(status)?;

        self.ready = is_ready;
        Ok(is_ready)
    }

    /// Read and decode the frame announced by the last `poll_ready`.
    ///
    /// The pending frame is consumed even if the read fails.
    pub fn fetch(&mut self) -> Result<ResultFrame> {
        self.require("fetch", &[SessionState::Ranging])?;
        if !self.ready {
            return Err(Error::NotReady);
        }
        self.ready = false;

        let raw = &mut self.raw;
        let status = self.device.with_uld(|uld, p| uld.get_ranging_data(p, raw))?;
        check_transfer(status)?;

        let frame = protocol::decode_frame(&self.raw, self.device.targets_per_zone(), self.sequence)?;
        self.sequence = self.sequence.wrapping_add(1);
        log::debug!(
            "Fetched frame {} (stream count {})",
            frame.sequence,
            frame.stream_count
        );
        Ok(frame)
    }

    /// Poll once and fetch if a frame is ready.
    pub fn try_next(&mut self) -> Result<Option<ResultFrame>> {
        if self.poll_ready()? {
            self.fetch().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Issue "end ranging". Legal from `Ranging`; state is unchanged on failure.
    ///
    /// A rejected stop is not retried on drop; calling `stop` again is the
    /// caller's decision.
    pub fn stop(&mut self) -> Result<()> {
        self.require("stop", &[SessionState::Ranging])?;

        let status = self.device.with_uld(|uld, p| uld.stop_ranging(p))?;
        if let Err(e) = check_command(Command::StopRanging, status) {
            self.stop_rejected = true;
            return Err(e);
        }

        self.state = SessionState::Stopped;
        self.stop_rejected = false;
        self.ready = false;
        log::info!("Ranging stopped after {} frames", self.sequence);
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl<B, U> Drop for RangingSession<B, U>
where
    B: Platform,
    U: Uld<B>,
{
    fn drop(&mut self) {
        if self.state == SessionState::Ranging && !self.stop_rejected {
            if let Err(e) = self.stop() {
                log::warn!("Failed to stop ranging on release: {}", e);
            }
        }
    }
}

fn check_command(command: Command, status: u8) -> Result<()> {
    match SensorStatus::from(status) {
        SensorStatus::Ok => Ok(()),
        status => {
            log::error!("Sensor rejected {} (status={:?})", command, status);
            Err(Error::Hardware { command, status })
        }
    }
}

fn check_transfer(status: u8) -> Result<()> {
    match SensorStatus::from(status) {
        SensorStatus::Ok => Ok(()),
        status => Err(CommError::Status(status).into()),
    }
}
