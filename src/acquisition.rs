use crate::bus::Platform;
use crate::session::RangingSession;
use crate::types::{ResultFrame, SessionState};
use crate::uld::Uld;
use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// When the acquisition loop stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBudget {
    /// Stop after this many frames.
    Bounded(u32),
    /// Run until cancelled through the [`StopFlag`].
    Streaming,
}

/// Pacing and termination knobs of the acquisition loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Sleep between two readiness polls, whether or not a frame was ready.
    pub poll_interval: Duration,
    pub budget: FrameBudget,
    /// Delay before ranging starts, giving the host time to finish start-up.
    pub startup_delay: Duration,
    /// Abort after this many consecutive comm errors. `None` skips them forever.
    pub max_consecutive_comm_errors: Option<u32>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            poll_interval: Duration::from_millis(5),
            budget: FrameBudget::Bounded(10),
            startup_delay: Duration::from_millis(100),
            max_consecutive_comm_errors: None,
        }
    }
}

impl AcquisitionConfig {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn budget(mut self, budget: FrameBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    pub fn max_consecutive_comm_errors(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_comm_errors = limit;
        self
    }

    /// Defaults overridden by `VL53L5CX_*` environment variables.
    ///
    /// - `VL53L5CX_POLL_INTERVAL_MS`
    /// - `VL53L5CX_FRAME_BUDGET` (0 = streaming)
    /// - `VL53L5CX_STARTUP_DELAY_MS`
    /// - `VL53L5CX_MAX_COMM_ERRORS` (0 = unlimited)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_budget = match defaults.budget {
            FrameBudget::Bounded(n) => n,
            FrameBudget::Streaming => 0,
        };

        let poll_ms = read_env_u64("VL53L5CX_POLL_INTERVAL_MS", millis(defaults.poll_interval));
        let budget = match read_env_u64("VL53L5CX_FRAME_BUDGET", u64::from(default_budget)) {
            0 => FrameBudget::Streaming,
            n => FrameBudget::Bounded(u32::try_from(n).unwrap_or(u32::MAX)),
        };
        let startup_ms = read_env_u64("VL53L5CX_STARTUP_DELAY_MS", millis(defaults.startup_delay));
        let max_errors = match read_env_u64(
            "VL53L5CX_MAX_COMM_ERRORS",
            u64::from(defaults.max_consecutive_comm_errors.unwrap_or(0)),
        ) {
            0 => None,
            n => Some(u32::try_from(n).unwrap_or(u32::MAX)),
        };

        let config = AcquisitionConfig {
            poll_interval: Duration::from_millis(poll_ms),
            budget,
            startup_delay: Duration::from_millis(startup_ms),
            max_consecutive_comm_errors: max_errors,
        };
        log::debug!("Acquisition config: {:?}", config);
        config
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => match v.trim().parse::<u64>() {
            Ok(n) => n,
            Err(_) => {
                log::warn!("Ignoring {}='{}' (expected an integer)", name, v);
                default
            }
        },
        Err(_) => default,
    }
}

/// Receiver of decoded frames.
pub trait FrameSink {
    /// Hand over one frame. Returning `false` means the frame was not taken
    /// and ends the acquisition.
    fn deliver(&mut self, frame: ResultFrame) -> bool;
}

impl FrameSink for Vec<ResultFrame> {
    fn deliver(&mut self, frame: ResultFrame) -> bool {
        self.push(frame);
        true
    }
}

/// Blocks while the channel is full; stops once every receiver is gone.
impl FrameSink for Sender<ResultFrame> {
    fn deliver(&mut self, frame: ResultFrame) -> bool {
        match self.send(frame) {
            Ok(()) => true,
            Err(_) => {
                log::info!("Frame channel disconnected, stopping acquisition");
                false
            }
        }
    }
}

impl<S: FrameSink + ?Sized> FrameSink for &mut S {
    fn deliver(&mut self, frame: ResultFrame) -> bool {
        (**self).deliver(frame)
    }
}

/// Adapts a closure into a [`FrameSink`].
pub struct FnSink<F>(pub F);

impl<F: FnMut(ResultFrame)> FrameSink for FnSink<F> {
    fn deliver(&mut self, frame: ResultFrame) -> bool {
        (self.0)(frame);
        true
    }
}

/// Writes every frame to the log, one line per zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn deliver(&mut self, frame: ResultFrame) -> bool {
        for line in frame.to_string().lines() {
            log::info!("{}", line);
        }
        true
    }
}

/// Cooperative cancellation token, checked once per poll tick.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    BudgetExhausted,
    Cancelled,
    SinkDisconnected,
}

/// Summary of a finished acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionReport {
    pub frames: u32,
    pub ticks: u64,
    pub comm_errors: u32,
    pub exit: ExitReason,
}

/// Fixed-cadence polling of one ranging session.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionLoop {
    config: AcquisitionConfig,
}

impl AcquisitionLoop {
    pub fn new(config: AcquisitionConfig) -> Self {
        AcquisitionLoop { config }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Run to completion.
    ///
    /// Starts ranging unless the session is already ranging, then polls until
    /// the budget is spent, `stop` is raised or the sink goes away. Ranging is
    /// stopped on every exit path once it was started. Comm errors skip the
    /// tick; any other error aborts the run.
    ///
    /// A cancel raised during the startup delay ends the run without
    /// starting ranging.
    pub fn run<B, U, S>(
        &self,
        session: &mut RangingSession<B, U>,
        sink: &mut S,
        stop: &StopFlag,
    ) -> Result<AcquisitionReport>
    where
        B: Platform,
        U: Uld<B>,
        S: FrameSink + ?Sized,
    {
        if session.state() != SessionState::Ranging {
            if !self.startup_wait(stop) {
                log::info!("Acquisition cancelled before ranging started");
                return Ok(AcquisitionReport {
                    frames: 0,
                    ticks: 0,
                    comm_errors: 0,
                    exit: ExitReason::Cancelled,
                });
            }
            session.start()?;
        }

        let outcome = self.poll_loop(session, sink, stop);
        let stopped = session.stop();

        match (outcome, stopped) {
            (Ok(report), Ok(())) => {
                log::info!(
                    "End of ranging: {} frames in {} ticks ({} comm errors, {:?})",
                    report.frames,
                    report.ticks,
                    report.comm_errors,
                    report.exit
                );
                Ok(report)
            }
            (Ok(_), Err(e)) => {
                log::error!("Failed to stop ranging: {}", e);
                Err(e)
            }
            (Err(e), stopped) => {
                if let Err(stop_err) = stopped {
                    log::warn!("Failed to stop ranging after error: {}", stop_err);
                }
                log::error!("Acquisition aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Sleep the startup delay in poll-interval slices. Returns `false` if
    /// cancelled.
    fn startup_wait(&self, stop: &StopFlag) -> bool {
        let slice = self.config.poll_interval.max(Duration::from_millis(1));
        let mut remaining = self.config.startup_delay;
        while !remaining.is_zero() {
            if stop.is_cancelled() {
                return false;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
        !stop.is_cancelled()
    }

    fn poll_loop<B, U, S>(
        &self,
        session: &mut RangingSession<B, U>,
        sink: &mut S,
        stop: &StopFlag,
    ) -> Result<AcquisitionReport>
    where
        B: Platform,
        U: Uld<B>,
        S: FrameSink + ?Sized,
    {
        let mut frames = 0u32;
        let mut ticks = 0u64;
        let mut comm_errors = 0u32;
        let mut consecutive_errors = 0u32;

        let exit = loop {
            if let FrameBudget::Bounded(limit) = self.config.budget {
                if frames >= limit {
                    break ExitReason::BudgetExhausted;
                }
            }
            if stop.is_cancelled() {
                break ExitReason::Cancelled;
            }

            ticks += 1;
            match session.try_next() {
                Ok(Some(frame)) => {
                    consecutive_errors = 0;
                    if !sink.deliver(frame) {
                        break ExitReason::SinkDisconnected;
                    }
                    frames = frames.saturating_add(1);
                }
                Ok(None) => consecutive_errors = 0,
                Err(e) if e.is_transient() => {
                    comm_errors = comm_errors.saturating_add(1);
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    log::warn!("Skipping tick {}: {}", ticks, e);
                    if let Some(limit) = self.config.max_consecutive_comm_errors {
                        if consecutive_errors >= limit {
                            log::error!("{} consecutive comm errors, giving up", consecutive_errors);
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }

            std::thread::sleep(self.config.poll_interval);
        };

        Ok(AcquisitionReport {
            frames,
            ticks,
            comm_errors,
            exit,
        })
    }
}

/// Thread parameters for the acquisition worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub name: String,
    pub stack_size: usize,
    /// Capacity of the queue used by [`FrameStream`].
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            name: "vl53l5cx-ranging".into(),
            stack_size: 16 * 1024,
            channel_capacity: 16,
        }
    }
}

/// A ranging session running on its own thread.
///
/// The session moves into the worker and is dropped there when the loop
/// ends. Dropping the handle cancels the loop and waits for it.
pub struct AcquisitionWorker {
    stop_flag: StopFlag,
    thread: Option<JoinHandle<Result<AcquisitionReport>>>,
}

impl AcquisitionWorker {
    /// Hand `session` over to a new worker thread feeding `sink`.
    ///
    /// A sink that blocks (a full bounded channel nobody drains) also blocks
    /// cancellation; [`FrameStream`] takes care of that ordering.
    pub fn spawn<B, U, S>(
        session: RangingSession<B, U>,
        config: AcquisitionConfig,
        worker: &WorkerConfig,
        sink: S,
    ) -> Result<AcquisitionWorker>
    where
        B: Platform + Send + 'static,
        U: Uld<B> + Send + 'static,
        S: FrameSink + Send + 'static,
    {
        let stop_flag = StopFlag::new();
        let stop = stop_flag.clone();

        let thread = std::thread::Builder::new()
            .name(worker.name.clone())
            .stack_size(worker.stack_size)
            .spawn(move || {
                let mut session = session;
                let mut sink = sink;
                log::info!("Acquisition worker started");
                AcquisitionLoop::new(config).run(&mut session, &mut sink, &stop)
            })
            .map_err(|e| Error::Spawn(e.to_string()))?;

        log::info!("Acquisition worker '{}' created", worker.name);
        Ok(AcquisitionWorker {
            stop_flag,
            thread: Some(thread),
        })
    }

    /// Ask the loop to stop; it notices within one poll interval.
    pub fn cancel(&self) {
        self.stop_flag.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the loop to end on its own and return its outcome.
    pub fn join(mut self) -> Result<AcquisitionReport> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| Error::WorkerPanicked)?,
            None => Err(Error::WorkerPanicked),
        }
    }

    fn shutdown(&mut self) {
        self.stop_flag.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Frames from a worker, delivered through a bounded queue.
pub struct FrameStream {
    // Dropped before `worker` so a worker blocked on a full queue can exit.
    receiver: Receiver<ResultFrame>,
    worker: AcquisitionWorker,
}

impl FrameStream {
    pub fn start<B, U>(
        session: RangingSession<B, U>,
        config: AcquisitionConfig,
        worker: &WorkerConfig,
    ) -> Result<FrameStream>
    where
        B: Platform + Send + 'static,
        U: Uld<B> + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(worker.channel_capacity);
        let worker = AcquisitionWorker::spawn(session, config, worker, sender)?;
        Ok(FrameStream { receiver, worker })
    }

    /// Receive the next frame, blocking until one arrives or the worker ends.
    pub fn recv(&self) -> Result<ResultFrame> {
        self.receiver.recv().map_err(|_| Error::StreamEnded)
    }

    pub fn try_recv(&self) -> Option<ResultFrame> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ResultFrame> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => Error::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => Error::StreamEnded,
        })
    }

    /// True until the worker has finished.
    pub fn is_active(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Cancel the worker and return its outcome. Undelivered frames are dropped.
    pub fn stop(self) -> Result<AcquisitionReport> {
        let FrameStream { receiver, worker } = self;
        worker.cancel();
        drop(receiver);
        worker.join()
    }

    /// Wait for a bounded run to finish, collecting every remaining frame.
    pub fn collect(self) -> Result<(Vec<ResultFrame>, AcquisitionReport)> {
        let FrameStream { receiver, worker } = self;
        let frames: Vec<ResultFrame> = receiver.iter().collect();
        let report = worker.join()?;
        Ok((frames, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceConfig;
    use crate::error::{CommError, InitError};
    use crate::sim::{self, SimPlatform, SimulatedUld, Tick};
    use crate::types::{Command, SensorStatus};

    fn fast() -> AcquisitionConfig {
        AcquisitionConfig::default()
            .poll_interval(Duration::ZERO)
            .startup_delay(Duration::ZERO)
    }

    fn session(uld: SimulatedUld) -> RangingSession<SimPlatform, SimulatedUld> {
        let mut device = DeviceConfig::new(SimPlatform::default(), uld);
        device.initialize().unwrap();
        RangingSession::new(device)
    }

    #[test]
    fn test_default_config() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.budget, FrameBudget::Bounded(10));
        assert_eq!(config.max_consecutive_comm_errors, None);
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("VL53L5CX_POLL_INTERVAL_MS", "20");
        std::env::set_var("VL53L5CX_FRAME_BUDGET", "0");
        std::env::set_var("VL53L5CX_MAX_COMM_ERRORS", "3");
        std::env::set_var("VL53L5CX_STARTUP_DELAY_MS", "soon");
        let config = AcquisitionConfig::from_env();
        std::env::remove_var("VL53L5CX_POLL_INTERVAL_MS");
        std::env::remove_var("VL53L5CX_FRAME_BUDGET");
        std::env::remove_var("VL53L5CX_MAX_COMM_ERRORS");
        std::env::remove_var("VL53L5CX_STARTUP_DELAY_MS");

        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.budget, FrameBudget::Streaming);
        assert_eq!(config.max_consecutive_comm_errors, Some(3));
        // Unparsable values fall back to the default.
        assert_eq!(config.startup_delay, AcquisitionConfig::default().startup_delay);
    }

    #[test]
    fn test_bounded_run_produces_budget_then_stops_once() {
        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let counters = uld.counters();
        let mut s = session(uld);
        let mut frames = Vec::new();

        let report = AcquisitionLoop::new(fast().budget(FrameBudget::Bounded(4)))
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap();

        assert_eq!(frames.len(), 4);
        assert_eq!(report.frames, 4);
        assert_eq!(report.exit, ExitReason::BudgetExhausted);
        assert_eq!(counters.start_calls(), 1);
        assert_eq!(counters.stop_calls(), 1);
        assert_eq!(s.state(), SessionState::Stopped);
        let sequences: Vec<u32> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_idle_ticks_do_not_count() {
        let uld = SimulatedUld::new()
            .script([Tick::Idle, Tick::Idle])
            .always_ready(sim::ramp_frame(1));
        let mut s = session(uld);
        let mut frames = Vec::new();

        let report = AcquisitionLoop::new(fast().budget(FrameBudget::Bounded(2)))
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap();

        assert_eq!(report.ticks, 4);
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn test_comm_error_skips_tick() {
        let uld = SimulatedUld::new()
            .script([
                Tick::Ready(sim::ramp_frame(1)),
                Tick::Fault(255),
                Tick::FetchFault(2),
            ])
            .always_ready(sim::ramp_frame(1));
        let mut s = session(uld);
        let mut frames = Vec::new();

        let report = AcquisitionLoop::new(fast().budget(FrameBudget::Bounded(3)))
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap();

        assert_eq!(report.comm_errors, 2);
        assert_eq!(report.ticks, 5);
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_comm_error_limit_aborts_and_stops() {
        let uld = SimulatedUld::new().script([Tick::Fault(1), Tick::Fault(1), Tick::Fault(1)]);
        let counters = uld.counters();
        let mut s = session(uld);
        let mut frames = Vec::new();

        let err = AcquisitionLoop::new(fast().max_consecutive_comm_errors(Some(2)))
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap_err();

        assert_eq!(err, Error::Comm(CommError::Status(SensorStatus::Timeout)));
        assert_eq!(counters.poll_calls(), 2);
        assert_eq!(counters.stop_calls(), 1);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_start_failure_aborts_before_polling() {
        let uld = SimulatedUld::new().fail_start(66);
        let counters = uld.counters();
        let mut s = session(uld);
        let mut frames = Vec::new();

        let err = AcquisitionLoop::new(fast())
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap_err();

        assert_eq!(
            err,
            Error::Hardware {
                command: Command::StartRanging,
                status: SensorStatus::McuError
            }
        );
        assert_eq!(counters.poll_calls(), 0);
        assert_eq!(counters.stop_calls(), 0);
    }

    #[test]
    fn test_stop_failure_is_surfaced() {
        let uld = SimulatedUld::new()
            .always_ready(sim::ramp_frame(1))
            .fail_stop(1);
        let mut s = session(uld);
        let mut frames = Vec::new();

        let err = AcquisitionLoop::new(fast().budget(FrameBudget::Bounded(1)))
            .run(&mut s, &mut frames, &StopFlag::new())
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Hardware {
                command: Command::StopRanging,
                ..
            }
        ));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_rejected_stop_is_sent_once_by_worker() {
        let uld = SimulatedUld::new()
            .always_ready(sim::ramp_frame(1))
            .fail_stop(1);
        let counters = uld.counters();

        let worker = AcquisitionWorker::spawn(
            session(uld),
            fast().budget(FrameBudget::Bounded(1)),
            &WorkerConfig::default(),
            Vec::<ResultFrame>::new(),
        )
        .unwrap();

        assert_eq!(
            worker.join(),
            Err(Error::Hardware {
                command: Command::StopRanging,
                status: SensorStatus::Timeout
            })
        );
        assert_eq!(counters.stop_calls(), 1);
    }

    #[test]
    fn test_cancelled_before_start_skips_ranging() {
        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let counters = uld.counters();
        let mut s = session(uld);
        let stop = StopFlag::new();
        stop.cancel();

        let started = std::time::Instant::now();
        let config = AcquisitionConfig::default().budget(FrameBudget::Streaming);
        let report = AcquisitionLoop::new(config)
            .run(&mut s, &mut Vec::new(), &stop)
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(report.exit, ExitReason::Cancelled);
        assert_eq!(report.ticks, 0);
        assert_eq!(counters.start_calls(), 0);
        assert_eq!(counters.stop_calls(), 0);
        assert_eq!(s.state(), SessionState::Initialized);
    }

    #[test]
    fn test_cancel_during_startup_delay() {
        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let counters = uld.counters();
        let mut s = session(uld);
        let stop = StopFlag::new();
        let canceller = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                stop.cancel();
            })
        };

        let config = AcquisitionConfig::default()
            .startup_delay(Duration::from_secs(5))
            .budget(FrameBudget::Streaming);
        let started = std::time::Instant::now();
        let report = AcquisitionLoop::new(config)
            .run(&mut s, &mut Vec::new(), &stop)
            .unwrap();
        canceller.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.exit, ExitReason::Cancelled);
        assert_eq!(counters.start_calls(), 0);
    }

    #[test]
    fn test_cancel_while_ranging_still_stops() {
        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let counters = uld.counters();
        let mut s = session(uld);
        s.start().unwrap();
        let stop = StopFlag::new();
        stop.cancel();

        let report = AcquisitionLoop::new(fast().budget(FrameBudget::Streaming))
            .run(&mut s, &mut Vec::new(), &stop)
            .unwrap();

        assert_eq!(report.exit, ExitReason::Cancelled);
        assert_eq!(report.ticks, 0);
        assert_eq!(counters.stop_calls(), 1);
        assert_eq!(s.state(), SessionState::Stopped);
    }

    #[test]
    fn test_sink_can_end_run() {
        struct TakeTwo(Vec<ResultFrame>);
        impl FrameSink for TakeTwo {
            fn deliver(&mut self, frame: ResultFrame) -> bool {
                if self.0.len() == 2 {
                    return false;
                }
                self.0.push(frame);
                true
            }
        }

        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let mut s = session(uld);
        let mut sink = TakeTwo(Vec::new());

        let report = AcquisitionLoop::new(fast().budget(FrameBudget::Streaming))
            .run(&mut s, &mut sink, &StopFlag::new())
            .unwrap();

        assert_eq!(report.exit, ExitReason::SinkDisconnected);
        assert_eq!(sink.0.len(), 2);
        // The refused third frame is not counted.
        assert_eq!(report.frames, 2);
        assert_eq!(report.ticks, 3);
    }

    #[test]
    fn test_uninitialized_session_is_rejected() {
        let mut s = RangingSession::new(DeviceConfig::new(SimPlatform::default(), SimulatedUld::new()));
        let err = AcquisitionLoop::new(fast())
            .run(&mut s, &mut LogSink, &StopFlag::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
        assert_ne!(err, Error::Init(InitError::AlreadyInitialized));
    }

    #[test]
    fn test_fn_sink() {
        let uld = SimulatedUld::new().always_ready(sim::ramp_frame(1));
        let mut s = session(uld);
        let mut total = 0i64;
        {
            let mut sink = FnSink(|f: ResultFrame| {
                total += f.distances_mm().iter().map(|&d| i64::from(d)).sum::<i64>()
            });
            AcquisitionLoop::new(fast().budget(FrameBudget::Bounded(2)))
                .run(&mut s, &mut sink, &StopFlag::new())
                .unwrap();
        }
        assert_eq!(total, 2 * 13_600);
    }
}
