//! Bring up a (simulated) VL53L5CX and log ten 4x4 frames from a worker thread.
//!
//! Usage: RUST_LOG=info cargo run --example ranging
//! Knobs: VL53L5CX_POLL_INTERVAL_MS, VL53L5CX_FRAME_BUDGET (0 streams forever),
//! VL53L5CX_MAX_COMM_ERRORS.

use std::time::Duration;
use vl53l5cx_ranging::sim::{self, SimPlatform, SimulatedUld, Tick};
use vl53l5cx_ranging::{
    AcquisitionConfig, AcquisitionWorker, DeviceConfig, LogSink, RangingSession, WorkerConfig,
};

fn main() {
    env_logger::init();

    println!(">>>>>> Initializing VL53L5CX <<<<<<");
    std::thread::sleep(Duration::from_millis(100));

    // A couple of idle polls and one bus glitch before frames flow.
    let uld = SimulatedUld::new()
        .script([Tick::Idle, Tick::Fault(255), Tick::Idle])
        .always_ready(sim::ramp_frame(1));
    let mut device = DeviceConfig::new(SimPlatform::default(), uld);

    match device.is_alive() {
        Ok(true) => println!("Sensor is alive"),
        Ok(false) => {
            eprintln!("VL53L5CX not detected at requested address");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to probe sensor: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = device.reset().and_then(|_| device.initialize()) {
        eprintln!("VL53L5CX ULD loading failed: {}", e);
        std::process::exit(1);
    }
    println!("VL53L5CX ULD ready! (Version: {})", device.revision());

    let session = RangingSession::new(device);
    let worker = match AcquisitionWorker::spawn(
        session,
        AcquisitionConfig::from_env(),
        &WorkerConfig::default(),
        LogSink,
    ) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Task has not been created: {}", e);
            std::process::exit(1);
        }
    };
    println!("Task has been created");

    match worker.join() {
        Ok(report) => println!(
            "End of ULD demo: {} frames, {} ticks, {} comm errors",
            report.frames, report.ticks, report.comm_errors
        ),
        Err(e) => {
            eprintln!("Ranging failed: {}", e);
            std::process::exit(1);
        }
    }
}
