use crate::bus::{BusBinding, Platform};
use crate::error::{ConfigError, Error, InitError};
use crate::types::{BusConfig, SensorStatus};
use crate::uld::Uld;
use crate::Result;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{I2c, SevenBitAddress};

/// A registered sensor together with the vendor driver state.
///
/// The driver's working buffer is only valid once [`initialize`](Self::initialize)
/// has succeeded.
pub struct DeviceConfig<B, U> {
    platform: B,
    uld: U,
    initialized: bool,
}

impl<I, R, D, U> DeviceConfig<BusBinding<I, R, D>, U>
where
    I: I2c<SevenBitAddress>,
    R: OutputPin,
    D: DelayNs,
    U: Uld<BusBinding<I, R, D>>,
{
    /// Register the sensor on `i2c` at the 7-bit `address`.
    pub fn create(
        i2c: I,
        delay: D,
        address: SevenBitAddress,
        reset: Option<R>,
        config: BusConfig,
        uld: U,
    ) -> std::result::Result<Self, ConfigError> {
        let binding = BusBinding::new(i2c, delay, address, reset, config)?;
        Ok(Self::new(binding, uld))
    }

    /// Like [`create`](Self::create), then confirm the sensor answers with
    /// the expected device and revision ids.
    pub fn create_checked(
        i2c: I,
        delay: D,
        address: SevenBitAddress,
        reset: Option<R>,
        config: BusConfig,
        uld: U,
    ) -> std::result::Result<Self, ConfigError> {
        let mut device = Self::create(i2c, delay, address, reset, config, uld)?;
        if !device.is_alive()? {
            log::error!("VL53L5CX not detected at 0x{:02x}", address);
            return Err(ConfigError::NotDetected);
        }
        log::info!("Sensor is alive");
        Ok(device)
    }
}

impl<B, U> DeviceConfig<B, U>
where
    B: Platform,
    U: Uld<B>,
{
    pub fn new(platform: B, uld: U) -> Self {
        DeviceConfig {
            platform,
            uld,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn platform(&self) -> &B {
        &self.platform
    }

    pub fn revision(&self) -> &'static str {
        self.uld.revision()
    }

    pub fn targets_per_zone(&self) -> usize {
        self.uld.targets_per_zone()
    }

    /// Probe the device and revision ids.
    pub fn is_alive(&mut self) -> std::result::Result<bool, ConfigError> {
        self.platform.is_alive().map_err(ConfigError::Bus)
    }

    /// Pulse the reset line, if one is wired.
    pub fn reset(&mut self) -> std::result::Result<(), InitError> {
        match self.platform.reset() {
            Ok(true) => {
                log::info!("Sensor reset complete");
                Ok(())
            }
            Ok(false) => {
                log::debug!("No reset line configured, skipping reset");
                Ok(())
            }
            Err(e) => {
                log::error!("Sensor reset failed: {}", e);
                Err(InitError::Reset(e))
            }
        }
    }

    /// Load firmware and calibration into the sensor. Must succeed exactly once.
    pub fn initialize(&mut self) -> std::result::Result<(), InitError> {
        if self.initialized {
            return Err(InitError::AlreadyInitialized);
        }

        log::info!("Initializing sensor");
        let status = SensorStatus::from(self.uld.init(&mut self.platform));
        if status != SensorStatus::Ok {
            log::error!("VL53L5CX ULD loading failed (status={:?})", status);
            return Err(InitError::Load(status));
        }

        self.initialized = true;
        log::info!("VL53L5CX ULD ready! (Version: {})", self.uld.revision());
        Ok(())
    }

    /// Split into the platform and driver parts.
    pub fn into_parts(self) -> (B, U) {
        (self.platform, self.uld)
    }

    /// Run a driver call that requires an initialized sensor.
    pub(crate) fn with_uld<T>(&mut self, f: impl FnOnce(&mut U, &mut B) -> T) -> Result<T> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        Ok(f(&mut self.uld, &mut self.platform))
    }
}
