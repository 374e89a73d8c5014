use crate::error::{BusFault, ConfigError};
use crate::protocol::{
    self, EXPECTED_DEVICE_ID, EXPECTED_REVISION_ID, REG_DEVICE_ID, REG_PAGE_SELECT,
};
use crate::types::BusConfig;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{Error as _, ErrorType, OutputPin};
use embedded_hal::i2c::{Error as _, I2c, SevenBitAddress};

/// Register-level access the vendor driver needs from the host.
///
/// Registers are addressed with a 16-bit index sent big-endian ahead of the
/// payload.
pub trait Platform {
    fn read(&mut self, index: u16, buf: &mut [u8]) -> Result<(), BusFault>;

    fn write(&mut self, index: u16, data: &[u8]) -> Result<(), BusFault>;

    fn wait_ms(&mut self, ms: u32);

    /// Drive the reset line through its timing sequence.
    ///
    /// Returns `Ok(false)` when no reset line is wired.
    fn reset(&mut self) -> Result<bool, BusFault> {
        Ok(false)
    }

    /// Read the device and revision ids from register page 0.
    fn is_alive(&mut self) -> Result<bool, BusFault> {
        let mut ids = [0u8; 2];
        self.write(REG_PAGE_SELECT, &[0x00])?;
        let read = self.read(REG_DEVICE_ID, &mut ids);
        // Page 2 must be restored even if the id read failed.
        self.write(REG_PAGE_SELECT, &[0x02])?;
        read?;
        log::debug!("device id 0x{:02x}, revision 0x{:02x}", ids[0], ids[1]);
        Ok(ids == [EXPECTED_DEVICE_ID, EXPECTED_REVISION_ID])
    }
}

/// Placeholder for a sensor without a wired reset line.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResetPin;

impl ErrorType for NoResetPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoResetPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Addressable connection to one physical sensor.
///
/// Owns the bus handle, the delay provider and the optional reset line for
/// the sensor's lifetime.
pub struct BusBinding<I, R, D> {
    i2c: I,
    delay: D,
    address: SevenBitAddress,
    reset: Option<R>,
    config: BusConfig,
    scratch: Vec<u8>,
}

impl<I, R, D> BusBinding<I, R, D>
where
    I: I2c<SevenBitAddress>,
    R: OutputPin,
    D: DelayNs,
{
    /// Register the sensor at `address` (7-bit).
    pub fn new(
        i2c: I,
        delay: D,
        address: SevenBitAddress,
        reset: Option<R>,
        config: BusConfig,
    ) -> Result<Self, ConfigError> {
        if !protocol::is_valid_address(address) {
            return Err(ConfigError::InvalidAddress(address));
        }
        if config.clock_hz > protocol::MAX_CLOCK_HZ {
            return Err(ConfigError::ClockTooFast(config.clock_hz));
        }

        log::info!(
            "I2C device registered at 0x{:02x} ({} Hz, pull-up={}, glitch filter={}, reset line={})",
            address,
            config.clock_hz,
            config.internal_pullup,
            config.glitch_filter,
            reset.is_some()
        );

        Ok(BusBinding {
            i2c,
            delay,
            address,
            reset,
            config,
            scratch: Vec::new(),
        })
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn has_reset_line(&self) -> bool {
        self.reset.is_some()
    }

    /// Give the bus, delay and reset line back to the host.
    pub fn release(self) -> (I, D, Option<R>) {
        (self.i2c, self.delay, self.reset)
    }
}

impl<I, R, D> Platform for BusBinding<I, R, D>
where
    I: I2c<SevenBitAddress>,
    R: OutputPin,
    D: DelayNs,
{
    fn read(&mut self, index: u16, buf: &mut [u8]) -> Result<(), BusFault> {
        self.i2c
            .write_read(self.address, &index.to_be_bytes(), buf)
            .map_err(|e| BusFault::I2c(e.kind()))
    }

    fn write(&mut self, index: u16, data: &[u8]) -> Result<(), BusFault> {
        protocol::build_write(index, data, &mut self.scratch);
        self.i2c
            .write(self.address, &self.scratch)
            .map_err(|e| BusFault::I2c(e.kind()))
    }

    fn wait_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn reset(&mut self) -> Result<bool, BusFault> {
        let Some(pin) = self.reset.as_mut() else {
            return Ok(false);
        };

        pin.set_low().map_err(|e| BusFault::Pin(e.kind()))?;
        self.delay.delay_ms(protocol::RESET_HOLD_MS);
        pin.set_high().map_err(|e| BusFault::Pin(e.kind()))?;
        self.delay.delay_ms(protocol::RESET_SETTLE_MS);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const ADDR: u8 = 0x29;

    fn binding(i2c: &I2cMock) -> BusBinding<I2cMock, NoResetPin, NoopDelay> {
        BusBinding::new(i2c.clone(), NoopDelay, ADDR, None, BusConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_reserved_address() {
        let mut i2c = I2cMock::new(&[]);
        let err = BusBinding::<_, NoResetPin, _>::new(
            i2c.clone(),
            NoopDelay,
            0x7C,
            None,
            BusConfig::default(),
        )
        .err();
        assert_eq!(err, Some(ConfigError::InvalidAddress(0x7C)));
        i2c.done();
    }

    #[test]
    fn test_rejects_fast_clock() {
        let mut i2c = I2cMock::new(&[]);
        let err = BusBinding::<_, NoResetPin, _>::new(
            i2c.clone(),
            NoopDelay,
            ADDR,
            None,
            BusConfig::default().clock_hz(3_400_000),
        )
        .err();
        assert_eq!(err, Some(ConfigError::ClockTooFast(3_400_000)));
        i2c.done();
    }

    #[test]
    fn test_register_write_prefixes_index() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write(ADDR, vec![0x2C, 0x04, 0x01, 0x02])]);
        let mut bus = binding(&i2c);
        bus.write(0x2C04, &[0x01, 0x02]).unwrap();
        i2c.done();
    }

    #[test]
    fn test_register_read() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            ADDR,
            vec![0x00, 0x06],
            vec![0xAB, 0xCD],
        )]);
        let mut bus = binding(&i2c);
        let mut buf = [0u8; 2];
        bus.read(0x0006, &mut buf).unwrap();
        assert_eq!(buf, [0xAB, 0xCD]);
        i2c.done();
    }

    #[test]
    fn test_is_alive() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x7F, 0xFF, 0x00]),
            I2cTransaction::write_read(ADDR, vec![0x00, 0x00], vec![0xF0, 0x02]),
            I2cTransaction::write(ADDR, vec![0x7F, 0xFF, 0x02]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = binding(&i2c);
        assert!(bus.is_alive().unwrap());
        i2c.done();
    }

    #[test]
    fn test_is_alive_wrong_device() {
        let expectations = [
            I2cTransaction::write(ADDR, vec![0x7F, 0xFF, 0x00]),
            I2cTransaction::write_read(ADDR, vec![0x00, 0x00], vec![0xEA, 0xCC]),
            I2cTransaction::write(ADDR, vec![0x7F, 0xFF, 0x02]),
        ];
        let mut i2c = I2cMock::new(&expectations);
        let mut bus = binding(&i2c);
        assert!(!bus.is_alive().unwrap());
        i2c.done();
    }

    #[test]
    fn test_reset_drives_line_low_then_high() {
        let mut i2c = I2cMock::new(&[]);
        let mut pin = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let mut bus = BusBinding::new(
            i2c.clone(),
            NoopDelay,
            ADDR,
            Some(pin.clone()),
            BusConfig::default(),
        )
        .unwrap();
        assert!(bus.reset().unwrap());
        pin.done();
        i2c.done();
    }

    #[test]
    fn test_reset_without_line() {
        let mut i2c = I2cMock::new(&[]);
        let mut bus = binding(&i2c);
        assert!(!bus.has_reset_line());
        assert!(!bus.reset().unwrap());
        i2c.done();
    }
}
