//! ADS1115 16-bit delta-sigma ADC over I2C.

use std::time::Duration;

use rppal::i2c::I2c;
use tracing::trace;

use chalet_traits::{Adc, BoxError, Gain, Mux};

use crate::error::{HwError, Result};
use crate::util::wait_until_ready;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Start a single conversion (write) / conversion idle (read).
const OS_SINGLE: u16 = 1 << 15;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
/// 128 samples per second.
const DR_128SPS: u16 = 0b100 << 5;
/// Comparator disabled, ALERT/RDY high impedance.
const COMP_DISABLE: u16 = 0b11;

/// 128 SPS converts in ~8 ms.
const CONVERSION_TIMEOUT: Duration = Duration::from_millis(20);
const POLL_INTERVAL: Duration = Duration::from_micros(500);

pub struct Ads1115 {
    i2c: I2c,
    address: u16,
    gain: Gain,
    mux: Mux,
}

impl Ads1115 {
    pub fn new(bus: u8, address: u16) -> Result<Self> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(Self {
            i2c,
            address,
            gain: Gain::default(),
            mux: Mux::default(),
        })
    }

    fn write_register(&mut self, reg: u8, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c
            .write(&[reg, hi, lo])
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(())
    }

    fn read_register(&self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(&[reg], &mut buf)
            .map_err(|e| HwError::I2c(e.to_string()))?;
        Ok(u16::from_be_bytes(buf))
    }

    fn config_word(&self) -> u16 {
        OS_SINGLE
            | (self.mux.code() << 12)
            | (self.gain.code() << 9)
            | MODE_SINGLE_SHOT
            | DR_128SPS
            | COMP_DISABLE
    }

    pub fn read_single(&mut self) -> Result<i16> {
        self.write_register(REG_CONFIG, self.config_word())?;
        wait_until_ready(
            || Ok(self.read_register(REG_CONFIG)? & OS_SINGLE != 0),
            CONVERSION_TIMEOUT,
            POLL_INTERVAL,
        )?;
        let raw = i16::from_be_bytes(self.read_register(REG_CONVERSION)?.to_be_bytes());
        trace!(address = self.address, mux = ?self.mux, raw, "ads1115 conversion");
        Ok(raw)
    }
}

impl Adc for Ads1115 {
    fn configure(&mut self, gain: Gain, mux: Mux) -> std::result::Result<(), BoxError> {
        self.gain = gain;
        self.mux = mux;
        Ok(())
    }

    fn convert(&mut self) -> std::result::Result<i16, BoxError> {
        Ok(self.read_single()?)
    }

    fn mv_per_count(&self) -> f32 {
        self.gain.mv_per_count()
    }

    fn test_connection(&mut self) -> bool {
        match self.read_register(REG_CONFIG) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(address = self.address, error = %e, "ads1115 not responding");
                false
            }
        }
    }
}
