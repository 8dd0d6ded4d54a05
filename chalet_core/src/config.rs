//! Runtime configuration types for the estimation engine.
//!
//! These are the structs the estimators are built from. They are separate
//! from the TOML-deserialized config in `chalet_config`; see `conversions`.

use chalet_traits::{Gain, Mux};

use crate::archive::ArchivePolicy;
use crate::shunt::ShuntChannelConfig;

/// Signal conditioning parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCfg {
    /// Moving average window for shunt current (samples).
    pub current_window: usize,
    /// Moving average window for time remaining (samples).
    pub time_left_window: usize,
    /// Denoiser responsiveness.
    pub snap_multiplier: f32,
    /// Denoiser output ceiling (exclusive).
    pub resolution: u32,
    /// Filtered counts below this read as zero current (~0.01 A at 2).
    pub deadband_counts: i32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            current_window: 10,
            time_left_window: 10,
            snap_multiplier: 0.01,
            resolution: 32_768,
            deadband_counts: 2,
        }
    }
}

/// Resistor divider feeding pack voltage to a single-ended ADC input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageDivider {
    pub r1_ohms: f32,
    pub r2_ohms: f32,
    /// Multiplicative trim from a reference meter.
    pub calibrate: f32,
    pub gain: Gain,
    pub mux: Mux,
}

impl VoltageDivider {
    /// Pack volts for a measured divider output in millivolts.
    pub fn volts(&self, mv_out: f32) -> f32 {
        mv_out * (self.r1_ohms + self.r2_ohms) / self.r2_ohms / 1000.0 * self.calibrate
    }
}

impl Default for VoltageDivider {
    fn default() -> Self {
        Self {
            r1_ohms: 3298.0,
            r2_ohms: 816.0,
            calibrate: 1.0,
            gain: Gain::Fsr4p096,
            mux: Mux::P2Gnd,
        }
    }
}

/// Everything a `CapacityEstimator` needs besides its ADCs and clock.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryCfg {
    /// Load-side shunt.
    pub chalet: ShuntChannelConfig,
    /// Charger-side shunt.
    pub ctek: ShuntChannelConfig,
    pub divider: VoltageDivider,
    pub filters: FilterCfg,
    pub archive: ArchivePolicy,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        Self {
            // shunt drops 75 mV at 50 A
            chalet: ShuntChannelConfig::from_rating(Gain::Fsr0p256, Mux::P0N1, 50.0, 75.0),
            // shunt drops 75 mV at 100 A
            ctek: ShuntChannelConfig::from_rating(Gain::Fsr0p256, Mux::P2N3, 100.0, 75.0),
            divider: VoltageDivider::default(),
            filters: FilterCfg::default(),
            archive: ArchivePolicy::BATTERY,
        }
    }
}
