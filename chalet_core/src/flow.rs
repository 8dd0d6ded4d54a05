//! Pulse-count flow metering with decile correction.
//!
//! A hall-effect flow sensor emits `k_factor` pulses per liter at its
//! nominal response. Real sensors under-read at low flow and over-read near
//! capacity, so each tick the measured frequency is bucketed into one of ten
//! deciles of rated capacity and the k-factor is scaled by that decile's
//! correction factor.

use std::sync::Arc;

use crate::pulse::{PulseAccumulator, PulseSample};
use crate::util::ms_to_secs;

/// Number of decile buckets in a correction table.
pub const DECILES: usize = 10;

/// Persisted calibration of one flow channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowChannelProperties {
    /// Rated flow in L/min.
    pub capacity: f32,
    /// Pulses per liter.
    pub k_factor: f32,
    /// Per-decile multiplicative correction.
    pub correction: [f32; DECILES],
}

impl FlowChannelProperties {
    pub fn new(capacity: f32, k_factor: f32) -> Self {
        Self {
            capacity,
            k_factor,
            correction: [1.0; DECILES],
        }
    }

    pub fn with_correction(mut self, correction: [f32; DECILES]) -> Self {
        self.correction = correction;
        self
    }

    /// Decile of `frequency` relative to rated capacity, always in `0..=9`.
    ///
    /// A frequency exactly on a boundary floors into the lower bucket.
    /// Zero, NaN and negative ratios land in decile 0; overflow lands in 9.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn decile(&self, frequency: f32) -> usize {
        let ratio = (10.0 * frequency / (self.capacity * self.k_factor)).floor();
        // float -> int casts saturate and map NaN to 0
        (ratio as usize).min(DECILES - 1)
    }

    /// Combined pulses-per-liter correction for a decile.
    pub fn correction_for(&self, decile: usize) -> f32 {
        self.k_factor / self.correction[decile.min(DECILES - 1)]
    }
}

/// Result of one estimator tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowTick {
    pub pulses: u32,
    pub elapsed_ms: u64,
    /// Pulses per second.
    pub frequency: f32,
    pub decile: usize,
    pub correction: f32,
    /// L/min.
    pub flow_rate: f32,
    /// Liters over this tick.
    pub volume: f32,
}

/// Converts drained pulses into flow rate and accumulated volume.
#[derive(Debug)]
pub struct FlowRateEstimator {
    properties: FlowChannelProperties,
    pulses: Arc<PulseAccumulator>,
    current_frequency: f32,
    current_flow_rate: f32,
    current_volume: f32,
    current_duration_ms: u64,
    current_correction: f32,
    current_decile: usize,
    total_volume: f32,
    total_duration_ms: u64,
    total_correction: f32,
}

impl FlowRateEstimator {
    pub fn new(properties: FlowChannelProperties) -> Self {
        Self {
            properties,
            pulses: Arc::new(PulseAccumulator::new()),
            current_frequency: 0.0,
            current_flow_rate: 0.0,
            current_volume: 0.0,
            current_duration_ms: 0,
            current_correction: 0.0,
            current_decile: 0,
            total_volume: 0.0,
            total_duration_ms: 0,
            total_correction: 0.0,
        }
    }

    /// Handle for the edge interrupt handler of this channel.
    pub fn pulse_handle(&self) -> Arc<PulseAccumulator> {
        self.pulses.clone()
    }

    pub fn properties(&self) -> &FlowChannelProperties {
        &self.properties
    }

    /// Install new calibration; takes effect on the next tick.
    pub fn set_properties(&mut self, properties: FlowChannelProperties) {
        self.properties = properties;
    }

    /// Drain the accumulator and update rates for an `elapsed_ms` interval.
    ///
    /// A zero interval is skipped: nothing is drained and totals are untouched.
    pub fn tick(&mut self, elapsed_ms: u64) -> Option<FlowTick> {
        if elapsed_ms == 0 {
            return None;
        }
        let sample = self.pulses.drain(elapsed_ms);
        self.apply(sample)
    }

    /// Update rates from an already drained sample.
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(&mut self, sample: PulseSample) -> Option<FlowTick> {
        if sample.elapsed_ms == 0 {
            return None;
        }
        let seconds = ms_to_secs(sample.elapsed_ms);
        let frequency = sample.pulses as f32 / seconds;

        let decile = self.properties.decile(frequency);
        let correction = self.properties.correction_for(decile);
        let flow_rate = frequency / correction;
        let volume = flow_rate * seconds / 60.0;

        self.current_frequency = frequency;
        self.current_decile = decile;
        self.current_correction = correction;
        self.current_flow_rate = flow_rate;
        self.current_volume = volume;
        self.current_duration_ms = sample.elapsed_ms;
        self.total_volume += volume;
        self.total_duration_ms += sample.elapsed_ms;
        self.total_correction += correction * sample.elapsed_ms as f32;

        if frequency > 0.0 {
            tracing::debug!(
                pulses = sample.pulses,
                frequency,
                decile,
                correction,
                flow_rate,
                volume,
                total_volume = self.total_volume,
                "flow tick"
            );
        }

        Some(FlowTick {
            pulses: sample.pulses,
            elapsed_ms: sample.elapsed_ms,
            frequency,
            decile,
            correction,
            flow_rate,
            volume,
        })
    }

    /// Clear pending pulses and the current-tick values; lifetime totals stay.
    pub fn reset(&mut self) {
        self.pulses.clear();
        self.current_frequency = 0.0;
        self.current_duration_ms = 0;
        self.current_flow_rate = 0.0;
        self.current_volume = 0.0;
        self.current_correction = 0.0;
        self.current_decile = 0;
    }

    pub fn reset_totals(&mut self) {
        self.total_volume = 0.0;
        self.total_duration_ms = 0;
        self.total_correction = 0.0;
    }

    /// L/min.
    pub fn current_flow_rate(&self) -> f32 {
        self.current_flow_rate
    }

    /// Liters over the last tick.
    pub fn current_volume(&self) -> f32 {
        self.current_volume
    }

    pub fn current_frequency(&self) -> f32 {
        self.current_frequency
    }

    pub fn current_duration_ms(&self) -> u64 {
        self.current_duration_ms
    }

    pub fn current_decile(&self) -> usize {
        self.current_decile
    }

    pub fn current_correction(&self) -> f32 {
        self.current_correction
    }

    pub fn total_volume(&self) -> f32 {
        self.total_volume
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Lifetime average flow rate in L/min.
    pub fn total_flow_rate(&self) -> f32 {
        if self.total_duration_ms == 0 {
            return 0.0;
        }
        self.total_volume / ms_to_secs(self.total_duration_ms) * 60.0
    }

    /// Percent deviation of the last tick's correction from the bare k-factor.
    pub fn current_error(&self) -> f32 {
        if self.current_correction == 0.0 {
            return 0.0;
        }
        (self.properties.k_factor / self.current_correction - 1.0) * 100.0
    }

    /// Time-weighted average of `current_error` over the estimator's lifetime.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_error(&self) -> f32 {
        if self.total_correction == 0.0 {
            return 0.0;
        }
        (self.properties.k_factor / self.total_correction * self.total_duration_ms as f32 - 1.0)
            * 100.0
    }
}
