//! Current sensing through a shunt on a differential ADC channel.

use std::sync::Arc;
use std::time::Instant;

use chalet_traits::{Adc, Clock, Gain, Mux};

use crate::config::FilterCfg;
use crate::filters::{AdaptiveDenoiser, BoundedMovingAverage};
use crate::hw_error::map_adc_error;
use crate::util::per_hour;

/// Wiring of one physical shunt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShuntChannelConfig {
    pub gain: Gain,
    pub mux: Mux,
    /// Amps per millivolt of drop, e.g. 50 A / 75 mV.
    pub amp_per_millivolt: f32,
}

impl ShuntChannelConfig {
    pub fn from_rating(gain: Gain, mux: Mux, rated_amps: f32, rated_millivolts: f32) -> Self {
        Self {
            gain,
            mux,
            amp_per_millivolt: rated_amps / rated_millivolts,
        }
    }
}

/// Persisted running values of one shunt channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShuntSnapshot {
    pub amp_hours: f32,
    pub adjusted_amp_hours: f32,
    pub average_current: f32,
    pub nett_amp_hours: f32,
}

/// Coulomb counter for one shunt.
///
/// Positive current is charge into the bank. `amp_hours` and
/// `adjusted_amp_hours` integrate charge only and never decrease except on
/// `reset`. `nett_amp_hours` integrates both directions, each weighted by
/// its direction's factor (coulomb efficiency charging, Peukert factor
/// discharging), and is what capacity estimation uses.
pub struct ShuntCurrentSensor {
    config: ShuntChannelConfig,
    pub(crate) current: f32,
    pub(crate) mv_drop: f32,
    pub(crate) amp_hours: f32,
    pub(crate) adjusted_amp_hours: f32,
    pub(crate) nett_amp_hours: f32,
    denoiser: AdaptiveDenoiser,
    average_current: BoundedMovingAverage,
    deadband_counts: i32,
    clock: Arc<dyn Clock + Send + Sync>,
    last_sample: Instant,
}

impl std::fmt::Debug for ShuntCurrentSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShuntCurrentSensor")
            .field("config", &self.config)
            .field("current", &self.current)
            .field("mv_drop", &self.mv_drop)
            .field("amp_hours", &self.amp_hours)
            .field("adjusted_amp_hours", &self.adjusted_amp_hours)
            .field("nett_amp_hours", &self.nett_amp_hours)
            .field("average_current", &self.average_current.average())
            .finish()
    }
}

impl ShuntCurrentSensor {
    pub fn new(
        config: ShuntChannelConfig,
        filters: &FilterCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        let last_sample = clock.now();
        Self {
            config,
            current: 0.0,
            mv_drop: 0.0,
            amp_hours: 0.0,
            adjusted_amp_hours: 0.0,
            nett_amp_hours: 0.0,
            denoiser: AdaptiveDenoiser::new(filters.snap_multiplier, filters.resolution),
            average_current: BoundedMovingAverage::new(filters.current_window),
            deadband_counts: filters.deadband_counts,
            clock,
            last_sample,
        }
    }

    /// Take one reading and integrate it over the time since the last one.
    ///
    /// Returns `true` when a reading was taken. A failed conversion is logged
    /// and reported as "no change"; the interval then carries into the next
    /// successful reading.
    pub fn sense(&mut self, adc: &mut dyn Adc, peukert_factor: f32, coulomb_efficiency: f32) -> bool {
        let count = match adc
            .configure(self.config.gain, self.config.mux)
            .and_then(|()| adc.convert())
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(mux = ?self.config.mux, error = %map_adc_error(&*e), "shunt conversion failed");
                return false;
            }
        };

        let per_hour = per_hour(self.clock.ms_since(self.last_sample));
        let sign: f32 = if count >= 0 { 1.0 } else { -1.0 };
        let magnitude = self.denoiser.update(i32::from(count.unsigned_abs()));
        self.mv_drop = if magnitude < self.deadband_counts {
            0.0
        } else {
            // at most one conversion's magnitude, exact in f32
            let counts = u16::try_from(magnitude).map_or(f32::from(u16::MAX), f32::from);
            counts * adc.mv_per_count() * sign
        };
        let factor = if sign > 0.0 {
            coulomb_efficiency
        } else {
            peukert_factor
        };

        self.current = self.mv_drop * self.config.amp_per_millivolt;
        self.average_current.add(self.current);
        if self.current > 0.0 {
            self.amp_hours += self.current / per_hour;
            self.adjusted_amp_hours += self.current * factor / per_hour;
        }
        self.nett_amp_hours += self.current * factor / per_hour;
        self.last_sample = self.clock.now();

        tracing::trace!(
            mux = ?self.config.mux,
            count,
            magnitude,
            mv_drop = self.mv_drop,
            current = self.current,
            amp_hours = self.amp_hours,
            nett_amp_hours = self.nett_amp_hours,
            "shunt sample"
        );
        true
    }

    /// Zero the amp-hour integrals (full-charge recalibration).
    pub fn reset(&mut self) {
        self.amp_hours = 0.0;
        self.adjusted_amp_hours = 0.0;
        self.nett_amp_hours = 0.0;
    }

    pub fn snapshot(&self) -> ShuntSnapshot {
        ShuntSnapshot {
            amp_hours: self.amp_hours,
            adjusted_amp_hours: self.adjusted_amp_hours,
            average_current: self.average_current(),
            nett_amp_hours: self.nett_amp_hours,
        }
    }

    pub fn restore(&mut self, snap: &ShuntSnapshot) {
        self.amp_hours = snap.amp_hours;
        self.adjusted_amp_hours = snap.adjusted_amp_hours;
        self.nett_amp_hours = snap.nett_amp_hours;
        self.average_current.set_average(snap.average_current);
    }

    pub fn config(&self) -> &ShuntChannelConfig {
        &self.config
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn mv_drop(&self) -> f32 {
        self.mv_drop
    }

    pub fn amp_hours(&self) -> f32 {
        self.amp_hours
    }

    pub fn adjusted_amp_hours(&self) -> f32 {
        self.adjusted_amp_hours
    }

    pub fn nett_amp_hours(&self) -> f32 {
        self.nett_amp_hours
    }

    pub fn average_current(&self) -> f32 {
        self.average_current.average()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedAdc;
    use chalet_traits::clock::test_clock::TestClock;

    const CHALET: ShuntChannelConfig = ShuntChannelConfig {
        gain: Gain::Fsr0p256,
        mux: Mux::P0N1,
        amp_per_millivolt: 2.0,
    };

    fn sensor(clock: &TestClock) -> ShuntCurrentSensor {
        ShuntCurrentSensor::new(CHALET, &FilterCfg::default(), Arc::new(clock.clone()))
    }

    // 128 counts at 0.0078125 mV/count = 1 mV = 2 A on this shunt
    #[test]
    fn charging_integrates_with_coulomb_efficiency() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        let mut adc = ScriptedAdc::new([128]);
        clock.advance_ms(3_600_000);
        assert!(s.sense(&mut adc, 1.2, 0.9));
        assert!((s.current() - 2.0).abs() < 1e-6);
        assert!((s.amp_hours() - 2.0).abs() < 1e-4);
        assert!((s.adjusted_amp_hours() - 1.8).abs() < 1e-4);
        assert!((s.nett_amp_hours() - 1.8).abs() < 1e-4);
        assert_eq!(adc.last_config(), Some((Gain::Fsr0p256, Mux::P0N1)));
    }

    #[test]
    fn discharge_never_decrements_charge_counters() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        let mut adc = ScriptedAdc::new([-128]);
        clock.advance_ms(1_800_000);
        assert!(s.sense(&mut adc, 1.2, 0.9));
        assert!((s.current() + 2.0).abs() < 1e-6);
        assert_eq!(s.amp_hours(), 0.0);
        assert_eq!(s.adjusted_amp_hours(), 0.0);
        // -2 A for half an hour, weighted by the Peukert factor
        assert!((s.nett_amp_hours() + 1.2).abs() < 1e-4);
    }

    #[test]
    fn deadband_forces_zero_drop() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        let mut adc = ScriptedAdc::new([1, -1]);
        clock.advance_ms(1000);
        assert!(s.sense(&mut adc, 1.0, 1.0));
        assert_eq!(s.mv_drop(), 0.0);
        assert_eq!(s.current(), 0.0);
        assert!(s.sense(&mut adc, 1.0, 1.0));
        assert_eq!(s.current(), 0.0);
    }

    #[test]
    fn failed_conversion_is_no_change_and_keeps_interval() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        let mut adc = ScriptedAdc::new([128]);
        adc.fail_next(1);
        clock.advance_ms(1_800_000);
        assert!(!s.sense(&mut adc, 1.0, 1.0));
        assert_eq!(s.average_current(), 0.0);
        clock.advance_ms(1_800_000);
        assert!(s.sense(&mut adc, 1.0, 1.0));
        // the full hour is integrated by the successful reading
        assert!((s.amp_hours() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn zero_interval_integrates_nothing() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        let mut adc = ScriptedAdc::new([128]);
        assert!(s.sense(&mut adc, 1.0, 1.0));
        assert_eq!(s.amp_hours(), 0.0);
        assert!((s.current() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn reset_and_restore() {
        let clock = TestClock::new();
        let mut s = sensor(&clock);
        s.restore(&ShuntSnapshot {
            amp_hours: 4.0,
            adjusted_amp_hours: 3.6,
            average_current: -1.5,
            nett_amp_hours: -2.0,
        });
        assert_eq!(s.average_current(), -1.5);
        assert_eq!(s.snapshot().nett_amp_hours, -2.0);
        s.reset();
        assert_eq!(s.amp_hours(), 0.0);
        assert_eq!(s.adjusted_amp_hours(), 0.0);
        assert_eq!(s.nett_amp_hours(), 0.0);
        assert_eq!(s.average_current(), -1.5, "average is not an integral");
    }
}
