//! Battery bank state: Peukert-adjusted coulomb counting over two shunts.
//!
//! Batteries are rated at an hour rate, e.g. 74 Ah at 20 h. Peukert's law
//! scales the capacity available at other discharge currents:
//!
//! - Peukert capacity `P = R * (C / R)^n`
//! - Battery life `T = P / I^n`
//!
//! where `C` is rated capacity, `R` the hour rating, `I` the discharge
//! current and `n` the Peukert exponent.

use std::sync::Arc;

use chalet_traits::{Adc, Clock, RecordStore};

use crate::archive::ArchiveGate;
use crate::config::{BatteryCfg, VoltageDivider};
use crate::error::Result;
use crate::filters::BoundedMovingAverage;
use crate::hw_error::map_adc_error;
use crate::persistence::{BATTERY_PROFILE, BATTERY_STATE, load_or_init, store_record};
use crate::shunt::{ShuntCurrentSensor, ShuntSnapshot};

/// Longest time remaining reported, in hours.
pub const MAX_TIME_LEFT_HOURS: f32 = 500.0;
/// Bounds of the dynamic Peukert factor.
pub const PEUKERT_FACTOR_MIN: f32 = 0.1;
pub const PEUKERT_FACTOR_MAX: f32 = 1.9;

/// Tunable battery parameters (`battery.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryProfile {
    /// Percent of capacity usable before the bank counts as empty.
    pub min_battery_level: f32,
    /// Ah.
    pub full_capacity: f32,
    /// Hour basis of the capacity rating.
    pub capacity_hours: f32,
    pub peukert_value: f32,
    /// Fraction of charge current recoverable on discharge.
    pub coulomb_efficiency: f32,
}

impl Default for BatteryProfile {
    fn default() -> Self {
        Self {
            min_battery_level: 0.0,
            full_capacity: 1.0,
            capacity_hours: 20.0,
            peukert_value: 1.0,
            coulomb_efficiency: 1.0,
        }
    }
}

/// Running battery state (`batstate.txt`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatteryStateRecord {
    pub chalet: ShuntSnapshot,
    pub ctek: ShuntSnapshot,
    pub average_time_left: f32,
}

/// Which amplifiers answered at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcStatus {
    pub current: bool,
    pub voltage: bool,
}

impl AdcStatus {
    pub fn all_ok(&self) -> bool {
        self.current && self.voltage
    }
}

/// State of charge and time remaining for the battery bank.
///
/// `I` is the amplifier shared by both shunts, `V` the one measuring pack
/// voltage.
pub struct CapacityEstimator<I: Adc, V: Adc> {
    profile: BatteryProfile,
    chalet: ShuntCurrentSensor,
    ctek: ShuntCurrentSensor,
    current_adc: I,
    voltage_adc: V,
    adc_status: AdcStatus,
    divider: VoltageDivider,
    battery_volts: f32,
    adjusted_capacity: f32,
    peukert_factor: f32,
    time_left: BoundedMovingAverage,
    archive: ArchiveGate,
}

impl<I: Adc, V: Adc> std::fmt::Debug for CapacityEstimator<I, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityEstimator")
            .field("profile", &self.profile)
            .field("chalet", &self.chalet)
            .field("ctek", &self.ctek)
            .field("adc_status", &self.adc_status)
            .field("battery_volts", &self.battery_volts)
            .field("adjusted_capacity", &self.adjusted_capacity)
            .field("peukert_factor", &self.peukert_factor)
            .field("time_left", &self.time_left.average())
            .field("archive", &self.archive)
            .finish()
    }
}

impl<I: Adc, V: Adc> CapacityEstimator<I, V> {
    pub fn new(
        profile: BatteryProfile,
        cfg: &BatteryCfg,
        current_adc: I,
        voltage_adc: V,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            profile,
            chalet: ShuntCurrentSensor::new(cfg.chalet, &cfg.filters, clock.clone()),
            ctek: ShuntCurrentSensor::new(cfg.ctek, &cfg.filters, clock.clone()),
            current_adc,
            voltage_adc,
            // assumed present until init() probes
            adc_status: AdcStatus {
                current: true,
                voltage: true,
            },
            divider: cfg.divider,
            battery_volts: 0.0,
            adjusted_capacity: 0.0,
            peukert_factor: 1.0,
            time_left: BoundedMovingAverage::new(cfg.filters.time_left_window),
            archive: ArchiveGate::new(cfg.archive, clock),
        }
    }

    /// Probe both amplifiers. One that does not answer is left disabled for
    /// the session; estimates that depend on it simply stop moving.
    pub fn init(&mut self) -> AdcStatus {
        self.adc_status = AdcStatus {
            current: self.current_adc.test_connection(),
            voltage: self.voltage_adc.test_connection(),
        };
        if !self.adc_status.current {
            tracing::warn!("current amplifier not responding; shunt sensing disabled");
        }
        if !self.adc_status.voltage {
            tracing::warn!("voltage amplifier not responding; pack voltage disabled");
        }
        self.adc_status
    }

    /// Load profile and running state, writing defaults for any record that
    /// does not exist yet.
    pub fn load<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let retries = self.archive.policy().write_retries;
        load_or_init(store, BATTERY_PROFILE, &mut self.profile, retries)?;
        let mut record = self.state_record();
        load_or_init(store, BATTERY_STATE, &mut record, retries)?;
        self.restore(&record);
        self.archive.committed(self.nett_amp_hours());
        tracing::info!(
            profile = ?self.profile,
            remaining = self.remaining_capacity(),
            "battery state loaded"
        );
        Ok(())
    }

    /// One sampling pass: both shunts, then pack voltage.
    ///
    /// Returns whether either shunt produced a reading; only then are time
    /// remaining and the Peukert factor recomputed.
    pub fn monitor(&mut self) -> bool {
        let mut changed = false;
        if self.adc_status.current {
            let (peukert, efficiency) = (self.peukert_factor, self.profile.coulomb_efficiency);
            changed |= self.chalet.sense(&mut self.current_adc, peukert, efficiency);
            changed |= self.ctek.sense(&mut self.current_adc, peukert, efficiency);
        }
        if changed {
            self.archive.mark_dirty();
            self.calculate_time_left();
            self.adjust_peukert_factor();
        }
        self.sample_voltage();

        tracing::debug!(
            chalet_current = self.chalet.current(),
            chalet_avg = self.chalet.average_current(),
            ctek_current = self.ctek.current(),
            ctek_avg = self.ctek.average_current(),
            remaining = self.remaining_capacity(),
            volts = self.battery_volts,
            peukert_factor = self.peukert_factor,
            time_left = self.time_left(),
            "battery monitor"
        );
        changed
    }

    fn sample_voltage(&mut self) {
        if !self.adc_status.voltage {
            return;
        }
        match self
            .voltage_adc
            .read_millivolts(self.divider.gain, self.divider.mux)
        {
            Ok(mv) => self.battery_volts = self.divider.volts(mv),
            Err(e) => {
                tracing::warn!(error = %map_adc_error(&*e), "pack voltage conversion failed");
            }
        }
    }

    /// Refresh the Peukert-adjusted capacity and, while discharging, push a
    /// new time-remaining estimate (hours) into its moving average.
    pub fn calculate_time_left(&mut self) {
        let p = &self.profile;
        let discharge = self.nett_average_current();
        self.adjusted_capacity =
            (self.remaining_capacity() / p.capacity_hours).powf(p.peukert_value) * p.capacity_hours;
        if discharge < 0.0 {
            let life = (self.adjusted_capacity / discharge.abs().powf(p.peukert_value))
                * (p.min_battery_level / 100.0);
            if life.is_nan() {
                return;
            }
            self.time_left.add(life.min(MAX_TIME_LEFT_HOURS));
        }
    }

    /// Recompute the discharge weighting factor from the average current.
    pub fn adjust_peukert_factor(&mut self) -> f32 {
        let p = &self.profile;
        let discharge = self.nett_average_current();
        let mut peuk_adjusted = p.full_capacity;
        if discharge < 0.0 {
            peuk_adjusted = p.full_capacity
                * (p.full_capacity / (discharge.abs() * p.capacity_hours))
                    .powf(p.peukert_value - 1.0);
        }
        let factor = p.full_capacity / peuk_adjusted;
        if !factor.is_nan() {
            self.peukert_factor = factor.clamp(PEUKERT_FACTOR_MIN, PEUKERT_FACTOR_MAX);
        }
        self.peukert_factor
    }

    /// Full-charge event: zero both shunt integrals.
    pub fn battery_full(&mut self) {
        self.chalet.reset();
        self.ctek.reset();
        self.archive.mark_dirty();
        tracing::info!("battery full; amp-hour counters reset");
    }

    pub fn should_archive(&self) -> bool {
        self.archive.should_archive(self.nett_amp_hours())
    }

    /// Commit running state. The dirty flag is cleared only if the write
    /// succeeds; a failed write is retried at the next eligible window.
    pub fn archive<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        let record = self.state_record();
        store_record(store, BATTERY_STATE, &record, self.archive.policy().write_retries)?;
        self.archive.committed(self.nett_amp_hours());
        tracing::info!(nett_amp_hours = self.nett_amp_hours(), "battery state archived");
        Ok(())
    }

    fn store_profile<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        store_record(store, BATTERY_PROFILE, &self.profile, self.archive.policy().write_retries)?;
        tracing::info!(profile = ?self.profile, "battery profile archived");
        Ok(())
    }

    pub fn set_full_capacity<S: RecordStore + ?Sized>(&mut self, value: f32, store: &mut S) -> Result<()> {
        self.profile.full_capacity = value;
        self.store_profile(store)
    }

    pub fn set_coulomb_efficiency<S: RecordStore + ?Sized>(
        &mut self,
        value: f32,
        store: &mut S,
    ) -> Result<()> {
        self.profile.coulomb_efficiency = value;
        self.store_profile(store)
    }

    pub fn set_peukert_constant<S: RecordStore + ?Sized>(
        &mut self,
        value: f32,
        store: &mut S,
    ) -> Result<()> {
        self.profile.peukert_value = value;
        self.store_profile(store)
    }

    pub fn state_record(&self) -> BatteryStateRecord {
        BatteryStateRecord {
            chalet: self.chalet.snapshot(),
            ctek: self.ctek.snapshot(),
            average_time_left: self.time_left(),
        }
    }

    pub fn restore(&mut self, record: &BatteryStateRecord) {
        self.chalet.restore(&record.chalet);
        self.ctek.restore(&record.ctek);
        self.time_left.set_average(record.average_time_left);
    }

    /// Ah left, clamped to `[0, full_capacity]`.
    pub fn remaining_capacity(&self) -> f32 {
        (self.profile.full_capacity + self.nett_amp_hours()).clamp(0.0, self.profile.full_capacity.max(0.0))
    }

    pub fn nett_amp_hours(&self) -> f32 {
        self.chalet.nett_amp_hours() + self.ctek.nett_amp_hours()
    }

    pub fn nett_adjusted_amp_hours(&self) -> f32 {
        self.chalet.adjusted_amp_hours() + self.ctek.adjusted_amp_hours()
    }

    pub fn nett_current(&self) -> f32 {
        self.chalet.current() + self.ctek.current()
    }

    pub fn nett_average_current(&self) -> f32 {
        self.chalet.average_current() + self.ctek.average_current()
    }

    /// Averaged hours remaining; holds its last value while not discharging.
    pub fn time_left(&self) -> f32 {
        self.time_left.average()
    }

    pub fn profile(&self) -> &BatteryProfile {
        &self.profile
    }

    pub fn chalet(&self) -> &ShuntCurrentSensor {
        &self.chalet
    }

    pub fn ctek(&self) -> &ShuntCurrentSensor {
        &self.ctek
    }

    pub fn adc_status(&self) -> AdcStatus {
        self.adc_status
    }

    pub fn battery_volts(&self) -> f32 {
        self.battery_volts
    }

    pub fn adjusted_capacity(&self) -> f32 {
        self.adjusted_capacity
    }

    pub fn peukert_factor(&self) -> f32 {
        self.peukert_factor
    }

    pub fn needs_archiving(&self) -> bool {
        self.archive.is_dirty()
    }

    pub fn archive_gate(&self) -> &ArchiveGate {
        &self.archive
    }
}
