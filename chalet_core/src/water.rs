//! Fill and drain metering for the water tank.

use std::sync::Arc;

use chalet_traits::RecordStore;

use crate::error::{DecodeError, Result};
use crate::flow::{DECILES, FlowChannelProperties, FlowRateEstimator};
use crate::persistence::{DRAIN_PROPERTIES, FILL_PROPERTIES, load_or_init, store_record};
use crate::pulse::PulseAccumulator;

/// Which meter, if any, is accumulating `calibrate_volume`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum CalibrationMode {
    #[default]
    None = 0,
    Drain = 1,
    Fill = 2,
}

impl TryFrom<u8> for CalibrationMode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(CalibrationMode::None),
            1 => Ok(CalibrationMode::Drain),
            2 => Ok(CalibrationMode::Fill),
            other => Err(DecodeError::UnknownCalibrationMode(other)),
        }
    }
}

/// Volumes accumulated since the tank was last filled or emptied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaterTotals {
    pub drained_volume: f32,
    pub filled_volume: f32,
    /// Fill rate minus drain rate over the last tick, L/min.
    pub nett_flow: f32,
    pub calibrate_volume: f32,
}

/// Owns the fill and drain flow estimators.
#[derive(Debug)]
pub struct WaterFlowMonitor {
    fill: FlowRateEstimator,
    drain: FlowRateEstimator,
    totals: WaterTotals,
    calibration_mode: CalibrationMode,
    dirty: bool,
}

impl WaterFlowMonitor {
    pub fn new(fill: FlowChannelProperties, drain: FlowChannelProperties) -> Self {
        Self {
            fill: FlowRateEstimator::new(fill),
            drain: FlowRateEstimator::new(drain),
            totals: WaterTotals::default(),
            calibration_mode: CalibrationMode::None,
            dirty: false,
        }
    }

    /// Load both channels' calibration, writing the current properties for
    /// any channel without a stored record.
    pub fn load<S: RecordStore + ?Sized>(&mut self, store: &mut S, retries: u8) -> Result<()> {
        let mut fill = self.fill.properties().clone();
        load_or_init(store, FILL_PROPERTIES, &mut fill, retries)?;
        self.fill.set_properties(fill);
        let mut drain = self.drain.properties().clone();
        load_or_init(store, DRAIN_PROPERTIES, &mut drain, retries)?;
        self.drain.set_properties(drain);
        Ok(())
    }

    /// Resume from persisted tank totals. Pending pulses and any
    /// calibration run are discarded.
    pub fn initialize(&mut self, drained_volume: f32, filled_volume: f32, nett_flow: f32) {
        self.reset();
        self.totals = WaterTotals {
            drained_volume,
            filled_volume,
            nett_flow,
            calibrate_volume: 0.0,
        };
    }

    pub fn fill_handle(&self) -> Arc<PulseAccumulator> {
        self.fill.pulse_handle()
    }

    pub fn drain_handle(&self) -> Arc<PulseAccumulator> {
        self.drain.pulse_handle()
    }

    /// Tick both meters over `elapsed_ms` and fold their volumes into the
    /// totals. Returns whether water is moving.
    pub fn tick(&mut self, elapsed_ms: u64) -> bool {
        let (Some(fill), Some(drain)) = (self.fill.tick(elapsed_ms), self.drain.tick(elapsed_ms))
        else {
            return false;
        };
        self.totals.filled_volume += fill.volume;
        self.totals.drained_volume += drain.volume;
        match self.calibration_mode {
            CalibrationMode::Drain => self.totals.calibrate_volume += drain.volume,
            CalibrationMode::Fill => self.totals.calibrate_volume += fill.volume,
            CalibrationMode::None => {}
        }
        self.totals.nett_flow = fill.flow_rate - drain.flow_rate;
        let flowing = self.totals.nett_flow != 0.0;
        if flowing {
            self.dirty = true;
        }
        flowing
    }

    /// Zero both meters and every total.
    pub fn reset(&mut self) {
        self.fill.reset();
        self.drain.reset();
        self.totals = WaterTotals::default();
    }

    /// Zero the drained and filled totals after the tank was refilled or
    /// emptied by other means. Pending pulses and a calibration run carry on.
    pub fn reset_totals(&mut self) {
        self.totals = WaterTotals {
            calibrate_volume: self.totals.calibrate_volume,
            ..WaterTotals::default()
        };
        self.dirty = false;
    }

    pub fn calibration_mode(&self) -> CalibrationMode {
        self.calibration_mode
    }

    /// Start calibrating `mode`'s meter from zero.
    pub fn set_calibration_mode(&mut self, mode: CalibrationMode) {
        self.calibration_mode = mode;
        if let Some(meter) = self.meter_mut(mode) {
            meter.reset();
            self.totals.calibrate_volume = 0.0;
        }
        tracing::info!(?mode, "calibration mode set");
    }

    pub fn reset_calibration(&mut self) {
        self.calibration_mode = CalibrationMode::None;
        self.totals.calibrate_volume = 0.0;
    }

    /// Calibration of the meter selected by `mode`.
    pub fn calibration_properties(&self, mode: CalibrationMode) -> Option<&FlowChannelProperties> {
        self.meter(mode).map(FlowRateEstimator::properties)
    }

    /// Install and persist new calibration for `mode`'s meter. `None` is
    /// ignored.
    pub fn set_calibration_properties<S: RecordStore + ?Sized>(
        &mut self,
        properties: FlowChannelProperties,
        mode: CalibrationMode,
        store: &mut S,
        retries: u8,
    ) -> Result<()> {
        let name = match mode {
            CalibrationMode::Fill => FILL_PROPERTIES,
            CalibrationMode::Drain => DRAIN_PROPERTIES,
            CalibrationMode::None => return Ok(()),
        };
        store_record(store, name, &properties, retries)?;
        if let Some(meter) = self.meter_mut(mode) {
            meter.set_properties(properties);
        }
        tracing::info!(?mode, record = name, "flow calibration stored");
        Ok(())
    }

    /// Rescale one decile of `mode`'s correction table so a run that the
    /// meter reported as `calculated` liters reads `measured` instead.
    ///
    /// Returns the new properties, which still have to be installed with
    /// [`Self::set_calibration_properties`].
    pub fn corrected_properties(
        &self,
        mode: CalibrationMode,
        decile: u8,
        measured: f32,
        calculated: f32,
    ) -> Result<Option<FlowChannelProperties>, DecodeError> {
        let idx = usize::from(decile);
        if idx >= DECILES {
            return Err(DecodeError::DecileOutOfRange(decile));
        }
        let Some(current) = self.calibration_properties(mode) else {
            return Ok(None);
        };
        if !(measured > 0.0 && calculated > 0.0) {
            return Ok(None);
        }
        let mut props = current.clone();
        props.correction[idx] *= measured / calculated;
        Ok(Some(props))
    }

    fn meter(&self, mode: CalibrationMode) -> Option<&FlowRateEstimator> {
        match mode {
            CalibrationMode::Fill => Some(&self.fill),
            CalibrationMode::Drain => Some(&self.drain),
            CalibrationMode::None => None,
        }
    }

    fn meter_mut(&mut self, mode: CalibrationMode) -> Option<&mut FlowRateEstimator> {
        match mode {
            CalibrationMode::Fill => Some(&mut self.fill),
            CalibrationMode::Drain => Some(&mut self.drain),
            CalibrationMode::None => None,
        }
    }

    pub fn totals(&self) -> WaterTotals {
        self.totals
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hand the accumulated totals off (to the tank) and clear dirty.
    pub fn take_dirty(&mut self) -> Option<WaterTotals> {
        std::mem::take(&mut self.dirty).then_some(self.totals)
    }

    pub fn fill(&self) -> &FlowRateEstimator {
        &self.fill
    }

    pub fn drain(&self) -> &FlowRateEstimator {
        &self.drain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemoryStore;
    use crate::persistence::Record;

    fn monitor() -> WaterFlowMonitor {
        WaterFlowMonitor::new(
            FlowChannelProperties::new(30.0, 4.5),
            FlowChannelProperties::new(30.0, 2.2),
        )
    }

    fn pulse(handle: &PulseAccumulator, n: u32) {
        for _ in 0..n {
            handle.count();
        }
    }

    #[test]
    fn idle_tick_is_not_dirty() {
        let mut m = monitor();
        assert!(!m.tick(1000));
        assert!(!m.is_dirty());
        assert_eq!(m.totals(), WaterTotals::default());
    }

    #[test]
    fn fill_pulses_accumulate_filled_volume() {
        let mut m = monitor();
        pulse(&m.fill_handle(), 15);
        assert!(m.tick(1000));
        let t = m.totals();
        assert!((t.filled_volume - 15.0 / 4.5 / 60.0).abs() < 1e-6);
        assert_eq!(t.drained_volume, 0.0);
        assert!((t.nett_flow - 15.0 / 4.5).abs() < 1e-5);
        assert!(m.is_dirty());
        assert_eq!(m.take_dirty(), Some(t));
        assert!(!m.is_dirty());
    }

    #[test]
    fn drain_flow_is_negative_nett() {
        let mut m = monitor();
        pulse(&m.drain_handle(), 11);
        m.tick(1000);
        assert!(m.totals().nett_flow < 0.0);
        assert!(m.totals().drained_volume > 0.0);
    }

    #[test]
    fn zero_interval_changes_nothing() {
        let mut m = monitor();
        let fill = m.fill_handle();
        pulse(&fill, 15);
        m.tick(1000);
        let before = m.totals();
        pulse(&fill, 15);
        assert!(!m.tick(0));
        assert_eq!(m.totals(), before);
        assert_eq!(fill.pending(), 15);
    }

    #[test]
    fn calibration_volume_tracks_selected_meter() {
        let mut m = monitor();
        pulse(&m.fill_handle(), 10);
        m.tick(1000);
        m.set_calibration_mode(CalibrationMode::Drain);
        assert_eq!(m.totals().calibrate_volume, 0.0);
        pulse(&m.fill_handle(), 10);
        pulse(&m.drain_handle(), 22);
        m.tick(1000);
        let drained = m.drain().current_volume();
        assert!((m.totals().calibrate_volume - drained).abs() < 1e-7);
        m.reset_calibration();
        assert_eq!(m.calibration_mode(), CalibrationMode::None);
        assert_eq!(m.totals().calibrate_volume, 0.0);
    }

    #[test]
    fn initialize_restores_totals() {
        let mut m = monitor();
        pulse(&m.fill_handle(), 3);
        m.initialize(1.5, 4.0, 0.0);
        assert_eq!(m.fill_handle().pending(), 0);
        assert_eq!(m.totals().drained_volume, 1.5);
        assert_eq!(m.totals().filled_volume, 4.0);
    }

    #[test]
    fn calibration_properties_are_persisted() {
        let mut m = monitor();
        let mut store = MemoryStore::new();
        let props = m
            .corrected_properties(CalibrationMode::Fill, 1, 9.0, 10.0)
            .expect("decile in range")
            .expect("fill meter");
        assert!((props.correction[1] - 0.9).abs() < 1e-6);
        m.set_calibration_properties(props.clone(), CalibrationMode::Fill, &mut store, 0)
            .expect("store");
        assert_eq!(m.fill().properties(), &props);
        assert_eq!(store.get(FILL_PROPERTIES), Some(props.encode().as_str()));
        assert!(store.get(DRAIN_PROPERTIES).is_none());
    }

    #[test]
    fn calibration_rejects_bad_decile() {
        let m = monitor();
        assert_eq!(
            m.corrected_properties(CalibrationMode::Fill, 10, 1.0, 1.0),
            Err(DecodeError::DecileOutOfRange(10))
        );
        assert_eq!(
            m.corrected_properties(CalibrationMode::None, 0, 1.0, 1.0),
            Ok(None)
        );
    }

    #[test]
    fn load_writes_missing_and_reads_existing() {
        let mut m = monitor();
        let mut store =
            MemoryStore::new().with_record(DRAIN_PROPERTIES, "25.000|2.500|1.1|1.2|");
        m.load(&mut store, 0).expect("load");
        assert!(store.get(FILL_PROPERTIES).is_some());
        let drain = m.drain().properties();
        assert_eq!(drain.capacity, 25.0);
        assert_eq!(drain.k_factor, 2.5);
        assert_eq!(drain.correction[0], 1.1);
        assert_eq!(drain.correction[1], 1.2);
        assert_eq!(drain.correction[2], 1.0);
    }

    #[test]
    fn unknown_calibration_mode_is_rejected() {
        assert_eq!(CalibrationMode::try_from(2), Ok(CalibrationMode::Fill));
        assert_eq!(
            CalibrationMode::try_from(7),
            Err(DecodeError::UnknownCalibrationMode(7))
        );
    }
}
