//! Tank volume bookkeeping fed by the flow meters.

use std::sync::Arc;

use chalet_traits::{Clock, RecordStore};

use crate::archive::{ArchiveGate, ArchivePolicy};
use crate::error::Result;
use crate::persistence::{TANK_STATE, load_or_init, store_record};
use crate::water::{WaterFlowMonitor, WaterTotals};

/// Persisted tank state (`tank.txt`), all in liters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TankRecord {
    /// Volume at the last fill or empty event.
    pub tank_volume: f32,
    pub drained_volume: f32,
    pub filled_volume: f32,
    /// L/min at the last update.
    pub nett_flow: f32,
    pub calibrate_volume: f32,
}

impl TankRecord {
    pub fn with_capacity(tank_volume: f32) -> Self {
        Self {
            tank_volume,
            ..Self::default()
        }
    }

    pub fn remaining_litres(&self) -> f32 {
        self.tank_volume - self.drained_volume + self.filled_volume
    }
}

/// The tank, archived once flow has been idle for the policy interval.
pub struct TankState {
    record: TankRecord,
    /// Operator-measured volume of the current calibration run.
    measured_volume: f32,
    archive: ArchiveGate,
}

impl std::fmt::Debug for TankState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TankState")
            .field("record", &self.record)
            .field("measured_volume", &self.measured_volume)
            .field("archive", &self.archive)
            .finish()
    }
}

impl TankState {
    pub fn new(capacity: f32, policy: ArchivePolicy, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            record: TankRecord::with_capacity(capacity),
            measured_volume: 0.0,
            archive: ArchiveGate::new(policy, clock),
        }
    }

    /// Load `tank.txt`, or persist a full tank on first boot.
    pub fn load<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        load_or_init(store, TANK_STATE, &mut self.record, self.archive.policy().write_retries)?;
        self.archive.committed(0.0);
        tracing::info!(
            record = ?self.record,
            remaining = self.remaining_litres(),
            "tank state loaded"
        );
        Ok(())
    }

    /// Copy the meters' totals; restarts the idle timer.
    pub fn update_from_flow(&mut self, totals: &WaterTotals) {
        self.record.drained_volume = totals.drained_volume;
        self.record.filled_volume = totals.filled_volume;
        self.record.nett_flow = totals.nett_flow;
        self.record.calibrate_volume = totals.calibrate_volume;
        self.archive.mark_dirty();
        self.archive.restart_timer();
    }

    /// The tank was filled to `volume` liters by other means. The meters'
    /// totals restart from zero along with the record.
    pub fn tank_filled(&mut self, volume: f32, water: &mut WaterFlowMonitor) {
        self.record.tank_volume = volume;
        self.clear_flows(water);
        tracing::info!(volume, "tank filled");
    }

    pub fn tank_empty(&mut self, water: &mut WaterFlowMonitor) {
        self.record.tank_volume = 0.0;
        self.clear_flows(water);
        tracing::info!("tank emptied");
    }

    fn clear_flows(&mut self, water: &mut WaterFlowMonitor) {
        water.reset_totals();
        self.record.drained_volume = 0.0;
        self.record.filled_volume = 0.0;
        self.record.nett_flow = 0.0;
        self.archive.mark_dirty();
    }

    /// Dirty and no flow update for the idle interval.
    pub fn should_archive(&self) -> bool {
        self.archive.should_archive(0.0)
    }

    /// Write `tank.txt`; on success the nett flow is cleared and the gate
    /// reset. A failed write leaves everything as it was.
    pub fn archive<S: RecordStore + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        store_record(store, TANK_STATE, &self.record, self.archive.policy().write_retries)?;
        self.record.nett_flow = 0.0;
        self.archive.committed(0.0);
        tracing::info!(remaining = self.remaining_litres(), "tank state archived");
        Ok(())
    }

    pub fn remaining_litres(&self) -> f32 {
        self.record.remaining_litres()
    }

    pub fn record(&self) -> &TankRecord {
        &self.record
    }

    pub fn measured_volume(&self) -> f32 {
        self.measured_volume
    }

    pub fn set_measured_volume(&mut self, litres: f32) {
        self.measured_volume = litres;
    }

    pub fn needs_archiving(&self) -> bool {
        self.archive.is_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MemoryStore;
    use chalet_traits::clock::test_clock::TestClock;

    fn tank(clock: &TestClock) -> TankState {
        TankState::new(60.0, ArchivePolicy::TANK, Arc::new(clock.clone()))
    }

    fn flowing(drained: f32, filled: f32, nett: f32) -> WaterTotals {
        WaterTotals {
            drained_volume: drained,
            filled_volume: filled,
            nett_flow: nett,
            calibrate_volume: 0.0,
        }
    }

    #[test]
    fn remaining_is_additive() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        t.update_from_flow(&flowing(12.5, 2.0, -3.0));
        assert_eq!(t.remaining_litres(), 49.5);
    }

    #[test]
    fn archives_only_after_flow_goes_idle() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        clock.advance_ms(900_000);
        assert!(!t.should_archive(), "clean");
        t.update_from_flow(&flowing(1.0, 0.0, -2.0));
        clock.advance_ms(599_999);
        assert!(!t.should_archive());
        t.update_from_flow(&flowing(1.5, 0.0, -2.0));
        clock.advance_ms(599_999);
        assert!(!t.should_archive(), "flow restarted the idle timer");
        clock.advance_ms(1);
        assert!(t.should_archive());

        let mut store = MemoryStore::new();
        t.archive(&mut store).expect("archive");
        assert!(!t.should_archive());
        assert_eq!(t.record().nett_flow, 0.0);
        assert_eq!(store.get(TANK_STATE), Some("60.00|1.50000|0.00000|-2.00000|0.00000|"));
    }

    #[test]
    fn failed_archive_keeps_state() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        t.update_from_flow(&flowing(1.0, 0.0, -2.0));
        clock.advance_ms(600_000);
        let mut store = MemoryStore::new();
        store.fail_writes(3);
        assert!(t.archive(&mut store).is_err());
        assert!(t.should_archive());
        assert_eq!(t.record().nett_flow, -2.0);
    }

    fn meters() -> WaterFlowMonitor {
        use crate::flow::FlowChannelProperties;
        WaterFlowMonitor::new(
            FlowChannelProperties::new(30.0, 4.5),
            FlowChannelProperties::new(30.0, 2.2),
        )
    }

    #[test]
    fn fill_and_empty_events() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        let mut water = meters();
        water.initialize(10.0, 3.0, 1.0);
        t.update_from_flow(&flowing(10.0, 3.0, 1.0));
        t.tank_filled(55.0, &mut water);
        assert_eq!(t.remaining_litres(), 55.0);
        assert!(t.needs_archiving());
        assert_eq!(water.totals().drained_volume, 0.0);
        assert_eq!(water.totals().filled_volume, 0.0);
        t.tank_empty(&mut water);
        assert_eq!(t.remaining_litres(), 0.0);
    }

    #[test]
    fn flow_after_refill_counts_from_the_new_level() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        let mut water = meters();
        let drain = water.drain_handle();
        // 2200 pulses over a minute on a 2.2 pulse/L meter: 16.67 L out
        for _ in 0..60 {
            for _ in 0..36 {
                drain.count();
            }
            water.tick(1000);
        }
        for _ in 0..40 {
            drain.count();
        }
        water.tick(1000);
        if let Some(totals) = water.take_dirty() {
            t.update_from_flow(&totals);
        }
        assert!((t.remaining_litres() - 43.33).abs() < 0.05);

        t.tank_filled(60.0, &mut water);
        assert_eq!(t.remaining_litres(), 60.0);

        drain.count();
        water.tick(1000);
        if let Some(totals) = water.take_dirty() {
            t.update_from_flow(&totals);
        }
        assert!(t.remaining_litres() > 59.0, "refill undone: {}", t.remaining_litres());
    }

    #[test]
    fn first_boot_writes_full_tank() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        let mut store = MemoryStore::new();
        t.load(&mut store).expect("load");
        assert_eq!(store.get(TANK_STATE), Some("60.00|0.00000|0.00000|0.00000|0.00000|"));
        assert!(!t.needs_archiving());
    }

    #[test]
    fn load_restores_record() {
        let clock = TestClock::new();
        let mut t = tank(&clock);
        let mut store = MemoryStore::new().with_record(TANK_STATE, "60.00|5.25|1.00|0.0|0.5|\n");
        t.load(&mut store).expect("load");
        assert_eq!(t.remaining_litres(), 55.75);
        assert_eq!(t.record().calibrate_volume, 0.5);
    }
}
