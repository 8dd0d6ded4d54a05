//! End-to-end runs of the estimators against in-memory hardware.

use std::sync::Arc;

use chalet_core::mocks::{MemoryStore, ScriptedAdc};
use chalet_core::persistence::{BATTERY_PROFILE, BATTERY_STATE, TANK_STATE};
use chalet_core::{
    ArchivePolicy, BatteryCfg, BatteryProfile, BatteryTelemetry, CapacityEstimator,
    FlowChannelProperties, FlowRateEstimator, Record, TankRecord, TankState, TankTelemetry, TelemetryRecord,
    WaterFlowMonitor,
};
use chalet_traits::clock::test_clock::TestClock;
use rstest::rstest;

#[test]
fn fifteen_hertz_over_one_second() {
    let mut meter = FlowRateEstimator::new(FlowChannelProperties::new(30.0, 4.5));
    let isr = meter.pulse_handle();
    for _ in 0..15 {
        isr.count();
    }
    let tick = meter.tick(1000).expect("non-zero interval");
    assert_eq!(tick.decile, 1);
    assert!((tick.correction - 4.5).abs() < 1e-6);
    assert!((tick.flow_rate - 3.333_333).abs() < 1e-4);
    assert!((tick.volume - 0.055_555).abs() < 1e-5);
    assert_eq!(meter.total_duration_ms(), 1000);
}

#[rstest]
#[case::idle(0, 0)]
#[case::rated_capacity(135, 9)]
#[case::saturated(10_000, 9)]
#[case::just_below_first_boundary(13, 0)]
fn decile_buckets(#[case] pulses_per_sec: u32, #[case] decile: usize) {
    let mut meter = FlowRateEstimator::new(FlowChannelProperties::new(30.0, 4.5));
    let isr = meter.pulse_handle();
    for _ in 0..pulses_per_sec {
        isr.count();
    }
    let tick = meter.tick(1000).expect("tick");
    assert_eq!(tick.decile, decile);
}

#[test]
fn profile_record_drives_time_left() {
    let clock = TestClock::new();
    let mut store = MemoryStore::new().with_record(BATTERY_PROFILE, "75.0|148.0|20.0|1.16|0.9|\n");
    let counts = std::iter::repeat_n([-710i16, 0], 30).flatten();
    let mut est = CapacityEstimator::new(
        BatteryProfile::default(),
        &BatteryCfg::default(),
        ScriptedAdc::new(counts),
        ScriptedAdc::new([20_000]),
        Arc::new(clock.clone()),
    );
    assert!(est.init().all_ok());
    est.load(&mut store).expect("load");
    assert_eq!(est.profile().full_capacity, 148.0);
    assert!(store.get(BATTERY_STATE).is_some(), "first boot persists state");

    for _ in 0..30 {
        clock.advance_ms(1000);
        est.monitor();
    }
    let remaining = est.remaining_capacity();
    assert!(remaining < 148.0);
    let expected = 20.0 * (remaining / 20.0).powf(1.16);
    assert!((est.adjusted_capacity() - expected).abs() / expected < 1e-5);
    let t = est.time_left();
    assert!(t.is_finite() && t > 0.0 && t < 500.0, "{t}");

    let frame = BatteryTelemetry::marshall(&est).encode(1);
    let (method, decoded) = BatteryTelemetry::decode(&frame).expect("decode");
    assert_eq!(method, 1);
    assert_eq!(decoded.remaining_capacity, remaining);
    assert_eq!(decoded.peukert_value, 1.16);
}

#[test]
fn fill_run_updates_tank_and_archives_when_idle() {
    let clock = TestClock::new();
    let mut store = MemoryStore::new();
    let mut tank = TankState::new(60.0, ArchivePolicy::TANK, Arc::new(clock.clone()));
    tank.load(&mut store).expect("load");
    let mut water = WaterFlowMonitor::new(
        FlowChannelProperties::new(30.0, 4.5),
        FlowChannelProperties::new(30.0, 2.2),
    );
    let rec = tank.record().clone();
    water.initialize(rec.drained_volume, rec.filled_volume, rec.nett_flow);

    let drain_isr = water.drain_handle();
    for _ in 0..60 {
        for _ in 0..22 {
            drain_isr.count();
        }
        clock.advance_ms(1000);
        water.tick(1000);
        if let Some(totals) = water.take_dirty() {
            tank.update_from_flow(&totals);
        }
    }
    // 22 Hz on a 2.2 pulse/L meter is 10 L/min, one minute of it
    assert!((tank.remaining_litres() - 50.0).abs() < 1e-3);
    assert!(!tank.should_archive());

    for _ in 0..600 {
        clock.advance_ms(1000);
        water.tick(1000);
        if let Some(totals) = water.take_dirty() {
            tank.update_from_flow(&totals);
        }
    }
    assert!(tank.should_archive());
    tank.archive(&mut store).expect("archive");
    let mut stored = TankRecord::default();
    stored
        .decode_into(store.get(TANK_STATE).expect("tank record"))
        .expect("decode");
    assert_eq!(stored.tank_volume, 60.0);
    assert!((stored.drained_volume - 10.0).abs() < 1e-3);
    assert!((stored.nett_flow + 10.0).abs() < 1e-3);
    assert_eq!(tank.record().nett_flow, 0.0);

    let frame = TankTelemetry::marshall(&tank).encode(2);
    assert_eq!(frame.len(), TankTelemetry::SIZE);
}
