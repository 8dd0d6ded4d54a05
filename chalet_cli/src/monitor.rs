//! The sampling loop: wires configuration, hardware and storage into the
//! estimators and sequences their calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chalet_core::conversions::{flow_properties, tank_archive_policy};
use chalet_core::{
    BatteryCfg, BatteryProfile, BatteryTelemetry, CalibrationTelemetry, CapacityEstimator,
    FileStore, TankState, TankTelemetry, TelemetryRecord, WaterFlowMonitor,
};
use chalet_hardware::{PulseGenerator, SimulatedAdc};
use chalet_traits::{Adc, Clock, MonotonicClock, Mux};
use eyre::WrapErr;
use serde_json::json;

/// Method tag on frames pushed by the monitor.
pub const METHOD_STATUS: u8 = 1;

#[derive(Debug, Clone)]
pub struct MonitorOpts {
    pub ticks: Option<u64>,
    pub sim: bool,
    pub chalet_counts: i16,
    pub ctek_counts: i16,
    pub fill_hz: u32,
    pub drain_hz: u32,
    pub telemetry: bool,
}

/// What the loop did, for the final report.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonitorSummary {
    pub ticks: u64,
    pub battery_archives: u64,
    pub tank_archives: u64,
    pub remaining_ah: f32,
    pub remaining_litres: f32,
}

type BoxAdc = Box<dyn Adc>;

fn sim_adcs(cfg: &chalet_config::Config, opts: &MonitorOpts) -> (BoxAdc, BoxAdc) {
    // 2.5 V on a 4.096 V range, ~12.6 V at the pack through the default divider
    const SIM_DIVIDER_COUNTS: i16 = 20_000;
    let current = SimulatedAdc::new()
        .with_counts(cfg.shunts.chalet.mux.into(), opts.chalet_counts)
        .with_counts(cfg.shunts.ctek.mux.into(), opts.ctek_counts)
        .with_jitter(3);
    let voltage_mux: Mux = cfg.voltage.mux.into();
    let voltage = SimulatedAdc::new().with_counts(voltage_mux, SIM_DIVIDER_COUNTS);
    (Box::new(current), Box::new(voltage))
}

#[cfg(feature = "hardware")]
fn build_adcs(cfg: &chalet_config::Config, opts: &MonitorOpts) -> eyre::Result<(BoxAdc, BoxAdc)> {
    use chalet_hardware::ads1115::Ads1115;
    if opts.sim {
        return Ok(sim_adcs(cfg, opts));
    }
    let hw = &cfg.hardware;
    let current = Ads1115::new(hw.i2c_bus, hw.current_adc_addr).wrap_err("open current amplifier")?;
    let voltage = Ads1115::new(hw.i2c_bus, hw.voltage_adc_addr).wrap_err("open voltage amplifier")?;
    Ok((Box::new(current), Box::new(voltage)))
}

#[cfg(not(feature = "hardware"))]
fn build_adcs(cfg: &chalet_config::Config, opts: &MonitorOpts) -> eyre::Result<(BoxAdc, BoxAdc)> {
    Ok(sim_adcs(cfg, opts))
}

/// Keeps the pulse sources alive for the duration of the loop.
#[derive(Default)]
struct PulseInputs {
    _generators: Vec<PulseGenerator>,
    #[cfg(feature = "hardware")]
    _edges: Vec<chalet_hardware::edges::EdgeInput>,
}

fn attach_pulses(
    cfg: &chalet_config::Config,
    opts: &MonitorOpts,
    water: &WaterFlowMonitor,
) -> eyre::Result<PulseInputs> {
    let fill = water.fill_handle();
    let drain = water.drain_handle();

    #[cfg(feature = "hardware")]
    if !opts.sim {
        use chalet_hardware::edges::EdgeInput;
        let hw = &cfg.hardware;
        let edges = vec![
            EdgeInput::attach(hw.fill_flow_pin, move || fill.count())
                .wrap_err("attach fill meter interrupt")?,
            EdgeInput::attach(hw.drain_flow_pin, move || drain.count())
                .wrap_err("attach drain meter interrupt")?,
        ];
        return Ok(PulseInputs {
            _edges: edges,
            ..PulseInputs::default()
        });
    }

    let _ = cfg;
    Ok(PulseInputs {
        _generators: vec![
            PulseGenerator::spawn(opts.fill_hz, move || fill.count()),
            PulseGenerator::spawn(opts.drain_hz, move || drain.count()),
        ],
        ..PulseInputs::default()
    })
}

fn emit_frame(kind: &str, frame: &[u8]) {
    println!("{}", json!({ "telemetry": kind, "frame": hex::encode(frame) }));
}

pub fn run_monitor(
    cfg: &chalet_config::Config,
    opts: &MonitorOpts,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<MonitorSummary> {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut store = FileStore::open(&cfg.storage.dir)
        .wrap_err_with(|| format!("open record directory {}", cfg.storage.dir.display()))?;
    let retries = cfg.archive.write_retries;

    let (current_adc, voltage_adc) = build_adcs(cfg, opts)?;
    let mut battery = CapacityEstimator::new(
        BatteryProfile::from(&cfg.battery),
        &BatteryCfg::from(cfg),
        current_adc,
        voltage_adc,
        clock.clone(),
    );
    let status = battery.init();
    tracing::info!(current = status.current, voltage = status.voltage, "amplifiers probed");
    battery.load(&mut store)?;

    let mut tank = TankState::new(
        cfg.tank.capacity_litres,
        tank_archive_policy(&cfg.archive),
        clock.clone(),
    );
    tank.load(&mut store)?;

    let mut water = WaterFlowMonitor::new(
        flow_properties(&cfg.flow.fill)?,
        flow_properties(&cfg.flow.drain)?,
    );
    water.load(&mut store, retries)?;
    let rec = tank.record().clone();
    water.initialize(rec.drained_volume, rec.filled_volume, rec.nett_flow);
    let _pulses = attach_pulses(cfg, opts, &water)?;

    let period = Duration::from_millis(cfg.hardware.tick_ms);
    let mut summary = MonitorSummary::default();
    let mut last = clock.now();
    tracing::info!(tick_ms = cfg.hardware.tick_ms, "monitor started");

    while !shutdown.load(Ordering::SeqCst) && opts.ticks.is_none_or(|n| summary.ticks < n) {
        clock.sleep(period);
        let elapsed = clock.ms_since(last);
        last = clock.now();

        water.tick(elapsed);
        if let Some(totals) = water.take_dirty() {
            tank.update_from_flow(&totals);
        }
        battery.monitor();

        if battery.should_archive() {
            match battery.archive(&mut store) {
                Ok(()) => summary.battery_archives += 1,
                Err(e) => tracing::warn!(error = %e, "battery archive failed; will retry"),
            }
        }
        if tank.should_archive() {
            match tank.archive(&mut store) {
                Ok(()) => summary.tank_archives += 1,
                Err(e) => tracing::warn!(error = %e, "tank archive failed; will retry"),
            }
        }

        if opts.telemetry {
            emit_frame("battery", &BatteryTelemetry::marshall(&battery).encode(METHOD_STATUS));
            emit_frame("tank", &TankTelemetry::marshall(&tank).encode(METHOD_STATUS));
            if water.calibration_mode() != chalet_core::CalibrationMode::None {
                emit_frame(
                    "calibration",
                    &CalibrationTelemetry::marshall(&water, &tank).encode(METHOD_STATUS),
                );
            }
        }
        summary.ticks += 1;
    }

    // Commit whatever is still dirty before exiting.
    if battery.needs_archiving() {
        battery.archive(&mut store)?;
        summary.battery_archives += 1;
    }
    if tank.needs_archiving() {
        tank.archive(&mut store)?;
        summary.tank_archives += 1;
    }

    summary.remaining_ah = battery.remaining_capacity();
    summary.remaining_litres = tank.remaining_litres();
    tracing::info!(?summary, "monitor stopped");
    Ok(summary)
}
