#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and correction-table parsing for the chalet monitor.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//!   Every section has installation defaults, so an empty file is valid.
//! - The correction CSV loader enforces headers and requires each flow
//!   decile exactly once.
use chalet_traits::{Gain, Mux};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Number of decile buckets in a flow correction table.
pub const DECILES: usize = 10;

/// Amplifier full-scale range, spelled the way the datasheet does.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum GainSetting {
    #[serde(rename = "6.144")]
    Fsr6p144,
    #[serde(rename = "4.096")]
    Fsr4p096,
    #[serde(rename = "2.048")]
    Fsr2p048,
    #[serde(rename = "1.024")]
    Fsr1p024,
    #[serde(rename = "0.512")]
    Fsr0p512,
    #[serde(rename = "0.256")]
    Fsr0p256,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MuxSetting {
    P0N1,
    P0N3,
    P1N3,
    P2N3,
    P0Gnd,
    P1Gnd,
    P2Gnd,
    P3Gnd,
}

/// Default battery profile, used until `battery.txt` exists.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatteryCfg {
    /// Percentage of capacity considered usable before the bank is "empty".
    pub min_battery_level: f32,
    /// Rated capacity in amp-hours.
    pub full_capacity: f32,
    /// Discharge-hour basis of the rating (e.g. 20 for a C20 rating).
    pub capacity_hours: f32,
    pub peukert_value: f32,
    /// Charge acceptance factor in (0, 1].
    pub coulomb_efficiency: f32,
}

impl Default for BatteryCfg {
    fn default() -> Self {
        // 2 x 74 Ah/20 h lead-acid, Peukert fitted from discharge tests.
        Self {
            min_battery_level: 75.0,
            full_capacity: 148.0,
            capacity_hours: 20.0,
            peukert_value: 1.16,
            coulomb_efficiency: 0.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShuntCfg {
    pub gain: GainSetting,
    pub mux: MuxSetting,
    /// Current at which the shunt drops `rated_millivolts`.
    pub rated_amps: f32,
    pub rated_millivolts: f32,
}

impl ShuntCfg {
    pub fn amp_per_millivolt(&self) -> f32 {
        self.rated_amps / self.rated_millivolts
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Shunts {
    /// Load side shunt (50 A / 75 mV).
    pub chalet: ShuntCfg,
    /// Charger side shunt (100 A / 75 mV).
    pub ctek: ShuntCfg,
}

impl Default for Shunts {
    fn default() -> Self {
        Self {
            chalet: ShuntCfg {
                gain: GainSetting::Fsr0p256,
                mux: MuxSetting::P0N1,
                rated_amps: 50.0,
                rated_millivolts: 75.0,
            },
            ctek: ShuntCfg {
                gain: GainSetting::Fsr0p256,
                mux: MuxSetting::P2N3,
                rated_amps: 100.0,
                rated_millivolts: 75.0,
            },
        }
    }
}

/// Pack voltage divider on the second amplifier.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoltageCfg {
    pub r1_ohms: f32,
    pub r2_ohms: f32,
    pub calibrate: f32,
    pub gain: GainSetting,
    pub mux: MuxSetting,
}

impl Default for VoltageCfg {
    fn default() -> Self {
        Self {
            r1_ohms: 3298.0,
            r2_ohms: 816.0,
            calibrate: 1.0,
            gain: GainSetting::Fsr4p096,
            mux: MuxSetting::P2Gnd,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlowChannelCfg {
    /// Rated flow in L/min.
    pub capacity: f32,
    /// Pulses per liter.
    pub k_factor: f32,
    /// Optional per-decile correction; defaults to all 1.0.
    #[serde(default)]
    pub correction: Option<Vec<f32>>,
    /// Optional `decile,m_factor` CSV; takes precedence over `correction`.
    #[serde(default)]
    pub correction_csv: Option<PathBuf>,
}

impl FlowChannelCfg {
    fn with_k(capacity: f32, k_factor: f32) -> Self {
        Self {
            capacity,
            k_factor,
            correction: None,
            correction_csv: None,
        }
    }

    /// Resolve the correction table from CSV, inline list, or defaults.
    pub fn correction_table(&self) -> eyre::Result<[f32; DECILES]> {
        if let Some(path) = &self.correction_csv {
            return load_correction_csv(path);
        }
        match &self.correction {
            Some(v) => {
                let table: [f32; DECILES] = v.as_slice().try_into().map_err(|_| {
                    eyre::eyre!("correction table needs {DECILES} entries, got {}", v.len())
                })?;
                Ok(table)
            }
            None => Ok([1.0; DECILES]),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Flow {
    pub fill: FlowChannelCfg,
    pub drain: FlowChannelCfg,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            fill: FlowChannelCfg::with_k(30.0, 4.5),
            drain: FlowChannelCfg::with_k(30.0, 2.2),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Filters {
    /// Moving average window for shunt current.
    pub current_window: usize,
    /// Moving average window for time remaining.
    pub time_left_window: usize,
    /// Responsiveness of the ADC denoiser; smaller is smoother.
    pub snap_multiplier: f32,
    /// Largest magnitude (exclusive) the denoiser will output.
    pub resolution: u32,
    /// Filtered counts below this read as zero current.
    pub deadband_counts: i32,
}

impl Default for Filters {
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Archive {
    /// Maximum staleness of the battery record.
    pub battery_interval_ms: u64,
    /// Amp-hour drift that forces a battery archive.
    pub battery_drift_ah: f32,
    /// How long flow must be idle before the tank record is written.
    pub tank_idle_ms: u64,
    /// Extra attempts after a failed record write.
    pub write_retries: u8,
}

impl Default for Archive {
    fn default() -> Self {
        Self {
            battery_interval_ms: 600_000,
            battery_drift_ah: 1.0,
            tank_idle_ms: 600_000,
            write_retries: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Tank {
    pub capacity_litres: f32,
}

impl Default for Tank {
    fn default() -> Self {
        Self {
            capacity_litres: 60.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Storage {
    /// Directory holding one text file per persisted record.
    pub dir: PathBuf,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("records"),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Hardware {
    /// I2C bus number of both amplifiers.
    pub i2c_bus: u8,
    /// Amplifier measuring both shunts.
    pub current_adc_addr: u16,
    /// Amplifier measuring pack voltage.
    pub voltage_adc_addr: u16,
    pub fill_flow_pin: u8,
    pub drain_flow_pin: u8,
    /// Main loop period.
    pub tick_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            current_adc_addr: 0x48,
            voltage_adc_addr: 0x49,
            fill_flow_pin: 2,
            drain_flow_pin: 3,
            tick_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub battery: BatteryCfg,
    pub shunts: Shunts,
    pub voltage: VoltageCfg,
    pub flow: Flow,
    pub filters: Filters,
    pub archive: Archive,
    pub tank: Tank,
    pub storage: Storage,
    pub logging: Logging,
    pub hardware: Hardware,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// One row of a correction table CSV.
///
/// Expected headers:
/// decile,m_factor
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CorrectionRow {
    pub decile: usize,
    pub m_factor: f32,
}

pub fn load_correction_csv(path: &Path) -> eyre::Result<[f32; DECILES]> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open correction CSV {:?}: {}", path, e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["decile", "m_factor"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "correction CSV must have headers 'decile,m_factor', got: {}",
            actual.join(",")
        );
    }

    let mut table = [None; DECILES];
    for (idx, rec) in rdr.deserialize::<CorrectionRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.decile >= DECILES {
            eyre::bail!("row {}: decile {} out of range 0..=9", idx + 2, row.decile);
        }
        if !(row.m_factor.is_finite() && row.m_factor > 0.0) {
            eyre::bail!("row {}: m_factor must be > 0", idx + 2);
        }
        if table[row.decile].replace(row.m_factor).is_some() {
            eyre::bail!("row {}: decile {} listed twice", idx + 2, row.decile);
        }
    }

    let mut out = [0.0; DECILES];
    for (i, slot) in table.iter().enumerate() {
        out[i] = slot.ok_or_else(|| eyre::eyre!("correction CSV is missing decile {i}"))?;
    }
    Ok(out)
}

fn positive(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Battery
        let b = &self.battery;
        if !(0.0..=100.0).contains(&b.min_battery_level) {
            eyre::bail!("battery.min_battery_level must be in [0, 100]");
        }
        if !positive(b.full_capacity) {
            eyre::bail!("battery.full_capacity must be > 0");
        }
        if !positive(b.capacity_hours) {
            eyre::bail!("battery.capacity_hours must be > 0");
        }
        if !(b.peukert_value.is_finite() && b.peukert_value >= 1.0) {
            eyre::bail!("battery.peukert_value must be >= 1.0");
        }
        if !(b.coulomb_efficiency > 0.0 && b.coulomb_efficiency <= 1.0) {
            eyre::bail!("battery.coulomb_efficiency must be in (0.0, 1.0]");
        }

        // Shunts
        for (name, s) in [("chalet", &self.shunts.chalet), ("ctek", &self.shunts.ctek)] {
            if !positive(s.rated_amps) || !positive(s.rated_millivolts) {
                eyre::bail!("shunts.{name} ratings must be > 0");
            }
            if !s.mux.is_differential() {
                eyre::bail!("shunts.{name}.mux must be a differential pair");
            }
        }

        // Voltage divider
        if !positive(self.voltage.r1_ohms) || !positive(self.voltage.r2_ohms) {
            eyre::bail!("voltage divider resistances must be > 0");
        }
        if !positive(self.voltage.calibrate) {
            eyre::bail!("voltage.calibrate must be > 0");
        }

        // Flow
        for (name, f) in [("fill", &self.flow.fill), ("drain", &self.flow.drain)] {
            if !positive(f.capacity) {
                eyre::bail!("flow.{name}.capacity must be > 0");
            }
            if !positive(f.k_factor) {
                eyre::bail!("flow.{name}.k_factor must be > 0");
            }
            let table = f
                .correction_table()
                .map_err(|e| eyre::eyre!("flow.{name}: {e}"))?;
            if table.iter().any(|m| !positive(*m)) {
                eyre::bail!("flow.{name}.correction factors must be > 0");
            }
        }

        // Filters
        if self.filters.current_window == 0 {
            eyre::bail!("filters.current_window must be >= 1");
        }
        if self.filters.time_left_window == 0 {
            eyre::bail!("filters.time_left_window must be >= 1");
        }
        if !positive(self.filters.snap_multiplier) {
            eyre::bail!("filters.snap_multiplier must be > 0");
        }
        if self.filters.resolution < 2 {
            eyre::bail!("filters.resolution must be >= 2");
        }
        if self.filters.deadband_counts < 0 {
            eyre::bail!("filters.deadband_counts must be >= 0");
        }

        // Archive
        if self.archive.battery_interval_ms == 0 {
            eyre::bail!("archive.battery_interval_ms must be >= 1");
        }
        if !positive(self.archive.battery_drift_ah) {
            eyre::bail!("archive.battery_drift_ah must be > 0");
        }
        if self.archive.tank_idle_ms == 0 {
            eyre::bail!("archive.tank_idle_ms must be >= 1");
        }

        // Tank
        if !(self.tank.capacity_litres.is_finite() && self.tank.capacity_litres >= 0.0) {
            eyre::bail!("tank.capacity_litres must be >= 0");
        }

        // Hardware
        if self.hardware.tick_ms == 0 {
            eyre::bail!("hardware.tick_ms must be >= 1");
        }

        Ok(())
    }
}

impl MuxSetting {
    pub fn is_differential(self) -> bool {
        matches!(
            self,
            MuxSetting::P0N1 | MuxSetting::P0N3 | MuxSetting::P1N3 | MuxSetting::P2N3
        )
    }
}

impl From<GainSetting> for Gain {
    fn from(g: GainSetting) -> Self {
        match g {
            GainSetting::Fsr6p144 => Gain::Fsr6p144,
            GainSetting::Fsr4p096 => Gain::Fsr4p096,
            GainSetting::Fsr2p048 => Gain::Fsr2p048,
            GainSetting::Fsr1p024 => Gain::Fsr1p024,
            GainSetting::Fsr0p512 => Gain::Fsr0p512,
            GainSetting::Fsr0p256 => Gain::Fsr0p256,
        }
    }
}

impl From<MuxSetting> for Mux {
    fn from(m: MuxSetting) -> Self {
        match m {
            MuxSetting::P0N1 => Mux::P0N1,
            MuxSetting::P0N3 => Mux::P0N3,
            MuxSetting::P1N3 => Mux::P1N3,
            MuxSetting::P2N3 => Mux::P2N3,
            MuxSetting::P0Gnd => Mux::P0Gnd,
            MuxSetting::P1Gnd => Mux::P1Gnd,
            MuxSetting::P2Gnd => Mux::P2Gnd,
            MuxSetting::P3Gnd => Mux::P3Gnd,
        }
    }
}
