//! Text records for durable estimator state.
//!
//! Each entity is a fixed, ordered sequence of `|`-terminated decimal tokens:
//!
//! - `battery.txt`: `minBatteryLevel|fullCapacity|capacityHours|peukertValue|coulombEfficiency|`
//! - `batstate.txt`: `chaletAmpHours|chaletAdjustedAmpHours|chaletAvgCurrent|ctekAmpHours|ctekAdjustedAmpHours|ctekAvgCurrent|avgTimeLeft|chaletNettAmpHours|ctekNettAmpHours|`
//! - `fill.txt` / `drain.txt`: `capacity|kFactor|mFactor0|...|mFactor9|`
//! - `tank.txt`: `tankVolume|drainedVolume|filledVolume|nettFlow|calibrateVolume|`
//!
//! Parsing is positional and lenient about length: tokens past the known
//! fields are ignored and missing trailing tokens leave their fields as they
//! were, so records written by older or newer firmware still load. A token
//! that is present but not a number rejects the whole record and leaves the
//! target untouched.

use std::fmt::Write as _;

use chalet_traits::RecordStore;

use crate::battery::{BatteryProfile, BatteryStateRecord};
use crate::error::{ChaletError, RecordError, Result};
use crate::flow::{DECILES, FlowChannelProperties};
use crate::hw_error::map_store_error;
use crate::tank::TankRecord;

pub const BATTERY_PROFILE: &str = "battery.txt";
pub const BATTERY_STATE: &str = "batstate.txt";
pub const FILL_PROPERTIES: &str = "fill.txt";
pub const DRAIN_PROPERTIES: &str = "drain.txt";
pub const TANK_STATE: &str = "tank.txt";

/// Decimal places used for most fields.
pub const PRECISION: usize = 5;

/// Left-to-right reader over a `|`-delimited record.
pub struct Tokens<'a> {
    iter: std::str::Split<'a, char>,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            iter: text.trim().split('|'),
        }
    }

    /// Overwrite `slot` with the next token; absent or empty tokens keep it.
    pub fn read_f32(&mut self, field: &'static str, slot: &mut f32) -> Result<(), RecordError> {
        match self.iter.next().map(str::trim) {
            None | Some("") => Ok(()),
            Some(token) => {
                *slot = token.parse().map_err(|_| RecordError::BadToken {
                    field,
                    token: token.to_string(),
                })?;
                Ok(())
            }
        }
    }
}

/// Appends fixed-precision `value|` tokens.
#[derive(Debug, Default)]
pub struct RecordWriter {
    out: String,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, value: f32, precision: usize) -> Self {
        // Writing to a String cannot fail.
        let _ = write!(self.out, "{value:.precision$}|");
        self
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// An entity with a text record representation.
pub trait Record: Clone {
    fn encode(&self) -> String;

    /// Consume tokens in field order, overwriting fields of `self`.
    fn parse_fields(&mut self, tokens: &mut Tokens<'_>) -> Result<(), RecordError>;

    /// Parse `text` into `self`; an empty record is a no-op and a bad token
    /// leaves `self` unchanged.
    fn decode_into(&mut self, text: &str) -> Result<(), RecordError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let mut next = self.clone();
        next.parse_fields(&mut Tokens::new(text))?;
        *self = next;
        Ok(())
    }
}

impl Record for BatteryProfile {
    fn encode(&self) -> String {
        RecordWriter::new()
            .field(self.min_battery_level, PRECISION)
            .field(self.full_capacity, PRECISION)
            .field(self.capacity_hours, PRECISION)
            .field(self.peukert_value, PRECISION)
            .field(self.coulomb_efficiency, PRECISION)
            .finish()
    }

    fn parse_fields(&mut self, t: &mut Tokens<'_>) -> Result<(), RecordError> {
        t.read_f32("minBatteryLevel", &mut self.min_battery_level)?;
        t.read_f32("fullCapacity", &mut self.full_capacity)?;
        t.read_f32("capacityHours", &mut self.capacity_hours)?;
        t.read_f32("peukertValue", &mut self.peukert_value)?;
        t.read_f32("coulombEfficiency", &mut self.coulomb_efficiency)
    }
}

impl Record for BatteryStateRecord {
    fn encode(&self) -> String {
        RecordWriter::new()
            .field(self.chalet.amp_hours, PRECISION)
            .field(self.chalet.adjusted_amp_hours, PRECISION)
            .field(self.chalet.average_current, PRECISION)
            .field(self.ctek.amp_hours, PRECISION)
            .field(self.ctek.adjusted_amp_hours, PRECISION)
            .field(self.ctek.average_current, PRECISION)
            .field(self.average_time_left, PRECISION)
            .field(self.chalet.nett_amp_hours, PRECISION)
            .field(self.ctek.nett_amp_hours, PRECISION)
            .finish()
    }

    fn parse_fields(&mut self, t: &mut Tokens<'_>) -> Result<(), RecordError> {
        t.read_f32("chaletAmpHours", &mut self.chalet.amp_hours)?;
        t.read_f32("chaletAdjustedAmpHours", &mut self.chalet.adjusted_amp_hours)?;
        t.read_f32("chaletAvgCurrent", &mut self.chalet.average_current)?;
        t.read_f32("ctekAmpHours", &mut self.ctek.amp_hours)?;
        t.read_f32("ctekAdjustedAmpHours", &mut self.ctek.adjusted_amp_hours)?;
        t.read_f32("ctekAvgCurrent", &mut self.ctek.average_current)?;
        t.read_f32("avgTimeLeft", &mut self.average_time_left)?;
        t.read_f32("chaletNettAmpHours", &mut self.chalet.nett_amp_hours)?;
        t.read_f32("ctekNettAmpHours", &mut self.ctek.nett_amp_hours)
    }
}

impl Record for FlowChannelProperties {
    fn encode(&self) -> String {
        let mut w = RecordWriter::new()
            .field(self.capacity, 3)
            .field(self.k_factor, 3);
        for m in self.correction {
            w = w.field(m, PRECISION);
        }
        w.finish()
    }

    fn parse_fields(&mut self, t: &mut Tokens<'_>) -> Result<(), RecordError> {
        const M_FACTORS: [&str; DECILES] = [
            "mFactor0", "mFactor1", "mFactor2", "mFactor3", "mFactor4", "mFactor5", "mFactor6",
            "mFactor7", "mFactor8", "mFactor9",
        ];
        t.read_f32("capacity", &mut self.capacity)?;
        t.read_f32("kFactor", &mut self.k_factor)?;
        for (slot, name) in self.correction.iter_mut().zip(M_FACTORS) {
            t.read_f32(name, slot)?;
        }
        Ok(())
    }
}

impl Record for TankRecord {
    fn encode(&self) -> String {
        RecordWriter::new()
            .field(self.tank_volume, 2)
            .field(self.drained_volume, PRECISION)
            .field(self.filled_volume, PRECISION)
            .field(self.nett_flow, PRECISION)
            .field(self.calibrate_volume, PRECISION)
            .finish()
    }

    fn parse_fields(&mut self, t: &mut Tokens<'_>) -> Result<(), RecordError> {
        t.read_f32("tankVolume", &mut self.tank_volume)?;
        t.read_f32("drainedVolume", &mut self.drained_volume)?;
        t.read_f32("filledVolume", &mut self.filled_volume)?;
        t.read_f32("nettFlow", &mut self.nett_flow)?;
        t.read_f32("calibrateVolume", &mut self.calibrate_volume)
    }
}

/// Write `record` under `name`, retrying up to `retries` extra times.
pub fn store_record<S, R>(store: &mut S, name: &str, record: &R, retries: u8) -> Result<()>
where
    S: RecordStore + ?Sized,
    R: Record,
{
    let text = record.encode();
    let mut attempt: u8 = 0;
    loop {
        match store.write(name, &text) {
            Ok(()) => {
                tracing::debug!(record = name, %text, "record written");
                return Ok(());
            }
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(record = name, retries = attempt, error = %e, "record write failed, retrying");
            }
            Err(e) => {
                tracing::error!(record = name, error = %e, "record write failed");
                return Err(map_store_error(&*e).into());
            }
        }
    }
}

/// Load `name` into `record`, or persist `record` as the initial value when
/// the store has none (first boot). Returns whether a stored record existed.
pub fn load_or_init<S, R>(store: &mut S, name: &str, record: &mut R, retries: u8) -> Result<bool>
where
    S: RecordStore + ?Sized,
    R: Record,
{
    match store.read(name).map_err(|e| map_store_error(&*e))? {
        Some(text) => {
            record
                .decode_into(&text)
                .map_err(|source| ChaletError::Record {
                    name: name.to_string(),
                    source,
                })?;
            tracing::debug!(record = name, %text, "record loaded");
            Ok(true)
        }
        None => {
            tracing::info!(record = name, "no stored record, writing defaults");
            store_record(store, name, record, retries)?;
            Ok(false)
        }
    }
}
