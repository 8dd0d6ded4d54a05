//! In-memory doubles for the ADC and record store seams.
//!
//! Public so downstream crates and integration tests can drive the
//! estimators without hardware.

use std::collections::{HashMap, VecDeque};

use chalet_traits::{Adc, BoxError, Gain, Mux, RecordStore};

/// ADC returning a scripted sequence of counts.
///
/// Once the script runs out the last count repeats. Injected failures do not
/// consume a scripted count.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdc {
    script: VecDeque<i16>,
    last: i16,
    fail_next: usize,
    config: Option<(Gain, Mux)>,
    connected: bool,
    conversions: usize,
}

impl ScriptedAdc {
    pub fn new(counts: impl IntoIterator<Item = i16>) -> Self {
        Self {
            script: counts.into_iter().collect(),
            connected: true,
            ..Self::default()
        }
    }

    /// Queue more counts after the current script.
    pub fn push(&mut self, counts: impl IntoIterator<Item = i16>) {
        self.script.extend(counts);
    }

    /// Make the next `n` conversions fail.
    pub fn fail_next(&mut self, n: usize) {
        self.fail_next = n;
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn last_config(&self) -> Option<(Gain, Mux)> {
        self.config
    }

    /// Successful conversions so far.
    pub fn conversions(&self) -> usize {
        self.conversions
    }
}

impl Adc for ScriptedAdc {
    fn configure(&mut self, gain: Gain, mux: Mux) -> Result<(), BoxError> {
        self.config = Some((gain, mux));
        Ok(())
    }

    fn convert(&mut self) -> Result<i16, BoxError> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err("conversion timeout".into());
        }
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.conversions += 1;
        Ok(self.last)
    }

    fn mv_per_count(&self) -> f32 {
        self.config.map_or(Gain::default(), |(g, _)| g).mv_per_count()
    }

    fn test_connection(&mut self) -> bool {
        self.connected
    }
}

/// Record store backed by a map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: HashMap<String, String>,
    fail_writes: usize,
    fail_reads: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, name: &str, record: &str) -> Self {
        self.records.insert(name.to_string(), record.to_string());
        self
    }

    /// Make the next `n` writes fail.
    pub fn fail_writes(&mut self, n: usize) {
        self.fail_writes = n;
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.records.get(name).map(String::as_str)
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RecordStore for MemoryStore {
    fn read(&mut self, name: &str) -> Result<Option<String>, BoxError> {
        if self.fail_reads {
            return Err(format!("read {name}: medium not ready").into());
        }
        Ok(self.records.get(name).cloned())
    }

    fn write(&mut self, name: &str, record: &str) -> Result<(), BoxError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(format!("write {name}: medium full").into());
        }
        self.records.insert(name.to_string(), record.to_string());
        self.writes += 1;
        Ok(())
    }
}
