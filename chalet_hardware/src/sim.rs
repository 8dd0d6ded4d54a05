//! Host-side stand-ins for the amplifiers and flow meters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chalet_traits::{Adc, BoxError, Gain, Mux};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::HwError;

/// Simulated amplifier: each multiplexer input reads a programmed count
/// plus a small jitter, reproducible for a given seed.
#[derive(Debug, Clone)]
pub struct SimulatedAdc {
    counts: HashMap<Mux, i16>,
    jitter: i16,
    gain: Gain,
    mux: Mux,
    rng: SmallRng,
    connected: bool,
}

const DEFAULT_SEED: u64 = 0x2545_F491;

impl Default for SimulatedAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdc {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            jitter: 0,
            gain: Gain::default(),
            mux: Mux::default(),
            rng: SmallRng::seed_from_u64(DEFAULT_SEED),
            connected: true,
        }
    }

    /// Program the count read on `mux`.
    pub fn with_counts(mut self, mux: Mux, counts: i16) -> Self {
        self.counts.insert(mux, counts);
        self
    }

    /// Add up to +/- `jitter` counts of noise to every conversion.
    pub fn with_jitter(mut self, jitter: i16) -> Self {
        self.jitter = jitter.max(0);
        self
    }

    /// Reseed the jitter source.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.connected = false;
        self
    }

    pub fn set_counts(&mut self, mux: Mux, counts: i16) {
        self.counts.insert(mux, counts);
    }

    fn noise(&mut self) -> i16 {
        if self.jitter == 0 {
            return 0;
        }
        self.rng.gen_range(-self.jitter..=self.jitter)
    }
}

impl Adc for SimulatedAdc {
    fn configure(&mut self, gain: Gain, mux: Mux) -> Result<(), BoxError> {
        self.gain = gain;
        self.mux = mux;
        Ok(())
    }

    fn convert(&mut self) -> Result<i16, BoxError> {
        if !self.connected {
            return Err(Box::new(HwError::ConversionTimeout));
        }
        let base = self.counts.get(&self.mux).copied().unwrap_or(0);
        let noise = self.noise();
        Ok(base.saturating_add(noise))
    }

    fn mv_per_count(&self) -> f32 {
        self.gain.mv_per_count()
    }

    fn test_connection(&mut self) -> bool {
        self.connected
    }
}

/// Background thread calling `on_edge` at a steady rate, standing in for a
/// flow meter's rising-edge interrupt.
pub struct PulseGenerator {
    hz: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PulseGenerator {
    pub fn spawn(hz: u32, on_edge: impl Fn() + Send + 'static) -> Self {
        let rate = Arc::new(AtomicU32::new(hz));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let rate = rate.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let hz = rate.load(Ordering::Relaxed);
                    if hz == 0 {
                        thread::sleep(Duration::from_millis(10));
                        continue;
                    }
                    on_edge();
                    thread::sleep(Duration::from_micros(1_000_000 / u64::from(hz)));
                }
            })
        };
        Self {
            hz: rate,
            stop,
            handle: Some(handle),
        }
    }

    pub fn set_rate(&self, hz: u32) {
        self.hz.store(hz, Ordering::Relaxed);
    }

    pub fn rate(&self) -> u32 {
        self.hz.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                tracing::warn!("pulse generator thread panicked");
            }
        }
    }
}

impl Drop for PulseGenerator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PulseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseGenerator")
            .field("hz", &self.rate())
            .field("running", &self.handle.is_some())
            .finish()
    }
}
