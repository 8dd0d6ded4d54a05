//! Edge-interrupt pulse counting.
//!
//! The counter is the only state shared between interrupt context and the
//! main loop. Increments and the read-and-reset are single atomic RMW
//! operations, so a pulse landing while the main loop drains is counted
//! exactly once: either in this drain or in the next.
//!
//! The counter is 32 bits and wraps; pulse rate x tick interval must stay
//! below `u32::MAX` between drains.

use std::sync::atomic::{AtomicU32, Ordering};

/// Pulses drained over one tick interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseSample {
    pub pulses: u32,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
pub struct PulseAccumulator {
    pulses: AtomicU32,
}

impl PulseAccumulator {
    pub const fn new() -> Self {
        Self {
            pulses: AtomicU32::new(0),
        }
    }

    /// Record one rising edge. Safe to call from interrupt context.
    #[inline]
    pub fn count(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically take the pulses accumulated since the previous drain.
    pub fn drain(&self, elapsed_ms: u64) -> PulseSample {
        let pulses = self.pulses.swap(0, Ordering::AcqRel);
        PulseSample { pulses, elapsed_ms }
    }

    /// Pulses counted since the last drain, without consuming them.
    pub fn pending(&self) -> u32 {
        self.pulses.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.pulses.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn drain_returns_and_resets() {
        let acc = PulseAccumulator::new();
        for _ in 0..15 {
            acc.count();
        }
        assert_eq!(acc.pending(), 15);
        assert_eq!(
            acc.drain(1000),
            PulseSample {
                pulses: 15,
                elapsed_ms: 1000
            }
        );
        assert_eq!(acc.drain(1000).pulses, 0);
    }

    #[test]
    fn concurrent_counts_are_never_lost_or_doubled() {
        const PER_THREAD: u32 = 50_000;
        const THREADS: u32 = 4;
        let acc = Arc::new(PulseAccumulator::new());

        let writers: Vec<_> = (0..THREADS)
            .map(|_| {
                let acc = acc.clone();
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        acc.count();
                    }
                })
            })
            .collect();

        let mut drained: u64 = 0;
        while writers.iter().any(|w| !w.is_finished()) {
            drained += u64::from(acc.drain(1).pulses);
        }
        for w in writers {
            w.join().expect("writer thread");
        }
        drained += u64::from(acc.drain(1).pulses);
        assert_eq!(drained, u64::from(PER_THREAD * THREADS));
    }
}
