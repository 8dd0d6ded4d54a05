//! Common time helpers for chalet_core.

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;
/// Number of seconds in one hour.
pub const SECS_PER_HOUR: f32 = 3_600.0;

/// Milliseconds as fractional seconds.
#[inline]
#[allow(clippy::cast_precision_loss)] // sub-millisecond rounding on multi-hour totals is fine
pub fn ms_to_secs(ms: u64) -> f32 {
    ms as f32 / MILLIS_PER_SEC as f32
}

/// Number of `elapsed_ms` intervals in one hour.
///
/// Zero elapsed time yields `+inf`, so `x / per_hour(0)` integrates to 0
/// rather than faulting.
#[inline]
pub fn per_hour(elapsed_ms: u64) -> f32 {
    SECS_PER_HOUR / ms_to_secs(elapsed_ms)
}
