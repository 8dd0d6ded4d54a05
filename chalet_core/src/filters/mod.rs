//! Signal conditioning shared by the current and time-remaining series.

pub mod denoise;
pub mod moving_average;

pub use denoise::AdaptiveDenoiser;
pub use moving_average::BoundedMovingAverage;
