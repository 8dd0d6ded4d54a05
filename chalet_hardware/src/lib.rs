//! Amplifier and pulse-input drivers for the chalet monitor.
//!
//! Without the `hardware` feature only the simulated devices are built.

pub mod error;
pub mod sim;
pub mod util;

pub use sim::{PulseGenerator, SimulatedAdc};

#[cfg(feature = "hardware")]
pub mod ads1115;
#[cfg(feature = "hardware")]
pub mod edges;
