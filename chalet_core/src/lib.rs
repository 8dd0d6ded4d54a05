#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Sensor estimation and telemetry engine for an off-grid chalet.
//!
//! Turns raw pulse counts and noisy shunt readings into flow rates, volumes,
//! currents, amp-hours and time remaining, decides when that state must be
//! committed to durable storage, and packs it into compact telemetry frames.
//! All hardware goes through `chalet_traits::Adc`, `RecordStore` and `Clock`.
//!
//! ## Architecture
//!
//! - **Filters**: bounded moving average and adaptive denoiser (`filters`)
//! - **Flow**: interrupt-safe pulse accumulator (`pulse`), decile-corrected
//!   flow estimator (`flow`), fill/drain monitor (`water`), tank (`tank`)
//! - **Battery**: shunt coulomb counter (`shunt`), Peukert-adjusted capacity
//!   estimator (`battery`)
//! - **Persistence**: archive gate (`archive`), text records
//!   (`persistence`), file store (`store`)
//! - **Telemetry**: packed binary snapshots (`telemetry`)

pub mod archive;
pub mod battery;
pub mod config;
pub mod conversions;
pub mod error;
pub mod filters;
pub mod flow;
pub mod hw_error;
pub mod mocks;
pub mod persistence;
pub mod pulse;
pub mod shunt;
pub mod store;
pub mod tank;
pub mod telemetry;
pub mod util;
pub mod water;

pub use archive::{ArchiveGate, ArchivePolicy};
pub use battery::{AdcStatus, BatteryProfile, BatteryStateRecord, CapacityEstimator};
pub use config::{BatteryCfg, FilterCfg, VoltageDivider};
pub use error::{ChaletError, DecodeError, RecordError, Result};
pub use flow::{FlowChannelProperties, FlowRateEstimator, FlowTick};
pub use persistence::Record;
pub use pulse::{PulseAccumulator, PulseSample};
pub use shunt::{ShuntChannelConfig, ShuntCurrentSensor, ShuntSnapshot};
pub use store::FileStore;
pub use tank::{TankRecord, TankState};
pub use telemetry::{BatteryTelemetry, CalibrationTelemetry, TankTelemetry, TelemetryRecord};
pub use water::{CalibrationMode, WaterFlowMonitor, WaterTotals};
