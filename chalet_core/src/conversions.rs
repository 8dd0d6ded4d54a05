//! `From` implementations bridging `chalet_config` types to engine types.
//! The gain and mux settings convert in `chalet_config` itself.

use crate::archive::ArchivePolicy;
use crate::battery::BatteryProfile;
use crate::config::{BatteryCfg, FilterCfg, VoltageDivider};
use crate::shunt::ShuntChannelConfig;

impl From<&chalet_config::BatteryCfg> for BatteryProfile {
    fn from(c: &chalet_config::BatteryCfg) -> Self {
        Self {
            min_battery_level: c.min_battery_level,
            full_capacity: c.full_capacity,
            capacity_hours: c.capacity_hours,
            peukert_value: c.peukert_value,
            coulomb_efficiency: c.coulomb_efficiency,
        }
    }
}

impl From<&chalet_config::ShuntCfg> for ShuntChannelConfig {
    fn from(c: &chalet_config::ShuntCfg) -> Self {
        ShuntChannelConfig::from_rating(c.gain.into(), c.mux.into(), c.rated_amps, c.rated_millivolts)
    }
}

impl From<&chalet_config::VoltageCfg> for VoltageDivider {
    fn from(c: &chalet_config::VoltageCfg) -> Self {
        Self {
            r1_ohms: c.r1_ohms,
            r2_ohms: c.r2_ohms,
            calibrate: c.calibrate,
            gain: c.gain.into(),
            mux: c.mux.into(),
        }
    }
}

impl From<&chalet_config::Filters> for FilterCfg {
    fn from(c: &chalet_config::Filters) -> Self {
        Self {
            current_window: c.current_window,
            time_left_window: c.time_left_window,
            snap_multiplier: c.snap_multiplier,
            resolution: c.resolution,
            deadband_counts: c.deadband_counts,
        }
    }
}

/// Battery state archive policy.
pub fn battery_archive_policy(c: &chalet_config::Archive) -> ArchivePolicy {
    ArchivePolicy {
        interval_ms: c.battery_interval_ms,
        drift_threshold: Some(c.battery_drift_ah),
        write_retries: c.write_retries,
    }
}

/// Tank archive policy: idle interval only.
pub fn tank_archive_policy(c: &chalet_config::Archive) -> ArchivePolicy {
    ArchivePolicy {
        interval_ms: c.tank_idle_ms,
        drift_threshold: None,
        write_retries: c.write_retries,
    }
}

impl From<&chalet_config::Config> for BatteryCfg {
    fn from(c: &chalet_config::Config) -> Self {
        Self {
            chalet: (&c.shunts.chalet).into(),
            ctek: (&c.shunts.ctek).into(),
            divider: (&c.voltage).into(),
            filters: (&c.filters).into(),
            archive: battery_archive_policy(&c.archive),
        }
    }
}

/// Flow channel properties from a config section. Fails if its correction
/// CSV cannot be read.
pub fn flow_properties(
    c: &chalet_config::FlowChannelCfg,
) -> eyre::Result<crate::flow::FlowChannelProperties> {
    Ok(crate::flow::FlowChannelProperties::new(c.capacity, c.k_factor)
        .with_correction(c.correction_table()?))
}
