//! Print the persisted records without creating any that are missing.

use chalet_core::persistence::{
    BATTERY_PROFILE, BATTERY_STATE, DRAIN_PROPERTIES, FILL_PROPERTIES, TANK_STATE,
};
use chalet_core::{
    BatteryProfile, BatteryStateRecord, ChaletError, FileStore, FlowChannelProperties, Record,
    ShuntSnapshot, TankRecord,
};
use chalet_traits::RecordStore;
use eyre::WrapErr;
use serde_json::{Value, json};

fn read_record<R: Record>(store: &mut FileStore, name: &str, mut record: R) -> eyre::Result<Option<R>> {
    let Some(text) = store
        .read(name)
        .map_err(|e| ChaletError::Storage(e.to_string()))?
    else {
        return Ok(None);
    };
    record
        .decode_into(&text)
        .map_err(|source| ChaletError::Record {
            name: name.to_string(),
            source,
        })?;
    Ok(Some(record))
}

fn snapshot_json(s: &ShuntSnapshot) -> Value {
    json!({
        "amp_hours": s.amp_hours,
        "adjusted_amp_hours": s.adjusted_amp_hours,
        "average_current": s.average_current,
        "nett_amp_hours": s.nett_amp_hours,
    })
}

fn flow_json(p: &FlowChannelProperties) -> Value {
    json!({
        "capacity": p.capacity,
        "k_factor": p.k_factor,
        "correction": p.correction,
    })
}

/// Collect every record under the store's directory into one JSON object.
/// Records that do not exist yet show as `null`.
pub fn collect(store: &mut FileStore) -> eyre::Result<Value> {
    let profile = read_record(store, BATTERY_PROFILE, BatteryProfile::default())?.map(|p| {
        json!({
            "min_battery_level": p.min_battery_level,
            "full_capacity": p.full_capacity,
            "capacity_hours": p.capacity_hours,
            "peukert_value": p.peukert_value,
            "coulomb_efficiency": p.coulomb_efficiency,
        })
    });
    let state = read_record(store, BATTERY_STATE, BatteryStateRecord::default())?.map(|s| {
        json!({
            "chalet": snapshot_json(&s.chalet),
            "ctek": snapshot_json(&s.ctek),
            "average_time_left": s.average_time_left,
        })
    });
    let blank = FlowChannelProperties::new(0.0, 0.0);
    let fill = read_record(store, FILL_PROPERTIES, blank.clone())?.map(|p| flow_json(&p));
    let drain = read_record(store, DRAIN_PROPERTIES, blank)?.map(|p| flow_json(&p));
    let tank = read_record(store, TANK_STATE, TankRecord::default())?.map(|t| {
        json!({
            "tank_volume": t.tank_volume,
            "drained_volume": t.drained_volume,
            "filled_volume": t.filled_volume,
            "nett_flow": t.nett_flow,
            "calibrate_volume": t.calibrate_volume,
            "remaining_litres": t.remaining_litres(),
        })
    });

    Ok(json!({
        "dir": store.dir().display().to_string(),
        "battery": profile,
        "battery_state": state,
        "fill": fill,
        "drain": drain,
        "tank": tank,
    }))
}

pub fn run_show(dir: &std::path::Path) -> eyre::Result<()> {
    let mut store =
        FileStore::open(dir).wrap_err_with(|| format!("open record directory {}", dir.display()))?;
    let out = collect(&mut store)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
