#![no_main]
use chalet_core::{BatteryProfile, BatteryStateRecord, FlowChannelProperties, Record, TankRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // A rejected record must leave the target untouched.
    let mut tank = TankRecord::with_capacity(60.0);
    if tank.decode_into(data).is_err() {
        assert_eq!(tank, TankRecord::with_capacity(60.0));
    }
    let _ = BatteryProfile::default().decode_into(data);
    let _ = BatteryStateRecord::default().decode_into(data);
    let _ = FlowChannelProperties::new(30.0, 7.5).decode_into(data);
});
