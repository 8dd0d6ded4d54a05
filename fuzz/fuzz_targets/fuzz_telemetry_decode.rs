#![no_main]
use chalet_core::{BatteryTelemetry, CalibrationTelemetry, TankTelemetry, TelemetryRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = BatteryTelemetry::decode(data);
    let _ = TankTelemetry::decode(data);
    if let Ok((method, rec)) = CalibrationTelemetry::decode(data) {
        // Accepted frames re-encode to the same bytes.
        assert_eq!(rec.encode(method), data);
    }
});
