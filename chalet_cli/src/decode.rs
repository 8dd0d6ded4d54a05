//! Decode a hex telemetry frame into JSON.

use chalet_core::{
    BatteryTelemetry, CalibrationTelemetry, ChaletError, TankTelemetry, TelemetryRecord,
};
use eyre::WrapErr;
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::FrameKind;

fn to_json<R: TelemetryRecord + Serialize>(bytes: &[u8]) -> eyre::Result<Value> {
    let (method, record) = R::decode(bytes).map_err(ChaletError::from)?;
    Ok(json!({ "method": method, "record": record }))
}

pub fn decode_frame(kind: FrameKind, hex_frame: &str) -> eyre::Result<Value> {
    let cleaned: String = hex_frame.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).wrap_err("invalid hex frame")?;
    match kind {
        FrameKind::Battery => to_json::<BatteryTelemetry>(&bytes),
        FrameKind::Tank => to_json::<TankTelemetry>(&bytes),
        FrameKind::Calibration => to_json::<CalibrationTelemetry>(&bytes),
    }
}

pub fn run_decode(kind: FrameKind, hex_frame: &str) -> eyre::Result<()> {
    let out = decode_frame(kind, hex_frame)?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tank_frame_decodes_with_method() {
        let rec = TankTelemetry {
            tank_volume: 1000.0,
            ..TankTelemetry::default()
        };
        let frame = hex::encode(rec.encode(7));
        let v = decode_frame(FrameKind::Tank, &frame).unwrap();
        assert_eq!(v["method"], 7);
        assert_eq!(v["record"]["tank_volume"], 1000.0);
    }

    #[test]
    fn short_frame_is_a_decode_error() {
        let err = decode_frame(FrameKind::Battery, "0102").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChaletError>(),
            Some(ChaletError::Decode(_))
        ));
    }

    #[test]
    fn non_hex_is_rejected() {
        assert!(decode_frame(FrameKind::Tank, "zz").is_err());
    }
}
