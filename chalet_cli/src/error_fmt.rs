//! Human-readable error descriptions and structured JSON error formatting.

use chalet_core::{ChaletError, DecodeError};
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(de) = err.downcast_ref::<DecodeError>() {
        return decode_hint(de);
    }

    if let Some(ce) = err.downcast_ref::<ChaletError>() {
        return match ce {
            ChaletError::Decode(de) => decode_hint(de),
            ChaletError::Record { name, source } => format!(
                "What happened: Record {name} could not be parsed ({source}).\nLikely causes: The file was edited by hand or truncated.\nHow to fix: Correct or delete {name}; defaults are written on the next start."
            ),
            ChaletError::Storage(msg) => format!(
                "What happened: Record storage failed ({msg}).\nLikely causes: Missing write permission or a full card.\nHow to fix: Check storage.dir in the config and the free space on the device."
            ),
            ChaletError::Adc(_) | ChaletError::AdcTimeout => {
                "What happened: An amplifier did not answer.\nLikely causes: Wrong I2C bus or address, or no power on the ADS1115.\nHow to fix: Check [hardware] i2c_bus and the *_adc_addr values, then run `i2cdetect`.".to_string()
            }
            ChaletError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("invalid hex") || lower.contains("odd number of digits") {
        return "What happened: The frame is not valid hex.\nLikely causes: Stray characters or a truncated copy.\nHow to fix: Pass the frame as an even-length string of hex digits.".to_string();
    }

    if lower.contains("parse config") || lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: A typo or an out-of-range value in the TOML.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("correction csv") {
        return format!(
            "What happened: Flow correction table could not be read ({msg}).\nHow to fix: Expected headers 'decile,m_factor' and ten rows."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

fn decode_hint(de: &DecodeError) -> String {
    format!(
        "What happened: Telemetry frame rejected ({de}).\nLikely causes: The frame belongs to a different record kind or was cut short.\nHow to fix: Check --kind against the sender."
    )
}

/// Stable exit codes: 3 for rejected frames, 4 for unreadable records,
/// 1 for everything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<DecodeError>().is_some() {
        return 3;
    }
    match err.downcast_ref::<ChaletError>() {
        Some(ChaletError::Decode(_)) => 3,
        Some(ChaletError::Record { .. }) => 4,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    let reason = match err.downcast_ref::<ChaletError>() {
        Some(ChaletError::Decode(_)) => "Decode",
        Some(ChaletError::Record { .. }) => "Record",
        Some(ChaletError::Storage(_)) => "Storage",
        Some(ChaletError::Adc(_) | ChaletError::AdcTimeout) => "Adc",
        Some(ChaletError::Config(_)) => "Config",
        None if err.downcast_ref::<DecodeError>().is_some() => "Decode",
        None => "Error",
    };
    json!({ "reason": reason, "code": exit_code_for_error(err), "message": humanize(err) })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_size_frame_maps_to_decode_exit_code() {
        let err = eyre::Report::new(DecodeError::WrongSize {
            expected: 29,
            actual: 4,
        });
        assert_eq!(exit_code_for_error(&err), 3);
        assert!(humanize(&err).contains("expected 29 bytes"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Decode");
        assert_eq!(v["code"], 3);
    }

    #[test]
    fn bad_record_maps_to_record_exit_code() {
        let err = eyre::Report::new(ChaletError::Record {
            name: "tank.txt".into(),
            source: chalet_core::RecordError::BadToken {
                field: "nettFlow",
                token: "abc".into(),
            },
        });
        assert_eq!(exit_code_for_error(&err), 4);
        assert!(humanize(&err).contains("tank.txt"));
    }

    #[test]
    fn unknown_errors_fall_back_to_generic() {
        let err = eyre::eyre!("boom");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Original: boom"));
    }
}
