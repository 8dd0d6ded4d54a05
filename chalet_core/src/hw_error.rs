//! Maps `Box<dyn Error>` from trait boundaries to typed `ChaletError`.
//!
//! The traits in `chalet_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver or store can plug in; this module converts those to our typed
//! error enum, with an optional feature-gated path for
//! `chalet_hardware::HwError` downcasting.

use crate::error::ChaletError;

/// Map an ADC trait-boundary error to a typed `ChaletError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_adc_error(e: &(dyn std::error::Error + 'static)) -> ChaletError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<chalet_hardware::error::HwError>() {
            return match hw {
                chalet_hardware::error::HwError::ConversionTimeout => ChaletError::AdcTimeout,
                other => ChaletError::Adc(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ChaletError::AdcTimeout
    } else {
        ChaletError::Adc(s)
    }
}

/// Map a record store trait-boundary error to `ChaletError::Storage`.
pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> ChaletError {
    ChaletError::Storage(e.to_string())
}
