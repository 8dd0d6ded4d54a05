use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `ready` until it reports `true` or `timeout` expires. Sleeps
/// `poll_interval` between polls; errors from `ready` end the wait.
pub fn wait_until_ready(
    mut ready: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !ready()? {
        if Instant::now() >= deadline {
            return Err(HwError::ConversionTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
