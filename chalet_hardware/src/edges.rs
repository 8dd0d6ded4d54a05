//! Rising-edge interrupts on the flow meter inputs.

use rppal::gpio::{Gpio, InputPin, Trigger};

use crate::error::{HwError, Result};

/// Keeps a pin's interrupt registered; dropping it detaches the handler.
pub struct EdgeInput {
    pin: InputPin,
}

impl EdgeInput {
    /// Call `on_edge` on every rising edge of `pin` (internal pull-down).
    pub fn attach(pin: u8, on_edge: impl Fn() + Send + 'static) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pulldown();
        pin.set_async_interrupt(Trigger::RisingEdge, move |_| on_edge())
            .map_err(|e| HwError::Gpio(e.to_string()))?;
        Ok(Self { pin })
    }

    pub fn pin(&self) -> u8 {
        self.pin.pin()
    }
}
