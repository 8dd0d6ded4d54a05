use crate::BoxError;

/// Programmable gain setting (full-scale range) of a 16-bit delta-sigma ADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gain {
    /// +/- 6.144 V
    Fsr6p144,
    /// +/- 4.096 V
    Fsr4p096,
    /// +/- 2.048 V
    #[default]
    Fsr2p048,
    /// +/- 1.024 V
    Fsr1p024,
    /// +/- 0.512 V
    Fsr0p512,
    /// +/- 0.256 V
    Fsr0p256,
}

impl Gain {
    /// Millivolts represented by one count of a signed 16-bit conversion.
    pub fn mv_per_count(self) -> f32 {
        let full_scale_mv = match self {
            Gain::Fsr6p144 => 6144.0,
            Gain::Fsr4p096 => 4096.0,
            Gain::Fsr2p048 => 2048.0,
            Gain::Fsr1p024 => 1024.0,
            Gain::Fsr0p512 => 512.0,
            Gain::Fsr0p256 => 256.0,
        };
        full_scale_mv / 32768.0
    }

    /// PGA field value of the config register.
    pub fn code(self) -> u16 {
        match self {
            Gain::Fsr6p144 => 0,
            Gain::Fsr4p096 => 1,
            Gain::Fsr2p048 => 2,
            Gain::Fsr1p024 => 3,
            Gain::Fsr0p512 => 4,
            Gain::Fsr0p256 => 5,
        }
    }
}

/// Input multiplexer selection: differential pairs or single-ended to ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mux {
    #[default]
    P0N1,
    P0N3,
    P1N3,
    P2N3,
    P0Gnd,
    P1Gnd,
    P2Gnd,
    P3Gnd,
}

impl Mux {
    /// MUX field value of the config register.
    pub fn code(self) -> u16 {
        match self {
            Mux::P0N1 => 0,
            Mux::P0N3 => 1,
            Mux::P1N3 => 2,
            Mux::P2N3 => 3,
            Mux::P0Gnd => 4,
            Mux::P1Gnd => 5,
            Mux::P2Gnd => 6,
            Mux::P3Gnd => 7,
        }
    }

    pub fn is_differential(self) -> bool {
        matches!(self, Mux::P0N1 | Mux::P0N3 | Mux::P1N3 | Mux::P2N3)
    }
}

/// A multiplexed analog-to-digital converter.
///
/// `convert` blocks for the hardware conversion time; nothing else may block.
pub trait Adc {
    /// Select gain and input pair for the next conversion.
    fn configure(&mut self, gain: Gain, mux: Mux) -> Result<(), BoxError>;
    /// Perform one conversion on the configured inputs.
    fn convert(&mut self) -> Result<i16, BoxError>;
    /// Conversion constant for the currently configured gain.
    fn mv_per_count(&self) -> f32;
    /// Probe the device; `false` disables sensing on it for the session.
    fn test_connection(&mut self) -> bool;

    /// Configure, convert, and scale to millivolts.
    fn read_millivolts(&mut self, gain: Gain, mux: Mux) -> Result<f32, BoxError> {
        self.configure(gain, mux)?;
        let counts = self.convert()?;
        Ok(f32::from(counts) * self.mv_per_count())
    }
}

impl<T: Adc + ?Sized> Adc for Box<T> {
    fn configure(&mut self, gain: Gain, mux: Mux) -> Result<(), BoxError> {
        (**self).configure(gain, mux)
    }
    fn convert(&mut self) -> Result<i16, BoxError> {
        (**self).convert()
    }
    fn mv_per_count(&self) -> f32 {
        (**self).mv_per_count()
    }
    fn test_connection(&mut self) -> bool {
        (**self).test_connection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowest_range_resolution_matches_datasheet() {
        assert!((Gain::Fsr0p256.mv_per_count() - 0.0078125).abs() < 1e-9);
        assert!((Gain::Fsr4p096.mv_per_count() - 0.125).abs() < 1e-9);
    }

    #[test]
    fn single_ended_inputs_are_not_differential() {
        assert!(Mux::P0N1.is_differential());
        assert!(Mux::P2N3.is_differential());
        assert!(!Mux::P2Gnd.is_differential());
    }
}
