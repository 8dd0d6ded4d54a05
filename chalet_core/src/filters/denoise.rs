/// Responsive single-pole smoother for a noisy ADC magnitude.
///
/// Each update moves the smoothed value toward the new sample by a fraction
/// that grows with the size of the jump: small jitter is averaged away while
/// a real step is followed almost immediately. With `snap_multiplier = 0.01`
/// any jump of 100 counts or more is taken in one step.
#[derive(Debug, Clone)]
pub struct AdaptiveDenoiser {
    smooth: f32,
    value: i32,
    changed: bool,
    snap_multiplier: f32,
    /// Output is clamped to `[0, resolution - 1]`.
    resolution: u32,
}

impl Default for AdaptiveDenoiser {
    fn default() -> Self {
        Self::new(0.01, 32_768)
    }
}

impl AdaptiveDenoiser {
    pub fn new(snap_multiplier: f32, resolution: u32) -> Self {
        Self {
            smooth: 0.0,
            value: 0,
            changed: false,
            snap_multiplier,
            resolution: resolution.max(2),
        }
    }

    /// Maps a jump (scaled by the snap multiplier) to a 0..=1 follow fraction.
    fn snap_curve(x: f32) -> f32 {
        let y = 1.0 / (x + 1.0);
        ((1.0 - y) * 2.0).min(1.0)
    }

    /// Feed one raw magnitude and return the smoothed integer value.
    // Inputs and the clamp ceiling are ADC magnitudes, exact in f32; the
    // smoothed value is clamped non-negative before truncating.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn update(&mut self, raw: i32) -> i32 {
        let raw = raw as f32;
        let diff = (raw - self.smooth).abs();
        let snap = Self::snap_curve(diff * self.snap_multiplier);
        self.smooth += (raw - self.smooth) * snap;
        self.smooth = self.smooth.clamp(0.0, (self.resolution - 1) as f32);

        let prev = self.value;
        self.value = self.smooth as i32;
        self.changed = self.value != prev;
        self.value
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Whether the last update changed the integer output.
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn reset(&mut self) {
        self.smooth = 0.0;
        self.value = 0;
        self.changed = false;
    }
}
