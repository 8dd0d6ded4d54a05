use std::collections::VecDeque;

/// Running average over the last `capacity` samples.
///
/// Until the window fills, the average is taken over the samples received
/// so far; an empty window averages to 0.
#[derive(Debug, Clone)]
pub struct BoundedMovingAverage {
    buf: VecDeque<f32>,
    capacity: usize,
}

impl BoundedMovingAverage {
    /// `capacity` is clamped to at least one sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, evicting the oldest once full, and return the new average.
    pub fn add(&mut self, value: f32) -> f32 {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
        self.average()
    }

    #[allow(clippy::cast_precision_loss)] // windows hold tens of samples
    pub fn average(&self) -> f32 {
        if self.buf.is_empty() {
            return 0.0;
        }
        self.buf.iter().sum::<f32>() / self.buf.len() as f32
    }

    /// Seed the window so that `average()` returns `value`.
    ///
    /// The whole window is filled, so a restored average decays toward live
    /// readings only as fast as the window turns over.
    pub fn set_average(&mut self, value: f32) {
        self.buf.clear();
        self.buf.extend(std::iter::repeat_n(value, self.capacity));
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
