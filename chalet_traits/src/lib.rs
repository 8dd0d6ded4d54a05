//! Hardware and storage seams for the chalet monitor.
//!
//! The estimation engine only ever talks to an ADC, a record store and a
//! clock through these traits, so it runs unchanged against real amplifiers,
//! simulated ones, and in-memory test doubles.

pub mod adc;
pub mod clock;

pub use adc::{Adc, Gain, Mux};
pub use clock::{Clock, MonotonicClock};

/// Boxed error used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Durable store of named text records (one record per entity).
///
/// A missing record is not an error: `read` returns `Ok(None)`.
pub trait RecordStore {
    fn read(&mut self, name: &str) -> Result<Option<String>, BoxError>;
    /// Replace the record called `name` with `record`.
    fn write(&mut self, name: &str, record: &str) -> Result<(), BoxError>;
}

impl<T: RecordStore + ?Sized> RecordStore for &mut T {
    fn read(&mut self, name: &str) -> Result<Option<String>, BoxError> {
        (**self).read(name)
    }
    fn write(&mut self, name: &str, record: &str) -> Result<(), BoxError> {
        (**self).write(name, record)
    }
}

impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    fn read(&mut self, name: &str) -> Result<Option<String>, BoxError> {
        (**self).read(name)
    }
    fn write(&mut self, name: &str, record: &str) -> Result<(), BoxError> {
        (**self).write(name, record)
    }
}
