//! Fixed-layout binary snapshots of live estimator state.
//!
//! Every frame is a 1-byte method tag followed by packed little-endian
//! fields with no padding. Frame sizes are fixed per record and checked on
//! decode; a frame of any other length is rejected before a field is read.

use chalet_traits::Adc;
use serde::Serialize;

use crate::battery::CapacityEstimator;
use crate::error::DecodeError;
use crate::flow::DECILES;
use crate::tank::TankState;
use crate::water::{CalibrationMode, WaterFlowMonitor};

/// A record with a fixed wire layout.
pub trait TelemetryRecord: Sized {
    /// Frame length including the method tag.
    const SIZE: usize;

    /// Serialize behind `method`.
    fn encode(&self, method: u8) -> Vec<u8>;

    /// Parse a frame into `(method, record)`.
    fn decode(frame: &[u8]) -> Result<(u8, Self), DecodeError>;

    /// Overwrite `self` from a received frame. On error `self` is untouched.
    fn unmarshall(&mut self, frame: &[u8]) -> Result<u8, DecodeError> {
        let (method, record) = Self::decode(frame)?;
        *self = record;
        Ok(method)
    }
}

struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    fn new(method: u8, size: usize) -> Self {
        let mut buf = Vec::with_capacity(size);
        buf.push(method);
        Self { buf }
    }

    fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    fn f32(mut self, v: f32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields from a frame whose length has already been checked.
struct FrameReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FrameReader<'a> {
    fn checked(frame: &'a [u8], expected: usize) -> Result<Self, DecodeError> {
        if frame.len() != expected {
            return Err(DecodeError::WrongSize {
                expected,
                actual: frame.len(),
            });
        }
        Ok(Self {
            buf: frame,
            offset: 0,
        })
    }

    fn u8(&mut self) -> u8 {
        let v = self.buf[self.offset];
        self.offset += 1;
        v
    }

    fn f32(&mut self) -> f32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[self.offset..self.offset + 4]);
        self.offset += 4;
        f32::from_le_bytes(bytes)
    }
}

/// Battery monitor snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatteryTelemetry {
    pub battery_volts: f32,
    pub chalet_amp_hours: f32,
    pub chalet_adjusted_amp_hours: f32,
    pub chalet_current: f32,
    pub chalet_average_current: f32,
    pub ctek_amp_hours: f32,
    pub ctek_adjusted_amp_hours: f32,
    pub ctek_current: f32,
    pub ctek_average_current: f32,
    pub time_left: f32,
    pub full_capacity: f32,
    pub adjusted_capacity: f32,
    pub remaining_capacity: f32,
    pub peukert_factor: f32,
    pub coulomb_efficiency: f32,
    pub peukert_value: f32,
}

impl BatteryTelemetry {
    pub fn marshall<I: Adc, V: Adc>(est: &CapacityEstimator<I, V>) -> Self {
        let (chalet, ctek) = (est.chalet(), est.ctek());
        Self {
            battery_volts: est.battery_volts(),
            chalet_amp_hours: chalet.amp_hours(),
            chalet_adjusted_amp_hours: chalet.adjusted_amp_hours(),
            chalet_current: chalet.current(),
            chalet_average_current: chalet.average_current(),
            ctek_amp_hours: ctek.amp_hours(),
            ctek_adjusted_amp_hours: ctek.adjusted_amp_hours(),
            ctek_current: ctek.current(),
            ctek_average_current: ctek.average_current(),
            time_left: est.time_left(),
            full_capacity: est.profile().full_capacity,
            adjusted_capacity: est.adjusted_capacity(),
            remaining_capacity: est.remaining_capacity(),
            peukert_factor: est.peukert_factor(),
            coulomb_efficiency: est.profile().coulomb_efficiency,
            peukert_value: est.profile().peukert_value,
        }
    }

    fn fields(&self) -> [f32; 16] {
        [
            self.battery_volts,
            self.chalet_amp_hours,
            self.chalet_adjusted_amp_hours,
            self.chalet_current,
            self.chalet_average_current,
            self.ctek_amp_hours,
            self.ctek_adjusted_amp_hours,
            self.ctek_current,
            self.ctek_average_current,
            self.time_left,
            self.full_capacity,
            self.adjusted_capacity,
            self.remaining_capacity,
            self.peukert_factor,
            self.coulomb_efficiency,
            self.peukert_value,
        ]
    }
}

impl TelemetryRecord for BatteryTelemetry {
    const SIZE: usize = 1 + 16 * 4;

    fn encode(&self, method: u8) -> Vec<u8> {
        self.fields()
            .into_iter()
            .fold(FrameWriter::new(method, Self::SIZE), FrameWriter::f32)
            .finish()
    }

    fn decode(frame: &[u8]) -> Result<(u8, Self), DecodeError> {
        let mut r = FrameReader::checked(frame, Self::SIZE)?;
        let method = r.u8();
        let record = Self {
            battery_volts: r.f32(),
            chalet_amp_hours: r.f32(),
            chalet_adjusted_amp_hours: r.f32(),
            chalet_current: r.f32(),
            chalet_average_current: r.f32(),
            ctek_amp_hours: r.f32(),
            ctek_adjusted_amp_hours: r.f32(),
            ctek_current: r.f32(),
            ctek_average_current: r.f32(),
            time_left: r.f32(),
            full_capacity: r.f32(),
            adjusted_capacity: r.f32(),
            remaining_capacity: r.f32(),
            peukert_factor: r.f32(),
            coulomb_efficiency: r.f32(),
            peukert_value: r.f32(),
        };
        Ok((method, record))
    }
}

/// Tank snapshot, liters and L/min.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TankTelemetry {
    pub tank_volume: f32,
    pub drained_volume: f32,
    pub filled_volume: f32,
    pub nett_flow: f32,
    pub calibrate_volume: f32,
    pub measured_volume: f32,
    pub remaining_litres: f32,
}

impl TankTelemetry {
    pub fn marshall(tank: &TankState) -> Self {
        let r = tank.record();
        Self {
            tank_volume: r.tank_volume,
            drained_volume: r.drained_volume,
            filled_volume: r.filled_volume,
            nett_flow: r.nett_flow,
            calibrate_volume: r.calibrate_volume,
            measured_volume: tank.measured_volume(),
            remaining_litres: tank.remaining_litres(),
        }
    }
}

impl TelemetryRecord for TankTelemetry {
    const SIZE: usize = 1 + 7 * 4;

    fn encode(&self, method: u8) -> Vec<u8> {
        FrameWriter::new(method, Self::SIZE)
            .f32(self.tank_volume)
            .f32(self.drained_volume)
            .f32(self.filled_volume)
            .f32(self.nett_flow)
            .f32(self.calibrate_volume)
            .f32(self.measured_volume)
            .f32(self.remaining_litres)
            .finish()
    }

    fn decode(frame: &[u8]) -> Result<(u8, Self), DecodeError> {
        let mut r = FrameReader::checked(frame, Self::SIZE)?;
        let method = r.u8();
        let record = Self {
            tank_volume: r.f32(),
            drained_volume: r.f32(),
            filled_volume: r.f32(),
            nett_flow: r.f32(),
            calibrate_volume: r.f32(),
            measured_volume: r.f32(),
            remaining_litres: r.f32(),
        };
        Ok((method, record))
    }
}

/// Flow calibration exchange: the meter's reading of a run versus the
/// operator's measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CalibrationTelemetry {
    #[serde(serialize_with = "serialize_mode")]
    pub mode: CalibrationMode,
    pub decile: u8,
    /// Liters measured by the operator.
    pub measured_flow: f32,
    /// Liters the meter reported.
    pub calculated_flow: f32,
}

fn serialize_mode<S: serde::Serializer>(mode: &CalibrationMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u8(*mode as u8)
}

impl CalibrationTelemetry {
    pub fn marshall(monitor: &WaterFlowMonitor, tank: &TankState) -> Self {
        let mode = monitor.calibration_mode();
        let decile = match mode {
            CalibrationMode::Fill => monitor.fill().current_decile(),
            CalibrationMode::Drain => monitor.drain().current_decile(),
            CalibrationMode::None => 0,
        };
        Self {
            mode,
            decile: u8::try_from(decile.min(DECILES - 1)).unwrap_or_default(),
            measured_flow: tank.measured_volume(),
            calculated_flow: monitor.totals().calibrate_volume,
        }
    }
}

impl TelemetryRecord for CalibrationTelemetry {
    const SIZE: usize = 1 + 1 + 1 + 2 * 4;

    fn encode(&self, method: u8) -> Vec<u8> {
        FrameWriter::new(method, Self::SIZE)
            .u8(self.mode as u8)
            .u8(self.decile)
            .f32(self.measured_flow)
            .f32(self.calculated_flow)
            .finish()
    }

    fn decode(frame: &[u8]) -> Result<(u8, Self), DecodeError> {
        let mut r = FrameReader::checked(frame, Self::SIZE)?;
        let method = r.u8();
        let mode = CalibrationMode::try_from(r.u8())?;
        let decile = r.u8();
        if usize::from(decile) >= DECILES {
            return Err(DecodeError::DecileOutOfRange(decile));
        }
        let record = Self {
            mode,
            decile,
            measured_flow: r.f32(),
            calculated_flow: r.f32(),
        };
        Ok((method, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchivePolicy;
    use crate::flow::FlowChannelProperties;
    use crate::water::WaterTotals;
    use chalet_traits::clock::test_clock::TestClock;
    use std::sync::Arc;

    #[test]
    fn frame_sizes_match_packed_layouts() {
        assert_eq!(BatteryTelemetry::SIZE, 65);
        assert_eq!(TankTelemetry::SIZE, 29);
        assert_eq!(CalibrationTelemetry::SIZE, 11);
        assert_eq!(BatteryTelemetry::default().encode(3).len(), 65);
        assert_eq!(TankTelemetry::default().encode(3).len(), 29);
        assert_eq!(CalibrationTelemetry::default().encode(3).len(), 11);
    }

    #[test]
    fn tank_layout_is_little_endian_after_tag() {
        let t = TankTelemetry {
            tank_volume: 60.0,
            remaining_litres: 1.0,
            ..TankTelemetry::default()
        };
        let frame = t.encode(0x42);
        assert_eq!(frame[0], 0x42);
        assert_eq!(&frame[1..5], &60.0f32.to_le_bytes());
        assert_eq!(&frame[25..29], &1.0f32.to_le_bytes());
        assert_eq!(TankTelemetry::decode(&frame), Ok((0x42, t)));
    }

    #[test]
    fn wrong_size_leaves_record_untouched() {
        let mut t = TankTelemetry {
            tank_volume: 60.0,
            ..TankTelemetry::default()
        };
        let before = t;
        let frame = TankTelemetry::default().encode(1);
        assert_eq!(
            t.unmarshall(&frame[..28]),
            Err(DecodeError::WrongSize {
                expected: 29,
                actual: 28
            })
        );
        assert_eq!(t, before);
        let mut long = frame.clone();
        long.push(0);
        assert!(t.unmarshall(&long).is_err());
        assert_eq!(t.unmarshall(&frame), Ok(1));
        assert_eq!(t, TankTelemetry::default());
    }

    #[test]
    fn calibration_validates_mode_and_decile() {
        let mut frame = CalibrationTelemetry {
            mode: CalibrationMode::Drain,
            decile: 4,
            measured_flow: 10.0,
            calculated_flow: 9.5,
        }
        .encode(7);
        assert_eq!(&frame[..3], &[7, 1, 4]);
        frame[1] = 9;
        assert_eq!(
            CalibrationTelemetry::decode(&frame),
            Err(DecodeError::UnknownCalibrationMode(9))
        );
        frame[1] = 2;
        frame[2] = 10;
        assert_eq!(
            CalibrationTelemetry::decode(&frame),
            Err(DecodeError::DecileOutOfRange(10))
        );
    }

    #[test]
    fn tank_marshall_reports_remaining() {
        let clock = TestClock::new();
        let mut tank = TankState::new(60.0, ArchivePolicy::TANK, Arc::new(clock));
        tank.update_from_flow(&WaterTotals {
            drained_volume: 10.0,
            filled_volume: 2.5,
            nett_flow: -1.0,
            calibrate_volume: 0.0,
        });
        tank.set_measured_volume(3.0);
        let t = TankTelemetry::marshall(&tank);
        assert_eq!(t.remaining_litres, 52.5);
        assert_eq!(t.measured_volume, 3.0);
        assert_eq!(t.nett_flow, -1.0);
    }

    #[test]
    fn calibration_marshall_uses_selected_meter() {
        let clock = TestClock::new();
        let tank = TankState::new(60.0, ArchivePolicy::TANK, Arc::new(clock));
        let mut m = WaterFlowMonitor::new(
            FlowChannelProperties::new(30.0, 4.5),
            FlowChannelProperties::new(30.0, 2.2),
        );
        m.set_calibration_mode(CalibrationMode::Fill);
        let fill = m.fill_handle();
        for _ in 0..40 {
            fill.count();
        }
        m.tick(1000);
        let c = CalibrationTelemetry::marshall(&m, &tank);
        assert_eq!(c.mode, CalibrationMode::Fill);
        // 40 Hz over a 135 Hz rated capacity
        assert_eq!(c.decile, 2);
        assert!(c.calculated_flow > 0.0);
    }
}
