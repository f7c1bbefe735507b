//! Analog front-end: turns raw ADC sample sets into published readings.
//!
//! Samples are left-aligned to 16 bits so the core calibrations apply
//! unchanged to the 12-bit converter.

use breaker_core::measurement::{Calibration, CurrentChannels, RmsAccumulator};
use breaker_core::switch::PowerStageTemperatures;

/// RMS window length as a power of two; 512 samples at 5 kHz span about five
/// mains cycles.
pub const RMS_WINDOW_SHIFT: u8 = 9;

/// ADC reference in millivolts.
const ADC_REFERENCE_MV: u32 = 3_000;
/// Rail feeding the NTC dividers.
const NTC_SUPPLY_MV: u32 = 3_300;
const NTC_SERIES_OHMS: u32 = 56_000;

/// Readings reported for a sense line pulled to ground, above the
/// under-voltage sentinel of the switch logic.
pub const NTC_GROUNDED_C: i32 = 250;
const NTC_GROUNDED_OHMS: u32 = 100;

/// NTC resistance at known temperatures, hottest last.
const NTC_TABLE: [(u32, i32); 8] = [
    (1_135_000, -20),
    (355_600, 0),
    (127_000, 20),
    (100_000, 25),
    (50_680, 40),
    (22_220, 60),
    (10_580, 80),
    (5_410, 100),
];

/// One conversion of every front-end channel, left-aligned to 16 bits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RawSample {
    pub fine_current: u16,
    pub coarse_current: u16,
    pub voltage: u16,
    pub temperature_in: u16,
    pub temperature_out: u16,
}

/// Values published after each completed RMS window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Readings {
    pub current_ma: u32,
    pub voltage_mv: u32,
    pub temperatures: PowerStageTemperatures,
}

/// Left-aligns a 12-bit conversion.
#[must_use]
pub const fn left_align(raw12: u16) -> u16 {
    (raw12 & 0x0fff) << 4
}

/// RMS state for the current and voltage channels.
pub struct FrontEnd {
    fine: RmsAccumulator,
    coarse: RmsAccumulator,
    voltage: RmsAccumulator,
    channels: CurrentChannels,
    voltage_calibration: Calibration,
}

impl FrontEnd {
    pub fn new(fine: Calibration, coarse: Calibration, voltage: Calibration) -> Self {
        Self {
            fine: RmsAccumulator::new(fine.offset(), RMS_WINDOW_SHIFT),
            coarse: RmsAccumulator::new(coarse.offset(), RMS_WINDOW_SHIFT),
            voltage: RmsAccumulator::new(voltage.offset(), RMS_WINDOW_SHIFT),
            channels: CurrentChannels::new(fine, coarse),
            voltage_calibration: voltage,
        }
    }

    /// Adds one sample set; returns readings when the window completes.
    pub fn push(&mut self, sample: RawSample) -> Option<Readings> {
        self.channels.observe_fine_sample(sample.fine_current);
        let fine = self.fine.push(sample.fine_current);
        let coarse = self.coarse.push(sample.coarse_current);
        let voltage = self.voltage.push(sample.voltage);

        let (Some(fine), Some(coarse), Some(voltage)) = (fine, coarse, voltage) else {
            return None;
        };
        self.channels.update(fine, coarse);
        Some(Readings {
            current_ma: self.channels.current_rms_ma(),
            voltage_mv: self.voltage_calibration.rms_to_milli(voltage),
            temperatures: PowerStageTemperatures {
                input_c: ntc_temperature_c(sample.temperature_in),
                output_c: ntc_temperature_c(sample.temperature_out),
            },
        })
    }
}

impl Default for FrontEnd {
    fn default() -> Self {
        Self::new(
            Calibration::FINE_CURRENT,
            Calibration::COARSE_CURRENT,
            Calibration::VOLTAGE,
        )
    }
}

/// Converts a power-stage NTC reading into degrees Celsius.
///
/// Interpolates linearly between table points and clamps outside the table.
#[must_use]
pub fn ntc_temperature_c(raw: u16) -> i32 {
    let sense_mv = (ADC_REFERENCE_MV * u32::from(raw)) >> 16;
    let resistance = sense_mv * NTC_SERIES_OHMS / (NTC_SUPPLY_MV - sense_mv);
    if resistance < NTC_GROUNDED_OHMS {
        return NTC_GROUNDED_C;
    }

    let (coldest_ohms, coldest_c) = NTC_TABLE[0];
    if resistance >= coldest_ohms {
        return coldest_c;
    }

    for pair in NTC_TABLE.windows(2) {
        let [(high_ohms, low_c), (low_ohms, high_c)] = [pair[0], pair[1]];
        if resistance > low_ohms {
            let span = i64::from(high_ohms - low_ohms);
            let offset = i64::from(high_ohms - resistance) * i64::from(high_c - low_c) / span;
            return low_c + i32::try_from(offset).unwrap_or(0);
        }
    }

    NTC_TABLE[NTC_TABLE.len() - 1].1
}
