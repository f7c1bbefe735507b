//! Collaborators that read what the sampling and edge tasks publish.

use breaker_core::measurement::{MeasurementProvider, TemperatureSensor};
use breaker_core::zero_crossing::ZeroCrossingSource;

use crate::status;

/// Zero-crossing source fed by the mains edge task.
#[derive(Copy, Clone, Debug, Default)]
pub struct PublishedZeroCrossing;

impl ZeroCrossingSource for PublishedZeroCrossing {
    fn frequency_mhz(&self) -> u32 {
        status::supply_frequency_mhz()
    }

    fn enable_events(&mut self) {
        status::set_zero_crossing_events(true);
    }

    fn disable_events(&mut self) {
        status::set_zero_crossing_events(false);
    }
}

/// Measurement provider backed by the latest completed RMS window.
#[derive(Copy, Clone, Debug, Default)]
pub struct PublishedMeasurement;

impl MeasurementProvider for PublishedMeasurement {
    fn current_rms_ma(&self) -> u32 {
        status::current_ma()
    }

    fn voltage_rms_mv(&self) -> u32 {
        status::voltage_mv()
    }

    fn temperature_c(&self, sensor: TemperatureSensor) -> i32 {
        let temperatures = status::temperatures();
        match sensor {
            TemperatureSensor::PowerIn => temperatures.input_c,
            TemperatureSensor::PowerOut => temperatures.output_c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_crossing_events_follow_the_state_machine() {
        let mut source = PublishedZeroCrossing;
        source.enable_events();
        assert!(status::zero_crossing_events_enabled());
        source.disable_events();
        assert!(!status::zero_crossing_events_enabled());
    }

    #[test]
    fn measurement_reads_published_window() {
        status::record_current_ma(1_250);
        status::record_voltage_mv(229_000);
        let measurement = PublishedMeasurement;
        assert_eq!(measurement.current_rms_ma(), 1_250);
        assert_eq!(measurement.voltage_rms_mv(), 229_000);
    }
}
