use embassy_stm32::Peri;
use embassy_stm32::adc::{Adc, SampleTime};
use embassy_stm32::peripherals::{ADC1, PA0, PA1, PA4, PA6, PA7};
use embassy_time::{Duration, Ticker};

use crate::frontend::{FrontEnd, RawSample, left_align};
use crate::status;

/// 5 kHz across all five channels.
const SAMPLE_PERIOD: Duration = Duration::from_micros(200);

#[embassy_executor::task]
pub async fn run(
    mut adc: Adc<'static, ADC1>,
    mut fine_current: Peri<'static, PA0>,
    mut coarse_current: Peri<'static, PA1>,
    mut voltage: Peri<'static, PA4>,
    mut temperature_in: Peri<'static, PA6>,
    mut temperature_out: Peri<'static, PA7>,
) -> ! {
    adc.set_sample_time(SampleTime::CYCLES12_5);
    let mut front_end = FrontEnd::default();
    let mut ticker = Ticker::every(SAMPLE_PERIOD);

    loop {
        ticker.next().await;
        let sample = RawSample {
            fine_current: left_align(adc.blocking_read(&mut fine_current)),
            coarse_current: left_align(adc.blocking_read(&mut coarse_current)),
            voltage: left_align(adc.blocking_read(&mut voltage)),
            temperature_in: left_align(adc.blocking_read(&mut temperature_in)),
            temperature_out: left_align(adc.blocking_read(&mut temperature_out)),
        };

        if let Some(readings) = front_end.push(sample) {
            status::record_current_ma(readings.current_ma);
            status::record_voltage_mv(readings.voltage_mv);
            status::record_temperatures(readings.temperatures);
            defmt::trace!(
                "rms {} mA {} mV",
                readings.current_ma,
                readings.voltage_mv
            );
        }
    }
}
