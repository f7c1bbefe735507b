use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Instant, with_timeout};

use breaker_core::queue::BreakerInput;
use breaker_core::zero_crossing::frequency_from_interval;

use crate::clock::from_embassy;
use crate::input::{InputProducer, submit};
use crate::status;

/// No crossing for this long means the supply is DC or absent.
const SUPPLY_LOSS_TIMEOUT: Duration = Duration::from_millis(100);

#[embassy_executor::task]
pub async fn switch_status(mut line: ExtiInput<'static>, mut producer: InputProducer<'static>) -> ! {
    loop {
        line.wait_for_any_edge().await;
        let closed = line.is_high();
        if status::record_switch_edge(closed) {
            submit(&mut producer, BreakerInput::SwitchChanged { closed });
        }
    }
}

/// Watches the zero-crossing detector, which toggles on every crossing.
#[embassy_executor::task]
pub async fn zero_crossing(mut line: ExtiInput<'static>, mut producer: InputProducer<'static>) -> ! {
    let mut previous: Option<Instant> = None;
    loop {
        if with_timeout(SUPPLY_LOSS_TIMEOUT, line.wait_for_any_edge())
            .await
            .is_err()
        {
            if previous.take().is_some() {
                defmt::info!("mains crossings stopped");
            }
            status::record_supply_frequency(0);
            continue;
        }

        let now = Instant::now();
        if let Some(previous) = previous {
            let interval = from_embassy(now - previous);
            status::record_supply_frequency(frequency_from_interval(interval));
        }
        previous = Some(now);

        if status::zero_crossing_events_enabled() {
            submit(&mut producer, BreakerInput::ZeroCrossing);
        }
    }
}
