use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Output;
use embassy_time::{Duration, Instant, Timer};

use breaker_core::switch::OcpTestDirection;

use super::OcpTestSignal;
use crate::indicator::{LedPattern, Press, classify_press, toggle_input};
use crate::input::{InputProducer, submit};
use crate::status;

const LED_REFRESH: Duration = Duration::from_millis(50);

/// Short press toggles the breaker; a long press runs the over-current
/// self-test, alternating the test direction.
#[embassy_executor::task]
pub async fn button(
    mut button: ExtiInput<'static>,
    mut producer: InputProducer<'static>,
    ocp_test: &'static OcpTestSignal,
) -> ! {
    let mut direction = OcpTestDirection::Positive;
    loop {
        button.wait_for_falling_edge().await;
        let pressed_at = Instant::now();
        button.wait_for_rising_edge().await;

        match classify_press(Instant::now() - pressed_at) {
            Some(Press::Short) => {
                let (state, _) = status::breaker();
                submit(&mut producer, toggle_input(state));
            }
            Some(Press::Long) => {
                ocp_test.signal(direction);
                direction = match direction {
                    OcpTestDirection::Positive => OcpTestDirection::Negative,
                    OcpTestDirection::Negative => OcpTestDirection::Positive,
                };
            }
            None => {}
        }
    }
}

#[embassy_executor::task]
pub async fn led(mut led: Output<'static>) -> ! {
    loop {
        let (state, cause) = status::breaker();
        match LedPattern::for_state(state, cause) {
            LedPattern::Off => {
                led.set_low();
                Timer::after(LED_REFRESH).await;
            }
            LedPattern::On => {
                led.set_high();
                Timer::after(LED_REFRESH).await;
            }
            pattern => {
                led.toggle();
                Timer::after(pattern.half_period().unwrap_or(LED_REFRESH)).await;
            }
        }
    }
}
