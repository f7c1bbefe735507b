use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::adc::Adc;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::Flash;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_sync::signal::Signal;

use breaker_core::TripCurve;
use breaker_core::switch::OcpTestDirection;

use crate::console::{LineChannel, ReplyChannel};
use crate::hw::flash;
use crate::hw::switch::GpioSwitch;
use crate::input::{BreakerMutex, InputConsumer, InputProducer, InputQueue};
use crate::providers::{PublishedMeasurement, PublishedZeroCrossing};
use crate::status;

mod breaker_task;
mod console_task;
mod edge_task;
mod panel_task;
mod sampling_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type OcpTestSignal = Signal<BreakerMutex, OcpTestDirection>;

pub(super) static INPUT_QUEUE: InputQueue = InputQueue::new();
pub(super) static CONSOLE_LINES: LineChannel = LineChannel::new();
pub(super) static CONSOLE_REPLIES: ReplyChannel = ReplyChannel::new();
pub(super) static OCP_TEST: OcpTestSignal = Signal::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA4,
        PA6,
        PA7,
        PA8,
        PA15,
        PB0,
        PB1,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PB8,
        EXTI7,
        EXTI8,
        EXTI15,
        ADC1,
        FLASH,
        USART5,
        ..
    } = hal::init(config);

    let switch_status = ExtiInput::new(PA8, EXTI8, Pull::None);
    status::record_switch_level(switch_status.is_high());

    let switch = GpioSwitch::new(
        Output::new(PB3, Level::Low, Speed::Low),
        Output::new(PB4, Level::Low, Speed::Low),
        Output::new(PB5, Level::Low, Speed::Low),
        Output::new(PB6, Level::Low, Speed::Low),
    );
    let store = flash::config_store(Flash::new_blocking(FLASH));
    let breaker = TripCurve::new(
        switch,
        PublishedZeroCrossing,
        PublishedMeasurement,
        store,
    );

    spawner
        .spawn(sampling_task::run(Adc::new(ADC1), PA0, PA1, PA4, PA6, PA7))
        .expect("failed to spawn sampling task");

    spawner
        .spawn(edge_task::switch_status(
            switch_status,
            InputProducer::new(INPUT_QUEUE.sender()),
        ))
        .expect("failed to spawn switch status task");

    spawner
        .spawn(edge_task::zero_crossing(
            ExtiInput::new(PB7, EXTI7, Pull::None),
            InputProducer::new(INPUT_QUEUE.sender()),
        ))
        .expect("failed to spawn zero-crossing task");

    spawner
        .spawn(breaker_task::run(
            breaker,
            InputConsumer::new(INPUT_QUEUE.receiver()),
            &CONSOLE_LINES,
            &CONSOLE_REPLIES,
            &OCP_TEST,
        ))
        .expect("failed to spawn breaker task");

    spawner
        .spawn(console_task::run(
            &CONSOLE_LINES,
            &CONSOLE_REPLIES,
            USART5,
            PB0,
            PB1,
        ))
        .expect("failed to spawn console task");

    spawner
        .spawn(panel_task::button(
            ExtiInput::new(PA15, EXTI15, Pull::Up),
            InputProducer::new(INPUT_QUEUE.sender()),
            &OCP_TEST,
        ))
        .expect("failed to spawn button task");

    spawner
        .spawn(panel_task::led(Output::new(PB8, Level::Low, Speed::Low)))
        .expect("failed to spawn LED task");

    core::future::pending::<()>().await;
}
