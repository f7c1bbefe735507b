use embassy_futures::select::{Either4, select4};
use embassy_time::Timer;

use breaker_core::queue::{BreakerInput, InputQueueConsumer};
use breaker_core::{TripCurve, TripNotification};

use super::OcpTestSignal;
use crate::clock::FirmwareInstant;
use crate::console::{self, LineChannel, ReplyChannel};
use crate::hw::flash::FlashStore;
use crate::hw::switch::GpioSwitch;
use crate::input::InputConsumer;
use crate::intent::{self, SwitchIntent};
use crate::providers::{PublishedMeasurement, PublishedZeroCrossing};
use crate::status;

pub type Breaker = TripCurve<
    FirmwareInstant,
    GpioSwitch<'static>,
    PublishedZeroCrossing,
    PublishedMeasurement,
    FlashStore,
>;

fn on_trip(notification: TripNotification) {
    defmt::warn!(
        "breaker {} cause {}",
        notification.state,
        notification.cause
    );
}

async fn deadline(at: Option<FirmwareInstant>) {
    match at {
        Some(at) => Timer::at(at.into_embassy()).await,
        None => core::future::pending().await,
    }
}

fn remember(breaker: &mut Breaker, intent: SwitchIntent) {
    if let Err(err) = intent::save(breaker.store_mut(), intent) {
        defmt::warn!("storing intent {} failed: {}", intent, err);
    }
}

fn apply(breaker: &mut Breaker, input: BreakerInput, now: FirmwareInstant) {
    match breaker.handle_input(input, now) {
        Ok(()) => {
            if let Some(intent) = SwitchIntent::from_input(input) {
                remember(breaker, intent);
            }
        }
        Err(err) => defmt::warn!("input {} rejected: {}", input, err),
    }
}

fn start(breaker: &mut Breaker) {
    let now = FirmwareInstant::now();
    if let Err(err) = breaker.init(now) {
        defmt::error!("breaker init failed: {}", err);
        return;
    }
    if let Err(err) = breaker.set_callback(Some(on_trip)) {
        defmt::warn!("callback rejected: {}", err);
    }

    let intent = intent::load(breaker.store_mut());
    defmt::info!("restoring intent {}", intent);
    if let Err(err) = breaker.handle_input(intent.input(), now) {
        defmt::warn!("restoring intent failed: {}", err);
    }
}

#[embassy_executor::task]
pub async fn run(
    mut breaker: Breaker,
    mut inputs: InputConsumer<'static>,
    lines: &'static LineChannel,
    replies: &'static ReplyChannel,
    ocp_test: &'static OcpTestSignal,
) -> ! {
    start(&mut breaker);

    loop {
        status::record_breaker(breaker.state(), breaker.cause());

        let woke = select4(
            inputs.receive(),
            lines.receive(),
            ocp_test.wait(),
            deadline(breaker.next_deadline()),
        )
        .await;

        let now = FirmwareInstant::now();
        if let Err(err) = breaker.poll(now) {
            defmt::warn!("poll failed: {}", err);
        }

        match woke {
            Either4::First(input) => {
                apply(&mut breaker, input, now);
                while let Ok(Some(input)) = inputs.try_dequeue() {
                    apply(&mut breaker, input, now);
                }
            }
            Either4::Second(line) => {
                let response = console::respond(&mut breaker, &line, now);
                if let Some(intent) = response.intent {
                    remember(&mut breaker, intent);
                }
                replies.send(response.reply).await;
            }
            Either4::Third(direction) => {
                if let Err(err) = breaker.switch_mut().trigger_ocp_test(direction) {
                    defmt::warn!("ocp test refused: {}", err);
                }
            }
            Either4::Fourth(()) => {}
        }

        breaker.dispatch_notification();
    }
}
