mod support;

use breaker_core::config::{CurvePoint, MAX_CURVE_POINTS};
use breaker_core::msm::MsmState;
use breaker_core::queue::BreakerInput;
use breaker_core::{TripCause, TripCurveError, TripNotification, TripState};
use support::*;

const CURVE: [CurvePoint; 2] = [CurvePoint::new(1_000, 500), CurvePoint::new(5_000, 200)];

/// DC-closed breaker with a short two-point curve; closed at 201 ms with the
/// next monitor tick due at 300 ms.
fn closed_with_curve() -> Breaker {
    let mut breaker = breaker();
    breaker.set_points(&CURVE).expect("curve accepted");
    close_dc(&mut breaker, 0);
    breaker
}

#[test]
fn sustained_overcurrent_trips_on_curve() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;

    poll(&mut breaker, 600);
    assert_eq!(breaker.state(), TripState::Closed);
    assert_eq!(breaker.monitor().spent()[..2], [400, 0]);

    poll(&mut breaker, 700);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
    assert_eq!(breaker.switch().off_calls, 1, "dc supplies open immediately");
    assert!(!breaker.monitor().is_running());

    report_switch(&mut breaker, 701);
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.cause(), TripCause::OverCurrentSw);
    assert_eq!(
        breaker.dispatch_notification(),
        Some(TripNotification {
            state: TripState::Opened,
            cause: TripCause::OverCurrentSw,
        })
    );
}

#[test]
fn higher_current_trips_on_steeper_point() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 6_000;

    poll(&mut breaker, 399);
    assert_eq!(breaker.state(), TripState::Closed);
    poll(&mut breaker, 400);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
}

#[test]
fn current_below_curve_resets_accumulation() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;
    poll(&mut breaker, 600);

    breaker.measurement_mut().current_ma = 999;
    poll(&mut breaker, 700);
    assert_eq!(breaker.monitor().spent()[0], 0);

    breaker.measurement_mut().current_ma = 2_000;
    poll(&mut breaker, 1_100);
    assert_eq!(breaker.state(), TripState::Closed);
    poll(&mut breaker, 1_200);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
}

#[test]
fn late_poll_catches_up_every_tick() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;

    // Ticks at 300..=700 are due; the fifth one trips.
    poll(&mut breaker, 950);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
}

#[test]
fn curve_trip_on_ac_waits_for_crossing() {
    let mut breaker = breaker();
    breaker.set_points(&CURVE).expect("curve accepted");
    let closed_at = close_ac(&mut breaker, 0);
    breaker.measurement_mut().current_ma = 6_000;

    poll(&mut breaker, closed_at + 300);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
    assert_eq!(breaker.switch().off_calls, 0);

    input(&mut breaker, BreakerInput::ZeroCrossing, closed_at + 310);
    assert_eq!(breaker.switch().off_calls, 1);
    report_switch(&mut breaker, closed_at + 311);
    assert_eq!(breaker.cause(), TripCause::OverCurrentSw);
}

#[test]
fn close_rearms_monitor_with_cleared_accumulators() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;
    poll(&mut breaker, 700);
    report_switch(&mut breaker, 701);
    assert!(!breaker.monitor().is_running());

    breaker.measurement_mut().current_ma = 0;
    close_dc(&mut breaker, 1_000);
    assert!(breaker.monitor().is_running());
    assert!(breaker.monitor().spent().iter().all(|spent| *spent == 0));
}

#[test]
fn repeated_close_keeps_accumulated_time() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;
    poll(&mut breaker, 600);
    assert_eq!(breaker.monitor().spent()[0], 400);

    breaker
        .close(MockInstant::millis(650))
        .expect("close should succeed");
    assert_eq!(breaker.monitor().spent()[0], 400);

    poll(&mut breaker, 700);
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
}

#[test]
fn no_accumulation_outside_closed() {
    let mut breaker = breaker();
    breaker.set_points(&CURVE).expect("curve accepted");
    breaker.measurement_mut().current_ma = 6_000;

    poll(&mut breaker, 10_000);
    assert_eq!(breaker.state(), TripState::Opened);
    assert!(breaker.monitor().spent().iter().all(|spent| *spent == 0));
}

#[test]
fn replacing_points_resets_accumulation() {
    let mut breaker = closed_with_curve();
    breaker.measurement_mut().current_ma = 2_000;
    poll(&mut breaker, 600);

    breaker.set_points(&CURVE).expect("curve accepted");
    assert_eq!(breaker.monitor().spent()[0], 0);

    poll(&mut breaker, 700);
    assert_eq!(breaker.state(), TripState::Closed);
}

#[test]
fn rejected_points_keep_previous_curve() {
    let mut breaker = breaker();
    breaker.set_points(&CURVE).expect("curve accepted");

    let rising = [CurvePoint::new(1_000, 100), CurvePoint::new(2_000, 200)];
    assert_eq!(
        breaker.set_points(&rising),
        Err(TripCurveError::InvalidArgument)
    );
    assert_eq!(breaker.set_points(&[]), Err(TripCurveError::InvalidArgument));

    let oversized = [CurvePoint::new(1_000, 100); MAX_CURVE_POINTS + 1];
    assert_eq!(
        breaker.set_points(&oversized),
        Err(TripCurveError::NoMemory)
    );

    assert_eq!(breaker.points(), Ok(&CURVE[..]));
}
