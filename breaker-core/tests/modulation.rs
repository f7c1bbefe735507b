mod support;

use breaker_core::config::{ClosedStateMode, CurvePoint, ModulationConfig, RecoveryConfig};
use breaker_core::csom::ModulationState;
use breaker_core::msm::MsmState;
use breaker_core::queue::BreakerInput;
use breaker_core::{TripCause, TripCurveError, TripNotification, TripState};
use support::*;

fn set_mode(breaker: &mut Breaker, mode: ClosedStateMode) {
    let config = RecoveryConfig {
        closed_state_mode: mode,
        ..breaker.recovery_config().expect("initialized")
    };
    breaker
        .set_recovery_config(config)
        .expect("recovery config accepted");
}

/// AC-closed breaker modulating 2 of every 5 crossings, with the cycle
/// started; returns the time of the last input.
fn modulating() -> (Breaker, u64) {
    let mut breaker = breaker();
    breaker
        .set_modulation_config(ModulationConfig::new(2, 5))
        .expect("modulation accepted");
    set_mode(&mut breaker, ClosedStateMode::ModulationControl);
    let at = close_ac(&mut breaker, 0);

    // First crossing activates the mode, the second starts the cycle.
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 10);
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 20);
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Closed);
    (breaker, at + 20)
}

#[test]
fn modulation_cycles_switch_while_logically_closed() {
    let (mut breaker, at) = modulating();

    input(&mut breaker, BreakerInput::ZeroCrossing, at + 10);
    assert_eq!(breaker.switch().off_calls, 0);
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 20);
    assert_eq!(breaker.switch().off_calls, 1);

    report_switch(&mut breaker, at + 21);
    assert_eq!(breaker.state(), TripState::Closed, "modulation opens are silent");
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Opened);
    assert!(!breaker.notification_pending());

    let on_calls = breaker.switch().on_calls;
    for n in 1..=3 {
        input(&mut breaker, BreakerInput::ZeroCrossing, at + 21 + n * 10);
    }
    assert_eq!(breaker.switch().on_calls, on_calls + 1);

    report_switch(&mut breaker, at + 52);
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Closed);
    assert_eq!(breaker.state(), TripState::Closed);
}

#[test]
fn leaving_mode_recloses_released_switch() {
    let (mut breaker, at) = modulating();
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 10);
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 20);
    report_switch(&mut breaker, at + 21);
    assert!(!breaker.switch().on);

    set_mode(&mut breaker, ClosedStateMode::None);
    let on_calls = breaker.switch().on_calls;

    input(&mut breaker, BreakerInput::ZeroCrossing, at + 30);
    assert_eq!(breaker.msm().state(), MsmState::CloseWait);
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Disabled);

    input(&mut breaker, BreakerInput::ZeroCrossing, at + 40);
    assert_eq!(breaker.switch().on_calls, on_calls + 1);
    report_switch(&mut breaker, at + 41);
    assert_eq!(breaker.state(), TripState::Closed);

    // Back to a plain closed breaker.
    for n in 1..=10 {
        input(&mut breaker, BreakerInput::ZeroCrossing, at + 41 + n * 10);
    }
    assert!(breaker.switch().on);
}

#[test]
fn open_while_released_settles_immediately() {
    let (mut breaker, at) = modulating();
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 10);
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 20);
    report_switch(&mut breaker, at + 21);
    let off_calls = breaker.switch().off_calls;

    breaker
        .open(MockInstant::millis(at + 25))
        .expect("open should succeed");
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.cause(), TripCause::External);
    assert_eq!(breaker.switch().off_calls, off_calls);
}

#[test]
fn curve_trip_while_released_settles_immediately() {
    let (mut breaker, at) = modulating();
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 10);
    input(&mut breaker, BreakerInput::ZeroCrossing, at + 20);
    report_switch(&mut breaker, at + 21);
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Opened);
    assert!(!breaker.switch().on);

    breaker
        .set_points(&[CurvePoint::new(1_000, 100)])
        .expect("curve accepted");
    breaker.measurement_mut().current_ma = 5_000;
    let (on_calls, off_calls) = (breaker.switch().on_calls, breaker.switch().off_calls);

    poll(&mut breaker, at + 1_000);
    assert_eq!(breaker.msm().state(), MsmState::Opened);
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.cause(), TripCause::OverCurrentSw);
    assert_eq!(breaker.switch().off_calls, off_calls, "switch already off");
    assert_eq!(
        breaker.dispatch_notification(),
        Some(TripNotification {
            state: TripState::Opened,
            cause: TripCause::OverCurrentSw,
        })
    );

    for n in 1..=10 {
        input(&mut breaker, BreakerInput::ZeroCrossing, at + 1_000 + n * 10);
    }
    poll(&mut breaker, at + 10_000);
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.switch().on_calls, on_calls, "no modulation reclose");
}

#[test]
fn invalid_parameters_are_rejected() {
    let mut breaker = breaker();
    assert_eq!(
        breaker.set_modulation_config(ModulationConfig::new(5, 5)),
        Err(TripCurveError::InvalidArgument)
    );
    assert_eq!(
        breaker.set_modulation_config(ModulationConfig::new(0, 3)),
        Err(TripCurveError::InvalidArgument)
    );
    assert_eq!(breaker.modulation_config(), Ok(ModulationConfig::default()));
}

#[test]
fn unconfigured_modulation_stays_disabled() {
    let mut breaker = breaker();
    set_mode(&mut breaker, ClosedStateMode::ModulationControl);
    let at = close_ac(&mut breaker, 0);

    for n in 1..=10 {
        input(&mut breaker, BreakerInput::ZeroCrossing, at + n * 10);
    }
    assert_eq!(breaker.msm().modulation().state(), ModulationState::Disabled);
    assert_eq!(breaker.switch().off_calls, 0);
}
