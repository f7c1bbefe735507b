mod support;

use breaker_core::config::CurvePoint;
use breaker_core::msm::MsmState;
use breaker_core::queue::BreakerInput;
use breaker_core::switch::SwitchCause;
use breaker_core::telemetry::TelemetryEventKind;
use breaker_core::{TripCause, TripCurve, TripCurveError, TripState};
use heapless::Deque;
use support::*;

#[test]
fn operations_require_init() {
    let mut breaker: Breaker = TripCurve::new(
        MockSwitch::new(),
        MockZeroCrossing::default(),
        MockMeasurement::default(),
        empty_store(),
    );

    assert_eq!(breaker.state(), TripState::Undefined);
    assert_eq!(breaker.cause(), TripCause::None);
    assert_eq!(
        breaker.close(MockInstant::millis(0)),
        Err(TripCurveError::NotSupported)
    );
    assert_eq!(breaker.hardware_limit(), Err(TripCurveError::NotSupported));
    assert_eq!(breaker.shutdown(), Err(TripCurveError::NotSupported));
    assert_eq!(breaker.switch().on_calls, 0);
}

#[test]
fn init_follows_switch_position() {
    let opened = breaker();
    assert_eq!(opened.state(), TripState::Opened);
    assert!(opened.switch().events_enabled);
    assert!(opened.zero_crossing().events_enabled);

    let closed_switch = MockSwitch {
        on: true,
        ..MockSwitch::new()
    };
    let closed = breaker_with(closed_switch, empty_store());
    assert_eq!(closed.state(), TripState::Closed);
    assert_eq!(closed.switch().on_calls, 0, "init must not command the switch");
    assert_eq!(closed.switch().limit, Some(60));
}

#[test]
fn ac_close_open_cycle() {
    let mut breaker = breaker();

    breaker
        .close(MockInstant::millis(0))
        .expect("close should succeed");
    assert_eq!(breaker.msm().state(), MsmState::SupplyWait);
    assert_eq!(breaker.state(), TripState::Transient);

    for n in 1..=5 {
        input(&mut breaker, BreakerInput::ZeroCrossing, n * 10);
    }
    poll(&mut breaker, 199);
    assert_eq!(breaker.msm().state(), MsmState::SupplyWait);

    poll(&mut breaker, 200);
    assert_eq!(breaker.msm().state(), MsmState::CloseWait);
    assert!(breaker.msm().is_ac_supply());
    assert_eq!(
        breaker.switch().on_calls,
        0,
        "ac supplies close at the next zero-crossing"
    );

    input(&mut breaker, BreakerInput::ZeroCrossing, 210);
    assert_eq!(breaker.switch().on_calls, 1);
    report_switch(&mut breaker, 211);
    assert_eq!(breaker.state(), TripState::Closed);
    assert_eq!(breaker.cause(), TripCause::External);

    breaker
        .open(MockInstant::millis(500))
        .expect("open should succeed");
    assert_eq!(breaker.msm().state(), MsmState::OpenWait);
    assert_eq!(breaker.switch().off_calls, 0, "ac supplies open at a crossing");

    input(&mut breaker, BreakerInput::ZeroCrossing, 510);
    assert_eq!(breaker.switch().off_calls, 1);
    report_switch(&mut breaker, 511);
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.cause(), TripCause::External);
    assert!(breaker.msm().event_filter().is_ignored(
        breaker_core::event::Event::ZeroCrossingVoltage
    ));
    assert_eq!(breaker.dispatch_notification(), None);
}

#[test]
fn dc_supply_closes_when_detection_ends() {
    let mut breaker = breaker();
    breaker
        .close(MockInstant::millis(0))
        .expect("close should succeed");

    input(&mut breaker, BreakerInput::ZeroCrossing, 50);
    input(&mut breaker, BreakerInput::ZeroCrossing, 90);
    input(&mut breaker, BreakerInput::ZeroCrossing, 130);
    poll(&mut breaker, 200);

    assert!(!breaker.msm().is_ac_supply());
    assert_eq!(breaker.switch().on_calls, 1);
    report_switch(&mut breaker, 201);
    assert_eq!(breaker.state(), TripState::Closed);

    breaker
        .open(MockInstant::millis(300))
        .expect("open should succeed");
    assert_eq!(breaker.switch().off_calls, 1, "dc supplies open immediately");
    report_switch(&mut breaker, 301);
    assert_eq!(breaker.state(), TripState::Opened);
}

#[test]
fn open_during_supply_detection() {
    let mut breaker = breaker();
    breaker
        .close(MockInstant::millis(0))
        .expect("close should succeed");
    breaker
        .open(MockInstant::millis(50))
        .expect("open should succeed");

    assert_eq!(breaker.state(), TripState::Opened);
    poll(&mut breaker, 1_000);
    assert_eq!(breaker.switch().on_calls, 0, "cancelled detection never closes");
}

#[test]
fn repeated_commands_do_not_touch_switch() {
    let mut breaker = breaker();
    breaker
        .open(MockInstant::millis(0))
        .expect("open should succeed");
    assert_eq!(breaker.state(), TripState::Opened);
    assert_eq!(breaker.switch().off_calls, 0);

    close_dc(&mut breaker, 10);
    let on_calls = breaker.switch().on_calls;

    breaker
        .close(MockInstant::millis(500))
        .expect("close should succeed");
    poll(&mut breaker, 1_000);
    assert_eq!(breaker.state(), TripState::Closed);
    assert_eq!(breaker.switch().on_calls, on_calls);
}

#[test]
fn refused_close_reports_switch_cause() {
    let switch = MockSwitch {
        refuse: Some(SwitchCause::OverTemperature),
        ..MockSwitch::new()
    };
    let mut breaker = breaker_with(switch, empty_store());
    breaker
        .close(MockInstant::millis(0))
        .expect("close should succeed");
    poll(&mut breaker, 200);

    assert_eq!(breaker.state(), TripState::Transient);
    assert_eq!(breaker.cause(), TripCause::OverTemperature);
    assert_eq!(breaker.switch().on_calls, 1, "no retry loop");

    breaker
        .open(MockInstant::millis(300))
        .expect("open should succeed");
    assert_eq!(breaker.state(), TripState::Opened);
}

#[test]
fn inputs_drain_in_order() {
    let mut breaker = breaker();
    let mut queue: Deque<BreakerInput, 8> = Deque::new();
    for input in [
        BreakerInput::Close,
        BreakerInput::ZeroCrossing,
        BreakerInput::ZeroCrossing,
        BreakerInput::ZeroCrossing,
        BreakerInput::ZeroCrossing,
    ] {
        queue.push_back(input).expect("queue has room");
    }

    let handled = breaker
        .drain(&mut queue, MockInstant::millis(0))
        .expect("drain should succeed");
    assert_eq!(handled, 5);
    assert!(queue.is_empty());

    poll(&mut breaker, 200);
    assert!(breaker.msm().is_ac_supply());
}

#[test]
fn get_points_truncates_to_buffer() {
    let breaker = breaker();
    let mut out = [CurvePoint::default(); 4];
    assert_eq!(breaker.get_points(&mut out), Ok(4));
    assert_eq!(breaker.point_count(), Ok(16));
    assert_eq!(out[0], breaker.points().expect("points")[0]);
}

#[test]
fn hardware_limit_rejected_by_driver_keeps_previous() {
    let mut breaker = breaker();
    assert_eq!(
        breaker.set_hardware_limit(200),
        Err(TripCurveError::Hardware(
            breaker_core::switch::SwitchError::LimitOutOfRange
        ))
    );
    assert_eq!(breaker.hardware_limit(), Ok(60));

    breaker.set_hardware_limit(40).expect("limit accepted");
    assert_eq!(breaker.hardware_limit(), Ok(40));
    assert_eq!(breaker.switch().limit, Some(40));
}

#[test]
fn shutdown_returns_to_undefined() {
    let mut breaker = breaker();
    close_dc(&mut breaker, 0);
    breaker.shutdown().expect("shutdown should succeed");

    assert_eq!(breaker.state(), TripState::Undefined);
    assert!(!breaker.switch().events_enabled);
    assert_eq!(breaker.next_deadline(), None);
    assert_eq!(
        breaker.handle_input(BreakerInput::ZeroCrossing, MockInstant::millis(1)),
        Err(TripCurveError::NotSupported)
    );
}

#[test]
fn state_changes_are_recorded() {
    let mut breaker = breaker();
    close_dc(&mut breaker, 0);

    let transitions: Vec<(MsmState, MsmState)> = breaker
        .telemetry()
        .oldest_first()
        .filter_map(|record| match record.event {
            TelemetryEventKind::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();

    assert_eq!(
        transitions,
        [
            (MsmState::Undefined, MsmState::Opened),
            (MsmState::Opened, MsmState::SupplyWait),
            (MsmState::SupplyWait, MsmState::CloseWait),
            (MsmState::CloseWait, MsmState::Closed),
        ]
    );
}
