//! Shared status storage for the firmware target.
//!
//! Lightweight atomics carry the switch lines, the latest readings and the
//! published breaker state between tasks. Only the breaker task owns the
//! state machines; everything else reads or writes through this module.

use breaker_core::switch::{
    FallingEdge, PowerStageTemperatures, SwitchCause, classify_falling_edge,
};
use breaker_core::{TripCause, TripState};
use portable_atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

static BREAKER_STATE: AtomicU8 = AtomicU8::new(0);
static BREAKER_CAUSE: AtomicU8 = AtomicU8::new(0);

static CURRENT_MA: AtomicU32 = AtomicU32::new(0);
static VOLTAGE_MV: AtomicU32 = AtomicU32::new(0);
static TEMP_IN_C: AtomicI32 = AtomicI32::new(25);
static TEMP_OUT_C: AtomicI32 = AtomicI32::new(25);
static SUPPLY_FREQUENCY_MHZ: AtomicU32 = AtomicU32::new(0);

/// Level of the switch status line.
static SWITCH_ON: AtomicBool = AtomicBool::new(false);
/// Level driven on the on-command line.
static ON_COMMAND: AtomicBool = AtomicBool::new(false);
static OCP_TEST_ACTIVE: AtomicBool = AtomicBool::new(false);
static LATCHED_CAUSE: AtomicU8 = AtomicU8::new(0);
static SWITCH_EVENTS: AtomicBool = AtomicBool::new(false);
static ZERO_CROSSING_EVENTS: AtomicBool = AtomicBool::new(false);

const fn state_code(state: TripState) -> u8 {
    match state {
        TripState::Undefined => 0,
        TripState::Opened => 1,
        TripState::Closed => 2,
        TripState::Transient => 3,
    }
}

const fn state_from_code(code: u8) -> TripState {
    match code {
        1 => TripState::Opened,
        2 => TripState::Closed,
        3 => TripState::Transient,
        _ => TripState::Undefined,
    }
}

const fn cause_code(cause: TripCause) -> u8 {
    match cause {
        TripCause::None => 0,
        TripCause::External => 1,
        TripCause::OverCurrentHw => 2,
        TripCause::OverCurrentSw => 3,
        TripCause::OverCurrentTest => 4,
        TripCause::OverTemperature => 5,
        TripCause::Undervoltage => 6,
    }
}

const fn cause_from_code(code: u8) -> TripCause {
    match code {
        1 => TripCause::External,
        2 => TripCause::OverCurrentHw,
        3 => TripCause::OverCurrentSw,
        4 => TripCause::OverCurrentTest,
        5 => TripCause::OverTemperature,
        6 => TripCause::Undervoltage,
        _ => TripCause::None,
    }
}

const fn switch_cause_code(cause: SwitchCause) -> u8 {
    match cause {
        SwitchCause::None => 0,
        SwitchCause::External => 1,
        SwitchCause::HardwareOvercurrent => 2,
        SwitchCause::OverTemperature => 3,
        SwitchCause::OcpTest => 4,
        SwitchCause::Undervoltage => 5,
    }
}

const fn switch_cause_from_code(code: u8) -> SwitchCause {
    match code {
        1 => SwitchCause::External,
        2 => SwitchCause::HardwareOvercurrent,
        3 => SwitchCause::OverTemperature,
        4 => SwitchCause::OcpTest,
        5 => SwitchCause::Undervoltage,
        _ => SwitchCause::None,
    }
}

/// Publishes the breaker state after the breaker task handled an input.
pub fn record_breaker(state: TripState, cause: TripCause) {
    BREAKER_STATE.store(state_code(state), Ordering::Relaxed);
    BREAKER_CAUSE.store(cause_code(cause), Ordering::Relaxed);
}

/// Last published breaker state and cause.
pub fn breaker() -> (TripState, TripCause) {
    (
        state_from_code(BREAKER_STATE.load(Ordering::Relaxed)),
        cause_from_code(BREAKER_CAUSE.load(Ordering::Relaxed)),
    )
}

pub fn record_current_ma(current_ma: u32) {
    CURRENT_MA.store(current_ma, Ordering::Relaxed);
}

pub fn current_ma() -> u32 {
    CURRENT_MA.load(Ordering::Relaxed)
}

pub fn record_voltage_mv(voltage_mv: u32) {
    VOLTAGE_MV.store(voltage_mv, Ordering::Relaxed);
}

pub fn voltage_mv() -> u32 {
    VOLTAGE_MV.load(Ordering::Relaxed)
}

pub fn record_temperatures(temperatures: PowerStageTemperatures) {
    TEMP_IN_C.store(temperatures.input_c, Ordering::Relaxed);
    TEMP_OUT_C.store(temperatures.output_c, Ordering::Relaxed);
}

pub fn temperatures() -> PowerStageTemperatures {
    PowerStageTemperatures {
        input_c: TEMP_IN_C.load(Ordering::Relaxed),
        output_c: TEMP_OUT_C.load(Ordering::Relaxed),
    }
}

/// Stores the mains frequency in millihertz (0 while no crossings arrive).
pub fn record_supply_frequency(frequency_mhz: u32) {
    SUPPLY_FREQUENCY_MHZ.store(frequency_mhz, Ordering::Relaxed);
}

pub fn supply_frequency_mhz() -> u32 {
    SUPPLY_FREQUENCY_MHZ.load(Ordering::Relaxed)
}

pub fn set_on_command(active: bool) {
    ON_COMMAND.store(active, Ordering::Relaxed);
}

pub fn set_ocp_test_active(active: bool) {
    OCP_TEST_ACTIVE.store(active, Ordering::Relaxed);
}

pub fn ocp_test_active() -> bool {
    OCP_TEST_ACTIVE.load(Ordering::Relaxed)
}

pub fn latch_cause(cause: SwitchCause) {
    LATCHED_CAUSE.store(switch_cause_code(cause), Ordering::Relaxed);
}

pub fn latched_cause() -> SwitchCause {
    switch_cause_from_code(LATCHED_CAUSE.load(Ordering::Relaxed))
}

pub fn switch_on() -> bool {
    SWITCH_ON.load(Ordering::Relaxed)
}

/// Samples the status line once at boot, before edges are watched.
pub fn record_switch_level(on: bool) {
    SWITCH_ON.store(on, Ordering::Relaxed);
}

pub fn set_switch_events(enabled: bool) {
    SWITCH_EVENTS.store(enabled, Ordering::Relaxed);
}

pub fn set_zero_crossing_events(enabled: bool) {
    ZERO_CROSSING_EVENTS.store(enabled, Ordering::Relaxed);
}

pub fn zero_crossing_events_enabled() -> bool {
    ZERO_CROSSING_EVENTS.load(Ordering::Relaxed)
}

/// Latches the cause of a status line edge.
///
/// Returns `true` when the edge must be forwarded to the breaker task.
pub fn record_switch_edge(on: bool) -> bool {
    SWITCH_ON.store(on, Ordering::Relaxed);
    if on {
        latch_cause(SwitchCause::External);
    } else {
        let edge = FallingEdge {
            on_command_active: ON_COMMAND.load(Ordering::Relaxed),
            ocp_test_active: OCP_TEST_ACTIVE.swap(false, Ordering::Relaxed),
            temperatures: temperatures(),
        };
        latch_cause(classify_falling_edge(&edge));
    }
    SWITCH_EVENTS.load(Ordering::Relaxed)
}
