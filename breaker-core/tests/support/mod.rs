#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use breaker_core::config::store::{FramedStore, RamStorage};
use breaker_core::measurement::{MeasurementProvider, TemperatureSensor};
use breaker_core::queue::BreakerInput;
use breaker_core::switch::{SwitchCause, SwitchDriver, SwitchError};
use breaker_core::zero_crossing::ZeroCrossingSource;
use breaker_core::{TripCurve, TripState};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub const fn millis(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits"))
    }
}

/// Switch that latches commands immediately and counts them.
#[derive(Debug, Default)]
pub struct MockSwitch {
    pub on: bool,
    pub cause: SwitchCause,
    pub refuse: Option<SwitchCause>,
    pub limit: Option<u8>,
    pub max_limit: u8,
    pub on_calls: usize,
    pub off_calls: usize,
    pub events_enabled: bool,
}

impl MockSwitch {
    pub fn new() -> Self {
        Self {
            max_limit: 100,
            ..Self::default()
        }
    }

    /// Simulates the power stage opening on its own.
    pub fn trip(&mut self, cause: SwitchCause) {
        self.on = false;
        self.cause = cause;
    }
}

impl SwitchDriver for MockSwitch {
    fn turn_on(&mut self) -> Result<(), SwitchCause> {
        self.on_calls += 1;
        if let Some(cause) = self.refuse {
            self.cause = cause;
            return Err(cause);
        }
        self.on = true;
        self.cause = SwitchCause::External;
        Ok(())
    }

    fn turn_off(&mut self) {
        self.off_calls += 1;
        self.on = false;
        self.cause = SwitchCause::External;
    }

    fn is_on(&self) -> bool {
        self.on
    }

    fn cause(&self) -> SwitchCause {
        self.cause
    }

    fn set_hardware_limit(&mut self, limit: u8) -> Result<(), SwitchError> {
        if limit > self.max_limit {
            return Err(SwitchError::LimitOutOfRange);
        }
        self.limit = Some(limit);
        Ok(())
    }

    fn enable_events(&mut self) {
        self.events_enabled = true;
    }

    fn disable_events(&mut self) {
        self.events_enabled = false;
    }
}

#[derive(Debug, Default)]
pub struct MockZeroCrossing {
    pub frequency_mhz: u32,
    pub events_enabled: bool,
}

impl ZeroCrossingSource for MockZeroCrossing {
    fn frequency_mhz(&self) -> u32 {
        self.frequency_mhz
    }

    fn enable_events(&mut self) {
        self.events_enabled = true;
    }

    fn disable_events(&mut self) {
        self.events_enabled = false;
    }
}

#[derive(Debug, Default)]
pub struct MockMeasurement {
    pub current_ma: u32,
}

impl MeasurementProvider for MockMeasurement {
    fn current_rms_ma(&self) -> u32 {
        self.current_ma
    }

    fn voltage_rms_mv(&self) -> u32 {
        230_000
    }

    fn temperature_c(&self, _: TemperatureSensor) -> i32 {
        30
    }
}

pub type MockStore = FramedStore<RamStorage<256>>;

pub type Breaker = TripCurve<MockInstant, MockSwitch, MockZeroCrossing, MockMeasurement, MockStore>;

pub fn empty_store() -> MockStore {
    FramedStore::new(RamStorage::new(), 0)
}

pub fn breaker_with(switch: MockSwitch, store: MockStore) -> Breaker {
    let mut breaker = TripCurve::new(
        switch,
        MockZeroCrossing::default(),
        MockMeasurement::default(),
        store,
    );
    breaker
        .init(MockInstant::millis(0))
        .expect("init should succeed");
    breaker
}

/// Initialized breaker with the switch open and an empty store.
pub fn breaker() -> Breaker {
    breaker_with(MockSwitch::new(), empty_store())
}

pub fn input(breaker: &mut Breaker, input: BreakerInput, at: u64) {
    breaker
        .handle_input(input, MockInstant::millis(at))
        .expect("input should be accepted");
}

pub fn poll(breaker: &mut Breaker, at: u64) {
    breaker
        .poll(MockInstant::millis(at))
        .expect("poll should succeed");
}

/// Reports the switch edge matching its current position.
pub fn report_switch(breaker: &mut Breaker, at: u64) {
    let closed = breaker.switch().is_on();
    input(breaker, BreakerInput::SwitchChanged { closed }, at);
}

/// Closes on an AC supply starting at `at`; returns the time the breaker closed.
pub fn close_ac(breaker: &mut Breaker, at: u64) -> u64 {
    breaker
        .close(MockInstant::millis(at))
        .expect("close should succeed");
    for n in 1..=4 {
        input(breaker, BreakerInput::ZeroCrossing, at + n * 10);
    }
    poll(breaker, at + 200);
    assert_eq!(breaker.state(), TripState::Transient);
    assert!(breaker.msm().is_ac_supply());

    input(breaker, BreakerInput::ZeroCrossing, at + 210);
    report_switch(breaker, at + 211);
    assert_eq!(breaker.state(), TripState::Closed);
    at + 211
}

/// Closes on a DC supply starting at `at`; returns the time the breaker closed.
pub fn close_dc(breaker: &mut Breaker, at: u64) -> u64 {
    breaker
        .close(MockInstant::millis(at))
        .expect("close should succeed");
    poll(breaker, at + 200);
    assert!(!breaker.msm().is_ac_supply());
    report_switch(breaker, at + 201);
    assert_eq!(breaker.state(), TripState::Closed);
    at + 201
}
