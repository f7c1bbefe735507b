//! Simulated breaker hardware for the host emulator.

use std::collections::VecDeque;
use std::ops::Add;
use std::time::Duration;

use breaker_core::measurement::{MeasurementProvider, TemperatureSensor};
use breaker_core::queue::BreakerInput;
use breaker_core::switch::{
    FallingEdge, PowerStageTemperatures, SwitchCause, SwitchDriver, SwitchError,
    classify_falling_edge, closing_permitted,
};
use breaker_core::zero_crossing::{ZeroCrossingSource, frequency_from_interval};

/// Largest hardware limit the simulated driver accepts.
pub const MAX_HARDWARE_LIMIT: u8 = 100;

/// Half period of 50 Hz mains.
pub const MAINS_HALF_PERIOD: Duration = Duration::from_millis(10);

/// Virtual time since the session started.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(Duration);

impl SimInstant {
    pub const ZERO: Self = Self(Duration::ZERO);

    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// Fault injected through the `trip` command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InjectedFault {
    OverCurrent,
    OverTemperature,
    Undervoltage,
    SelfTest,
}

/// Switch that latches immediately and queues its edges for the session.
#[derive(Debug)]
pub struct SimSwitch {
    on: bool,
    on_command: bool,
    cause: SwitchCause,
    events_enabled: bool,
    temperatures: PowerStageTemperatures,
    edges: VecDeque<BreakerInput>,
}

impl SimSwitch {
    pub fn new() -> Self {
        Self {
            on: false,
            on_command: false,
            cause: SwitchCause::None,
            events_enabled: false,
            temperatures: PowerStageTemperatures {
                input_c: 25,
                output_c: 25,
            },
            edges: VecDeque::new(),
        }
    }

    pub fn set_temperatures(&mut self, temperatures: PowerStageTemperatures) {
        self.temperatures = temperatures;
    }

    /// Opens the switch the way the protection latch would.
    ///
    /// Returns `false` when the switch is already open.
    pub fn inject(&mut self, fault: InjectedFault) -> bool {
        if !self.on {
            return false;
        }

        let mut temperatures = self.temperatures;
        match fault {
            InjectedFault::OverCurrent | InjectedFault::SelfTest => {}
            InjectedFault::OverTemperature => temperatures.input_c = temperatures.input_c.max(95),
            InjectedFault::Undervoltage => temperatures.output_c = 250,
        }
        let edge = FallingEdge {
            on_command_active: self.on_command,
            ocp_test_active: fault == InjectedFault::SelfTest,
            temperatures,
        };

        self.on = false;
        self.cause = classify_falling_edge(&edge);
        self.push_edge(false);
        true
    }

    /// Takes the oldest undelivered edge.
    pub fn next_edge(&mut self) -> Option<BreakerInput> {
        self.edges.pop_front()
    }

    fn push_edge(&mut self, closed: bool) {
        if self.events_enabled {
            self.edges.push_back(BreakerInput::SwitchChanged { closed });
        }
    }
}

impl SwitchDriver for SimSwitch {
    fn turn_on(&mut self) -> Result<(), SwitchCause> {
        if let Err(cause) = closing_permitted(self.temperatures) {
            self.cause = cause;
            return Err(cause);
        }
        self.on_command = true;
        self.cause = SwitchCause::External;
        if !self.on {
            self.on = true;
            self.push_edge(true);
        }
        Ok(())
    }

    fn turn_off(&mut self) {
        self.on_command = false;
        self.cause = SwitchCause::External;
        if self.on {
            self.on = false;
            self.push_edge(false);
        }
    }

    fn is_on(&self) -> bool {
        self.on
    }

    fn cause(&self) -> SwitchCause {
        self.cause
    }

    fn set_hardware_limit(&mut self, limit: u8) -> Result<(), SwitchError> {
        if limit > MAX_HARDWARE_LIMIT {
            return Err(SwitchError::LimitOutOfRange);
        }
        Ok(())
    }

    fn enable_events(&mut self) {
        self.events_enabled = true;
    }

    fn disable_events(&mut self) {
        self.events_enabled = false;
        self.edges.clear();
    }
}

/// Mains supply feeding zero-crossings into the session.
#[derive(Debug)]
pub struct SimZeroCrossing {
    ac: bool,
    events_enabled: bool,
    next_crossing: Option<SimInstant>,
}

impl SimZeroCrossing {
    pub fn new() -> Self {
        Self {
            ac: true,
            events_enabled: false,
            next_crossing: None,
        }
    }

    /// Switches between an AC and a DC supply at `now`.
    pub fn set_ac(&mut self, ac: bool, now: SimInstant) {
        self.ac = ac;
        self.reschedule(now);
    }

    /// Next crossing the session must deliver, if any.
    pub fn next_crossing(&self) -> Option<SimInstant> {
        self.next_crossing
    }

    /// Marks the crossing at `at` as delivered.
    pub fn advance_past(&mut self, at: SimInstant) {
        self.next_crossing = self
            .next_crossing
            .filter(|_| self.ac && self.events_enabled)
            .map(|_| at + MAINS_HALF_PERIOD);
    }

    fn reschedule(&mut self, now: SimInstant) {
        self.next_crossing = (self.ac && self.events_enabled).then(|| now + MAINS_HALF_PERIOD);
    }
}

impl ZeroCrossingSource for SimZeroCrossing {
    fn frequency_mhz(&self) -> u32 {
        if self.ac {
            frequency_from_interval(MAINS_HALF_PERIOD)
        } else {
            0
        }
    }

    fn enable_events(&mut self) {
        self.events_enabled = true;
        self.reschedule(SimInstant::ZERO);
    }

    fn disable_events(&mut self) {
        self.events_enabled = false;
        self.next_crossing = None;
    }
}

/// Readings set from the command line.
#[derive(Copy, Clone, Debug)]
pub struct SimMeasurement {
    pub current_ma: u32,
    pub voltage_mv: u32,
    pub temperatures: PowerStageTemperatures,
}

impl SimMeasurement {
    pub fn new() -> Self {
        Self {
            current_ma: 0,
            voltage_mv: 230_000,
            temperatures: PowerStageTemperatures {
                input_c: 25,
                output_c: 25,
            },
        }
    }
}

impl MeasurementProvider for SimMeasurement {
    fn current_rms_ma(&self) -> u32 {
        self.current_ma
    }

    fn voltage_rms_mv(&self) -> u32 {
        self.voltage_mv
    }

    fn temperature_c(&self, sensor: TemperatureSensor) -> i32 {
        match sensor {
            TemperatureSensor::PowerIn => self.temperatures.input_c,
            TemperatureSensor::PowerOut => self.temperatures.output_c,
        }
    }
}
