//! Solid-state switch collaborator and its protection logic.
//!
//! Drivers own the GPIO lines and the hardware latch. The helpers here hold the
//! part of a driver that is pure decision logic: classifying why a falling
//! edge happened and whether closing is currently safe.

use core::fmt;

/// Output temperature reading above which the power board signals under-voltage.
///
/// The under-voltage shutdown circuit pulls the output temperature line to
/// ground, which reads as an absurdly high temperature.
pub const UNDERVOLTAGE_SENTINEL_C: i32 = 200;

/// Power stage temperature above which a trip is attributed to over-temperature.
pub const OVER_TEMPERATURE_TRIP_C: i32 = 80;

/// Highest power stage temperature at which the switch may be closed.
pub const MAX_CLOSING_TEMPERATURE_C: i32 = 75;

/// Reason the switch last changed state, as latched by the driver.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchCause {
    #[default]
    None,
    /// Commanded by software (operator, state machine or modulation).
    External,
    HardwareOvercurrent,
    OverTemperature,
    /// Over-current protection self-test.
    OcpTest,
    Undervoltage,
}

impl fmt::Display for SwitchCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors reported by driver configuration calls.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchError {
    /// The requested hardware limit cannot be programmed.
    LimitOutOfRange,
    /// The OCP self-test requires a closed switch.
    NotClosed,
}

impl fmt::Display for SwitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Abstraction over the physical breaker switch.
///
/// Edge notifications are delivered by the driver's owner as
/// [`BreakerInput::SwitchChanged`](crate::queue::BreakerInput::SwitchChanged)
/// once the corresponding [`cause`](Self::cause) has been latched.
pub trait SwitchDriver {
    /// Requests the switch to close.
    ///
    /// # Errors
    ///
    /// Returns the cause that prevented closing (e.g. over-temperature).
    fn turn_on(&mut self) -> Result<(), SwitchCause>;

    /// Requests the switch to open.
    fn turn_off(&mut self);

    /// Returns `true` while the switch conducts.
    fn is_on(&self) -> bool;

    /// Returns the cause latched at the last edge.
    fn cause(&self) -> SwitchCause;

    /// Programs the hardware over-current limit.
    ///
    /// # Errors
    ///
    /// Returns a [`SwitchError`] when the limit cannot be applied.
    fn set_hardware_limit(&mut self, limit: u8) -> Result<(), SwitchError>;

    /// Starts delivering edge notifications.
    fn enable_events(&mut self) {}

    /// Stops delivering edge notifications.
    fn disable_events(&mut self) {}
}

/// Switch driver that performs no hardware interaction and stays open.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopSwitchDriver;

impl NoopSwitchDriver {
    /// Creates a new no-op switch driver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SwitchDriver for NoopSwitchDriver {
    fn turn_on(&mut self) -> Result<(), SwitchCause> {
        Ok(())
    }

    fn turn_off(&mut self) {}

    fn is_on(&self) -> bool {
        false
    }

    fn cause(&self) -> SwitchCause {
        SwitchCause::None
    }

    fn set_hardware_limit(&mut self, _: u8) -> Result<(), SwitchError> {
        Ok(())
    }
}

/// Direction of the injected OCP self-test current.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OcpTestDirection {
    Positive,
    Negative,
}

/// Temperatures of the power stage at the time of an edge.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PowerStageTemperatures {
    pub input_c: i32,
    pub output_c: i32,
}

/// Snapshot of the driver lines sampled on a falling status edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FallingEdge {
    /// The on-command line was still asserted when the switch opened.
    pub on_command_active: bool,
    /// An OCP self-test was in progress.
    pub ocp_test_active: bool,
    pub temperatures: PowerStageTemperatures,
}

/// Determines why the switch opened.
///
/// An open with the on-command released was requested by software. Otherwise
/// the hardware latch fired and the power stage readings tell which
/// protection did it.
#[must_use]
pub fn classify_falling_edge(edge: &FallingEdge) -> SwitchCause {
    if !edge.on_command_active {
        return SwitchCause::External;
    }
    if edge.ocp_test_active {
        return SwitchCause::OcpTest;
    }

    let PowerStageTemperatures { input_c, output_c } = edge.temperatures;
    if output_c > UNDERVOLTAGE_SENTINEL_C {
        SwitchCause::Undervoltage
    } else if input_c > OVER_TEMPERATURE_TRIP_C || output_c > OVER_TEMPERATURE_TRIP_C {
        SwitchCause::OverTemperature
    } else {
        SwitchCause::HardwareOvercurrent
    }
}

/// Checks whether the power stage allows closing.
///
/// # Errors
///
/// Returns [`SwitchCause::Undervoltage`] while the under-voltage sentinel is
/// asserted and [`SwitchCause::OverTemperature`] while either reading exceeds
/// [`MAX_CLOSING_TEMPERATURE_C`].
pub fn closing_permitted(temperatures: PowerStageTemperatures) -> Result<(), SwitchCause> {
    if temperatures.output_c > UNDERVOLTAGE_SENTINEL_C {
        return Err(SwitchCause::Undervoltage);
    }
    if temperatures.input_c > MAX_CLOSING_TEMPERATURE_C
        || temperatures.output_c > MAX_CLOSING_TEMPERATURE_C
    {
        return Err(SwitchCause::OverTemperature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latched(input_c: i32, output_c: i32) -> FallingEdge {
        FallingEdge {
            on_command_active: true,
            ocp_test_active: false,
            temperatures: PowerStageTemperatures { input_c, output_c },
        }
    }

    #[test]
    fn released_command_is_external() {
        let edge = FallingEdge {
            on_command_active: false,
            ..latched(120, 300)
        };
        assert_eq!(classify_falling_edge(&edge), SwitchCause::External);
    }

    #[test]
    fn self_test_takes_precedence_over_temperatures() {
        let edge = FallingEdge {
            ocp_test_active: true,
            ..latched(120, 40)
        };
        assert_eq!(classify_falling_edge(&edge), SwitchCause::OcpTest);
    }

    #[test]
    fn latch_causes_follow_power_stage_readings() {
        assert_eq!(
            classify_falling_edge(&latched(25, 250)),
            SwitchCause::Undervoltage
        );
        assert_eq!(
            classify_falling_edge(&latched(81, 30)),
            SwitchCause::OverTemperature
        );
        assert_eq!(
            classify_falling_edge(&latched(30, 81)),
            SwitchCause::OverTemperature
        );
        assert_eq!(
            classify_falling_edge(&latched(80, 80)),
            SwitchCause::HardwareOvercurrent
        );
    }

    #[test]
    fn closing_guard_uses_tighter_threshold() {
        let warm = PowerStageTemperatures {
            input_c: 76,
            output_c: 30,
        };
        assert_eq!(closing_permitted(warm), Err(SwitchCause::OverTemperature));
        let cool = PowerStageTemperatures {
            input_c: 75,
            output_c: 75,
        };
        assert_eq!(closing_permitted(cool), Ok(()));
        let brown_out = PowerStageTemperatures {
            input_c: 20,
            output_c: 201,
        };
        assert_eq!(closing_permitted(brown_out), Err(SwitchCause::Undervoltage));
    }
}
