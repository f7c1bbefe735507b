//! Solid-state switch driven through GPIO.
//!
//! The on-command line closes the power stage; the hardware latch opens it
//! on its own when a protection fires. The status line is watched by the
//! edge task, which latches the cause into [`status`] before the breaker
//! task sees the edge.

use breaker_core::switch::{
    OcpTestDirection, SwitchCause, SwitchDriver, SwitchError, closing_permitted,
};
use embassy_stm32::gpio::Output;

use crate::status;

/// Largest protection limit the comparator can be set to, in amperes.
pub const MAX_HARDWARE_LIMIT: u8 = 100;

pub struct GpioSwitch<'d> {
    on_command: Output<'d>,
    protection_reset: Output<'d>,
    ocp_test_positive: Output<'d>,
    ocp_test_negative: Output<'d>,
}

impl<'d> GpioSwitch<'d> {
    pub fn new(
        on_command: Output<'d>,
        protection_reset: Output<'d>,
        ocp_test_positive: Output<'d>,
        ocp_test_negative: Output<'d>,
    ) -> Self {
        Self {
            on_command,
            protection_reset,
            ocp_test_positive,
            ocp_test_negative,
        }
    }

    /// Injects a test current that must trip the over-current latch.
    ///
    /// # Errors
    ///
    /// [`SwitchError::NotClosed`] while the switch is open.
    pub fn trigger_ocp_test(&mut self, direction: OcpTestDirection) -> Result<(), SwitchError> {
        if !status::switch_on() {
            defmt::warn!("ocp test needs a closed switch");
            return Err(SwitchError::NotClosed);
        }

        match direction {
            OcpTestDirection::Positive => self.ocp_test_positive.set_high(),
            OcpTestDirection::Negative => self.ocp_test_negative.set_high(),
        }
        status::set_ocp_test_active(true);
        defmt::info!("ocp test {} triggered", direction);
        Ok(())
    }

    fn release_ocp_test(&mut self) {
        // Only one direction runs at a time; drop both.
        self.ocp_test_positive.set_low();
        self.ocp_test_negative.set_low();
        status::set_ocp_test_active(false);
    }
}

impl SwitchDriver for GpioSwitch<'_> {
    fn turn_on(&mut self) -> Result<(), SwitchCause> {
        if status::switch_on() {
            return Ok(());
        }
        if let Err(cause) = closing_permitted(status::temperatures()) {
            status::latch_cause(cause);
            return Err(cause);
        }

        self.release_ocp_test();
        self.protection_reset.set_high();
        self.protection_reset.set_low();
        status::latch_cause(SwitchCause::External);
        status::set_on_command(true);
        self.on_command.set_high();
        Ok(())
    }

    fn turn_off(&mut self) {
        self.release_ocp_test();
        status::latch_cause(SwitchCause::External);
        status::set_on_command(false);
        self.on_command.set_low();
    }

    fn is_on(&self) -> bool {
        status::switch_on()
    }

    fn cause(&self) -> SwitchCause {
        status::latched_cause()
    }

    fn set_hardware_limit(&mut self, limit: u8) -> Result<(), SwitchError> {
        if limit > MAX_HARDWARE_LIMIT {
            return Err(SwitchError::LimitOutOfRange);
        }
        // The comparator reference stays at full scale; the limit is only
        // validated until the board exposes an adjustable reference.
        defmt::info!("hardware limit {} A", limit);
        Ok(())
    }

    fn enable_events(&mut self) {
        status::set_switch_events(true);
    }

    fn disable_events(&mut self) {
        status::set_switch_events(false);
    }
}
