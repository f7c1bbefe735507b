//! Closed-state operation modes.
//!
//! A closed-state mode runs only while the main state machine sits in
//! `Closed`. The modulation mode cycles the switch open and closed, counting
//! mains zero-crossings instead of wall-clock time so the cycle follows the
//! mains frequency.

use core::fmt;

use crate::config::{ConfigError, ModulationConfig};
use crate::event::Event;
use crate::switch::SwitchDriver;

/// Internal phase of the modulation cycle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModulationState {
    /// Waiting for a valid configuration; entered on cleanup.
    #[default]
    Disabled,
    /// Switch conducting, counting towards the forced open.
    Closed,
    /// Switch released, counting towards the end of the period.
    Opened,
}

impl fmt::Display for ModulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Modulation control sub-state machine.
#[derive(Clone, Debug)]
pub struct ModulationControl {
    config: ModulationConfig,
    state: ModulationState,
    zero_crossings: u8,
}

impl ModulationControl {
    /// Creates a disabled modulation control using `config`.
    #[must_use]
    pub const fn new(config: ModulationConfig) -> Self {
        Self {
            config,
            state: ModulationState::Disabled,
            zero_crossings: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> ModulationConfig {
        self.config
    }

    /// Replaces the parameters; the running cycle picks them up immediately.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidModulation`] unless `0 < closed < period`.
    pub fn set_config(&mut self, config: ModulationConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    #[must_use]
    pub const fn state(&self) -> ModulationState {
        self.state
    }

    /// Zero-crossings counted in the current period.
    #[must_use]
    pub const fn zero_crossings(&self) -> u8 {
        self.zero_crossings
    }

    /// Applies `event` to the modulation cycle.
    pub fn handle<S>(&mut self, event: Event, switch: &mut S)
    where
        S: SwitchDriver,
    {
        match self.state {
            ModulationState::Disabled => self.enter(),
            ModulationState::Closed => match event {
                Event::ZeroCrossingVoltage => {
                    self.zero_crossings = self.zero_crossings.saturating_add(1);
                    if self.zero_crossings >= self.config.zero_crossings_while_closed {
                        switch.turn_off();
                    }
                }
                Event::SwitchOpened => self.state = ModulationState::Opened,
                _ => {}
            },
            ModulationState::Opened => match event {
                Event::ZeroCrossingVoltage => {
                    self.zero_crossings = self.zero_crossings.saturating_add(1);
                    if self.zero_crossings >= self.config.zero_crossings_period {
                        self.zero_crossings = 0;
                        if switch.turn_on().is_err() {
                            debug!("modulation reclose refused");
                        }
                    }
                }
                Event::SwitchClosed => self.state = ModulationState::Closed,
                _ => {}
            },
        }
    }

    /// Resets the cycle; the next event restarts it from `Disabled`.
    pub fn cleanup(&mut self) {
        self.zero_crossings = 0;
        self.state = ModulationState::Disabled;
    }

    fn enter(&mut self) {
        self.zero_crossings = 0;
        self.state = if self.config.is_valid() {
            ModulationState::Closed
        } else {
            ModulationState::Disabled
        };
    }
}
