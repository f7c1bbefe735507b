//! Main state machine of the trip curve.
//!
//! The machine owns the open/closed lifecycle of the breaker: supply detection
//! on every close, reclosing at zero-crossings on AC supplies, bounded
//! automatic recovery after hardware over-current trips, and the hand-off to
//! the closed-state operation mode. Every transition runs to completion on the
//! caller's context; hardware access goes through the [`SwitchDriver`] passed
//! into [`MainStateMachine::handle`].

use core::{fmt, time::Duration};

use crate::config::{ClosedStateMode, ConfigError, ModulationConfig, RecoveryConfig};
use crate::csom::ModulationControl;
use crate::event::{Event, EventFilter};
use crate::switch::{SwitchCause, SwitchDriver};
use crate::timer::{MonotonicInstant, TimerBank, TimerId};

/// Window during which zero-crossings are counted to classify the supply.
pub const SUPPLY_DETECT_WINDOW: Duration = Duration::from_millis(200);

/// Fewest zero-crossings inside [`SUPPLY_DETECT_WINDOW`] that indicate AC.
pub const MIN_AC_ZERO_CROSSINGS: u8 = 4;

/// Lifecycle states of the main state machine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsmState {
    /// Not started, or shut down.
    #[default]
    Undefined,
    Opened,
    /// Counting zero-crossings to tell AC from DC.
    SupplyWait,
    /// Waiting for the switch to report closed.
    CloseWait,
    Closed,
    /// Waiting for the switch to report open.
    OpenWait,
}

impl fmt::Display for MsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Reason for the last state change.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsmCause {
    #[default]
    None,
    External,
    OverCurrentHw,
    OverCurrentDuration,
    /// Anything else latched by the switch driver.
    Other,
}

impl MsmCause {
    /// Returns `true` for causes raised by a protection rather than a command.
    #[must_use]
    pub const fn is_protective(self) -> bool {
        matches!(
            self,
            MsmCause::OverCurrentHw | MsmCause::OverCurrentDuration | MsmCause::Other
        )
    }
}

impl fmt::Display for MsmCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors surfaced by [`MainStateMachine::handle`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MsmError {
    /// The machine has not been started.
    NotStarted,
}

impl fmt::Display for MsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Main state machine runtime state.
#[derive(Clone, Debug)]
pub struct MainStateMachine<Instant> {
    config: RecoveryConfig,
    state: MsmState,
    cause: MsmCause,
    active_mode: ClosedStateMode,
    zero_crossings: u8,
    ac_supply: bool,
    filter: EventFilter,
    recovery_remaining: u16,
    timers: TimerBank<Instant>,
    modulation: ModulationControl,
    notify_pending: bool,
}

impl<Instant> MainStateMachine<Instant>
where
    Instant: MonotonicInstant,
{
    /// Creates a machine in [`MsmState::Undefined`].
    pub const fn new(config: RecoveryConfig, modulation: ModulationConfig) -> Self {
        Self {
            config,
            state: MsmState::Undefined,
            cause: MsmCause::None,
            active_mode: ClosedStateMode::None,
            zero_crossings: 0,
            ac_supply: false,
            filter: EventFilter::new(),
            recovery_remaining: 0,
            timers: TimerBank::new(),
            modulation: ModulationControl::new(modulation),
            notify_pending: false,
        }
    }

    /// Starts the machine in the state matching the physical switch.
    pub fn start<S>(&mut self, switch: &S)
    where
        S: SwitchDriver,
    {
        self.timers.cancel_all();
        self.filter = EventFilter::new();
        self.state = if switch.is_on() {
            MsmState::Closed
        } else {
            self.filter.ignore(Event::ZeroCrossingVoltage);
            MsmState::Opened
        };
        self.cause = MsmCause::None;
        self.zero_crossings = 0;
        self.active_mode = ClosedStateMode::None;
        self.recovery_remaining = self.config.attempt_budget();
        self.modulation.cleanup();
        self.notify_pending = false;
        info!("msm started: {}", self.state);
    }

    /// Returns the machine to [`MsmState::Undefined`] and drops pending timers.
    pub fn stop(&mut self) {
        self.timers.cancel_all();
        self.state = MsmState::Undefined;
        self.cause = MsmCause::None;
        self.notify_pending = false;
    }

    #[must_use]
    pub const fn state(&self) -> MsmState {
        self.state
    }

    #[must_use]
    pub const fn cause(&self) -> MsmCause {
        self.cause
    }

    /// Supply classification of the current close cycle.
    #[must_use]
    pub const fn is_ac_supply(&self) -> bool {
        self.ac_supply
    }

    #[must_use]
    pub const fn recovery_remaining(&self) -> u16 {
        self.recovery_remaining
    }

    #[must_use]
    pub const fn zero_crossings(&self) -> u8 {
        self.zero_crossings
    }

    #[must_use]
    pub const fn event_filter(&self) -> &EventFilter {
        &self.filter
    }

    #[must_use]
    pub const fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Replaces the recovery policy.
    ///
    /// A changed closed-state mode is picked up by the next event handled in
    /// `Closed`. A smaller attempt budget caps the attempts left in the
    /// current cycle at once; a larger one applies from the next close.
    ///
    /// # Errors
    ///
    /// See [`RecoveryConfig::validate`].
    pub fn set_config(&mut self, config: RecoveryConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        self.recovery_remaining = self.recovery_remaining.min(config.attempt_budget());
        Ok(())
    }

    #[must_use]
    pub const fn modulation(&self) -> &ModulationControl {
        &self.modulation
    }

    /// Replaces the modulation parameters.
    ///
    /// # Errors
    ///
    /// See [`ModulationControl::set_config`].
    pub fn set_modulation_config(&mut self, config: ModulationConfig) -> Result<(), ConfigError> {
        self.modulation.set_config(config)
    }

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Returns and clears the pending observer notification.
    pub fn take_notification(&mut self) -> bool {
        core::mem::take(&mut self.notify_pending)
    }

    /// Delivers every timer due at `now`.
    ///
    /// # Errors
    ///
    /// [`MsmError::NotStarted`] before [`Self::start`].
    pub fn poll_timers<S>(&mut self, switch: &mut S, now: Instant) -> Result<usize, MsmError>
    where
        S: SwitchDriver,
    {
        let mut fired = 0;
        while let Some(event) = self.take_expired(now) {
            self.handle(event, switch, now)?;
            fired += 1;
        }
        Ok(fired)
    }

    /// Disarms the earliest timer due at `now` and returns its event.
    ///
    /// Callers that need to observe each expiry separately feed the event back
    /// through [`Self::handle`].
    pub fn take_expired(&mut self, now: Instant) -> Option<Event> {
        self.timers.take_expired(now).map(TimerId::event)
    }

    /// Applies a single event to the transition table.
    ///
    /// Events without a transition in the current state are dropped.
    ///
    /// # Errors
    ///
    /// [`MsmError::NotStarted`] before [`Self::start`].
    pub fn handle<S>(&mut self, event: Event, switch: &mut S, now: Instant) -> Result<(), MsmError>
    where
        S: SwitchDriver,
    {
        if self.filter.is_ignored(event) {
            return Ok(());
        }

        match self.state {
            MsmState::Undefined => return Err(MsmError::NotStarted),
            MsmState::Opened => {
                if event == Event::CmdClose {
                    self.close_from_opened(now);
                }
            }
            MsmState::SupplyWait => match event {
                Event::CmdOpen => self.abort_supply_wait(),
                Event::ZeroCrossingVoltage => {
                    self.zero_crossings = self.zero_crossings.saturating_add(1);
                }
                Event::SupplyTimerExpired => self.classify_supply(switch),
                _ => {}
            },
            MsmState::CloseWait => match event {
                Event::CmdOpen => self.open_before_open_wait(switch),
                Event::RecoveryTimerExpired | Event::ZeroCrossingVoltage => {
                    self.timers.cancel(TimerId::Recovery);
                    self.reclose(switch);
                }
                Event::SwitchClosed => self.enter_closed(now),
                _ => {}
            },
            MsmState::Closed => {
                match event {
                    Event::CmdOpen => self.open_before_open_wait(switch),
                    Event::OverCurrentDuration => self.trip_on_duration(switch),
                    Event::SwitchOpened => self.switch_opened_while_closed(switch, now),
                    Event::RecoveryResetTimerExpired => {
                        self.recovery_remaining = self.config.attempt_budget();
                        info!("recovery attempts replenished: {}", self.recovery_remaining);
                    }
                    _ => {}
                }
                self.closed_state_mode_event(event, switch);
            }
            MsmState::OpenWait => match event {
                Event::ZeroCrossingVoltage => switch.turn_off(),
                Event::SwitchOpened => self.settle_opened(),
                _ => {}
            },
        }

        Ok(())
    }

    fn close_from_opened(&mut self, now: Instant) {
        info!("close");
        self.timers.cancel_all();
        self.zero_crossings = 0;
        self.state = MsmState::SupplyWait;
        self.cause = MsmCause::External;
        self.active_mode = ClosedStateMode::None;
        self.recovery_remaining = self.config.attempt_budget();
        self.filter.accept(Event::ZeroCrossingVoltage);
        self.timers.arm(TimerId::SupplyDetect, now, SUPPLY_DETECT_WINDOW);
    }

    fn abort_supply_wait(&mut self) {
        info!("open during supply detection");
        self.timers.cancel(TimerId::SupplyDetect);
        self.cause = MsmCause::External;
        self.settle_opened();
    }

    fn classify_supply<S>(&mut self, switch: &mut S)
    where
        S: SwitchDriver,
    {
        let counted = core::mem::take(&mut self.zero_crossings);
        self.state = MsmState::CloseWait;
        self.ac_supply = counted >= MIN_AC_ZERO_CROSSINGS;

        if self.ac_supply {
            // Reclose happens at the next zero-crossing.
            info!("supply: ac ({} crossings)", counted);
            return;
        }

        info!("supply: dc ({} crossings)", counted);
        self.filter.ignore(Event::ZeroCrossingVoltage);
        self.reclose(switch);
    }

    fn open_before_open_wait<S>(&mut self, switch: &mut S)
    where
        S: SwitchDriver,
    {
        info!("open");
        self.timers.cancel(TimerId::Recovery);
        self.timers.cancel(TimerId::RecoveryReset);
        self.cause = MsmCause::External;

        if !switch.is_on() {
            // Already released by the closed-state mode.
            self.settle_opened();
            return;
        }

        self.state = MsmState::OpenWait;
        if !self.ac_supply {
            switch.turn_off();
        }
    }

    fn reclose<S>(&mut self, switch: &mut S)
    where
        S: SwitchDriver,
    {
        if let Err(cause) = switch.turn_on() {
            warn!("switch refused to close: {}", cause);
            self.adopt_switch_cause(cause);
        }
    }

    fn enter_closed(&mut self, now: Instant) {
        self.state = MsmState::Closed;
        if self.recovery_remaining < self.config.attempt_budget() {
            self.timers.arm(
                TimerId::RecoveryReset,
                now,
                self.config.recovery_reset_timeout,
            );
        }
        info!("closed");
    }

    fn trip_on_duration<S>(&mut self, switch: &mut S)
    where
        S: SwitchDriver,
    {
        warn!("over-current duration trip");
        self.timers.cancel(TimerId::RecoveryReset);
        self.cause = MsmCause::OverCurrentDuration;

        if !switch.is_on() {
            // Released by the closed-state mode; no edge will follow.
            self.settle_opened();
            return;
        }

        self.state = MsmState::OpenWait;
        if !self.ac_supply {
            switch.turn_off();
        }
    }

    fn switch_opened_while_closed<S>(&mut self, switch: &S, now: Instant)
    where
        S: SwitchDriver,
    {
        self.timers.cancel(TimerId::RecoveryReset);

        let latched = switch.cause();
        match latched {
            SwitchCause::External => {
                // Released by the closed-state mode, which recloses it.
            }
            SwitchCause::HardwareOvercurrent if self.recovery_remaining > 0 => {
                self.recovery_remaining -= 1;
                self.state = MsmState::CloseWait;
                warn!(
                    "hardware over-current, reclosing ({} attempts left)",
                    self.recovery_remaining
                );
                // AC supplies reclose at the next zero-crossing instead.
                if !self.ac_supply {
                    self.timers
                        .arm(TimerId::Recovery, now, self.config.recovery_delay);
                }
            }
            _ => {
                warn!("switch tripped: {}", latched);
                self.adopt_switch_cause(latched);
                self.settle_opened();
            }
        }
    }

    fn settle_opened(&mut self) {
        self.state = MsmState::Opened;
        self.filter.ignore(Event::ZeroCrossingVoltage);
        if self.cause.is_protective() {
            self.notify_pending = true;
        }
    }

    fn adopt_switch_cause(&mut self, cause: SwitchCause) {
        match cause {
            SwitchCause::HardwareOvercurrent => self.cause = MsmCause::OverCurrentHw,
            // Commanded changes keep the cause chosen by the state machine.
            SwitchCause::External => {}
            _ => self.cause = MsmCause::Other,
        }
    }

    fn closed_state_mode_event<S>(&mut self, event: Event, switch: &mut S)
    where
        S: SwitchDriver,
    {
        if self.state != MsmState::Closed {
            return;
        }

        if self.active_mode != self.config.closed_state_mode {
            info!("closed-state mode: {}", self.config.closed_state_mode);
            self.active_mode = self.config.closed_state_mode;
            self.cleanup_closed_state_mode(switch);
            return;
        }

        match self.active_mode {
            ClosedStateMode::None => {}
            ClosedStateMode::ModulationControl if self.ac_supply => {
                self.modulation.handle(event, switch);
            }
            ClosedStateMode::ModulationControl => {
                trace!("modulation requires an ac supply");
            }
        }
    }

    fn cleanup_closed_state_mode<S>(&mut self, switch: &mut S)
    where
        S: SwitchDriver,
    {
        self.modulation.cleanup();

        if switch.is_on() {
            return;
        }

        // Still logically closed: bring the switch back.
        self.state = MsmState::CloseWait;
        if !self.ac_supply {
            self.reclose(switch);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::ops::Add;

    use super::*;
    use crate::switch::SwitchError;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    struct Ticks(u64);

    impl Add<Duration> for Ticks {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Ticks(self.0 + u64::try_from(rhs.as_millis()).unwrap())
        }
    }

    #[derive(Default)]
    struct ScriptedSwitch {
        on: bool,
        cause: SwitchCause,
        refuse: Option<SwitchCause>,
        on_calls: usize,
        off_calls: usize,
    }

    impl SwitchDriver for ScriptedSwitch {
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

        fn set_hardware_limit(&mut self, _: u8) -> Result<(), SwitchError> {
            Ok(())
        }
    }

    fn started(switch: &ScriptedSwitch) -> MainStateMachine<Ticks> {
        let mut msm = MainStateMachine::new(RecoveryConfig::default(), ModulationConfig::default());
        msm.start(switch);
        msm
    }

    #[test]
    fn events_before_start_are_rejected() {
        let mut msm: MainStateMachine<Ticks> =
            MainStateMachine::new(RecoveryConfig::default(), ModulationConfig::default());
        let mut switch = ScriptedSwitch::default();
        assert_eq!(
            msm.handle(Event::CmdClose, &mut switch, Ticks(0)),
            Err(MsmError::NotStarted)
        );
    }

    #[test]
    fn start_follows_switch_position() {
        let closed = ScriptedSwitch {
            on: true,
            ..ScriptedSwitch::default()
        };
        assert_eq!(started(&closed).state(), MsmState::Closed);
        let open = ScriptedSwitch::default();
        let msm = started(&open);
        assert_eq!(msm.state(), MsmState::Opened);
        assert!(msm.event_filter().is_ignored(Event::ZeroCrossingVoltage));
    }

    #[test]
    fn dc_supply_closes_when_detection_window_ends() {
        let mut switch = ScriptedSwitch::default();
        let mut msm = started(&switch);

        msm.handle(Event::CmdClose, &mut switch, Ticks(0)).unwrap();
        assert_eq!(msm.state(), MsmState::SupplyWait);
        assert_eq!(msm.next_deadline(), Some(Ticks(200)));

        msm.handle(Event::ZeroCrossingVoltage, &mut switch, Ticks(50))
            .unwrap();
        assert_eq!(msm.poll_timers(&mut switch, Ticks(199)), Ok(0));
        assert_eq!(msm.poll_timers(&mut switch, Ticks(200)), Ok(1));

        assert_eq!(msm.state(), MsmState::CloseWait);
        assert!(!msm.is_ac_supply());
        assert_eq!(switch.on_calls, 1);
        assert!(msm.event_filter().is_ignored(Event::ZeroCrossingVoltage));
    }

    #[test]
    fn refused_close_records_switch_cause() {
        let mut switch = ScriptedSwitch {
            refuse: Some(SwitchCause::OverTemperature),
            ..ScriptedSwitch::default()
        };
        let mut msm = started(&switch);
        msm.handle(Event::CmdClose, &mut switch, Ticks(0)).unwrap();
        msm.poll_timers(&mut switch, Ticks(200)).unwrap();

        assert_eq!(msm.state(), MsmState::CloseWait);
        assert_eq!(msm.cause(), MsmCause::Other);
        assert_eq!(switch.on_calls, 1, "no immediate retry");
    }

    #[test]
    fn open_during_supply_detection_cancels_timer() {
        let mut switch = ScriptedSwitch::default();
        let mut msm = started(&switch);
        msm.handle(Event::CmdClose, &mut switch, Ticks(0)).unwrap();
        msm.handle(Event::CmdOpen, &mut switch, Ticks(10)).unwrap();

        assert_eq!(msm.state(), MsmState::Opened);
        assert_eq!(msm.cause(), MsmCause::External);
        assert_eq!(msm.next_deadline(), None);
        assert!(!msm.take_notification());
    }

    #[test]
    fn non_overcurrent_trip_opens_and_notifies() {
        let mut switch = ScriptedSwitch {
            on: true,
            ..ScriptedSwitch::default()
        };
        let mut msm = started(&switch);
        switch.on = false;
        switch.cause = SwitchCause::Undervoltage;
        msm.handle(Event::SwitchOpened, &mut switch, Ticks(0))
            .unwrap();

        assert_eq!(msm.state(), MsmState::Opened);
        assert_eq!(msm.cause(), MsmCause::Other);
        assert!(msm.take_notification());
        assert!(!msm.take_notification());
    }

    #[test]
    fn recovery_reset_timer_replenishes_budget() {
        let mut switch = ScriptedSwitch::default();
        let mut msm = started(&switch);
        msm.set_config(RecoveryConfig {
            recovery_enabled: true,
            recovery_attempts: 1,
            ..RecoveryConfig::default()
        })
        .unwrap();

        msm.handle(Event::CmdClose, &mut switch, Ticks(0)).unwrap();
        msm.poll_timers(&mut switch, Ticks(200)).unwrap();
        msm.handle(Event::SwitchClosed, &mut switch, Ticks(201))
            .unwrap();

        switch.on = false;
        switch.cause = SwitchCause::HardwareOvercurrent;
        msm.handle(Event::SwitchOpened, &mut switch, Ticks(300))
            .unwrap();
        assert_eq!(msm.recovery_remaining(), 0);
        assert_eq!(msm.state(), MsmState::CloseWait);

        // DC supply: the recovery timer drives the reclose.
        msm.poll_timers(&mut switch, Ticks(1_300)).unwrap();
        assert_eq!(switch.on_calls, 2);
        msm.handle(Event::SwitchClosed, &mut switch, Ticks(1_301))
            .unwrap();
        assert_eq!(msm.next_deadline(), Some(Ticks(61_301)));

        msm.poll_timers(&mut switch, Ticks(61_301)).unwrap();
        assert_eq!(msm.recovery_remaining(), 1);
    }
}
