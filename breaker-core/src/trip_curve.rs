//! Trip-curve facade.
//!
//! [`TripCurve`] is the single owned context of a breaker. It composes the
//! main state machine, the inverse-time monitor and the persisted
//! configuration with the injected collaborators, and exposes the command
//! surface used by consoles and firmware tasks. Every method runs on the
//! caller's context; callers serialize access by owning the value from one
//! task and feeding interrupt-originated inputs through a queue.

use core::fmt;

use crate::config::store::{self, ConfigStore};
use crate::config::{
    ConfigError, CurvePoint, ModulationConfig, PersistedConfig, RecoveryConfig, TripCurveConfig,
};
use crate::event::Event;
use crate::measurement::MeasurementProvider;
use crate::monitor::{InverseTimeMonitor, TickOutcome};
use crate::msm::{MainStateMachine, MsmCause, MsmState};
use crate::queue::{BreakerInput, InputQueueConsumer};
use crate::switch::{SwitchCause, SwitchDriver, SwitchError};
use crate::telemetry::{TelemetryEventKind, TelemetryRecorder};
use crate::timer::MonotonicInstant;
use crate::zero_crossing::ZeroCrossingSource;

/// Public breaker state.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripState {
    #[default]
    Undefined,
    Opened,
    Closed,
    /// Supply detection, closing or opening in progress.
    Transient,
}

impl fmt::Display for TripState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TripState::Undefined => "undefined",
            TripState::Opened => "opened",
            TripState::Closed => "closed",
            TripState::Transient => "transient",
        })
    }
}

impl From<MsmState> for TripState {
    fn from(state: MsmState) -> Self {
        match state {
            MsmState::Undefined => TripState::Undefined,
            MsmState::Opened => TripState::Opened,
            MsmState::Closed => TripState::Closed,
            MsmState::SupplyWait | MsmState::CloseWait | MsmState::OpenWait => {
                TripState::Transient
            }
        }
    }
}

/// Public reason for the last state change.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripCause {
    #[default]
    None,
    External,
    OverCurrentHw,
    /// Inverse-time curve trip.
    OverCurrentSw,
    OverCurrentTest,
    OverTemperature,
    Undervoltage,
}

impl fmt::Display for TripCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TripCause::None => "none",
            TripCause::External => "external",
            TripCause::OverCurrentHw => "overcurrent-hw",
            TripCause::OverCurrentSw => "overcurrent-sw",
            TripCause::OverCurrentTest => "overcurrent-test",
            TripCause::OverTemperature => "overtemperature",
            TripCause::Undervoltage => "undervoltage",
        })
    }
}

/// Notification delivered to the registered observer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TripNotification {
    pub state: TripState,
    pub cause: TripCause,
}

/// Observer invoked from [`TripCurve::dispatch_notification`].
pub type TripCallback = fn(TripNotification);

/// Errors surfaced by the facade.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TripCurveError {
    /// The facade is not initialized.
    NotSupported,
    /// Rejected configuration value.
    InvalidArgument,
    /// More curve points than can be stored.
    NoMemory,
    /// The switch driver rejected the request.
    Hardware(SwitchError),
}

impl fmt::Display for TripCurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripCurveError::NotSupported => f.write_str("not supported"),
            TripCurveError::InvalidArgument => f.write_str("invalid argument"),
            TripCurveError::NoMemory => f.write_str("no memory"),
            TripCurveError::Hardware(err) => write!(f, "hardware: {err}"),
        }
    }
}

impl From<ConfigError> for TripCurveError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::TooManyPoints => TripCurveError::NoMemory,
            _ => TripCurveError::InvalidArgument,
        }
    }
}

impl From<SwitchError> for TripCurveError {
    fn from(value: SwitchError) -> Self {
        TripCurveError::Hardware(value)
    }
}

/// Owned breaker context.
pub struct TripCurve<I, S, Z, M, C>
where
    I: MonotonicInstant,
{
    switch: S,
    zero_crossing: Z,
    measurement: M,
    store: C,
    config: TripCurveConfig,
    msm: MainStateMachine<I>,
    monitor: InverseTimeMonitor<I>,
    telemetry: TelemetryRecorder<I>,
    callback: Option<TripCallback>,
    pending: Option<TripNotification>,
    last_seen: Option<I>,
    initialized: bool,
}

impl<I, S, Z, M, C> TripCurve<I, S, Z, M, C>
where
    I: MonotonicInstant,
    S: SwitchDriver,
    Z: ZeroCrossingSource,
    M: MeasurementProvider,
    C: ConfigStore,
{
    /// Creates an uninitialized breaker around its collaborators.
    pub fn new(switch: S, zero_crossing: Z, measurement: M, store: C) -> Self {
        Self {
            switch,
            zero_crossing,
            measurement,
            store,
            config: TripCurveConfig::default(),
            msm: MainStateMachine::new(RecoveryConfig::default(), ModulationConfig::default()),
            monitor: InverseTimeMonitor::new(),
            telemetry: TelemetryRecorder::new(),
            callback: None,
            pending: None,
            last_seen: None,
            initialized: false,
        }
    }

    /// Restores the configuration, starts the state machine from the switch
    /// position and starts the monitor.
    ///
    /// Calling `init` on an initialized breaker has no effect.
    ///
    /// Records that fail to load are replaced by defaults, which are written
    /// back immediately.
    ///
    /// # Errors
    ///
    /// Currently infallible; the result is kept for collaborator failures that
    /// must abort start-up.
    pub fn init(&mut self, now: I) -> Result<(), TripCurveError> {
        if self.initialized {
            return Ok(());
        }
        self.last_seen = Some(now);

        self.config = self.restore_or_default::<TripCurveConfig>(now);
        let recovery = self.restore_or_default::<RecoveryConfig>(now);
        let modulation = self.restore_or_default::<ModulationConfig>(now);

        if let Err(err) = self.switch.set_hardware_limit(self.config.hardware_limit) {
            warn!("hardware limit {} rejected: {}", self.config.hardware_limit, err);
        }

        self.switch.enable_events();
        self.zero_crossing.enable_events();

        self.msm = MainStateMachine::new(recovery, modulation);
        self.msm.start(&self.switch);
        self.telemetry
            .record_state_change(MsmState::Undefined, self.msm.state(), now);

        self.monitor.reset();
        self.monitor.start(now);
        self.pending = None;
        self.initialized = true;
        info!("trip curve initialized: {}", self.state());
        Ok(())
    }

    /// Stops event delivery and returns to the undefined state.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn shutdown(&mut self) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.switch.disable_events();
        self.zero_crossing.disable_events();
        self.msm.stop();
        self.monitor.stop();
        self.monitor.reset();
        self.pending = None;
        self.initialized = false;
        info!("trip curve shut down");
        Ok(())
    }

    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Requests the breaker to close and re-arms the monitor.
    ///
    /// A breaker that is already closed keeps its accumulated over-current
    /// time, so repeated close requests cannot postpone a curve trip.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn close(&mut self, now: I) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        if self.msm.state() == MsmState::Closed {
            debug!("close ignored, already closed");
            return Ok(());
        }
        self.monitor.reset();
        self.apply(Event::CmdClose, now)?;
        self.monitor.start(now);
        Ok(())
    }

    /// Requests the breaker to open and stops the monitor.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn open(&mut self, now: I) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.apply(Event::CmdOpen, now)?;
        self.monitor.stop();
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> TripState {
        if self.initialized {
            self.msm.state().into()
        } else {
            TripState::Undefined
        }
    }

    /// Reason for the last state change, refined by the switch driver's
    /// latched cause when the state machine only knows it as "other".
    #[must_use]
    pub fn cause(&self) -> TripCause {
        if !self.initialized {
            return TripCause::None;
        }
        match self.msm.cause() {
            MsmCause::None => TripCause::None,
            MsmCause::External => TripCause::External,
            MsmCause::OverCurrentHw => TripCause::OverCurrentHw,
            MsmCause::OverCurrentDuration => TripCause::OverCurrentSw,
            MsmCause::Other => match self.switch.cause() {
                SwitchCause::OverTemperature => TripCause::OverTemperature,
                SwitchCause::OcpTest => TripCause::OverCurrentTest,
                SwitchCause::Undervoltage => TripCause::Undervoltage,
                _ => TripCause::None,
            },
        }
    }

    /// Programs the hardware over-current limit and persists it.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::Hardware`] when the driver rejects the limit; the
    /// stored limit is then left unchanged.
    pub fn set_hardware_limit(&mut self, limit: u8) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.switch.set_hardware_limit(limit)?;
        self.config.hardware_limit = limit;
        let config = self.config.clone();
        self.persist(&config);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn hardware_limit(&self) -> Result<u8, TripCurveError> {
        self.ensure_initialized()?;
        Ok(self.config.hardware_limit)
    }

    /// Replaces the curve points and persists them.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::InvalidArgument`] for an empty or non-monotonic curve
    /// and [`TripCurveError::NoMemory`] for too many points. The previous
    /// curve stays in effect on error.
    pub fn set_points(&mut self, points: &[CurvePoint]) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.config.set_points(points)?;
        self.monitor.reset();
        let config = self.config.clone();
        self.persist(&config);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn points(&self) -> Result<&[CurvePoint], TripCurveError> {
        self.ensure_initialized()?;
        Ok(self.config.points())
    }

    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn point_count(&self) -> Result<usize, TripCurveError> {
        Ok(self.points()?.len())
    }

    /// Copies as many points as fit into `out` and returns how many were copied.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn get_points(&self, out: &mut [CurvePoint]) -> Result<usize, TripCurveError> {
        let points = self.points()?;
        let count = points.len().min(out.len());
        out[..count].copy_from_slice(&points[..count]);
        Ok(count)
    }

    /// Replaces the recovery policy and persists it.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::InvalidArgument`] when the reset timeout is out of
    /// range.
    pub fn set_recovery_config(&mut self, config: RecoveryConfig) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.msm.set_config(config)?;
        self.persist(&config);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn recovery_config(&self) -> Result<RecoveryConfig, TripCurveError> {
        self.ensure_initialized()?;
        Ok(*self.msm.config())
    }

    /// Replaces the modulation parameters and persists them.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::InvalidArgument`] unless `0 < closed < period`.
    pub fn set_modulation_config(
        &mut self,
        config: ModulationConfig,
    ) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.msm.set_modulation_config(config)?;
        self.persist(&config);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn modulation_config(&self) -> Result<ModulationConfig, TripCurveError> {
        self.ensure_initialized()?;
        Ok(self.msm.modulation().config())
    }

    /// Registers the observer notified of protective trips, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn set_callback(&mut self, callback: Option<TripCallback>) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.callback = callback;
        Ok(())
    }

    /// Delivers the pending notification, if any, to the registered observer.
    ///
    /// Runs outside event processing so observers may call back into the
    /// facade. Several trips between two dispatches coalesce into one
    /// notification describing the latest state.
    pub fn dispatch_notification(&mut self) -> Option<TripNotification> {
        let notification = self.pending.take()?;
        if let Some(callback) = self.callback {
            callback(notification);
        }
        Some(notification)
    }

    /// Returns `true` while a notification awaits dispatch.
    #[must_use]
    pub const fn notification_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Applies one queued input.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn handle_input(&mut self, input: BreakerInput, now: I) -> Result<(), TripCurveError> {
        match input {
            BreakerInput::ZeroCrossing => self.apply(Event::ZeroCrossingVoltage, now),
            BreakerInput::SwitchChanged { closed: true } => self.apply(Event::SwitchClosed, now),
            BreakerInput::SwitchChanged { closed: false } => self.apply(Event::SwitchOpened, now),
            BreakerInput::Open => self.open(now),
            BreakerInput::Close => self.close(now),
        }
    }

    /// Applies every input currently queued and returns how many were handled.
    ///
    /// A disconnected or failing queue ends the drain early.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn drain<Q>(&mut self, queue: &mut Q, now: I) -> Result<usize, TripCurveError>
    where
        Q: InputQueueConsumer,
    {
        self.ensure_initialized()?;
        let mut handled = 0;
        loop {
            match queue.try_dequeue() {
                Ok(Some(input)) => {
                    self.handle_input(input, now)?;
                    handled += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("input queue unavailable");
                    break;
                }
            }
        }
        Ok(handled)
    }

    /// Fires due timers, then runs every monitor tick due at `now`.
    ///
    /// # Errors
    ///
    /// [`TripCurveError::NotSupported`] when not initialized.
    pub fn poll(&mut self, now: I) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.last_seen = Some(now);

        while let Some(event) = self.msm.take_expired(now) {
            self.apply(event, now)?;
        }

        loop {
            let closed = self.msm.state() == MsmState::Closed;
            let current_ma = self.measurement.current_rms_ma();
            let outcome = self
                .monitor
                .tick(now, current_ma, self.config.points(), closed);
            match outcome {
                TickOutcome::Idle => break,
                TickOutcome::Evaluated => {}
                TickOutcome::Tripped { index } => {
                    warn!("curve point {} exceeded at {} mA", index, current_ma);
                    self.apply(Event::OverCurrentDuration, now)?;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        match (self.msm.next_deadline(), self.monitor.next_deadline()) {
            (Some(timer), Some(tick)) => Some(timer.min(tick)),
            (timer, tick) => timer.or(tick),
        }
    }

    /// Mains frequency reported by the zero-crossing source, in millihertz.
    #[must_use]
    pub fn supply_frequency_mhz(&self) -> u32 {
        self.zero_crossing.frequency_mhz()
    }

    /// Read-only view of the main state machine.
    #[must_use]
    pub const fn msm(&self) -> &MainStateMachine<I> {
        &self.msm
    }

    #[must_use]
    pub const fn monitor(&self) -> &InverseTimeMonitor<I> {
        &self.monitor
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut TelemetryRecorder<I> {
        &mut self.telemetry
    }

    #[must_use]
    pub const fn switch(&self) -> &S {
        &self.switch
    }

    pub fn switch_mut(&mut self) -> &mut S {
        &mut self.switch
    }

    #[must_use]
    pub const fn zero_crossing(&self) -> &Z {
        &self.zero_crossing
    }

    pub fn zero_crossing_mut(&mut self) -> &mut Z {
        &mut self.zero_crossing
    }

    #[must_use]
    pub const fn measurement(&self) -> &M {
        &self.measurement
    }

    pub fn measurement_mut(&mut self) -> &mut M {
        &mut self.measurement
    }

    #[must_use]
    pub const fn store(&self) -> &C {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut C {
        &mut self.store
    }

    fn ensure_initialized(&self) -> Result<(), TripCurveError> {
        if self.initialized {
            Ok(())
        } else {
            Err(TripCurveError::NotSupported)
        }
    }

    fn apply(&mut self, event: Event, now: I) -> Result<(), TripCurveError> {
        self.ensure_initialized()?;
        self.last_seen = Some(now);

        let before = self.msm.state();
        let remaining = self.msm.recovery_remaining();
        self.msm
            .handle(event, &mut self.switch, now)
            .map_err(|_| TripCurveError::NotSupported)?;

        let after = self.msm.state();
        if before != after {
            debug!("{} on {}: {} -> {}", event, before, after, self.msm.cause());
            self.telemetry.record_state_change(before, after, now);
        }
        if self.msm.recovery_remaining() < remaining {
            self.telemetry
                .record_recovery_attempt(self.msm.recovery_remaining(), now);
        }
        if self.msm.take_notification() {
            let notification = TripNotification {
                state: self.state(),
                cause: self.cause(),
            };
            warn!("tripped: {}", notification.cause);
            self.telemetry.record_trip(notification.cause, now);
            self.pending = Some(notification);
        }
        Ok(())
    }

    fn restore_or_default<T>(&mut self, now: I) -> T
    where
        T: PersistedConfig,
    {
        match store::restore::<T, C>(&mut self.store) {
            Ok(config) => {
                self.telemetry
                    .record(TelemetryEventKind::ConfigRestored(T::SECTION), now);
                config
            }
            Err(err) => {
                warn!("{} record unusable ({}), using defaults", T::SECTION, err);
                self.telemetry
                    .record(TelemetryEventKind::ConfigDefaulted(T::SECTION), now);
                let config = T::default();
                self.persist(&config);
                config
            }
        }
    }

    fn persist<T>(&mut self, config: &T)
    where
        T: PersistedConfig,
    {
        if let Err(err) = store::persist(&mut self.store, config) {
            error!("storing {} record failed: {}", T::SECTION, err);
            if let Some(now) = self.last_seen {
                self.telemetry
                    .record(TelemetryEventKind::ConfigStoreFailed(T::SECTION), now);
            }
        }
    }
}
