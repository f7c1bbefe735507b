//! Persisted breaker configuration shared by firmware and host targets.
//!
//! Three independent records make up the breaker configuration: the
//! inverse-time trip curve (plus the hardware current limit), the recovery
//! policy of the main state machine, and the parameters of the modulation
//! closed-state mode. Each record has a fixed little-endian layout so the
//! [`store`] layer can frame and checksum it without knowing its contents.

pub mod store;

use core::{fmt, time::Duration};

use heapless::Vec;

/// Upper bound on the number of points describing a trip curve.
pub const MAX_CURVE_POINTS: usize = 16;

/// Hardware over-current limit applied when no configuration was stored.
pub const DEFAULT_HARDWARE_LIMIT: u8 = 60;

/// Delay before a DC-supply reclose attempt.
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_secs(1);

/// Time the breaker must stay closed before recovery attempts are replenished.
pub const DEFAULT_RECOVERY_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Shortest accepted recovery-reset timeout.
pub const MIN_RECOVERY_RESET_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest accepted recovery-reset timeout.
pub const MAX_RECOVERY_RESET_TIMEOUT: Duration = Duration::from_secs(3600);

/// Default 16-point curve for a 16 A class B breaker, `(mA, ms)`.
const DEFAULT_CURVE: [(u32, u32); MAX_CURVE_POINTS] = [
    (18_000, 5_400_000),
    (20_000, 1_600_000),
    (22_000, 500_000),
    (24_000, 180_000),
    (26_000, 90_000),
    (28_000, 50_000),
    (30_000, 30_000),
    (32_000, 20_000),
    (34_000, 13_000),
    (36_000, 8_500),
    (38_000, 6_000),
    (40_000, 4_200),
    (42_000, 2_800),
    (44_000, 1_900),
    (46_000, 1_400),
    (48_000, 1_000),
];

/// Rejection reasons for configuration values.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Curve is empty or not monotonic.
    InvalidPoints,
    /// More points than [`MAX_CURVE_POINTS`].
    TooManyPoints,
    /// Modulation parameters violate `0 < closed < period`.
    InvalidModulation,
    /// Recovery-reset timeout outside the accepted range.
    InvalidRecoveryTimeout,
    /// Unknown closed-state operation mode discriminant.
    InvalidMode,
    /// Encoded record is shorter than its layout.
    Truncated,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Identifies one of the persisted configuration records.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigSection {
    TripCurve,
    Recovery,
    Modulation,
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSection::TripCurve => f.write_str("trip-curve"),
            ConfigSection::Recovery => f.write_str("recovery"),
            ConfigSection::Modulation => f.write_str("modulation"),
        }
    }
}

/// Fixed-layout record that can be written to and read back from a
/// [`ConfigStore`](store::ConfigStore).
pub trait PersistedConfig: Sized + Default {
    /// Record this type is stored as.
    const SECTION: ConfigSection;
    /// Byte offset of the record inside the configuration store.
    const OFFSET: u32;
    /// Length of the encoded payload.
    const ENCODED_LEN: usize;

    /// Writes the payload into `out`, which holds at least [`Self::ENCODED_LEN`] bytes.
    fn encode(&self, out: &mut [u8]);

    /// Parses and validates a payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the payload is truncated or describes an
    /// invalid configuration.
    fn decode(bytes: &[u8]) -> Result<Self, ConfigError>;
}

/// One point of the inverse-time curve.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurvePoint {
    /// RMS current threshold in milliamperes.
    pub current_ma: u32,
    /// Time the current may stay at or above the threshold, in milliseconds.
    pub duration_ms: u32,
}

impl CurvePoint {
    /// Creates a new curve point.
    #[must_use]
    pub const fn new(current_ma: u32, duration_ms: u32) -> Self {
        Self {
            current_ma,
            duration_ms,
        }
    }
}

/// Bounded storage for the points of a trip curve.
pub type CurvePoints = Vec<CurvePoint, MAX_CURVE_POINTS>;

/// Checks that `points` describe a usable inverse-time curve.
///
/// Currents must not decrease and durations must not increase from one point
/// to the next.
///
/// # Errors
///
/// [`ConfigError::InvalidPoints`] for an empty or non-monotonic curve,
/// [`ConfigError::TooManyPoints`] when the curve does not fit in
/// [`MAX_CURVE_POINTS`].
pub fn validate_points(points: &[CurvePoint]) -> Result<(), ConfigError> {
    if points.is_empty() {
        return Err(ConfigError::InvalidPoints);
    }

    let monotonic = points.windows(2).all(|pair| {
        pair[0].current_ma <= pair[1].current_ma && pair[0].duration_ms >= pair[1].duration_ms
    });
    if !monotonic {
        return Err(ConfigError::InvalidPoints);
    }

    if points.len() > MAX_CURVE_POINTS {
        return Err(ConfigError::TooManyPoints);
    }

    Ok(())
}

/// Trip curve record: curve points plus the hardware current limit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TripCurveConfig {
    points: CurvePoints,
    /// Coarse instantaneous limit programmed into the switch driver.
    pub hardware_limit: u8,
}

impl TripCurveConfig {
    /// Builds a record after validating `points`.
    ///
    /// # Errors
    ///
    /// See [`validate_points`].
    pub fn new(points: &[CurvePoint], hardware_limit: u8) -> Result<Self, ConfigError> {
        let mut config = Self {
            points: Vec::new(),
            hardware_limit,
        };
        config.set_points(points)?;
        Ok(config)
    }

    /// Returns the configured curve points in ascending current order.
    #[must_use]
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Replaces the curve points, leaving the record untouched on rejection.
    ///
    /// # Errors
    ///
    /// See [`validate_points`].
    pub fn set_points(&mut self, points: &[CurvePoint]) -> Result<(), ConfigError> {
        validate_points(points)?;
        let mut replacement = CurvePoints::new();
        replacement
            .extend_from_slice(points)
            .map_err(|_| ConfigError::TooManyPoints)?;
        self.points = replacement;
        Ok(())
    }
}

impl Default for TripCurveConfig {
    fn default() -> Self {
        let points = DEFAULT_CURVE
            .iter()
            .map(|&(current_ma, duration_ms)| CurvePoint::new(current_ma, duration_ms))
            .collect();
        Self {
            points,
            hardware_limit: DEFAULT_HARDWARE_LIMIT,
        }
    }
}

impl PersistedConfig for TripCurveConfig {
    const SECTION: ConfigSection = ConfigSection::TripCurve;
    const OFFSET: u32 = 0;
    // 16 points of (u32, u32), point count, hardware limit.
    const ENCODED_LEN: usize = MAX_CURVE_POINTS * 8 + 2;

    fn encode(&self, out: &mut [u8]) {
        out[..Self::ENCODED_LEN].fill(0);
        for (slot, point) in out.chunks_exact_mut(8).zip(self.points.iter()) {
            slot[..4].copy_from_slice(&point.current_ma.to_le_bytes());
            slot[4..].copy_from_slice(&point.duration_ms.to_le_bytes());
        }
        let tail = MAX_CURVE_POINTS * 8;
        // Bounded by MAX_CURVE_POINTS, which fits in a byte.
        out[tail] = u8::try_from(self.points.len()).unwrap_or(u8::MAX);
        out[tail + 1] = self.hardware_limit;
    }

    fn decode(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(ConfigError::Truncated);
        }

        let tail = MAX_CURVE_POINTS * 8;
        let count = usize::from(bytes[tail]);
        if count > MAX_CURVE_POINTS {
            return Err(ConfigError::TooManyPoints);
        }

        let mut points = CurvePoints::new();
        for slot in bytes[..tail].chunks_exact(8).take(count) {
            let point = CurvePoint::new(read_u32(&slot[..4]), read_u32(&slot[4..]));
            points
                .push(point)
                .map_err(|_| ConfigError::TooManyPoints)?;
        }
        if !points.is_empty() {
            validate_points(&points)?;
        }

        Ok(Self {
            points,
            hardware_limit: bytes[tail + 1],
        })
    }
}

/// Behaviour layered on top of the main state machine while it is closed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClosedStateMode {
    /// Plain closed breaker.
    #[default]
    None,
    /// Periodic open/close cycling counted in zero-crossings.
    ModulationControl,
}

impl ClosedStateMode {
    /// Encodes the mode as its stored discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            ClosedStateMode::None => 0,
            ClosedStateMode::ModulationControl => 1,
        }
    }

    /// Decodes a stored discriminant.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidMode`] for unknown values.
    pub const fn from_raw(raw: u8) -> Result<Self, ConfigError> {
        match raw {
            0 => Ok(ClosedStateMode::None),
            1 => Ok(ClosedStateMode::ModulationControl),
            _ => Err(ConfigError::InvalidMode),
        }
    }
}

impl fmt::Display for ClosedStateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosedStateMode::None => f.write_str("none"),
            ClosedStateMode::ModulationControl => f.write_str("modulation"),
        }
    }
}

/// Recovery (auto-reclose) policy of the main state machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecoveryConfig {
    pub closed_state_mode: ClosedStateMode,
    pub recovery_enabled: bool,
    /// Automatic recloses permitted after hardware over-current trips.
    pub recovery_attempts: u16,
    /// Wait before reclosing on a DC supply.
    pub recovery_delay: Duration,
    /// Closed time after which the attempt budget is replenished.
    pub recovery_reset_timeout: Duration,
}

impl RecoveryConfig {
    /// Checks the reset timeout against the accepted range.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidRecoveryTimeout`] when out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if (MIN_RECOVERY_RESET_TIMEOUT..=MAX_RECOVERY_RESET_TIMEOUT)
            .contains(&self.recovery_reset_timeout)
        {
            Ok(())
        } else {
            Err(ConfigError::InvalidRecoveryTimeout)
        }
    }

    /// Attempt budget granted on every close; zero while recovery is disabled.
    #[must_use]
    pub const fn attempt_budget(&self) -> u16 {
        if self.recovery_enabled {
            self.recovery_attempts
        } else {
            0
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            closed_state_mode: ClosedStateMode::None,
            recovery_enabled: false,
            recovery_attempts: 0,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            recovery_reset_timeout: DEFAULT_RECOVERY_RESET_TIMEOUT,
        }
    }
}

impl PersistedConfig for RecoveryConfig {
    const SECTION: ConfigSection = ConfigSection::Recovery;
    const OFFSET: u32 = 160;
    const ENCODED_LEN: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.closed_state_mode.to_raw();
        out[1] = u8::from(self.recovery_enabled);
        out[2..4].copy_from_slice(&self.recovery_attempts.to_le_bytes());
        let delay_us = u32::try_from(self.recovery_delay.as_micros()).unwrap_or(u32::MAX);
        out[4..8].copy_from_slice(&delay_us.to_le_bytes());
        let reset_ms = u32::try_from(self.recovery_reset_timeout.as_millis()).unwrap_or(u32::MAX);
        out[8..12].copy_from_slice(&reset_ms.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(ConfigError::Truncated);
        }

        let config = Self {
            closed_state_mode: ClosedStateMode::from_raw(bytes[0])?,
            recovery_enabled: bytes[1] != 0,
            recovery_attempts: u16::from_le_bytes([bytes[2], bytes[3]]),
            recovery_delay: Duration::from_micros(u64::from(read_u32(&bytes[4..8]))),
            recovery_reset_timeout: Duration::from_millis(u64::from(read_u32(&bytes[8..12]))),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Parameters of the modulation closed-state mode, counted in zero-crossings.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModulationConfig {
    pub zero_crossings_while_closed: u8,
    pub zero_crossings_period: u8,
}

impl ModulationConfig {
    /// Creates a new, unvalidated parameter set.
    #[must_use]
    pub const fn new(zero_crossings_while_closed: u8, zero_crossings_period: u8) -> Self {
        Self {
            zero_crossings_while_closed,
            zero_crossings_period,
        }
    }

    /// Returns `true` when `0 < while_closed < period`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.zero_crossings_while_closed != 0
            && self.zero_crossings_while_closed < self.zero_crossings_period
    }

    /// # Errors
    ///
    /// [`ConfigError::InvalidModulation`] unless [`Self::is_valid`].
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::InvalidModulation)
        }
    }
}

impl PersistedConfig for ModulationConfig {
    const SECTION: ConfigSection = ConfigSection::Modulation;
    const OFFSET: u32 = 192;
    const ENCODED_LEN: usize = 2;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.zero_crossings_while_closed;
        out[1] = self.zero_crossings_period;
    }

    // The all-zero default is stored as-is; validity is only enforced by the setter.
    fn decode(bytes: &[u8]) -> Result<Self, ConfigError> {
        match bytes {
            [closed, period, ..] => Ok(Self::new(*closed, *period)),
            _ => Err(ConfigError::Truncated),
        }
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}
