//! Measurement collaborator and the RMS arithmetic behind it.
//!
//! The state machines only consume calibrated RMS values through
//! [`MeasurementProvider`]. Targets that sample raw ADC codes build those values
//! with [`RmsAccumulator`], [`Calibration`] and [`CurrentChannels`].

use core::fmt;

/// Mid-scale code of the 16-bit ADC, the zero point of the bipolar inputs.
pub const ADC_MIDSCALE: u16 = 32_768;

/// Distance from either ADC rail at which a channel counts as saturated.
pub const SATURATION_MARGIN: u16 = 100;

/// Default gain of the fine (high amplification) current channel, codes per A.
pub const DEFAULT_FINE_CURRENT_GAIN: u32 = 8_738;

/// Default gain of the coarse (low amplification) current channel, codes per A.
pub const DEFAULT_COARSE_CURRENT_GAIN: u32 = 874;

/// Default gain of the mains voltage channel, codes per V.
pub const DEFAULT_VOLTAGE_GAIN: u32 = 79;

/// Temperature sensors readable through a [`MeasurementProvider`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TemperatureSensor {
    PowerIn,
    PowerOut,
}

/// Source of calibrated electrical readings.
pub trait MeasurementProvider {
    /// RMS load current in milliamperes.
    fn current_rms_ma(&self) -> u32;

    /// RMS mains voltage in millivolts.
    fn voltage_rms_mv(&self) -> u32;

    /// Temperature in degrees Celsius.
    fn temperature_c(&self, sensor: TemperatureSensor) -> i32;
}

/// Measurement provider reporting an idle, cold, unpowered line.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopMeasurement;

impl NoopMeasurement {
    /// Creates a new no-op measurement provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MeasurementProvider for NoopMeasurement {
    fn current_rms_ma(&self) -> u32 {
        0
    }

    fn voltage_rms_mv(&self) -> u32 {
        0
    }

    fn temperature_c(&self, _: TemperatureSensor) -> i32 {
        25
    }
}

/// Rejection reasons for calibration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MeasurementError {
    ZeroGain,
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Linear mapping from ADC codes to physical units: `(raw - offset) / gain`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    gain: u32,
    offset: u16,
}

impl Calibration {
    /// Fine current channel defaults.
    pub const FINE_CURRENT: Self = Self {
        gain: DEFAULT_FINE_CURRENT_GAIN,
        offset: ADC_MIDSCALE,
    };

    /// Coarse current channel defaults.
    pub const COARSE_CURRENT: Self = Self {
        gain: DEFAULT_COARSE_CURRENT_GAIN,
        offset: ADC_MIDSCALE,
    };

    /// Mains voltage channel defaults.
    pub const VOLTAGE: Self = Self {
        gain: DEFAULT_VOLTAGE_GAIN,
        offset: ADC_MIDSCALE,
    };

    /// Creates calibration parameters.
    ///
    /// # Errors
    ///
    /// [`MeasurementError::ZeroGain`] when `gain` is zero.
    pub const fn new(gain: u32, offset: u16) -> Result<Self, MeasurementError> {
        if gain == 0 {
            Err(MeasurementError::ZeroGain)
        } else {
            Ok(Self { gain, offset })
        }
    }

    #[must_use]
    pub const fn gain(&self) -> u32 {
        self.gain
    }

    #[must_use]
    pub const fn offset(&self) -> u16 {
        self.offset
    }

    /// Converts an RMS value in ADC codes into milli-units.
    #[must_use]
    pub fn rms_to_milli(&self, rms_codes: u32) -> u32 {
        let scaled = u64::from(rms_codes) * 1_000 / u64::from(self.gain);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    /// Converts a single sample into signed milli-units.
    #[must_use]
    pub fn sample_to_milli(&self, raw: u16) -> i32 {
        let centered = i64::from(raw) - i64::from(self.offset);
        let scaled = centered * 1_000 / i64::from(self.gain);
        i32::try_from(scaled).unwrap_or(if scaled < 0 { i32::MIN } else { i32::MAX })
    }
}

/// Accumulates squared, offset-corrected samples over `2^shift` samples.
#[derive(Clone, Debug)]
pub struct RmsAccumulator {
    offset: u16,
    shift: u8,
    sum_of_squares: u64,
    samples: u32,
}

impl RmsAccumulator {
    /// Creates an accumulator producing one result every `2^shift` samples.
    ///
    /// `shift` is clamped to 16 so the sum of squares cannot overflow.
    #[must_use]
    pub const fn new(offset: u16, shift: u8) -> Self {
        Self {
            offset,
            shift: if shift > 16 { 16 } else { shift },
            sum_of_squares: 0,
            samples: 0,
        }
    }

    /// Number of samples per RMS window.
    #[must_use]
    pub const fn window(&self) -> u32 {
        1 << self.shift
    }

    /// Discards the partial window.
    pub fn reset(&mut self) {
        self.sum_of_squares = 0;
        self.samples = 0;
    }

    /// Adds a sample and returns the RMS in ADC codes once a window completes.
    pub fn push(&mut self, raw: u16) -> Option<u32> {
        let centered = i64::from(raw) - i64::from(self.offset);
        self.sum_of_squares += centered.unsigned_abs().pow(2);
        self.samples += 1;

        if self.samples < self.window() {
            return None;
        }

        let mean = self.sum_of_squares >> self.shift;
        self.reset();
        // The mean square of 16-bit codes is below 2^32, so its root fits.
        Some(u32::try_from(mean.isqrt()).unwrap_or(u32::MAX))
    }
}

/// Pair of current channels with different amplification.
///
/// The fine channel resolves small currents but saturates first; readings fall
/// back to the coarse channel while the fine one sits near a rail.
#[derive(Clone, Debug)]
pub struct CurrentChannels {
    fine: Calibration,
    coarse: Calibration,
    fine_rms_ma: u32,
    coarse_rms_ma: u32,
    fine_saturated: bool,
}

impl CurrentChannels {
    /// Creates the channel pair with the given calibrations.
    #[must_use]
    pub const fn new(fine: Calibration, coarse: Calibration) -> Self {
        Self {
            fine,
            coarse,
            fine_rms_ma: 0,
            coarse_rms_ma: 0,
            fine_saturated: false,
        }
    }

    /// Replaces the calibration of the fine channel.
    pub fn set_fine_calibration(&mut self, calibration: Calibration) {
        self.fine = calibration;
    }

    /// Replaces the calibration of the coarse channel.
    pub fn set_coarse_calibration(&mut self, calibration: Calibration) {
        self.coarse = calibration;
    }

    /// Records the latest raw fine-channel sample for saturation tracking.
    pub fn observe_fine_sample(&mut self, raw: u16) {
        self.fine_saturated = is_saturated(raw);
    }

    /// Stores completed RMS windows (in ADC codes) for both channels.
    pub fn update(&mut self, fine_rms_codes: u32, coarse_rms_codes: u32) {
        self.fine_rms_ma = self.fine.rms_to_milli(fine_rms_codes);
        self.coarse_rms_ma = self.coarse.rms_to_milli(coarse_rms_codes);
    }

    /// Current reading from whichever channel is usable.
    #[must_use]
    pub const fn current_rms_ma(&self) -> u32 {
        if self.fine_saturated {
            self.coarse_rms_ma
        } else {
            self.fine_rms_ma
        }
    }
}

impl Default for CurrentChannels {
    fn default() -> Self {
        Self::new(Calibration::FINE_CURRENT, Calibration::COARSE_CURRENT)
    }
}

/// Returns `true` when `raw` lies within [`SATURATION_MARGIN`] of either rail.
#[must_use]
pub const fn is_saturated(raw: u16) -> bool {
    raw <= SATURATION_MARGIN || raw >= u16::MAX - SATURATION_MARGIN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gain_is_rejected() {
        assert_eq!(Calibration::new(0, 0), Err(MeasurementError::ZeroGain));
    }

    #[test]
    fn square_wave_rms_equals_amplitude() {
        let mut rms = RmsAccumulator::new(ADC_MIDSCALE, 2);
        assert_eq!(rms.push(ADC_MIDSCALE + 1_000), None);
        assert_eq!(rms.push(ADC_MIDSCALE - 1_000), None);
        assert_eq!(rms.push(ADC_MIDSCALE + 1_000), None);
        assert_eq!(rms.push(ADC_MIDSCALE - 1_000), Some(1_000));
        assert_eq!(rms.push(ADC_MIDSCALE), None, "window restarts");
    }

    #[test]
    fn rms_codes_scale_to_milliamps() {
        let calibration = Calibration::COARSE_CURRENT;
        assert_eq!(calibration.rms_to_milli(874), 1_000);
        assert_eq!(calibration.rms_to_milli(8_740), 10_000);
    }

    #[test]
    fn sample_conversion_is_signed() {
        let calibration = Calibration::VOLTAGE;
        assert_eq!(calibration.sample_to_milli(ADC_MIDSCALE), 0);
        assert!(calibration.sample_to_milli(0) < 0);
    }

    #[test]
    fn saturated_fine_channel_falls_back_to_coarse() {
        let mut channels = CurrentChannels::default();
        channels.update(8_738, 874);
        channels.observe_fine_sample(ADC_MIDSCALE);
        assert_eq!(channels.current_rms_ma(), 1_000);

        channels.update(0, 8_740);
        channels.observe_fine_sample(u16::MAX - 20);
        assert_eq!(channels.current_rms_ma(), 10_000);
    }

    #[test]
    fn saturation_band_covers_both_rails() {
        assert!(is_saturated(0));
        assert!(is_saturated(100));
        assert!(!is_saturated(101));
        assert!(is_saturated(u16::MAX));
        assert!(!is_saturated(ADC_MIDSCALE));
    }
}
