//! Mains zero-crossing collaborator.

use core::time::Duration;

/// Source of mains voltage zero-crossing notifications.
///
/// Crossings are delivered by the owner of the source as
/// [`BreakerInput::ZeroCrossing`](crate::queue::BreakerInput::ZeroCrossing).
pub trait ZeroCrossingSource {
    /// Estimated mains frequency in millihertz, zero when unknown.
    fn frequency_mhz(&self) -> u32;

    /// Starts delivering crossing notifications.
    fn enable_events(&mut self) {}

    /// Stops delivering crossing notifications.
    fn disable_events(&mut self) {}
}

/// Zero-crossing source that never reports a crossing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopZeroCrossingSource;

impl NoopZeroCrossingSource {
    /// Creates a new no-op source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ZeroCrossingSource for NoopZeroCrossingSource {
    fn frequency_mhz(&self) -> u32 {
        0
    }
}

/// Mains frequency in millihertz given the spacing of consecutive crossings.
///
/// Both edges of the waveform cross zero, so a full period spans two intervals.
#[must_use]
pub fn frequency_from_interval(interval: Duration) -> u32 {
    let period_ns = interval.as_nanos().saturating_mul(2);
    if period_ns == 0 {
        return 0;
    }
    u32::try_from(1_000_000_000_000u128 / period_ns).unwrap_or(u32::MAX)
}
