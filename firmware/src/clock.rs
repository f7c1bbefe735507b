//! Executor clock binding for the breaker state machines.

use core::ops::Add;
use core::time::Duration;

use embassy_time::{Duration as EmbassyDuration, Instant};

/// Embassy instant that advances by `core::time::Duration`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    /// Reads the executor clock.
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    /// Microseconds since boot.
    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(
            self.0
                .checked_add(EmbassyDuration::from_micros(micros))
                .unwrap_or(Instant::MAX),
        )
    }
}

/// Converts an executor duration, e.g. a measured edge interval.
pub fn from_embassy(duration: EmbassyDuration) -> Duration {
    Duration::from_micros(duration.as_micros())
}
