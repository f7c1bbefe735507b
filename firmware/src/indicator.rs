//! User button decoding and status LED patterns.

use embassy_time::Duration;

use breaker_core::queue::BreakerInput;
use breaker_core::{TripCause, TripState};

/// Presses shorter than this are contact bounce.
pub const DEBOUNCE: Duration = Duration::from_millis(30);

/// Holding the button this long requests an over-current self-test.
pub const LONG_PRESS: Duration = Duration::from_secs(2);

/// Decoded button gesture.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Press {
    Short,
    Long,
}

/// Classifies a press by how long the button was held.
pub fn classify_press(held: Duration) -> Option<Press> {
    if held < DEBOUNCE {
        None
    } else if held < LONG_PRESS {
        Some(Press::Short)
    } else {
        Some(Press::Long)
    }
}

/// A short press toggles the breaker; while a transition is in progress it
/// opens.
pub const fn toggle_input(state: TripState) -> BreakerInput {
    match state {
        TripState::Opened | TripState::Undefined => BreakerInput::Close,
        TripState::Closed | TripState::Transient => BreakerInput::Open,
    }
}

/// LED behaviour for the published breaker state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum LedPattern {
    Off,
    On,
    /// Transition in progress.
    FastBlink,
    /// Opened by a protection.
    SlowBlink,
}

impl LedPattern {
    pub const fn for_state(state: TripState, cause: TripCause) -> Self {
        match (state, cause) {
            (TripState::Closed, _) => LedPattern::On,
            (TripState::Transient, _) => LedPattern::FastBlink,
            (TripState::Opened, TripCause::None | TripCause::External)
            | (TripState::Undefined, _) => LedPattern::Off,
            (TripState::Opened, _) => LedPattern::SlowBlink,
        }
    }

    /// Time the LED holds each level; `None` for a steady pattern.
    pub const fn half_period(self) -> Option<Duration> {
        match self {
            LedPattern::Off | LedPattern::On => None,
            LedPattern::FastBlink => Some(Duration::from_millis(100)),
            LedPattern::SlowBlink => Some(Duration::from_millis(500)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presses_are_classified_by_hold_time() {
        assert_eq!(classify_press(Duration::from_millis(10)), None);
        assert_eq!(classify_press(Duration::from_millis(200)), Some(Press::Short));
        assert_eq!(classify_press(Duration::from_secs(3)), Some(Press::Long));
    }

    #[test]
    fn short_press_toggles() {
        assert_eq!(toggle_input(TripState::Opened), BreakerInput::Close);
        assert_eq!(toggle_input(TripState::Closed), BreakerInput::Open);
        assert_eq!(toggle_input(TripState::Transient), BreakerInput::Open);
    }

    #[test]
    fn protective_trips_blink() {
        assert_eq!(
            LedPattern::for_state(TripState::Opened, TripCause::OverCurrentSw),
            LedPattern::SlowBlink
        );
        assert_eq!(
            LedPattern::for_state(TripState::Opened, TripCause::External),
            LedPattern::Off
        );
        assert_eq!(
            LedPattern::for_state(TripState::Closed, TripCause::External),
            LedPattern::On
        );
        assert_eq!(
            LedPattern::SlowBlink.half_period(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(LedPattern::On.half_period(), None);
    }
}
