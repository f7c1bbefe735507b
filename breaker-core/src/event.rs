//! Events consumed by the breaker state machines.

use core::fmt;

/// Number of distinct [`Event`] kinds.
pub const EVENT_KIND_COUNT: usize = 9;

/// Inputs of the main state machine and, while closed, of the closed-state mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Operator requested the breaker to open.
    CmdOpen,
    /// Operator requested the breaker to close.
    CmdClose,
    /// Mains voltage crossed zero.
    ZeroCrossingVoltage,
    /// Inverse-time monitor detected a sustained over-current.
    OverCurrentDuration,
    /// Switch driver reported a falling edge; the cause is latched in the driver.
    SwitchOpened,
    /// Switch driver reported a rising edge.
    SwitchClosed,
    SupplyTimerExpired,
    RecoveryTimerExpired,
    RecoveryResetTimerExpired,
}

impl Event {
    /// All event kinds in index order.
    pub const ALL: [Event; EVENT_KIND_COUNT] = [
        Event::CmdOpen,
        Event::CmdClose,
        Event::ZeroCrossingVoltage,
        Event::OverCurrentDuration,
        Event::SwitchOpened,
        Event::SwitchClosed,
        Event::SupplyTimerExpired,
        Event::RecoveryTimerExpired,
        Event::RecoveryResetTimerExpired,
    ];

    /// Returns a dense index suitable for lookup tables.
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            Event::CmdOpen => 0,
            Event::CmdClose => 1,
            Event::ZeroCrossingVoltage => 2,
            Event::OverCurrentDuration => 3,
            Event::SwitchOpened => 4,
            Event::SwitchClosed => 5,
            Event::SupplyTimerExpired => 6,
            Event::RecoveryTimerExpired => 7,
            Event::RecoveryResetTimerExpired => 8,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Set of event kinds the state machine currently drops on arrival.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EventFilter {
    ignored: [bool; EVENT_KIND_COUNT],
}

impl EventFilter {
    /// Creates a filter that lets every event through.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ignored: [false; EVENT_KIND_COUNT],
        }
    }

    /// Starts dropping `event`.
    pub fn ignore(&mut self, event: Event) {
        self.ignored[event.as_index()] = true;
    }

    /// Stops dropping `event`.
    pub fn accept(&mut self, event: Event) {
        self.ignored[event.as_index()] = false;
    }

    /// Returns `true` when `event` should be dropped.
    #[must_use]
    pub const fn is_ignored(&self, event: Event) -> bool {
        self.ignored[event.as_index()]
    }

    /// Iterates over the kinds currently dropped.
    pub fn ignored(&self) -> impl Iterator<Item = Event> + '_ {
        Event::ALL
            .into_iter()
            .filter(|event| self.is_ignored(*event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_dense() {
        for (index, event) in Event::ALL.iter().enumerate() {
            assert_eq!(event.as_index(), index);
        }
    }

    #[test]
    fn filter_toggles_single_kind() {
        let mut filter = EventFilter::new();
        filter.ignore(Event::ZeroCrossingVoltage);
        assert!(filter.is_ignored(Event::ZeroCrossingVoltage));
        assert!(!filter.is_ignored(Event::CmdClose));
        assert_eq!(filter.ignored().count(), 1);

        filter.accept(Event::ZeroCrossingVoltage);
        assert_eq!(filter, EventFilter::new());
    }
}
