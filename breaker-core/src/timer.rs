//! One-shot timers owned by the main state machine.
//!
//! Timers are plain deadlines polled from the same context that processes
//! events, so cancelling a timer takes effect before any later event can be
//! handled and an expiry is never delivered into a state that already moved on.

use core::{ops::Add, time::Duration};

use crate::event::Event;

const TIMER_COUNT: usize = 3;

/// Monotonic timestamp usable by the breaker state machines.
///
/// Firmware binds this to the executor clock; tests use a plain counter.
pub trait MonotonicInstant: Copy + Ord + Add<Duration, Output = Self> {}

impl<T> MonotonicInstant for T where T: Copy + Ord + Add<Duration, Output = T> {}

/// Identifies one of the state machine timers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerId {
    SupplyDetect,
    Recovery,
    RecoveryReset,
}

impl TimerId {
    const ALL: [TimerId; TIMER_COUNT] = [
        TimerId::SupplyDetect,
        TimerId::Recovery,
        TimerId::RecoveryReset,
    ];

    const fn as_index(self) -> usize {
        match self {
            TimerId::SupplyDetect => 0,
            TimerId::Recovery => 1,
            TimerId::RecoveryReset => 2,
        }
    }

    /// Event delivered when the timer fires.
    #[must_use]
    pub const fn event(self) -> Event {
        match self {
            TimerId::SupplyDetect => Event::SupplyTimerExpired,
            TimerId::Recovery => Event::RecoveryTimerExpired,
            TimerId::RecoveryReset => Event::RecoveryResetTimerExpired,
        }
    }
}

/// Deadlines for every [`TimerId`].
#[derive(Clone, Debug)]
pub struct TimerBank<Instant> {
    deadlines: [Option<Instant>; TIMER_COUNT],
}

impl<Instant> TimerBank<Instant>
where
    Instant: Copy + Ord,
{
    /// Creates a bank with every timer disarmed.
    pub const fn new() -> Self {
        Self {
            deadlines: [None; TIMER_COUNT],
        }
    }

    /// Arms `timer` to fire `after` from `now`, replacing any previous deadline.
    pub fn arm(&mut self, timer: TimerId, now: Instant, after: Duration)
    where
        Instant: Add<Duration, Output = Instant>,
    {
        self.deadlines[timer.as_index()] = Some(now + after);
    }

    /// Disarms `timer`; a no-op when it is not running.
    pub fn cancel(&mut self, timer: TimerId) {
        self.deadlines[timer.as_index()] = None;
    }

    /// Disarms every timer.
    pub fn cancel_all(&mut self) {
        self.deadlines = [None; TIMER_COUNT];
    }

    /// Returns `true` while `timer` has a pending deadline.
    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.deadlines[timer.as_index()].is_some()
    }

    /// Returns the deadline of `timer`, if armed.
    pub fn deadline(&self, timer: TimerId) -> Option<Instant> {
        self.deadlines[timer.as_index()]
    }

    /// Returns the earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Disarms and returns the earliest timer that is due at `now`.
    pub fn take_expired(&mut self, now: Instant) -> Option<TimerId> {
        let due = TimerId::ALL
            .into_iter()
            .filter_map(|timer| {
                self.deadline(timer)
                    .filter(|deadline| *deadline <= now)
                    .map(|deadline| (deadline, timer))
            })
            .min_by_key(|(deadline, _)| *deadline)
            .map(|(_, timer)| timer)?;
        self.cancel(due);
        Some(due)
    }
}

impl<Instant> Default for TimerBank<Instant>
where
    Instant: Copy + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    struct Millis(u64);

    impl Add<Duration> for Millis {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Millis(self.0 + u64::try_from(rhs.as_millis()).unwrap())
        }
    }

    #[test]
    fn expires_in_deadline_order() {
        let mut bank = TimerBank::new();
        bank.arm(TimerId::RecoveryReset, Millis(0), Duration::from_millis(50));
        bank.arm(TimerId::SupplyDetect, Millis(0), Duration::from_millis(20));

        assert_eq!(bank.next_deadline(), Some(Millis(20)));
        assert_eq!(bank.take_expired(Millis(10)), None);
        assert_eq!(bank.take_expired(Millis(60)), Some(TimerId::SupplyDetect));
        assert_eq!(bank.take_expired(Millis(60)), Some(TimerId::RecoveryReset));
        assert_eq!(bank.take_expired(Millis(60)), None);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut bank = TimerBank::new();
        bank.arm(TimerId::Recovery, Millis(0), Duration::from_millis(5));
        bank.cancel(TimerId::Recovery);
        assert!(!bank.is_armed(TimerId::Recovery));
        assert_eq!(bank.take_expired(Millis(100)), None);
    }

    #[test]
    fn rearming_replaces_deadline() {
        let mut bank = TimerBank::new();
        bank.arm(TimerId::SupplyDetect, Millis(0), Duration::from_millis(5));
        bank.arm(TimerId::SupplyDetect, Millis(10), Duration::from_millis(5));
        assert_eq!(bank.take_expired(Millis(6)), None);
        assert_eq!(bank.take_expired(Millis(15)), Some(TimerId::SupplyDetect));
    }
}
