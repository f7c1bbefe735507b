//! Inverse-time over-current monitor.
//!
//! Every tick compares the RMS current against each curve point and
//! accumulates the time spent at or above that point's threshold. A point
//! whose accumulated time reaches its duration trips the breaker.

use core::time::Duration;

use crate::config::{CurvePoint, MAX_CURVE_POINTS};
use crate::timer::MonotonicInstant;

/// Interval between monitor evaluations.
pub const MONITOR_INTERVAL: Duration = Duration::from_millis(100);

const TICK_MS: u32 = 100;

/// Outcome of a single [`InverseTimeMonitor::tick`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// The monitor is stopped or the tick is not due yet.
    Idle,
    /// Accumulators were updated, no point reached its duration.
    Evaluated,
    /// Point `index` reached its duration; the monitor stopped itself.
    Tripped { index: usize },
}

/// Accumulated over-current time per curve point.
#[derive(Clone, Debug)]
pub struct InverseTimeMonitor<Instant> {
    spent_ms: [u32; MAX_CURVE_POINTS],
    next_tick: Option<Instant>,
}

impl<Instant> InverseTimeMonitor<Instant>
where
    Instant: MonotonicInstant,
{
    /// Creates a stopped monitor with empty accumulators.
    pub const fn new() -> Self {
        Self {
            spent_ms: [0; MAX_CURVE_POINTS],
            next_tick: None,
        }
    }

    /// Schedules the first tick one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + MONITOR_INTERVAL);
    }

    /// Stops scheduling ticks; accumulators are kept.
    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Clears every accumulator.
    pub fn reset(&mut self) {
        self.spent_ms = [0; MAX_CURVE_POINTS];
    }

    /// Deadline of the next tick while running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Time accumulated against each point.
    pub fn spent(&self) -> &[u32; MAX_CURVE_POINTS] {
        &self.spent_ms
    }

    /// Runs the tick due at `now`, if any.
    ///
    /// Accumulation only happens while `closed` is set; the schedule keeps
    /// running regardless so the monitor resumes once the breaker closes.
    pub fn tick(
        &mut self,
        now: Instant,
        current_ma: u32,
        points: &[CurvePoint],
        closed: bool,
    ) -> TickOutcome {
        let Some(deadline) = self.next_tick else {
            return TickOutcome::Idle;
        };
        if now < deadline {
            return TickOutcome::Idle;
        }
        self.next_tick = Some(deadline + MONITOR_INTERVAL);

        if !closed {
            return TickOutcome::Evaluated;
        }

        match points.first() {
            Some(lowest) if current_ma >= lowest.current_ma => {}
            _ => {
                self.reset();
                return TickOutcome::Evaluated;
            }
        }

        let mut tripped = None;
        for (index, (point, spent)) in points.iter().zip(self.spent_ms.iter_mut()).enumerate() {
            if current_ma >= point.current_ma {
                *spent = spent.saturating_add(TICK_MS);
                if tripped.is_none() && *spent >= point.duration_ms {
                    tripped = Some(index);
                }
            } else {
                *spent = 0;
            }
        }

        match tripped {
            Some(index) => {
                // Re-armed by the next close.
                self.next_tick = None;
                TickOutcome::Tripped { index }
            }
            None => TickOutcome::Evaluated,
        }
    }
}

impl<Instant> Default for InverseTimeMonitor<Instant>
where
    Instant: MonotonicInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::ops::Add;

    use super::*;

    #[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
    struct Ms(u64);

    impl Add<Duration> for Ms {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Ms(self.0 + u64::try_from(rhs.as_millis()).unwrap())
        }
    }

    const CURVE: [CurvePoint; 2] = [CurvePoint::new(1_000, 500), CurvePoint::new(5_000, 200)];

    fn run(monitor: &mut InverseTimeMonitor<Ms>, from: u64, ticks: u64, current: u32) -> TickOutcome {
        let mut last = TickOutcome::Idle;
        for n in 1..=ticks {
            last = monitor.tick(Ms(from + n * 100), current, &CURVE, true);
            if matches!(last, TickOutcome::Tripped { .. }) {
                break;
            }
        }
        last
    }

    #[test]
    fn stopped_monitor_is_idle() {
        let mut monitor = InverseTimeMonitor::<Ms>::new();
        assert_eq!(monitor.tick(Ms(1_000), 50_000, &CURVE, true), TickOutcome::Idle);
    }

    #[test]
    fn tick_waits_for_deadline() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        assert_eq!(monitor.tick(Ms(99), 2_000, &CURVE, true), TickOutcome::Idle);
        assert_eq!(monitor.tick(Ms(100), 2_000, &CURVE, true), TickOutcome::Evaluated);
        assert_eq!(monitor.next_deadline(), Some(Ms(200)));
    }

    #[test]
    fn trips_exactly_at_point_duration() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        assert_eq!(run(&mut monitor, 0, 4, 2_000), TickOutcome::Evaluated);
        assert_eq!(monitor.spent()[0], 400);
        assert_eq!(
            monitor.tick(Ms(500), 2_000, &CURVE, true),
            TickOutcome::Tripped { index: 0 }
        );
        assert!(!monitor.is_running());
    }

    #[test]
    fn higher_current_trips_faster() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        assert_eq!(run(&mut monitor, 0, 10, 6_000), TickOutcome::Tripped { index: 1 });
        assert_eq!(monitor.spent()[1], 200);
    }

    #[test]
    fn dropping_below_lowest_threshold_resets() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        run(&mut monitor, 0, 3, 2_000);
        assert_eq!(monitor.tick(Ms(400), 10, &CURVE, true), TickOutcome::Evaluated);
        assert_eq!(monitor.spent()[0], 0);
    }

    #[test]
    fn accumulation_pauses_while_open() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        assert_eq!(monitor.tick(Ms(100), 9_000, &CURVE, false), TickOutcome::Evaluated);
        assert_eq!(monitor.spent(), &[0; MAX_CURVE_POINTS]);
    }

    #[test]
    fn empty_curve_never_trips() {
        let mut monitor = InverseTimeMonitor::new();
        monitor.start(Ms(0));
        for n in 1..=50 {
            assert_eq!(monitor.tick(Ms(n * 100), u32::MAX, &[], true), TickOutcome::Evaluated);
        }
    }
}
