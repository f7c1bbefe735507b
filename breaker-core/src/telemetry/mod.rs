//! Breaker telemetry shared by firmware and host targets.
//!
//! The trip curve records every state change, protective trip, recovery
//! attempt and configuration restore outcome into a fixed-size ring. Consoles
//! replay the ring oldest first; firmware additionally mirrors each record over
//! defmt as it is written.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::config::ConfigSection;
use crate::msm::MsmState;
use crate::trip_curve::TripCause;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Sequential identifier assigned to each record.
pub type EventId = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryEventKind {
    /// Main state machine moved between states.
    StateChanged { from: MsmState, to: MsmState },
    /// Breaker settled open for a protective reason.
    Tripped(TripCause),
    /// Automatic reclose scheduled after a hardware over-current trip.
    RecoveryAttempt { remaining: u16 },
    /// Record loaded from the store at init.
    ConfigRestored(ConfigSection),
    /// Record missing or corrupt; defaults were applied and re-persisted.
    ConfigDefaulted(ConfigSection),
    /// Writing the record back to the store failed.
    ConfigStoreFailed(ConfigSection),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StateChanged { from, to } => {
                write!(f, "state {from} -> {to}")
            }
            TelemetryEventKind::Tripped(cause) => write!(f, "tripped {cause}"),
            TelemetryEventKind::RecoveryAttempt { remaining } => {
                write!(f, "recovery-attempt remaining={remaining}")
            }
            TelemetryEventKind::ConfigRestored(section) => write!(f, "config-restored {section}"),
            TelemetryEventKind::ConfigDefaulted(section) => {
                write!(f, "config-defaulted {section}")
            }
            TelemetryEventKind::ConfigStoreFailed(section) => {
                write!(f, "config-store-failed {section}")
            }
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Drops every stored record; identifiers keep counting.
    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Records a state machine transition.
    pub fn record_state_change(
        &mut self,
        from: MsmState,
        to: MsmState,
        timestamp: TInstant,
    ) -> EventId {
        self.record(TelemetryEventKind::StateChanged { from, to }, timestamp)
    }

    /// Records a protective trip.
    pub fn record_trip(&mut self, cause: TripCause, timestamp: TInstant) -> EventId {
        self.record(TelemetryEventKind::Tripped(cause), timestamp)
    }

    /// Records a scheduled automatic reclose.
    pub fn record_recovery_attempt(&mut self, remaining: u16, timestamp: TInstant) -> EventId {
        self.record(TelemetryEventKind::RecoveryAttempt { remaining }, timestamp)
    }

    /// Records an arbitrary telemetry event.
    pub fn record(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}
