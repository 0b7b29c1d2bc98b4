//! Trip event model and the clock it is measured against.
//!
//! Events are immutable once emitted and are shared by reference among
//! partial matches until they age out of the pattern window.

use std::sync::Arc;
use std::time::Duration;

/// Microsecond-precision instant on the event-time axis (not wall-clock).
///
/// Bike trips carry historical timestamps; the evaluator only ever needs
/// their relative order and separation, so a plain microsecond counter
/// avoids pulling in a calendar/timezone dependency the core has no use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTime(i64);

impl EventTime {
    /// Constructs an `EventTime` from a microsecond count on whatever epoch
    /// the caller's event source uses; only relative ordering matters here.
    pub const fn from_micros(micros: i64) -> Self {
        EventTime(micros)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Saturating duration between two instants; `None` if `other` is later.
    pub fn checked_duration_since(self, other: EventTime) -> Option<Duration> {
        if self.0 < other.0 {
            None
        } else {
            Some(Duration::from_micros((self.0 - other.0) as u64))
        }
    }
}

impl std::ops::Add<Duration> for EventTime {
    type Output = EventTime;
    fn add(self, rhs: Duration) -> EventTime {
        EventTime(self.0 + rhs.as_micros() as i64)
    }
}

impl std::ops::Sub<Duration> for EventTime {
    type Output = EventTime;
    fn sub(self, rhs: Duration) -> EventTime {
        EventTime(self.0 - rhs.as_micros() as i64)
    }
}

/// Opaque bike identifier. Interned as `Arc<str>` so chains can cheaply
/// clone and hash it without re-allocating per event, mirroring how the
/// original prototype keys its sequence-state map by the raw bike string.
pub type BikeId = Arc<str>;

/// Integer station identifier.
pub type StationId = i64;

/// A single bike-trip record, as delivered by the (collaborator) event
/// source. Invariant: `start_time <= end_time`.
#[derive(Debug, Clone)]
pub struct TripEvent {
    pub bike_id: BikeId,
    pub start_station: StationId,
    pub end_station: StationId,
    pub start_time: EventTime,
    pub end_time: EventTime,
    /// Trip duration in seconds as reported by the source, carried through
    /// unexamined by the core (kept for sink/export convenience).
    pub duration_s: Option<f64>,
    pub start_station_name: Option<Arc<str>>,
    pub end_station_name: Option<Arc<str>>,
}

impl TripEvent {
    pub fn new(
        bike_id: impl Into<BikeId>,
        start_station: StationId,
        end_station: StationId,
        start_time: EventTime,
        end_time: EventTime,
    ) -> Self {
        Self {
            bike_id: bike_id.into(),
            start_station,
            end_station,
            start_time,
            end_time,
            duration_s: None,
            start_station_name: None,
            end_station_name: None,
        }
    }

    /// Whether the event is internally consistent (`start_time <= end_time`).
    #[inline]
    pub fn is_well_formed(&self) -> bool {
        self.start_time <= self.end_time
    }
}
