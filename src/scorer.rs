//! Event utility scorer.
//!
//! Estimates, cheaply and locally, how much dropping a given event would
//! hurt future matches — events that extend an active chain toward a target
//! station are protected first.

use std::collections::HashMap;
use std::time::Duration;

use log::trace;

use crate::event::{BikeId, EventTime, StationId, TripEvent};

/// Coarse importance class driving shedder aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilityLabel {
    Critical,
    Supporting,
    NonCritical,
}

/// Most recently accepted chain state observed for one bike.
#[derive(Debug, Clone)]
struct SequenceState {
    first_start: EventTime,
    last_end: EventTime,
    last_end_station: StationId,
    length: u32,
}

/// Scores inbound events for utility with respect to ongoing chains and the
/// configured target stations.
pub struct EventUtilityScorer {
    targets: Vec<StationId>,
    active_window: Duration,
    by_bike: HashMap<BikeId, SequenceState>,
}

impl EventUtilityScorer {
    pub fn new(targets: Vec<StationId>, active_window: Duration) -> Self {
        EventUtilityScorer {
            targets,
            active_window,
            by_bike: HashMap::new(),
        }
    }

    pub fn update_targets(&mut self, targets: Vec<StationId>) {
        self.targets = targets;
    }

    pub fn update_window(&mut self, active_window: Duration) {
        self.active_window = active_window;
    }

    /// Scores one event in `[0, 1]` plus its coarse label, via an additive
    /// rule over live-chain/targets/short-trip signals. Lazily prunes bike
    /// state older than the active window relative to `event.start_time`.
    pub fn score_event(&mut self, event: &TripEvent) -> (f64, UtilityLabel) {
        self.prune_expired(event.start_time);

        let mut score = 0.05_f64;

        if let Some(state) = self.by_bike.get(&event.bike_id) {
            score += 0.20;

            let extends = state.last_end_station == event.start_station
                && event
                    .start_time
                    .checked_duration_since(state.last_end)
                    .is_some_and(|d| d <= self.active_window);

            if extends {
                score += 0.35;
            } else if event
                .start_time
                .checked_duration_since(state.first_start)
                .is_some_and(|d| d <= self.active_window)
            {
                score += 0.15;
            }
        }

        if self.targets.contains(&event.start_station) {
            score += 0.15;
        }
        if self.targets.contains(&event.end_station) {
            score += 0.30;
        }

        if event
            .end_time
            .checked_duration_since(event.start_time)
            .is_some_and(|d| d <= Duration::from_secs(15 * 60))
        {
            score += 0.05;
        }

        let score = score.clamp(0.0, 1.0);
        let label = if score >= 0.75 {
            UtilityLabel::Critical
        } else if score >= 0.45 {
            UtilityLabel::Supporting
        } else {
            UtilityLabel::NonCritical
        };
        (score, label)
    }

    /// Updates (or seeds) per-bike chain state after a drop/accept decision
    /// has been made for `event`.
    pub fn note_event(&mut self, event: &TripEvent, accepted: bool) {
        self.prune_expired(event.end_time);
        if !accepted {
            return;
        }

        let extends = self
            .by_bike
            .get(&event.bike_id)
            .is_some_and(|state| {
                state.last_end_station == event.start_station
                    && event
                        .start_time
                        .checked_duration_since(state.last_end)
                        .is_some_and(|d| d <= self.active_window)
            });

        if extends {
            let state = self.by_bike.get_mut(&event.bike_id).unwrap();
            state.last_end = event.end_time;
            state.last_end_station = event.end_station;
            state.length += 1;
        } else {
            self.by_bike.insert(
                event.bike_id.clone(),
                SequenceState {
                    first_start: event.start_time,
                    last_end: event.end_time,
                    last_end_station: event.end_station,
                    length: 1,
                },
            );
        }
    }

    fn prune_expired(&mut self, now: EventTime) {
        let window = self.active_window;
        let before = self.by_bike.len();
        self.by_bike
            .retain(|_, state| now.checked_duration_since(state.last_end).is_none_or(|d| d <= window));
        let pruned = before - self.by_bike.len();
        if pruned > 0 {
            trace!("utility scorer pruned {pruned} expired bike states");
        }
    }
}
