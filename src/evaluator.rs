//! Pattern evaluator — the core of the crate.
//!
//! Maintains, per bike, at most one active chain per suffix station: because
//! extension conditions are deterministic and a chain's future is fully
//! described by its `last_end_station`, two sibling chains for the same bike
//! sharing that station are redundant — only the longest (earliest-start on
//! a tie) survives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use log::trace;

use crate::event::{BikeId, EventTime, StationId, TripEvent};
use crate::metrics::{Counters, Projection};

/// A trip event tagged with the wall-clock instant it was handed to the
/// evaluator, so the driver can later compute end-to-end detection latency
/// without the evaluator itself touching a wall clock.
#[derive(Debug, Clone)]
pub struct IngestedTrip {
    pub event: Arc<TripEvent>,
    pub ingested_at: Instant,
}

impl IngestedTrip {
    pub fn new(event: Arc<TripEvent>, ingested_at: Instant) -> Self {
        IngestedTrip { event, ingested_at }
    }
}

/// An ordered prefix of the pattern: 1..=K same-bike, station-chained trips
/// within the window, not yet terminated.
#[derive(Debug, Clone)]
struct Chain {
    events: Vec<IngestedTrip>,
    first_start: EventTime,
    last_end: EventTime,
    last_end_station: StationId,
}

impl Chain {
    fn singleton(trip: IngestedTrip) -> Self {
        let (start, end, station) = {
            let e = &trip.event;
            (e.start_time, e.end_time, e.end_station)
        };
        Chain {
            events: vec![trip],
            first_start: start,
            last_end: end,
            last_end_station: station,
        }
    }

    fn length(&self) -> usize {
        self.events.len()
    }

    fn extended(&self, trip: IngestedTrip) -> Chain {
        let mut events = self.events.clone();
        let last_end = trip.event.end_time;
        let last_end_station = trip.event.end_station;
        events.push(trip);
        Chain {
            events,
            first_start: self.first_start,
            last_end,
            last_end_station,
        }
    }
}

/// A chain plus the terminal event that completed it.
#[derive(Debug, Clone)]
pub struct CompletedMatch {
    pub events: Vec<IngestedTrip>,
    pub projection: Projection,
}

impl CompletedMatch {
    /// Earliest wall-clock ingestion time among all contributing events —
    /// the reference point the driver measures detection latency from.
    pub fn earliest_ingested_at(&self) -> Instant {
        self.events
            .iter()
            .map(|t| t.ingested_at)
            .min()
            .expect("a completed match always has at least one event")
    }
}

/// Maintains partial matches for the bike hot-path pattern and emits
/// completed matches as the chain window allows.
pub struct PatternEvaluator {
    targets: Vec<StationId>,
    window: std::time::Duration,
    max_kleene: usize,
    /// bike -> (last_end_station -> chain); at most one chain per key.
    chains: HashMap<BikeId, HashMap<StationId, Chain>>,
}

impl PatternEvaluator {
    pub fn new(targets: Vec<StationId>, window: std::time::Duration, max_kleene: usize) -> Self {
        PatternEvaluator {
            targets,
            window,
            max_kleene,
            chains: HashMap::new(),
        }
    }

    pub fn update_targets(&mut self, targets: Vec<StationId>) {
        self.targets = targets;
    }

    pub fn update_window(&mut self, window: std::time::Duration) {
        self.window = window;
    }

    pub fn max_kleene(&self) -> usize {
        self.max_kleene
    }

    /// Shrinks (or restores) the Kleene cap. Any live chain whose length now
    /// exceeds the new cap is evicted and counted as `partial_evicted`.
    /// Takes effect immediately — chains already over cap are evicted before
    /// the next event is processed.
    pub fn set_max_kleene(&mut self, new_cap: usize, counters: &mut Counters) {
        if new_cap >= self.max_kleene {
            self.max_kleene = new_cap;
            return;
        }
        let mut evicted = 0u64;
        for per_bike in self.chains.values_mut() {
            let before = per_bike.len();
            per_bike.retain(|_, chain| chain.length() <= new_cap);
            evicted += (before - per_bike.len()) as u64;
        }
        self.chains.retain(|_, per_bike| !per_bike.is_empty());
        if evicted > 0 {
            trace!("cap shrink to {new_cap} evicted {evicted} chains");
        }
        counters.partial_evicted += evicted;
        self.max_kleene = new_cap;
    }

    /// Runs one event through expire / terminal-test / extend / singleton-seed,
    /// returning every match it completed (usually 0 or 1; see module docs
    /// for why more than one per event cannot arise here).
    pub fn process_event(&mut self, trip: IngestedTrip, counters: &mut Counters) -> Vec<CompletedMatch> {
        let event: Arc<TripEvent> = trip.event.clone();
        let bike_chains = self.chains.entry(event.bike_id.clone()).or_default();

        // Step 1: window-based eviction, scoped to this bike's chains.
        let window = self.window;
        let start_time = event.start_time;
        let before = bike_chains.len();
        bike_chains.retain(|_, chain| {
            start_time
                .checked_duration_since(chain.first_start)
                .is_none_or(|d| d <= window)
        });
        let pruned = (before - bike_chains.len()) as u64;
        if pruned > 0 {
            counters.partial_pruned += pruned;
            trace!("window eviction pruned {pruned} chains for bike {}", event.bike_id);
        }

        // Step 2: terminal test against the (at most one) chain whose
        // suffix station matches this event's start station.
        let mut completed = Vec::new();
        if self.targets.contains(&event.end_station) {
            if let Some(c) = bike_chains.get(&event.start_station) {
                let within_window = event
                    .end_time
                    .checked_duration_since(c.first_start)
                    .is_some_and(|d| d <= window);
                if within_window {
                    let projection: Projection = (
                        c.events[0].event.start_station,
                        c.events[c.events.len() - 1].event.end_station,
                        event.end_station,
                    );
                    let mut events = c.events.clone();
                    events.push(trip.clone());
                    completed.push(CompletedMatch { events, projection });
                }
            }
        }

        // Step 3: extension of the matching chain, if any and under cap.
        let cap = self.max_kleene;
        if let Some(c) = bike_chains.get(&event.start_station) {
            let within_window = event
                .end_time
                .checked_duration_since(c.first_start)
                .is_some_and(|d| d <= window);
            if c.length() < cap && within_window {
                let extended = c.extended(trip.clone());
                bike_chains.remove(&event.start_station);
                upsert(bike_chains, extended);
            }
        }

        // Step 4: always also seed a length-1 chain from this event.
        upsert(bike_chains, Chain::singleton(trip));

        if bike_chains.is_empty() {
            self.chains.remove(&event.bike_id);
        }

        completed
    }
}

/// Inserts `candidate` at its `last_end_station` key, keeping whichever of
/// candidate/incumbent is longer, tie-broken by earliest `first_start`.
fn upsert(bike_chains: &mut HashMap<StationId, Chain>, candidate: Chain) {
    let key = candidate.last_end_station;
    match bike_chains.get(&key) {
        None => {
            bike_chains.insert(key, candidate);
        }
        Some(incumbent) => {
            let replace = match candidate.length().cmp(&incumbent.length()) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => candidate.first_start < incumbent.first_start,
            };
            if replace {
                bike_chains.insert(key, candidate);
            }
        }
    }
}
