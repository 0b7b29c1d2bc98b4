//! Pipeline driver — wires shedder → evaluator → sink and feeds both latency
//! signals back into the detector.
//!
//! Single-threaded and lock-free on the hot path: pull an event, measure a
//! latency, check a threshold, feed the feedback loop, all on one logical
//! execution context.

use std::sync::Arc;
use std::time::Instant;

use log::warn;
use rand::Rng;

use crate::config::PipelineConfig;
use crate::detector::OverloadDetector;
use crate::error::PipelineError;
use crate::evaluator::{IngestedTrip, PatternEvaluator};
use crate::event::{EventTime, TripEvent};
use crate::metrics::{Counters, Projection};
use crate::scorer::EventUtilityScorer;
use crate::shedder::LoadShedder;

/// Collaborator sink: receives one completed match at a time. No buffering
/// is implied; the sink owns whatever persistence it needs.
pub trait MatchSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn on_match(
        &mut self,
        events: &[Arc<TripEvent>],
        projection: Projection,
        detection_latency_ms: f64,
    ) -> Result<(), Self::Error>;
}

/// Drives trip events from `events` through the scorer/detector/shedder/
/// evaluator chain and into `sink`, honouring `cancelled` once per event and
/// once per emitted match. `rng` is injected so a caller can pin shedding
/// decisions to a deterministic seed.
pub struct Pipeline<R: Rng> {
    scorer: EventUtilityScorer,
    detector: OverloadDetector,
    shedder: LoadShedder,
    evaluator: PatternEvaluator,
    rng: R,
    last_yield_at: Option<Instant>,
    last_event_start: Option<EventTime>,
}

impl<R: Rng> Pipeline<R> {
    pub fn new(config: &PipelineConfig, rng: R) -> Result<Self, crate::error::ConfigError> {
        config.validate()?;

        let detector = OverloadDetector::new(
            config.target_latency_ms,
            config.window_events,
            config.ema_alpha,
            config.exit_hysteresis,
        )?;

        Ok(Pipeline {
            scorer: EventUtilityScorer::new(config.targets.clone(), config.time_window),
            detector,
            shedder: LoadShedder::new(
                config.shed_enabled,
                config.shed_mode,
                config.base_drop_prob,
                config.max_kleene,
            ),
            evaluator: PatternEvaluator::new(
                config.targets.clone(),
                config.time_window,
                config.max_kleene,
            ),
            rng,
            last_yield_at: None,
            last_event_start: None,
        })
    }

    /// Runs `events` to completion (or until `cancelled()` returns `true`),
    /// forwarding completed matches to `sink`, and returns the final
    /// counters. Aborts immediately on a sink failure.
    pub fn run<I, S>(
        &mut self,
        events: I,
        sink: &mut S,
        cancelled: impl Fn() -> bool,
    ) -> Result<Counters, PipelineError>
    where
        I: IntoIterator<Item = TripEvent>,
        S: MatchSink,
    {
        let mut counters = Counters::default();

        for event in events {
            if cancelled() {
                break;
            }
            counters.events_ingested += 1;

            if !event.is_well_formed() {
                warn!("dropped malformed event for bike {}", event.bike_id);
                counters.events_dropped += 1;
                continue;
            }
            if let Some(prev) = self.last_event_start {
                if event.start_time < prev {
                    warn!(
                        "dropped out-of-order event for bike {} (start_time went backward)",
                        event.bike_id
                    );
                    counters.events_dropped += 1;
                    continue;
                }
            }
            self.last_event_start = Some(event.start_time);

            let now = Instant::now();
            if let Some(last) = self.last_yield_at {
                let latency_ms = now.duration_since(last).as_secs_f64() * 1000.0;
                self.detector.note_event_latency(latency_ms);
            }
            self.last_yield_at = Some(now);

            let overshoot = self.detector.overshoot();
            let (_score, label) = self.scorer.score_event(&event);
            let decision = self.shedder.decide(overshoot, label, &mut self.rng);
            self.scorer.note_event(&event, !decision.drop);

            if decision.drop {
                counters.events_dropped += 1;
                continue;
            }

            let new_cap = self.shedder.effective_cap(overshoot);
            self.evaluator.set_max_kleene(new_cap, &mut counters);

            let trip = Arc::new(event);
            let ingested = IngestedTrip::new(trip, Instant::now());
            let completions = self.evaluator.process_event(ingested, &mut counters);

            for m in completions {
                if cancelled() {
                    return Ok(counters);
                }
                let detection_latency_ms =
                    Instant::now().duration_since(m.earliest_ingested_at()).as_secs_f64() * 1000.0;
                self.detector.note_match_latency(detection_latency_ms);
                counters.matches_completed += 1;

                let events: Vec<Arc<TripEvent>> = m.events.iter().map(|t| t.event.clone()).collect();
                sink.on_match(&events, m.projection, detection_latency_ms)
                    .map_err(|e| PipelineError::SinkFailed(Box::new(e)))?;
            }
        }

        Ok(counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShedMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::convert::Infallible;
    use std::time::Duration;

    fn trip(bike: &str, start_min: i64, end_min: i64, start: i64, end: i64) -> TripEvent {
        TripEvent::new(
            bike,
            start,
            end,
            EventTime::from_micros(start_min * 60_000_000),
            EventTime::from_micros(end_min * 60_000_000),
        )
    }

    struct VecSink {
        matches: Vec<Projection>,
    }

    impl MatchSink for VecSink {
        type Error = Infallible;
        fn on_match(
            &mut self,
            _events: &[Arc<TripEvent>],
            projection: Projection,
            _detection_latency_ms: f64,
        ) -> Result<(), Infallible> {
            self.matches.push(projection);
            Ok(())
        }
    }

    struct FailingSink;

    #[derive(Debug)]
    struct SinkBoom;
    impl std::fmt::Display for SinkBoom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "sink boom")
        }
    }
    impl std::error::Error for SinkBoom {}

    impl MatchSink for FailingSink {
        type Error = SinkBoom;
        fn on_match(
            &mut self,
            _events: &[Arc<TripEvent>],
            _projection: Projection,
            _detection_latency_ms: f64,
        ) -> Result<(), SinkBoom> {
            Err(SinkBoom)
        }
    }

    fn base_config() -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.targets = vec![426, 3002, 462];
        cfg.time_window = Duration::from_secs(3600);
        cfg.max_kleene = 3;
        cfg.shed_enabled = false;
        cfg
    }

    #[test]
    fn three_chain_hit_runs_end_to_end() {
        let cfg = base_config();
        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(0)).unwrap();
        let mut sink = VecSink { matches: Vec::new() };

        let events = vec![
            trip("100", 0, 10, 100, 200),
            trip("100", 15, 25, 200, 300),
            trip("100", 30, 50, 300, 426),
        ];

        let counters = pipeline.run(events, &mut sink, || false).unwrap();
        assert_eq!(sink.matches, vec![(100, 300, 426)]);
        assert_eq!(counters.matches_completed, 1);
        assert_eq!(counters.events_ingested, counters.events_dropped + counters.events_accepted());
    }

    #[test]
    fn malformed_event_is_dropped_not_propagated() {
        let cfg = base_config();
        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(0)).unwrap();
        let mut sink = VecSink { matches: Vec::new() };

        let mut bad = trip("1", 10, 0, 1, 2); // end_time before start_time
        bad.end_time = EventTime::from_micros(0);
        let counters = pipeline.run(vec![bad], &mut sink, || false).unwrap();
        assert_eq!(counters.events_dropped, 1);
        assert_eq!(counters.matches_completed, 0);
    }

    #[test]
    fn backward_start_time_is_dropped() {
        let cfg = base_config();
        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(0)).unwrap();
        let mut sink = VecSink { matches: Vec::new() };

        let events = vec![
            trip("1", 10, 15, 1, 2),
            trip("1", 5, 8, 2, 3), // start_time went backward
        ];
        let counters = pipeline.run(events, &mut sink, || false).unwrap();
        assert_eq!(counters.events_dropped, 1);
    }

    #[test]
    fn sink_failure_propagates_and_aborts() {
        let cfg = base_config();
        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(0)).unwrap();
        let mut sink = FailingSink;

        let events = vec![
            trip("100", 0, 10, 100, 200),
            trip("100", 15, 25, 200, 300),
            trip("100", 30, 50, 300, 426),
        ];
        let result = pipeline.run(events, &mut sink, || false);
        assert!(matches!(result, Err(PipelineError::SinkFailed(_))));
    }

    #[test]
    fn cancellation_stops_before_further_events() {
        let cfg = base_config();
        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(0)).unwrap();
        let mut sink = VecSink { matches: Vec::new() };

        let events = vec![
            trip("100", 0, 10, 100, 200),
            trip("100", 15, 25, 200, 300),
            trip("100", 30, 50, 300, 426),
        ];
        let counters = pipeline.run(events, &mut sink, || true).unwrap();
        assert_eq!(counters.events_ingested, 0);
    }

    #[test]
    fn shedding_never_drops_critical_events_and_lowers_recall_at_worst_to_bounds() {
        let mut cfg = base_config();
        cfg.shed_enabled = true;
        cfg.shed_mode = ShedMode::Event;
        cfg.base_drop_prob = 0.5;
        cfg.target_latency_ms = 1.0;

        let mut pipeline = Pipeline::new(&cfg, StdRng::seed_from_u64(42)).unwrap();
        let mut sink = VecSink { matches: Vec::new() };

        let mut events = Vec::new();
        for i in 0..100 {
            let base = i * 100;
            events.push(trip("100", base, base + 10, 100, 200));
            events.push(trip("100", base + 15, base + 25, 200, 300));
            events.push(trip("100", base + 30, base + 50, 300, 426));
        }

        let counters = pipeline.run(events, &mut sink, || false).unwrap();
        assert_eq!(counters.events_ingested, counters.events_dropped + counters.events_accepted());
        assert!(counters.matches_completed <= 100);
    }
}
