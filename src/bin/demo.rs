//! Demonstration binary: runs the bike hot-path pattern matcher against a
//! handful of representative trip scenarios, end to end.
//!
//! This is exercise wiring for the library, not the deliverable itself.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use bikehotpath::config::PipelineConfig;
use bikehotpath::event::{EventTime, TripEvent};
use bikehotpath::metrics::Projection;
use bikehotpath::pipeline::{MatchSink, Pipeline};

struct PrintingSink {
    count: usize,
}

impl MatchSink for PrintingSink {
    type Error = std::convert::Infallible;

    fn on_match(
        &mut self,
        events: &[Arc<TripEvent>],
        projection: Projection,
        detection_latency_ms: f64,
    ) -> Result<(), Self::Error> {
        self.count += 1;
        println!(
            "match #{}: projection={:?} events={} detection_latency_ms={:.3}",
            self.count,
            projection,
            events.len(),
            detection_latency_ms
        );
        Ok(())
    }
}

fn trip(bike: &str, start_min: i64, end_min: i64, start_station: i64, end_station: i64) -> TripEvent {
    TripEvent::new(
        bike,
        start_station,
        end_station,
        EventTime::from_micros(start_min * 60_000_000),
        EventTime::from_micros(end_min * 60_000_000),
    )
}

fn seed_scenarios() -> Vec<TripEvent> {
    vec![
        // 1. Valid 3-chain hit.
        trip("100", 0, 10, 100, 200),
        trip("100", 15, 25, 200, 300),
        trip("100", 30, 50, 300, 426),
        // 2. Window violation (70m > 60m window).
        trip("200", 0, 55, 500, 600),
        trip("200", 56, 70, 600, 3002),
        // 3. Bike mismatch.
        trip("300", 70, 80, 700, 800),
        trip("400", 85, 95, 800, 462),
        // 4. Not chained (950 != 1000).
        trip("500", 100, 110, 900, 950),
        trip("500", 115, 125, 1000, 426),
        // 5. Self-loop valid.
        trip("190", 0, 10, 100, 100),
        trip("190", 15, 25, 100, 100),
        trip("190", 30, 50, 100, 426),
    ]
}

fn main() {
    env_logger::init();
    println!("=== bikehotpath demo ===");

    let mut config = PipelineConfig::default();
    config.time_window = Duration::from_secs(3600);
    config.targets = vec![426, 3002, 462];
    config.max_kleene = 3;

    let mut pipeline = Pipeline::new(&config, StdRng::seed_from_u64(0))
        .expect("default config is always valid");
    let mut sink = PrintingSink { count: 0 };

    let counters = pipeline
        .run(seed_scenarios(), &mut sink, || false)
        .expect("printing sink never fails");

    println!(
        "counters: ingested={} dropped={} matches={} pruned={} evicted={}",
        counters.events_ingested,
        counters.events_dropped,
        counters.matches_completed,
        counters.partial_pruned,
        counters.partial_evicted,
    );
}
