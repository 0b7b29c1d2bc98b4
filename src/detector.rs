//! Overload detector.
//!
//! Tracks two independent EMAs — per-match detection latency and
//! per-event processing latency — and derives a hysteretic overload state
//! plus an overshoot ratio the shedder scales its drop rate by.

use std::collections::VecDeque;
use std::time::Instant;

use log::info;

use crate::error::ConfigError;

/// Two-signal EMA overload detector with hysteresis.
pub struct OverloadDetector {
    target_latency_ms: f64,
    ema_alpha: f64,
    exit_hysteresis: f64,
    window_events: usize,

    ema_match: Option<f64>,
    ema_event: Option<f64>,
    history: VecDeque<f64>,

    overloaded: bool,
    burst_start: Option<Instant>,
    overload_start: Option<Instant>,
}

impl OverloadDetector {
    pub fn new(
        target_latency_ms: f64,
        window_events: usize,
        ema_alpha: f64,
        exit_hysteresis: f64,
    ) -> Result<Self, ConfigError> {
        if !(target_latency_ms > 0.0) {
            return Err(ConfigError::InvalidTargetLatency(target_latency_ms));
        }
        if !(0.0 < ema_alpha && ema_alpha <= 1.0) {
            return Err(ConfigError::InvalidEmaAlpha(ema_alpha));
        }
        if !(0.0 < exit_hysteresis && exit_hysteresis < 1.0) {
            return Err(ConfigError::InvalidExitHysteresis(exit_hysteresis));
        }
        if window_events == 0 {
            return Err(ConfigError::InvalidWindowEvents(window_events));
        }

        Ok(OverloadDetector {
            target_latency_ms,
            ema_alpha,
            exit_hysteresis,
            window_events,
            ema_match: None,
            ema_event: None,
            history: VecDeque::with_capacity(window_events),
            overloaded: false,
            burst_start: None,
            overload_start: None,
        })
    }

    /// Records an end-to-end match-detection latency sample (ms).
    pub fn note_match_latency(&mut self, latency_ms: f64) {
        self.ema_match = Some(ema_update(self.ema_match, latency_ms, self.ema_alpha));
        self.push_history(latency_ms);
        self.update_state();
    }

    /// Records a per-event processing latency sample (ms); does not feed the
    /// diagnostic history (only match latencies are retained there).
    pub fn note_event_latency(&mut self, latency_ms: f64) {
        self.ema_event = Some(ema_update(self.ema_event, latency_ms, self.ema_alpha));
        self.update_state();
    }

    fn push_history(&mut self, latency_ms: f64) {
        if self.history.len() >= self.window_events {
            self.history.pop_front();
        }
        self.history.push_back(latency_ms);
    }

    /// `latest = max(ema_match, ema_event)`, `overshoot = max(0, (latest -
    /// target) / target)`. Transitions `NORMAL -> OVERLOADED` the first time
    /// `latest` exceeds the target, and back once it falls at or below
    /// `target * exit_hysteresis`.
    fn update_state(&mut self) {
        let latest = match (self.ema_match, self.ema_event) {
            (Some(m), Some(e)) => Some(m.max(e)),
            (Some(m), None) => Some(m),
            (None, Some(e)) => Some(e),
            (None, None) => None,
        };
        let Some(latest) = latest else { return };

        if latest > self.target_latency_ms {
            if self.burst_start.is_none() {
                self.burst_start = Some(Instant::now());
            }
            if !self.overloaded {
                self.overloaded = true;
                self.overload_start = Some(Instant::now());
                info!(
                    "overload entered: ema={:.2}ms target={:.2}ms",
                    latest, self.target_latency_ms
                );
            }
        } else if self.overloaded && latest <= self.target_latency_ms * self.exit_hysteresis {
            self.overloaded = false;
            self.burst_start = None;
            self.overload_start = None;
            info!("overload cleared: ema={:.2}ms", latest);
        }
    }

    /// `max(0, (latest - target) / target)`, `0.0` before any sample lands.
    pub fn overshoot(&self) -> f64 {
        let latest = match (self.ema_match, self.ema_event) {
            (Some(m), Some(e)) => m.max(e),
            (Some(m), None) => m,
            (None, Some(e)) => e,
            (None, None) => return 0.0,
        };
        ((latest - self.target_latency_ms) / self.target_latency_ms).max(0.0)
    }

    pub fn is_overloaded(&self) -> bool {
        self.overloaded
    }

    /// Wall-clock time from burst start to overload entry, if a burst is
    /// currently tracked and overload has actually triggered.
    pub fn detection_latency_ms(&self) -> Option<f64> {
        match (self.burst_start, self.overload_start) {
            (Some(b), Some(o)) => Some(o.saturating_duration_since(b).as_secs_f64() * 1000.0),
            _ => None,
        }
    }

    pub fn last_match_ema_ms(&self) -> Option<f64> {
        self.ema_match
    }

    pub fn last_event_ema_ms(&self) -> Option<f64> {
        self.ema_event
    }

    /// Bounded history of the last `window_events` raw match-latency
    /// samples, for diagnostics.
    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }
}

fn ema_update(prev: Option<f64>, sample: f64, alpha: f64) -> f64 {
    match prev {
        None => sample,
        Some(prev) => alpha * sample + (1.0 - alpha) * prev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_construction_params() {
        assert!(OverloadDetector::new(0.0, 200, 0.2, 0.8).is_err());
        assert!(OverloadDetector::new(10.0, 200, 0.0, 0.8).is_err());
        assert!(OverloadDetector::new(10.0, 200, 1.5, 0.8).is_err());
        assert!(OverloadDetector::new(10.0, 200, 0.2, 0.0).is_err());
        assert!(OverloadDetector::new(10.0, 200, 0.2, 1.0).is_err());
        assert!(OverloadDetector::new(10.0, 0, 0.2, 0.8).is_err());
    }

    #[test]
    fn unreachable_target_never_overloads() {
        let mut d = OverloadDetector::new(f64::MAX, 200, 0.2, 0.8).unwrap();
        for _ in 0..50 {
            d.note_match_latency(1_000.0);
        }
        assert!(!d.is_overloaded());
        assert_eq!(d.overshoot(), 0.0);
    }

    #[test]
    fn enters_and_exits_overload_with_hysteresis() {
        let mut d = OverloadDetector::new(10.0, 200, 1.0, 0.8).unwrap();
        assert!(!d.is_overloaded());

        d.note_match_latency(100.0);
        assert!(d.is_overloaded());
        assert!(d.overshoot() > 0.0);

        // alpha=1.0 makes the EMA track the raw sample exactly, so a sample
        // at/below target*hysteresis clears overload immediately.
        d.note_match_latency(7.0);
        assert!(!d.is_overloaded());
    }

    #[test]
    fn history_is_capped_at_window_events() {
        let mut d = OverloadDetector::new(10.0, 3, 0.2, 0.8).unwrap();
        for i in 0..10 {
            d.note_match_latency(i as f64);
        }
        assert_eq!(d.history().len(), 3);
        assert_eq!(d.history().iter().copied().collect::<Vec<_>>(), vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn event_latency_alone_can_trigger_overload() {
        let mut d = OverloadDetector::new(5.0, 200, 0.5, 0.8).unwrap();
        d.note_event_latency(50.0);
        assert!(d.is_overloaded());
    }
}
