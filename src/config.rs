//! Validated pipeline configuration.
//!
//! `serde`-derived so a collaborator CLI or config-file loader can
//! deserialize a `PipelineConfig` directly; this crate never parses a file
//! itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::StationId;

/// Event-only or event+Kleene-cap-shrink shedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShedMode {
    Event,
    Hybrid,
}

/// Top-level pipeline configuration. Construct via [`PipelineConfig::new`]
/// (or `Default::default()` plus field overrides), then call
/// [`PipelineConfig::validate`] once before wiring up the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub targets: Vec<StationId>,
    pub time_window: Duration,
    pub max_kleene: usize,
    pub shed_enabled: bool,
    pub shed_mode: ShedMode,
    pub base_drop_prob: f64,
    pub target_latency_ms: f64,
    pub ema_alpha: f64,
    pub exit_hysteresis: f64,
    pub window_events: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            targets: vec![426, 3002, 462],
            time_window: Duration::from_secs(3600),
            max_kleene: 3,
            shed_enabled: false,
            shed_mode: ShedMode::Event,
            base_drop_prob: 0.0,
            target_latency_ms: 50.0,
            ema_alpha: 0.2,
            exit_hysteresis: 0.8,
            window_events: 200,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every configuration invariant that must hold at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0 < self.ema_alpha && self.ema_alpha <= 1.0) {
            return Err(ConfigError::InvalidEmaAlpha(self.ema_alpha));
        }
        if !(0.0 < self.exit_hysteresis && self.exit_hysteresis < 1.0) {
            return Err(ConfigError::InvalidExitHysteresis(self.exit_hysteresis));
        }
        if !(self.target_latency_ms > 0.0) {
            return Err(ConfigError::InvalidTargetLatency(self.target_latency_ms));
        }
        if self.window_events == 0 {
            return Err(ConfigError::InvalidWindowEvents(self.window_events));
        }
        if !(0.0..=1.0).contains(&self.base_drop_prob) {
            return Err(ConfigError::InvalidDropProbability(self.base_drop_prob));
        }
        if self.max_kleene == 0 {
            return Err(ConfigError::InvalidMaxKleene(self.max_kleene));
        }
        if self.time_window.is_zero() {
            return Err(ConfigError::InvalidTimeWindow);
        }
        Ok(())
    }
}
