//! Crate error taxonomy.
//!
//! Config errors fail fast at construction time; pipeline errors surface a
//! collaborator sink failure so the driver can abort and report final
//! counters. Neither case is hot-path: malformed events and backward-clock
//! jumps are not represented as `Err` at all, they are counted (see
//! `metrics::Counters`).

use std::fmt;

/// Rejected at construction: an out-of-range configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `ema_alpha` must be in `(0, 1]`.
    InvalidEmaAlpha(f64),
    /// `exit_hysteresis` must be in `(0, 1)`.
    InvalidExitHysteresis(f64),
    /// `target_latency_ms` must be positive.
    InvalidTargetLatency(f64),
    /// `window_events` must be a positive integer.
    InvalidWindowEvents(usize),
    /// `base_drop_prob` must be in `[0, 1]`.
    InvalidDropProbability(f64),
    /// `max_kleene` must be at least 1.
    InvalidMaxKleene(usize),
    /// `time_window` must be positive.
    InvalidTimeWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidEmaAlpha(v) => {
                write!(f, "ema_alpha must be in (0, 1], got {v}")
            }
            ConfigError::InvalidExitHysteresis(v) => {
                write!(f, "exit_hysteresis must be in (0, 1), got {v}")
            }
            ConfigError::InvalidTargetLatency(v) => {
                write!(f, "target_latency_ms must be positive, got {v}")
            }
            ConfigError::InvalidWindowEvents(v) => {
                write!(f, "window_events must be positive, got {v}")
            }
            ConfigError::InvalidDropProbability(v) => {
                write!(f, "base_drop_prob must be in [0, 1], got {v}")
            }
            ConfigError::InvalidMaxKleene(v) => {
                write!(f, "max_kleene must be >= 1, got {v}")
            }
            ConfigError::InvalidTimeWindow => write!(f, "time_window must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Driver-level failure. Only a sink can fail the pipeline; the evaluator,
/// detector and shedder are infallible once constructed.
#[derive(Debug)]
pub enum PipelineError {
    /// The match sink raised on emission; the boxed error is the sink's own.
    SinkFailed(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::SinkFailed(e) => write!(f, "match sink failed: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::SinkFailed(e) => Some(e.as_ref()),
        }
    }
}
