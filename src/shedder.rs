//! Load shedder.
//!
//! Composes the utility scorer and the overload detector into a per-event
//! drop decision, plus an optional hybrid-mode Kleene-cap shrink.

use rand::Rng;

use crate::config::ShedMode;
use crate::scorer::UtilityLabel;

/// Outcome of a single shedding decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShedDecision {
    pub drop: bool,
    pub drop_chance: f64,
}

/// Per-event drop decision plus, in hybrid mode, Kleene-cap shrink.
pub struct LoadShedder {
    enabled: bool,
    mode: ShedMode,
    base_drop_prob: f64,
    base_cap: usize,
}

impl LoadShedder {
    pub fn new(enabled: bool, mode: ShedMode, base_drop_prob: f64, base_cap: usize) -> Self {
        LoadShedder {
            enabled,
            mode,
            base_drop_prob,
            base_cap,
        }
    }

    /// Drop-chance formula, scaled by overshoot and gated by utility label.
    /// `rng` is injected so callers (and tests) can pin the Bernoulli draw
    /// with a deterministic source.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        overshoot: f64,
        label: UtilityLabel,
        rng: &mut R,
    ) -> ShedDecision {
        if !self.enabled {
            return ShedDecision {
                drop: false,
                drop_chance: 0.0,
            };
        }

        let p_drop = (self.base_drop_prob + 0.5 * overshoot).clamp(0.0, 0.9);

        let drop_chance = match label {
            UtilityLabel::NonCritical => p_drop,
            UtilityLabel::Supporting if overshoot > 0.6 => p_drop * overshoot.min(1.0),
            _ => 0.0,
        };

        let drop = drop_chance > 0.0 && rng.random::<f64>() < drop_chance;
        ShedDecision { drop, drop_chance }
    }

    /// Effective Kleene cap for the current overshoot. Event mode always
    /// returns `base_cap`; hybrid mode shrinks it while overloaded:
    /// `max(2, base_cap - (1 + floor(overshoot * 2)))`.
    pub fn effective_cap(&self, overshoot: f64) -> usize {
        if self.mode != ShedMode::Hybrid || overshoot <= 0.0 {
            return self.base_cap;
        }
        let shrink = 1 + (overshoot * 2.0).floor() as usize;
        self.base_cap.saturating_sub(shrink).max(2)
    }
}
