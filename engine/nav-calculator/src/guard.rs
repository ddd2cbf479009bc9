//! Guard against implausible NAV transitions

use crate::config::GuardConfig;
use crate::error::{NavError, Result};

/// Tracks the last accepted NAV and rejects implausible jumps from it.
///
/// A zero (or non-positive) NAV is always rejected. The first NAV seen is
/// accepted as-is. Changes are compared in whole percent, truncated toward
/// zero, so a 400.9% rise still passes a 400% limit.
#[derive(Debug, Clone, Default)]
pub struct NavGuard {
    config: GuardConfig,
    last_accepted: Option<f64>,
}

impl NavGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config, last_accepted: None }
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    /// Check a transition to `next` without recording it
    pub fn check(&self, next: f64) -> Result<()> {
        let previous = self.last_accepted.unwrap_or(0.0);
        let violation = |reason: String| NavError::GuardViolation { previous, next, reason };

        if !next.is_finite() || next <= 0.0 {
            return Err(violation("NAV must be a positive finite value".to_string()));
        }

        let Some(previous) = self.last_accepted else {
            return Ok(());
        };

        let change = 100.0 * (next - previous) / previous;
        let whole = change.trunc();
        if whole > self.config.max_rise_percent {
            return Err(violation(format!(
                "rise of {change:.2}% exceeds {}%",
                self.config.max_rise_percent
            )));
        }
        if -whole > self.config.max_fall_percent {
            return Err(violation(format!(
                "fall of {:.2}% exceeds {}%",
                -change, self.config.max_fall_percent
            )));
        }
        Ok(())
    }

    /// Check a transition and record it when accepted
    pub fn accept(&mut self, next: f64) -> Result<()> {
        self.check(next)?;
        self.last_accepted = Some(next);
        Ok(())
    }

    /// Forget the last accepted NAV; the next one is accepted unconditionally
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
