//! Position evolution: applies a computed change to one position

use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::{MIN_POSITION_VALUE, SPIKE_SUB_STEPS};

/// One intermediate frame of a spike, for animating the move
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeFrame {
    pub step: usize,
    pub progress: f64,
    pub value: f64,
}

/// Cubic ease-in/ease-out curve over [0, 1]
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Apply an ordinary change (fraction) to a position
pub fn apply_change(position: &mut Position, change: f64) {
    let change = if change.is_finite() { change } else { 0.0 };
    let next = position.current_value * (1.0 + change);
    position.set_current_value(next.max(MIN_POSITION_VALUE));
}

/// Apply a spike spread over [`SPIKE_SUB_STEPS`] eased frames.
///
/// The final value is exactly `start * (1 + magnitude)`; the frames only
/// describe the path taken to get there.
pub fn apply_spike(position: &mut Position, magnitude: f64, day: u64) -> Vec<SpikeFrame> {
    let magnitude = if magnitude.is_finite() { magnitude } else { 0.0 };
    let start = position.current_value;
    let target = (start * (1.0 + magnitude)).max(MIN_POSITION_VALUE);

    let frames = (1..=SPIKE_SUB_STEPS)
        .map(|step| {
            let progress = ease_in_out_cubic(step as f64 / SPIKE_SUB_STEPS as f64);
            let value = (start + (target - start) * progress).round().max(MIN_POSITION_VALUE);
            SpikeFrame { step, progress, value }
        })
        .collect();

    position.set_current_value(target);
    position.last_spike_day = Some(day);
    frames
}
