//! Car-following arithmetic.
//!
//! Pure per-vehicle formulas; the engine owns iteration order and edge
//! transitions.

/// Gap (length units) below which a follower must fully stop.
pub(crate) const MIN_GAP: f64 = 30.0;

/// Gap below which a follower scales its speed down linearly.
pub(crate) const SLOW_GAP: f64 = 60.0;

/// Position updates smaller than this fraction of an edge are skipped to
/// avoid cumulative sub-unit drift.
pub(crate) const MIN_POSITION_DELTA: f64 = 1e-4;

/// Speeds below this count as standing still for status purposes.
pub(crate) const SPEED_EPS: f64 = 0.05;

/// Desired speed given the gap to the nearest leader on the same edge
/// and the edge's effective multiplier. `None` means the lane ahead is
/// clear.
pub(crate) fn follow_target(gap: Option<f64>, max_speed: f64, multiplier: f64) -> f64 {
    let free = max_speed / multiplier.max(0.1);
    match gap {
        Some(gap) if gap < MIN_GAP => 0.0,
        Some(gap) if gap < SLOW_GAP => free * (gap - MIN_GAP) / MIN_GAP,
        _ => free,
    }
}

/// Exponential smoothing of the target speed. A zero target is applied
/// unsmoothed so a follower pinned behind a leader stops instead of
/// coasting on stale smoothed values.
pub(crate) fn smooth_target(previous: f64, raw: f64, alpha: f64) -> f64 {
    if raw == 0.0 {
        0.0
    } else {
        alpha * raw + (1.0 - alpha) * previous
    }
}

/// Moves `current` toward `target`, at most `accel * dt` per step, never
/// below zero.
pub(crate) fn integrate_speed(current: f64, target: f64, accel: f64, dt: f64) -> f64 {
    let diff = target - current;
    if diff == 0.0 {
        return current;
    }
    let step = diff.abs().min(accel * dt);
    (current + diff.signum() * step).max(0.0)
}
