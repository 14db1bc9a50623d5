//! Window movement animations.
//!
//! Animations reference windows by id — never by pointer — so deleting a
//! window just filters the list. An animation is active while its progress
//! is below 1.0; when the last animation for a window completes, the
//! window's true bounds equal the end bounds and the PTY is resized once.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::geom::Rect;

/// Default animation duration.
pub const DEFAULT_DURATION: Duration = Duration::from_millis(180);

/// One in-flight bounds transition.
#[derive(Debug, Clone)]
pub struct Animation {
    /// Window being moved.
    pub window_id: Uuid,
    /// Bounds at start.
    pub start: Rect,
    /// Bounds at completion.
    pub end: Rect,
    /// When the animation began.
    pub started: Instant,
    /// Total duration.
    pub duration: Duration,
}

impl Animation {
    /// Linear progress in `[0, 1]` at `now`.
    pub fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    /// Whether the animation has run to completion.
    pub fn finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    /// Interpolated bounds at `now` with ease-in-out applied.
    pub fn bounds_at(&self, now: Instant) -> Rect {
        Rect::lerp(self.start, self.end, ease_in_out(self.progress(now)))
    }
}

/// Cubic ease-in-out.
fn ease_in_out(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// A position update produced by an animation tick.
#[derive(Debug, Clone, Copy)]
pub struct AnimationStep {
    /// Window to move.
    pub window_id: Uuid,
    /// Bounds for this frame.
    pub bounds: Rect,
    /// True on the final frame: commit and resize the PTY once.
    pub finished: bool,
}

/// The set of in-flight animations.
#[derive(Debug, Default)]
pub struct AnimationSet {
    animations: Vec<Animation>,
}

impl AnimationSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) an animation for a window.
    ///
    /// A window animates to one target at a time; retargeting mid-flight
    /// starts from the interpolated current bounds.
    pub fn animate(&mut self, window_id: Uuid, start: Rect, end: Rect, duration: Duration) {
        let now = Instant::now();
        let start = self
            .animations
            .iter()
            .find(|a| a.window_id == window_id)
            .map(|a| a.bounds_at(now))
            .unwrap_or(start);
        self.animations.retain(|a| a.window_id != window_id);
        self.animations.push(Animation {
            window_id,
            start,
            end,
            started: now,
            duration,
        });
    }

    /// Whether any animation is still active (progress < 1.0).
    pub fn has_active(&self) -> bool {
        let now = Instant::now();
        self.animations.iter().any(|a| !a.finished(now))
    }

    /// Number of in-flight animations.
    pub fn len(&self) -> usize {
        self.animations.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }

    /// Advance all animations, dropping the finished ones.
    pub fn tick(&mut self, now: Instant) -> Vec<AnimationStep> {
        let mut steps = Vec::with_capacity(self.animations.len());
        for animation in &self.animations {
            steps.push(AnimationStep {
                window_id: animation.window_id,
                bounds: animation.bounds_at(now),
                finished: animation.finished(now),
            });
        }
        self.animations.retain(|a| !a.finished(now));
        steps
    }

    /// Drop animations for a deleted window.
    pub fn remove_window(&mut self, window_id: Uuid) {
        self.animations.retain(|a| a.window_id != window_id);
    }

    /// Cancel everything (used when animations get suppressed mid-flight).
    pub fn clear(&mut self) -> Vec<AnimationStep> {
        let steps = self
            .animations
            .drain(..)
            .map(|a| AnimationStep {
                window_id: a.window_id,
                bounds: a.end,
                finished: true,
            })
            .collect();
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rects() -> (Rect, Rect) {
        (Rect::new(0, 0, 20, 10), Rect::new(40, 20, 40, 20))
    }

    #[test]
    fn ease_endpoints() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_finishes_immediately() {
        let (start, end) = rects();
        let a = Animation {
            window_id: Uuid::new_v4(),
            start,
            end,
            started: Instant::now(),
            duration: Duration::ZERO,
        };
        assert!(a.finished(Instant::now()));
        assert_eq!(a.bounds_at(Instant::now()), end);
    }

    #[test]
    fn tick_reports_final_bounds_and_drops() {
        let (start, end) = rects();
        let id = Uuid::new_v4();
        let mut set = AnimationSet::new();
        set.animate(id, start, end, Duration::from_millis(1));

        std::thread::sleep(Duration::from_millis(5));
        let steps = set.tick(Instant::now());
        assert_eq!(steps.len(), 1);
        assert!(steps[0].finished);
        assert_eq!(steps[0].bounds, end);
        assert!(set.is_empty());
        assert!(!set.has_active());
    }

    #[test]
    fn retarget_replaces_existing() {
        let (start, end) = rects();
        let id = Uuid::new_v4();
        let mut set = AnimationSet::new();
        set.animate(id, start, end, Duration::from_secs(10));
        set.animate(id, start, Rect::new(5, 5, 25, 12), Duration::from_secs(10));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_window_filters() {
        let (start, end) = rects();
        let keep = Uuid::new_v4();
        let drop_id = Uuid::new_v4();
        let mut set = AnimationSet::new();
        set.animate(keep, start, end, Duration::from_secs(10));
        set.animate(drop_id, start, end, Duration::from_secs(10));
        set.remove_window(drop_id);
        assert_eq!(set.len(), 1);
        assert!(set.has_active());
    }

    #[test]
    fn clear_jumps_to_end_bounds() {
        let (start, end) = rects();
        let id = Uuid::new_v4();
        let mut set = AnimationSet::new();
        set.animate(id, start, end, Duration::from_secs(10));
        let steps = set.clear();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].bounds, end);
        assert!(steps[0].finished);
        assert!(set.is_empty());
    }
}
