// Copyright 2024 the Lamina Authors
// SPDX-License-Identifier: Apache-2.0

//! The easing curve of smooth scroll animations.

use std::time::Duration;

use kurbo::Vec2;

/// Scroll durations are expressed in frames at this rate.
const DURATION_DIVISOR: f64 = 60.0;

const CONSTANT_DURATION: f64 = 9.0;

const INVERSE_DELTA_RAMP_START_PX: f64 = 120.0;
const INVERSE_DELTA_RAMP_END_PX: f64 = 480.0;
const INVERSE_DELTA_MIN_DURATION: f64 = 6.0;
const INVERSE_DELTA_MAX_DURATION: f64 = 12.0;
const INVERSE_DELTA_SLOPE: f64 = (INVERSE_DELTA_MIN_DURATION - INVERSE_DELTA_MAX_DURATION)
    / (INVERSE_DELTA_RAMP_END_PX - INVERSE_DELTA_RAMP_START_PX);
const INVERSE_DELTA_OFFSET: f64 =
    INVERSE_DELTA_MAX_DURATION - INVERSE_DELTA_RAMP_START_PX * INVERSE_DELTA_SLOPE;

const EPSILON: f64 = 0.01;

/// How the duration of a scroll animation depends on its distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DurationBehavior {
    /// Every animation takes the same time.
    ///
    /// Used for line, page and document scrolls.
    Constant,
    /// Short distances animate slowly and long ones quickly.
    ///
    /// Used for pixel scrolls, such as mouse wheel ticks.
    InverseDelta,
}

/// The largest component of a delta, keeping its sign.
fn maximum_dimension(delta: Vec2) -> f64 {
    if delta.x.abs() > delta.y.abs() {
        delta.x
    } else {
        delta.y
    }
}

/// A cubic bezier timing function from `(0, 0)` to `(1, 1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicBezierTiming {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
    start_gradient: f64,
    end_gradient: f64,
}

impl CubicBezierTiming {
    /// Builds the curve with control points `(x1, y1)` and `(x2, y2)`.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let cx = 3.0 * x1;
        let bx = 3.0 * (x2 - x1) - cx;
        let ax = 1.0 - cx - bx;
        let cy = 3.0 * y1;
        let by = 3.0 * (y2 - y1) - cy;
        let ay = 1.0 - cy - by;

        let start_gradient = if x1 > 0.0 {
            y1 / x1
        } else if y1 == 0.0 && x2 > 0.0 {
            y2 / x2
        } else {
            0.0
        };
        let end_gradient = if x2 < 1.0 {
            (y2 - 1.0) / (x2 - 1.0)
        } else if x1 < 1.0 {
            (y1 - 1.0) / (x1 - 1.0)
        } else {
            0.0
        };

        Self {
            ax,
            bx,
            cx,
            ay,
            by,
            cy,
            start_gradient,
            end_gradient,
        }
    }

    /// The CSS `ease-in-out` curve.
    pub fn ease_in_out() -> Self {
        Self::new(0.42, 0.0, 0.58, 1.0)
    }

    /// An ease-out curve whose initial slope is `velocity`.
    pub fn ease_out_with_initial_velocity(velocity: f64) -> Self {
        let velocity = velocity.clamp(-1000.0, 1000.0);
        let x1 = 0.42;
        Self::new(x1, velocity * x1, 0.58, 1.0)
    }

    fn sample_x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn sample_y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn sample_derivative_x(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    fn sample_derivative_y(&self, t: f64) -> f64 {
        (3.0 * self.ay * t + 2.0 * self.by) * t + self.cy
    }

    /// Finds the curve parameter for a given `x` in `[0, 1]`.
    fn solve_x(&self, x: f64) -> f64 {
        const NEWTON_ITERATIONS: usize = 8;
        const TOLERANCE: f64 = 1e-7;

        let mut t = x;
        for _ in 0..NEWTON_ITERATIONS {
            let error = self.sample_x(t) - x;
            if error.abs() < TOLERANCE {
                return t;
            }
            let derivative = self.sample_derivative_x(t);
            if derivative.abs() < 1e-6 {
                break;
            }
            t -= error / derivative;
        }

        // Newton didn't converge, fall back to bisection.
        let (mut low, mut high) = (0.0, 1.0);
        t = x;
        while low < high {
            let value = self.sample_x(t);
            if (value - x).abs() < TOLERANCE {
                return t;
            }
            if x > value {
                low = t;
            } else {
                high = t;
            }
            let next = (high - low) * 0.5 + low;
            if next == t {
                break;
            }
            t = next;
        }
        t
    }

    /// The progress at `x`, extrapolating linearly outside of `[0, 1]`.
    pub fn value(&self, x: f64) -> f64 {
        if x < 0.0 {
            return self.start_gradient * x;
        }
        if x > 1.0 {
            return 1.0 + self.end_gradient * (x - 1.0);
        }
        self.sample_y(self.solve_x(x))
    }

    /// The slope of the curve at `x`.
    pub fn velocity(&self, x: f64) -> f64 {
        if x < 0.0 {
            return self.start_gradient;
        }
        if x > 1.0 {
            return self.end_gradient;
        }
        let t = self.solve_x(x);
        let dx = self.sample_derivative_x(t);
        if dx.abs() < f64::EPSILON {
            return 0.0;
        }
        self.sample_derivative_y(t) / dx
    }
}

/// The curve of a smooth scroll, from an initial offset to a target offset.
///
/// The curve can be retargeted mid-flight: the new segment starts where the curve
/// currently is, with a timing function whose initial slope preserves the current velocity.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrollOffsetAnimationCurve {
    initial_value: Vec2,
    target_value: Vec2,
    /// In seconds since the start of the animation.
    total_animation_duration: f64,
    /// In seconds since the start of the animation.
    last_retarget: f64,
    timing: CubicBezierTiming,
    duration_behavior: DurationBehavior,
}

impl ScrollOffsetAnimationCurve {
    /// A curve towards `target_value`, starting at `initial_value`.
    pub fn new(
        initial_value: Vec2,
        target_value: Vec2,
        duration_behavior: DurationBehavior,
    ) -> Self {
        let duration = Self::segment_duration(target_value - initial_value, duration_behavior);
        Self {
            initial_value,
            target_value,
            total_animation_duration: duration.as_secs_f64(),
            last_retarget: 0.0,
            timing: CubicBezierTiming::ease_in_out(),
            duration_behavior,
        }
    }

    /// The duration of an animation segment covering `delta`.
    pub fn segment_duration(delta: Vec2, behavior: DurationBehavior) -> Duration {
        let frames = match behavior {
            DurationBehavior::Constant => CONSTANT_DURATION,
            DurationBehavior::InverseDelta => (INVERSE_DELTA_OFFSET
                + maximum_dimension(delta).abs() * INVERSE_DELTA_SLOPE)
                .clamp(INVERSE_DELTA_MIN_DURATION, INVERSE_DELTA_MAX_DURATION),
        };
        Duration::from_secs_f64(frames / DURATION_DIVISOR)
    }

    /// The offset the curve starts from, or was last retargeted from.
    pub fn initial_value(&self) -> Vec2 {
        self.initial_value
    }

    /// The offset the curve ends at.
    pub fn target_value(&self) -> Vec2 {
        self.target_value
    }

    /// How the duration depends on the distance.
    pub fn duration_behavior(&self) -> DurationBehavior {
        self.duration_behavior
    }

    /// The total duration, measured from the start of the animation.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_animation_duration)
    }

    /// The offset at `elapsed` since the start of the animation.
    pub fn value(&self, elapsed: Duration) -> Vec2 {
        let duration = self.total_animation_duration - self.last_retarget;
        let t = elapsed.as_secs_f64() - self.last_retarget;
        if t <= 0.0 {
            return self.initial_value;
        }
        if t >= duration {
            return self.target_value;
        }
        let progress = self.timing.value(t / duration);
        self.initial_value.lerp(self.target_value, progress)
    }

    /// Shifts both ends of the curve, e.g. after the content under the scroller moved.
    pub fn apply_adjustment(&mut self, adjustment: Vec2) {
        self.initial_value += adjustment;
        self.target_value += adjustment;
    }

    /// Starts a fresh ease-in-out segment from `initial_value` at `elapsed`.
    ///
    /// Used when the previous segment was stopped, so there is no velocity to preserve.
    pub fn restart(&mut self, elapsed: Duration, initial_value: Vec2, target_value: Vec2) {
        let t = elapsed.as_secs_f64();
        self.initial_value = initial_value;
        self.target_value = target_value;
        self.last_retarget = t;
        self.total_animation_duration = t
            + Self::segment_duration(target_value - initial_value, self.duration_behavior)
                .as_secs_f64();
        self.timing = CubicBezierTiming::ease_in_out();
    }

    /// Retargets the curve at `elapsed` since the start of the animation.
    ///
    /// The offset at `elapsed` is unchanged, and the new segment starts with the
    /// velocity the curve had at that time.
    pub fn update_target(&mut self, elapsed: Duration, new_target: Vec2) {
        if maximum_dimension(self.target_value - new_target).abs() < EPSILON {
            self.target_value = new_target;
            return;
        }

        let t = elapsed.as_secs_f64().max(self.last_retarget);
        let current_position = self.value(Duration::from_secs_f64(t));
        let old_delta = self.target_value - self.initial_value;
        let new_delta = new_target - current_position;

        let old_duration = self.total_animation_duration - self.last_retarget;
        let old_normalized_velocity = if old_duration > 0.0 {
            self.timing.velocity((t - self.last_retarget) / old_duration)
        } else {
            0.0
        };

        // Bounding the duration by the current velocity avoids a visible bounce when a
        // fast animation is retargeted to a nearby offset.
        let new_duration = Self::segment_duration(new_delta, self.duration_behavior)
            .as_secs_f64()
            .min(velocity_based_duration_bound(
                old_delta,
                old_normalized_velocity,
                old_duration,
                new_delta,
            ));

        if new_duration < EPSILON {
            // We're (almost) at the target already.
            self.target_value = new_target;
            self.total_animation_duration = t;
            return;
        }

        let new_velocity = old_normalized_velocity
            * (new_duration / old_duration)
            * (maximum_dimension(old_delta) / maximum_dimension(new_delta));

        self.initial_value = current_position;
        self.target_value = new_target;
        self.total_animation_duration = t + new_duration;
        self.last_retarget = t;
        self.timing = CubicBezierTiming::ease_out_with_initial_velocity(new_velocity);
    }
}

/// An estimate of how long reaching `new_delta` takes at the current velocity.
fn velocity_based_duration_bound(
    old_delta: Vec2,
    old_normalized_velocity: f64,
    old_duration: f64,
    new_delta: Vec2,
) -> f64 {
    let old_delta_max_dimension = maximum_dimension(old_delta);
    let new_delta_max_dimension = maximum_dimension(new_delta);

    if new_delta_max_dimension.abs() < EPSILON {
        return 0.0;
    }
    if old_delta_max_dimension.abs() < EPSILON || old_normalized_velocity.abs() < EPSILON {
        return f64::INFINITY;
    }

    let old_true_velocity = old_normalized_velocity * old_delta_max_dimension / old_duration;
    // The factor accounts for the ease-out of the new segment.
    let bound = (new_delta_max_dimension / old_true_velocity) * 2.5;
    // A negative bound means we're moving away from the new target.
    if bound < 0.0 { f64::INFINITY } else { bound }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn frames(duration: Duration) -> f64 {
        duration.as_secs_f64() * DURATION_DIVISOR
    }

    #[test]
    fn constant_duration_is_nine_frames() {
        for distance in [1.0, 100.0, 10_000.0] {
            let duration = ScrollOffsetAnimationCurve::segment_duration(
                Vec2::new(0.0, distance),
                DurationBehavior::Constant,
            );
            assert_approx_eq!(f64, frames(duration), 9.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn inverse_delta_duration_ramps_down() {
        let duration = |distance: f64| {
            frames(ScrollOffsetAnimationCurve::segment_duration(
                Vec2::new(0.0, distance),
                DurationBehavior::InverseDelta,
            ))
        };
        assert_approx_eq!(f64, duration(50.0), 12.0, epsilon = 1e-6);
        assert_approx_eq!(f64, duration(120.0), 12.0, epsilon = 1e-6);
        assert_approx_eq!(f64, duration(300.0), 9.0, epsilon = 1e-6);
        assert_approx_eq!(f64, duration(480.0), 6.0, epsilon = 1e-6);
        assert_approx_eq!(f64, duration(-2000.0), 6.0, epsilon = 1e-6);
    }

    #[test]
    fn ease_in_out_is_symmetric() {
        let timing = CubicBezierTiming::ease_in_out();
        assert_approx_eq!(f64, timing.value(0.0), 0.0, epsilon = 1e-6);
        assert_approx_eq!(f64, timing.value(0.5), 0.5, epsilon = 1e-6);
        assert_approx_eq!(f64, timing.value(1.0), 1.0, epsilon = 1e-6);
        assert_approx_eq!(
            f64,
            timing.value(0.25),
            1.0 - timing.value(0.75),
            epsilon = 1e-6
        );
    }

    #[test]
    fn curve_reaches_its_target() {
        let curve = ScrollOffsetAnimationCurve::new(
            Vec2::ZERO,
            Vec2::new(0.0, 100.0),
            DurationBehavior::Constant,
        );
        assert_eq!(curve.value(Duration::ZERO), Vec2::ZERO);
        assert_eq!(curve.value(curve.duration()), Vec2::new(0.0, 100.0));
        let midway = curve.value(curve.duration() / 2);
        assert_approx_eq!(f64, midway.y, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn retargeting_keeps_the_current_position() {
        let mut curve = ScrollOffsetAnimationCurve::new(
            Vec2::ZERO,
            Vec2::new(0.0, 300.0),
            DurationBehavior::InverseDelta,
        );
        let elapsed = Duration::from_millis(50);
        let before = curve.value(elapsed);
        curve.update_target(elapsed, Vec2::new(0.0, 600.0));
        let after = curve.value(elapsed);
        assert_approx_eq!(f64, before.y, after.y, epsilon = 1e-6);
        assert_eq!(curve.target_value(), Vec2::new(0.0, 600.0));
        assert!(curve.duration() > elapsed);
        assert_eq!(curve.value(curve.duration()), Vec2::new(0.0, 600.0));
    }

    #[test]
    fn adjustment_moves_both_ends() {
        let mut curve = ScrollOffsetAnimationCurve::new(
            Vec2::new(0.0, 10.0),
            Vec2::new(0.0, 100.0),
            DurationBehavior::Constant,
        );
        curve.apply_adjustment(Vec2::new(0.0, 5.0));
        assert_eq!(curve.initial_value(), Vec2::new(0.0, 15.0));
        assert_eq!(curve.target_value(), Vec2::new(0.0, 105.0));
    }
}
