use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

pub const DEFAULT_KEYFRAME_RATE: f32 = 10.0;
pub const MIN_KEYFRAME_RATE: f32 = 10.0;
pub const MAX_KEYFRAME_RATE: f32 = 30.0;

/// Pending move of one instance from its pose at keyframe arrival to the keyframe's pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRecord {
    pub from_position: Vec3,
    pub from_rotation: Quat,
    pub to_position: Vec3,
    pub to_rotation: Quat,
    pub start: Instant,
}

impl MotionRecord {
    /// Normalized progress; `>= 1.0` once the interval has elapsed.
    pub fn progress(&self, now: Instant, interval: Duration) -> f32 {
        if interval.is_zero() {
            return 1.0;
        }
        now.saturating_duration_since(self.start).as_secs_f32() / interval.as_secs_f32()
    }

    pub fn sample(&self, t: f32) -> (Vec3, Quat) {
        if t >= 1.0 {
            return (self.to_position, self.to_rotation);
        }
        let t = t.max(0.0);

        // Take the short way around.
        let to_rotation = if self.from_rotation.dot(self.to_rotation) < 0.0 {
            -self.to_rotation
        } else {
            self.to_rotation
        };

        (
            self.from_position.lerp(self.to_position, t),
            self.from_rotation.slerp(to_rotation, t),
        )
    }
}

/// Interval between two keyframes at `rate` Hz, with the rate clamped to the supported band.
pub fn keyframe_interval(rate: f32) -> Duration {
    let rate = if rate.is_finite() {
        rate.clamp(MIN_KEYFRAME_RATE, MAX_KEYFRAME_RATE)
    } else {
        DEFAULT_KEYFRAME_RATE
    };
    Duration::from_secs_f32(1.0 / rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: Instant) -> MotionRecord {
        MotionRecord {
            from_position: Vec3::ZERO,
            from_rotation: Quat::IDENTITY,
            to_position: Vec3::new(2.0, 0.0, -4.0),
            to_rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            start,
        }
    }

    #[test]
    fn test_sample_endpoints_and_midpoint() {
        let start = Instant::now();
        let interval = Duration::from_millis(100);
        let motion = record(start);

        let (p, r) = motion.sample(motion.progress(start, interval));
        assert_eq!(p, Vec3::ZERO);
        assert!(r.abs_diff_eq(Quat::IDENTITY, 1e-6));

        let (p, r) = motion.sample(motion.progress(start + interval / 2, interval));
        assert!(p.abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), 1e-4));
        assert!(r.abs_diff_eq(Quat::from_rotation_y(std::f32::consts::FRAC_PI_4), 1e-4));

        let (p, r) = motion.sample(motion.progress(start + interval, interval));
        assert_eq!(p, motion.to_position);
        assert_eq!(r, motion.to_rotation);
    }

    #[test]
    fn test_sample_takes_short_arc() {
        let mut motion = record(Instant::now());
        motion.to_rotation = -Quat::from_rotation_y(0.2);

        let (_, r) = motion.sample(0.5);
        assert!(r.abs_diff_eq(Quat::from_rotation_y(0.1), 1e-4));
    }

    #[test]
    fn test_interval_is_clamped() {
        assert_eq!(keyframe_interval(10.0), Duration::from_secs_f32(0.1));
        assert_eq!(keyframe_interval(1.0), Duration::from_secs_f32(0.1));
        assert_eq!(keyframe_interval(120.0), Duration::from_secs_f32(1.0 / 30.0));
        assert_eq!(keyframe_interval(f32::NAN), Duration::from_secs_f32(0.1));
    }
}
