use glam::{Quat, Vec3};

use crate::animation::transform::{Transformation, normalize_or_identity};

/// Values that can be blended between two poses.
///
/// `t` is never clamped: values outside `[0, 1]` extrapolate.
pub trait Interpolatable: Copy + Sized {
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self;
}

impl Interpolatable for f32 {
    #[inline]
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }
}

impl Interpolatable for Vec3 {
    #[inline]
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        start + (end - start) * t
    }
}

impl Interpolatable for Quat {
    /// Shortest-arc slerp, re-normalized afterwards.
    #[inline]
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        normalize_or_identity(start.slerp(end, t))
    }
}

impl Interpolatable for Transformation {
    #[inline]
    fn interpolate_linear(start: Self, end: Self, t: f32) -> Self {
        Transformation {
            scale: Vec3::interpolate_linear(start.scale, end.scale, t),
            rotation: Quat::interpolate_linear(start.rotation, end.rotation, t),
            translation: Vec3::interpolate_linear(start.translation, end.translation, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_vec3_extrapolates() {
        let v = Vec3::interpolate_linear(Vec3::ZERO, Vec3::ONE, 2.0);
        assert!(v.abs_diff_eq(Vec3::splat(2.0), 1e-6));
    }

    #[test]
    fn test_quat_takes_shortest_arc() {
        let a = Quat::IDENTITY;
        let b = -Quat::from_rotation_y(FRAC_PI_2);
        let mid = Quat::interpolate_linear(a, b, 0.5);
        let expected = Quat::from_rotation_y(FRAC_PI_2 * 0.5);
        assert!(mid.angle_between(expected) < 1e-4);
        assert!((mid.length() - 1.0).abs() < 1e-5);
    }
}
