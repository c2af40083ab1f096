//! Ray–projection intersection for parallel beams.

use core_geom::{Vec2f, Vec3f};

/// The reflected normal of the ray direction at `angle` (radians): the
/// ray direction lies in the x–y plane, and this vector both encodes the
/// angle and maps a world position onto the projection's u axis.
#[inline]
pub fn reverse_normal(angle: f32) -> Vec2f {
    Vec2f::new([-angle.sin(), angle.cos()])
}

/// Intersection point (v, u) of the ray through `position` = (z, y, x)
/// with an abstract projection plane containing the rotation axis.
///
/// v runs parallel to the rotation axis, so it is simply z; u is the
/// in-plane coordinate after rotating by the projection angle:
/// u = -sin(θ)·x + cos(θ)·y.
#[inline]
pub fn intersect(position: Vec3f, reverse_normal: Vec2f) -> Vec2f {
    Vec2f::new([
        position[0],
        reverse_normal[0] * position[2] + reverse_normal[1] * position[1],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn zero_angle_projects_y_onto_u() {
        let p = intersect(Vec3f::new([1.5, 2.0, 3.0]), reverse_normal(0.0));
        assert_relative_eq!(p[0], 1.5);
        assert_relative_eq!(p[1], 2.0);
    }

    #[test]
    fn quarter_turn_projects_negative_x_onto_u() {
        let p = intersect(Vec3f::new([0.0, 2.0, 3.0]), reverse_normal(FRAC_PI_2));
        assert_relative_eq!(p[1], -3.0, epsilon = 1e-6);
    }

    #[test]
    fn forty_five_degrees_mixes_axes_equally() {
        let p = intersect(Vec3f::new([0.0, 1.0, 1.0]), reverse_normal(FRAC_PI_4));
        assert_relative_eq!(p[1], 0.0, epsilon = 1e-6);
        let q = intersect(Vec3f::new([0.0, 1.0, -1.0]), reverse_normal(FRAC_PI_4));
        assert_relative_eq!(q[1], 2.0f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn v_is_independent_of_angle() {
        for angle in [0.0f32, 0.3, 1.2, 3.0] {
            let p = intersect(Vec3f::new([-0.7, 5.0, -2.0]), reverse_normal(angle));
            assert_relative_eq!(p[0], -0.7);
        }
    }
}
