//! The per-worker back-projector.

use core_geom::{Dims3, Projection, Vec3f, Volume};
use tracing::debug;

use crate::interpolate::{
    Bilinear, BilinearWithFallback, NearestNeighbor, PixelInterpolation, PixelInterpolator,
};
use crate::ray::{intersect, reverse_normal};

/// Owns one slab of the output volume and accumulates filtered projections
/// into it.
///
/// The volume is allocated zero-filled up front. `apply_projection` is
/// read-only over the projection and writes only this slab, so any number
/// of back-projectors over disjoint slabs may run concurrently against a
/// shared projection.
pub struct BackProjector {
    volume: Volume,
    interpolation: PixelInterpolation,
    /// Applied per sample; the final voxel value is Σ scale·sample.
    scaling_factor: f32,
}

impl BackProjector {
    pub fn new(
        dims: Dims3,
        spacing: Vec3f,
        origin: Vec3f,
        interpolation: PixelInterpolation,
        scaling_factor: f32,
    ) -> Self {
        debug!(
            target: "backproject",
            dims = %dims,
            origin_z = origin[0],
            "allocating volume slab"
        );
        Self {
            volume: Volume::new(dims, spacing, origin),
            interpolation,
            scaling_factor,
        }
    }

    /// Back-projects one filtered projection at `angle` (radians) through
    /// the slab. A zero-slice slab is a no-op, which is what makes worker
    /// counts above the slice count harmless.
    pub fn apply_projection(&mut self, projection: &Projection, angle: f32) {
        match self.interpolation {
            PixelInterpolation::NearestNeighbor => {
                self.apply_with::<NearestNeighbor>(projection, angle)
            }
            PixelInterpolation::Bilinear => self.apply_with::<Bilinear>(projection, angle),
            PixelInterpolation::BilinearWithFallback => {
                self.apply_with::<BilinearWithFallback>(projection, angle)
            }
        }
    }

    fn apply_with<I: PixelInterpolator>(&mut self, projection: &Projection, angle: f32) {
        let rn = reverse_normal(angle);
        let dims = self.volume.dims();
        let spacing = self.volume.spacing();
        let origin = self.volume.origin();
        let scale = self.scaling_factor;

        for z in 0..dims[0] {
            let z_w = origin[0] + z as f32 * spacing[0];
            for y in 0..dims[1] {
                let y_w = origin[1] + y as f32 * spacing[1];
                for x in 0..dims[2] {
                    let x_w = origin[2] + x as f32 * spacing[2];
                    let point = intersect(Vec3f::new([z_w, y_w, x_w]), rn);
                    let sample = I::interpolate(projection, point);
                    *self.volume.at_mut(z, y, x) += scale * sample;
                }
            }
        }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn into_volume(self) -> Volume {
        self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core_geom::{Dims2, Vec2f};
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    /// The 3x3 test projection used throughout: a centre row of
    /// (10, 20, 30) flanked by rows of 1000 so that any v leakage is
    /// unmistakable.
    fn test_projection(origin_shift_u: f32) -> Projection {
        let dims = Dims2::new([3, 3]);
        let spacing = Vec2f::new([0.4, 0.4]);
        let origin = Vec2f::new([
            -0.5 * 2.0 * 0.4,
            -0.5 * 2.0 * 0.4 + origin_shift_u,
        ]);
        Projection::from_vec(
            dims,
            spacing,
            origin,
            vec![1000.0, 1000.0, 1000.0, 10.0, 20.0, 30.0, 1000.0, 1000.0, 1000.0],
        )
    }

    fn single_voxel_projector(volume_origin: Vec3f) -> BackProjector {
        BackProjector::new(
            Dims3::new([1, 1, 1]),
            Vec3f::new([0.1, 0.1, 0.1]),
            volume_origin,
            PixelInterpolation::Bilinear,
            1.0,
        )
    }

    #[test]
    fn single_voxel_accumulates_centre_pixel() {
        let projection = test_projection(0.0);
        let mut bp = single_voxel_projector(Vec3f::zeros());
        bp.apply_projection(&projection, FRAC_PI_4);
        assert_relative_eq!(bp.volume().at(0, 0, 0), 20.0, epsilon = 1e-4);
        bp.apply_projection(&projection, 0.0);
        assert_relative_eq!(bp.volume().at(0, 0, 0), 40.0, epsilon = 1e-4);
    }

    #[test]
    fn offset_projection_interpolates_between_pixels() {
        // Projection shifted +half a pixel in u: the origin voxel lands
        // exactly between the pixels with values 10 and 20.
        let projection = test_projection(0.5 * 0.4);
        let mut bp = single_voxel_projector(Vec3f::zeros());
        bp.apply_projection(&projection, FRAC_PI_4);
        assert_relative_eq!(bp.volume().at(0, 0, 0), 15.0, epsilon = 1e-4);
        bp.apply_projection(&projection, 0.0);
        assert_relative_eq!(bp.volume().at(0, 0, 0), 30.0, epsilon = 1e-4);
    }

    #[test]
    fn offset_volume_shifts_the_sample_point() {
        let projection = test_projection(0.0);
        let mut bp = single_voxel_projector(Vec3f::new([0.0, 0.1, 0.0]));
        bp.apply_projection(&projection, FRAC_PI_4);
        // 45 degrees turns the y shift into cos(45°)·0.1 along u.
        let expected = 20.0 + 10.0 * 0.1 * 0.5f32.sqrt() / 0.4;
        assert_relative_eq!(bp.volume().at(0, 0, 0), expected, epsilon = 1e-4);
        // 90 degrees is along the shift direction, so it looks centred.
        bp.apply_projection(&projection, FRAC_PI_2);
        assert_relative_eq!(bp.volume().at(0, 0, 0), expected + 20.0, epsilon = 1e-4);
    }

    #[test]
    fn two_by_two_volume_matches_hand_computation() {
        let projection = test_projection(0.0);
        let dims = Dims3::new([1, 2, 2]);
        let spacing = Vec3f::new([0.1, 0.1, 0.1]);
        let origin = Vec3f::new([0.0, -0.05, -0.05]);
        let mut bp = BackProjector::new(
            dims,
            spacing,
            origin,
            PixelInterpolation::Bilinear,
            1.0,
        );
        bp.apply_projection(&projection, 0.0);
        let expected1 = 10.0 + ((0.4 - 0.05) / 0.4) * 10.0;
        let expected2 = 20.0 + (0.05 / 0.4) * 10.0;
        assert_relative_eq!(bp.volume().at(0, 0, 0), expected1, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 0, 1), expected1, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 1, 0), expected2, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 1, 1), expected2, epsilon = 1e-4);

        bp.apply_projection(&projection, FRAC_PI_2);
        assert_relative_eq!(bp.volume().at(0, 0, 0), expected1 + expected2, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 0, 1), 2.0 * expected1, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 1, 0), 2.0 * expected2, epsilon = 1e-4);
        assert_relative_eq!(bp.volume().at(0, 1, 1), expected2 + expected1, epsilon = 1e-4);
    }

    #[test]
    fn scaling_factor_multiplies_every_sample() {
        let projection = test_projection(0.0);
        let mut bp = BackProjector::new(
            Dims3::new([1, 1, 1]),
            Vec3f::new([0.1, 0.1, 0.1]),
            Vec3f::zeros(),
            PixelInterpolation::Bilinear,
            0.25,
        );
        bp.apply_projection(&projection, 0.0);
        bp.apply_projection(&projection, FRAC_PI_4);
        assert_relative_eq!(bp.volume().at(0, 0, 0), 0.25 * 40.0, epsilon = 1e-4);
    }

    #[test]
    fn empty_slab_is_a_no_op() {
        let projection = test_projection(0.0);
        let mut bp = BackProjector::new(
            Dims3::new([0, 4, 4]),
            Vec3f::new([0.1, 0.1, 0.1]),
            Vec3f::zeros(),
            PixelInterpolation::BilinearWithFallback,
            1.0,
        );
        bp.apply_projection(&projection, 1.0);
        assert!(bp.volume().data().is_empty());
    }
}
