//! Pixel interpolation on projections.
//!
//! The three variants differ only in how they treat the image border:
//!
//! * [`NearestNeighbor`] answers anywhere inside the *exterior* extents
//!   (the physical pixel footprint) and 0 outside.
//! * [`Bilinear`] answers only strictly inside the *interior* extents (the
//!   hull of pixel centres) and 0 outside, so it never invents data beyond
//!   the last centre, at the price of a half-pixel dead border.
//! * [`BilinearWithFallback`] is bilinear inside the interior extents and
//!   falls back to nearest-neighbour in the half-pixel border, recovering
//!   the edge information the plain bilinear variant discards.
//!
//! None of them reads out of bounds for any query point.

use core_geom::{Projection, Vec2f};

/// Runtime selection of the interpolation variant. Resolved to a concrete
/// [`PixelInterpolator`] type once per projection by the back-projector, so
/// the per-sample cost is a direct call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelInterpolation {
    NearestNeighbor,
    Bilinear,
    #[default]
    BilinearWithFallback,
}

/// A stateless interpolation scheme over a projection.
pub trait PixelInterpolator {
    /// Samples `image` at the world-space point (v, u).
    fn interpolate(image: &Projection, point: Vec2f) -> f32;
}

pub struct NearestNeighbor;

impl PixelInterpolator for NearestNeighbor {
    #[inline]
    fn interpolate(image: &Projection, point: Vec2f) -> f32 {
        let ext = image.exterior_extents();
        if point[0] <= ext[0][0]
            || point[0] >= ext[0][1]
            || point[1] <= ext[1][0]
            || point[1] >= ext[1][1]
        {
            return 0.0;
        }
        let dims = image.dims();
        let origin = image.origin();
        let spacing = image.spacing();
        // Saturating float→usize casts plus the clamp keep the index legal
        // even at the extreme of rounding error on the extent test.
        let i = (((point[0] - origin[0]) / spacing[0] + 0.5) as usize).min(dims[0] - 1);
        let j = (((point[1] - origin[1]) / spacing[1] + 0.5) as usize).min(dims[1] - 1);
        image.at(i, j)
    }
}

pub struct Bilinear;

impl PixelInterpolator for Bilinear {
    #[inline]
    fn interpolate(image: &Projection, point: Vec2f) -> f32 {
        let int = image.interior_extents();
        if point[0] <= int[0][0]
            || point[0] >= int[0][1]
            || point[1] <= int[1][0]
            || point[1] >= int[1][1]
        {
            return 0.0;
        }
        bilinear_unchecked(image, point)
    }
}

pub struct BilinearWithFallback;

impl PixelInterpolator for BilinearWithFallback {
    #[inline]
    fn interpolate(image: &Projection, point: Vec2f) -> f32 {
        let int = image.interior_extents();
        if point[0] <= int[0][0]
            || point[0] >= int[0][1]
            || point[1] <= int[1][0]
            || point[1] >= int[1][1]
        {
            // Outside the hull of pixel centres: nearest-neighbour buys an
            // extra half pixel of width on every side.
            return NearestNeighbor::interpolate(image, point);
        }
        bilinear_unchecked(image, point)
    }
}

/// Standard 4-neighbour weighted average. Caller guarantees the point is
/// strictly inside the interior extents, so i+1/j+1 are in range.
#[inline]
fn bilinear_unchecked(image: &Projection, point: Vec2f) -> f32 {
    let origin = image.origin();
    let spacing = image.spacing();
    let fp0 = (point[0] - origin[0]) / spacing[0];
    let fp1 = (point[1] - origin[1]) / spacing[1];
    let i = fp0.floor();
    let j = fp1.floor();
    let s0 = fp0 - i;
    let s1 = fp1 - j;
    let (i, j) = (i as usize, j as usize);
    let t0 = (1.0 - s1) * image.at(i, j) + s1 * image.at(i, j + 1);
    let t1 = (1.0 - s1) * image.at(i + 1, j) + s1 * image.at(i + 1, j + 1);
    (1.0 - s0) * t0 + s0 * t1
}

impl PixelInterpolation {
    /// One-off dynamic dispatch; the back-projector's hot loop goes through
    /// the generic path instead.
    pub fn interpolate(self, image: &Projection, point: Vec2f) -> f32 {
        match self {
            Self::NearestNeighbor => NearestNeighbor::interpolate(image, point),
            Self::Bilinear => Bilinear::interpolate(image, point),
            Self::BilinearWithFallback => BilinearWithFallback::interpolate(image, point),
        }
    }
}
