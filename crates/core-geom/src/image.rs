//! Arrays positioned in space.
//!
//! An image is an array plus a spacing and an origin, where the origin is
//! the centre of the index-0 element. Two extent boxes follow from that
//! convention and both matter to interpolation:
//!
//! * interior extents: the convex hull of the element centres,
//!   `[origin, origin + (dims-1)·spacing]` per axis;
//! * exterior extents: the physical footprint including the half-element
//!   border, interior widened by `spacing/2` on each side.
//!
//! Both are cached and recomputed whenever origin or spacing change.

use crate::array::{Array2, Array3, View2};
use crate::vector::{Dims2, Dims3, Vec2f, Vec3f};

/// Per-axis `[low, high]` extent pair.
pub type Extent = [f32; 2];

fn extents<const N: usize>(
    dims: [usize; N],
    spacing: [f32; N],
    origin: [f32; N],
) -> ([Extent; N], [Extent; N]) {
    let mut interior = [[0.0f32; 2]; N];
    let mut exterior = [[0.0f32; 2]; N];
    for axis in 0..N {
        let lo = origin[axis];
        let hi = origin[axis] + (dims[axis].saturating_sub(1)) as f32 * spacing[axis];
        interior[axis] = [lo, hi];
        exterior[axis] = [lo - 0.5 * spacing[axis], hi + 0.5 * spacing[axis]];
    }
    (interior, exterior)
}

/// A 2-D image: dense array + spacing + origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Image2<T> {
    array: Array2<T>,
    spacing: Vec2f,
    origin: Vec2f,
    interior: [Extent; 2],
    exterior: [Extent; 2],
}

impl<T: Copy + Default> Image2<T> {
    pub fn new(dims: Dims2, spacing: Vec2f, origin: Vec2f) -> Self {
        Self::from_array(Array2::new(dims), spacing, origin)
    }

    pub fn from_array(array: Array2<T>, spacing: Vec2f, origin: Vec2f) -> Self {
        let (interior, exterior) = extents(array.dims().0, spacing.0, origin.0);
        Self {
            array,
            spacing,
            origin,
            interior,
            exterior,
        }
    }

    pub fn from_vec(dims: Dims2, spacing: Vec2f, origin: Vec2f, data: Vec<T>) -> Self {
        Self::from_array(Array2::from_vec(dims, data), spacing, origin)
    }

    pub fn dims(&self) -> Dims2 {
        self.array.dims()
    }

    pub fn spacing(&self) -> Vec2f {
        self.spacing
    }

    pub fn origin(&self) -> Vec2f {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Vec2f) {
        self.origin = origin;
        let (interior, exterior) = extents(self.array.dims().0, self.spacing.0, origin.0);
        self.interior = interior;
        self.exterior = exterior;
    }

    pub fn set_spacing(&mut self, spacing: Vec2f) {
        self.spacing = spacing;
        let (interior, exterior) = extents(self.array.dims().0, spacing.0, self.origin.0);
        self.interior = interior;
        self.exterior = exterior;
    }

    pub fn interior_extents(&self) -> &[Extent; 2] {
        &self.interior
    }

    pub fn exterior_extents(&self) -> &[Extent; 2] {
        &self.exterior
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        self.array.at(i, j)
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut T {
        self.array.at_mut(i, j)
    }

    pub fn array(&self) -> &Array2<T> {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Array2<T> {
        &mut self.array
    }

    pub fn data(&self) -> &[T] {
        self.array.data()
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        self.array.data_mut()
    }

    pub fn fill(&mut self, value: T) {
        self.array.fill(value);
    }

    pub fn view(&self) -> View2<'_, T> {
        self.array.view()
    }
}

/// A 3-D image, indexed (z, y, x).
#[derive(Debug, Clone, PartialEq)]
pub struct Image3<T> {
    array: Array3<T>,
    spacing: Vec3f,
    origin: Vec3f,
    interior: [Extent; 3],
    exterior: [Extent; 3],
}

impl<T: Copy + Default> Image3<T> {
    pub fn new(dims: Dims3, spacing: Vec3f, origin: Vec3f) -> Self {
        Self::from_array(Array3::new(dims), spacing, origin)
    }

    pub fn from_array(array: Array3<T>, spacing: Vec3f, origin: Vec3f) -> Self {
        let (interior, exterior) = extents(array.dims().0, spacing.0, origin.0);
        Self {
            array,
            spacing,
            origin,
            interior,
            exterior,
        }
    }

    pub fn dims(&self) -> Dims3 {
        self.array.dims()
    }

    pub fn spacing(&self) -> Vec3f {
        self.spacing
    }

    pub fn origin(&self) -> Vec3f {
        self.origin
    }

    pub fn interior_extents(&self) -> &[Extent; 3] {
        &self.interior
    }

    pub fn exterior_extents(&self) -> &[Extent; 3] {
        &self.exterior
    }

    #[inline]
    pub fn at(&self, z: usize, y: usize, x: usize) -> T {
        self.array.at(z, y, x)
    }

    #[inline]
    pub fn at_mut(&mut self, z: usize, y: usize, x: usize) -> &mut T {
        self.array.at_mut(z, y, x)
    }

    pub fn array(&self) -> &Array3<T> {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Array3<T> {
        &mut self.array
    }

    pub fn data(&self) -> &[T] {
        self.array.data()
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        self.array.data_mut()
    }

    pub fn fill(&mut self, value: T) {
        self.array.fill(value);
    }

    /// Borrowed view of one z-slice (for streaming the volume out).
    pub fn slice(&self, z: usize) -> View2<'_, T> {
        self.array.slice(z)
    }
}
