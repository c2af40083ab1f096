//! Geometry primitives for the reconstruction pipeline.
//!
//! Everything downstream of the readers is expressed in terms of three
//! building blocks defined here:
//!
//! * [`Vector`]: a fixed-length numeric tuple with element-wise arithmetic.
//!   Semantic aliases distinguish index tuples ([`Dims2`], [`Dims3`]) from
//!   real-space tuples ([`Vec2f`], [`Vec3f`]).
//! * [`Array2`] / [`Array3`]: dense row-major arrays (the last index is
//!   fastest-varying in memory). [`View2`] wraps borrowed storage with an
//!   explicit lifetime for zero-copy slice hand-off to the writers.
//! * [`Image2`] / [`Image3`]: arrays positioned in space by a spacing and
//!   an origin. The origin is the *centre* of the index-0 element, not its
//!   corner; interior/exterior extents are derived accordingly and kept in
//!   sync on mutation.
//!
//! Axis conventions: projections are indexed (v, u) with u perpendicular to
//! the rotation axis; volumes are indexed (z, y, x) with z parallel to it.

mod array;
mod image;
mod subvolume;
mod vector;

pub use array::{Array2, Array3, View2};
pub use image::{Image2, Image3};
pub use subvolume::{partition_volume, Subvolume};
pub use vector::{Dims2, Dims3, Vec2f, Vec3f, Vector};

/// A 2-D radiograph positioned in space: rows are v, columns are u.
pub type Projection = Image2<f32>;

/// The reconstruction volume (or one worker's slab of it), indexed (z, y, x).
pub type Volume = Image3<f32>;
