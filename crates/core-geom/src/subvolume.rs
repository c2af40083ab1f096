//! Partitioning of a volume into per-worker slabs along the z axis.

use crate::vector::{Dims3, Vec3f};

/// Descriptor of one contiguous range of z-slices of the output volume.
///
/// Only a description; no voxel data is touched here. Spacing is omitted
/// because every slab shares the parent volume's spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subvolume {
    /// Index of this slab's first z-slice in the parent volume.
    pub z_start: usize,
    pub dims: Dims3,
    pub origin: Vec3f,
}

/// Divides `dims` into `slabs` z-ranges whose z-dims sum to `dims[0]` and
/// differ from each other by at most one slice, larger slabs first.
///
/// `slabs` may exceed the slice count, in which case trailing slabs are
/// empty (z dim 0); consumers must tolerate those.
pub fn partition_volume(dims: Dims3, spacing: Vec3f, origin: Vec3f, slabs: usize) -> Vec<Subvolume> {
    assert!(slabs > 0, "cannot partition into zero slabs");
    let z = dims[0];
    let base = z / slabs;
    let remainder = z % slabs;

    let mut out = Vec::with_capacity(slabs);
    let mut z_start = 0usize;
    for s in 0..slabs {
        let slab_z = base + usize::from(s < remainder);
        let mut slab_origin = origin;
        slab_origin[0] = origin[0] + z_start as f32 * spacing[0];
        out.push(Subvolume {
            z_start,
            dims: Dims3::new([slab_z, dims[1], dims[2]]),
            origin: slab_origin,
        });
        z_start += slab_z;
    }
    debug_assert_eq!(z_start, z);
    out
}
