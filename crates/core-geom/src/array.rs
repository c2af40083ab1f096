//! Dense row-major arrays.
//!
//! The last index is fastest-varying in memory: the flat index of
//! (i0, …, i_{N-1}) with dims (d0, …, d_{N-1}) is (((i0·d1)+i1)·d2+i2)….
//! Owned arrays zero-fill their storage on allocation, which also touches
//! every page up front on lazily-committing operating systems.
//!
//! Indexed accessors bounds-check against the flat extent: `debug_assert!`
//! in the per-element hot paths, hard checks in the flat accessors.

use crate::vector::{Dims2, Dims3};

/// Owned dense 2-D array, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2<T> {
    dims: Dims2,
    data: Vec<T>,
}

impl<T: Copy + Default> Array2<T> {
    /// Allocates a zero-filled (`T::default()`) array.
    pub fn new(dims: Dims2) -> Self {
        Self {
            dims,
            data: vec![T::default(); dims.product()],
        }
    }

    /// Wraps an existing buffer. The flat length must match the dims.
    pub fn from_vec(dims: Dims2, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            dims.product(),
            "buffer length {} does not match dims {}",
            data.len(),
            dims
        );
        Self { dims, data }
    }

    pub fn dims(&self) -> Dims2 {
        self.dims
    }

    /// Flat (1-D) length; always equals `dims.product()`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.dims[0] && j < self.dims[1]);
        self.data[i * self.dims[1] + j]
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize) -> &mut T {
        debug_assert!(i < self.dims[0] && j < self.dims[1]);
        &mut self.data[i * self.dims[1] + j]
    }

    pub fn flat(&self, k: usize) -> T {
        assert!(k < self.data.len(), "flat index {k} out of range");
        self.data[k]
    }

    pub fn row(&self, i: usize) -> &[T] {
        let w = self.dims[1];
        &self.data[i * w..(i + 1) * w]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [T] {
        let w = self.dims[1];
        &mut self.data[i * w..(i + 1) * w]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Bit-copies from a same-shaped source.
    pub fn copy_from(&mut self, source: &Array2<T>) {
        assert_eq!(self.dims, source.dims, "shape mismatch in copy_from");
        self.data.copy_from_slice(&source.data);
    }

    pub fn view(&self) -> View2<'_, T> {
        View2 {
            dims: self.dims,
            data: &self.data,
        }
    }
}

/// Borrowed read-only 2-D view over external storage.
///
/// Used to hand slices of a larger array (one z-slice of a volume, say) to
/// the writers without copying.
#[derive(Debug, Clone, Copy)]
pub struct View2<'a, T> {
    dims: Dims2,
    data: &'a [T],
}

impl<'a, T: Copy> View2<'a, T> {
    pub fn new(dims: Dims2, data: &'a [T]) -> Self {
        assert_eq!(data.len(), dims.product(), "view length does not match dims");
        Self { dims, data }
    }

    pub fn dims(&self) -> Dims2 {
        self.dims
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize) -> T {
        debug_assert!(i < self.dims[0] && j < self.dims[1]);
        self.data[i * self.dims[1] + j]
    }

    pub fn data(&self) -> &'a [T] {
        self.data
    }
}

/// Owned dense 3-D array, row-major (z slowest, x fastest).
#[derive(Debug, Clone, PartialEq)]
pub struct Array3<T> {
    dims: Dims3,
    data: Vec<T>,
}

impl<T: Copy + Default> Array3<T> {
    pub fn new(dims: Dims3) -> Self {
        Self {
            dims,
            data: vec![T::default(); dims.product()],
        }
    }

    pub fn from_vec(dims: Dims3, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            dims.product(),
            "buffer length {} does not match dims {}",
            data.len(),
            dims
        );
        Self { dims, data }
    }

    pub fn dims(&self) -> Dims3 {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn at(&self, i: usize, j: usize, k: usize) -> T {
        debug_assert!(i < self.dims[0] && j < self.dims[1] && k < self.dims[2]);
        self.data[(i * self.dims[1] + j) * self.dims[2] + k]
    }

    #[inline]
    pub fn at_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        debug_assert!(i < self.dims[0] && j < self.dims[1] && k < self.dims[2]);
        &mut self.data[(i * self.dims[1] + j) * self.dims[2] + k]
    }

    pub fn flat(&self, k: usize) -> T {
        assert!(k < self.data.len(), "flat index {k} out of range");
        self.data[k]
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn copy_from(&mut self, source: &Array3<T>) {
        assert_eq!(self.dims, source.dims, "shape mismatch in copy_from");
        self.data.copy_from_slice(&source.data);
    }

    /// Borrowed view of one z-slice.
    pub fn slice(&self, z: usize) -> View2<'_, T> {
        assert!(z < self.dims[0], "slice index {z} out of range");
        let plane = self.dims[1] * self.dims[2];
        View2 {
            dims: Dims2::new([self.dims[1], self.dims[2]]),
            data: &self.data[z * plane..(z + 1) * plane],
        }
    }
}
