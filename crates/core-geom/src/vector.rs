//! Fixed-length numeric tuples.

use std::fmt;
use std::ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub};

/// A fixed-length tuple of numbers with element-wise arithmetic.
///
/// Used both for index tuples (`Vector<N, usize>`) and for real-space
/// positions, spacings and origins (`Vector<N, f32>`). Arithmetic is
/// element-wise; scalar forms are provided through `scaled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vector<const N: usize, T>(pub [T; N]);

/// Index tuple of a 2-D array, ordered (rows, columns) = (v, u).
pub type Dims2 = Vector<2, usize>;
/// Index tuple of a 3-D array, ordered (z, y, x).
pub type Dims3 = Vector<3, usize>;
/// Real-space 2-tuple (spacings, origins, sample points).
pub type Vec2f = Vector<2, f32>;
/// Real-space 3-tuple.
pub type Vec3f = Vector<3, f32>;

impl<const N: usize, T> Vector<N, T> {
    pub const fn new(elements: [T; N]) -> Self {
        Self(elements)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }
}

impl<const N: usize, T: Copy> Vector<N, T> {
    /// Returns the tuple with its elements in reverse order.
    ///
    /// Index tuples are stored slowest-axis-first; file formats list
    /// dimensions fastest-axis-first, so this conversion appears at every
    /// I/O boundary.
    pub fn reverse(self) -> Self {
        let mut out = self.0;
        out.reverse();
        Self(out)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Vector<N, U> {
        Vector(self.0.map(f))
    }
}

impl<const N: usize, T: Copy + Mul<Output = T>> Vector<N, T> {
    /// Product of all elements. For a `Dims` tuple this is the flat length.
    pub fn product(self) -> T {
        self.0
            .into_iter()
            .reduce(|acc, e| acc * e)
            .expect("zero-length vector")
    }
}

impl<const N: usize, T: Copy + Mul<Output = T> + Add<Output = T>> Vector<N, T> {
    pub fn dot(self, other: Self) -> T {
        let mut terms = self.0.into_iter().zip(other.0).map(|(a, b)| a * b);
        let first = terms.next().expect("zero-length vector");
        terms.fold(first, |acc, t| acc + t)
    }
}

impl<const N: usize, T: Copy + Mul<Output = T>> Vector<N, T> {
    pub fn scaled(self, s: T) -> Self {
        Self(self.0.map(|e| e * s))
    }
}

impl<const N: usize> Vector<N, f32> {
    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }
}

impl<const N: usize> Vector<N, usize> {
    pub fn zeros() -> Self {
        Self([0; N])
    }

    pub fn ones() -> Self {
        Self([1; N])
    }

    /// Element-wise conversion to f32 (voxel indices entering world space).
    pub fn as_f32(self) -> Vector<N, f32> {
        Vector(self.0.map(|e| e as f32))
    }
}

impl<const N: usize> Vector<N, f32> {
    pub fn zeros() -> Self {
        Self([0.0; N])
    }

    pub fn ones() -> Self {
        Self([1.0; N])
    }
}

impl<const N: usize, T> Index<usize> for Vector<N, T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.0[i]
    }
}

impl<const N: usize, T> IndexMut<usize> for Vector<N, T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.0[i]
    }
}

impl<const N: usize, T: Copy + Add<Output = T>> Add for Vector<N, T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o = *o + r;
        }
        Self(out)
    }
}

impl<const N: usize, T: Copy + Sub<Output = T>> Sub for Vector<N, T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o = *o - r;
        }
        Self(out)
    }
}

impl<const N: usize, T: Copy + Mul<Output = T>> Mul for Vector<N, T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o = *o * r;
        }
        Self(out)
    }
}

impl<const N: usize, T: Copy + Div<Output = T>> Div for Vector<N, T> {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let mut out = self.0;
        for (o, r) in out.iter_mut().zip(rhs.0) {
            *o = *o / r;
        }
        Self(out)
    }
}

impl<const N: usize, T: Copy + Neg<Output = T>> Neg for Vector<N, T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.map(|e| -e))
    }
}

impl<const N: usize, T: fmt::Display> fmt::Display for Vector<N, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        write!(f, ")")
    }
}

impl<const N: usize, T> From<[T; N]> for Vector<N, T> {
    fn from(elements: [T; N]) -> Self {
        Self(elements)
    }
}
