//! Bad-pixel identification and repair.
//!
//! Bad pixels are found once, from the calibration fields alone:
//!
//! 1. the flat field is too dark (`bright - dark < flat_threshold`),
//! 2. the dark field is too bright (`dark > dark_threshold`),
//! 3. the pair is inverted (`bright <= dark`).
//!
//! Repair either zeroes the bad pixels or replaces each with the uniform
//! average of its 4 nearest good neighbours, found by walking rings of
//! increasing Chebyshev distance around the pixel.

use core_geom::{Dims2, Projection};
use tracing::info;

use crate::error::CalibrationError;

/// Thresholds for bad-pixel identification.
#[derive(Debug, Clone, Copy)]
pub struct BadPixelOptions {
    /// Pixels whose flat field (`bright - dark`) is below this are bad.
    /// 10 counts is a reasonable floor for discrete detectors; for
    /// floating-point raw data it will usually need overriding.
    pub flat_field_bad_threshold: f32,
    /// Pixels whose dark field exceeds this are bad. Default infinity,
    /// i.e. disabled.
    pub dark_field_bad_threshold: f32,
}

impl Default for BadPixelOptions {
    fn default() -> Self {
        Self {
            flat_field_bad_threshold: 10.0,
            dark_field_bad_threshold: f32::INFINITY,
        }
    }
}

/// Replacement recipe for one bad pixel: its 4 nearest good neighbours,
/// each weighted 1/4. Entries never reference a bad pixel, which is what
/// makes in-place averaging read only pre-correction values.
#[derive(Debug, Clone, Copy)]
struct CorrectionEntry {
    neighbours: [(usize, usize); 4],
}

const NEIGHBOUR_WEIGHT: f32 = 0.25;

#[derive(Debug)]
pub struct BadPixelCorrector {
    dims: Dims2,
    bad: Vec<(usize, usize)>,
    mask: Vec<bool>,
    table: Vec<CorrectionEntry>,
}

impl BadPixelCorrector {
    /// Identifies bad pixels from the dark and bright fields and builds the
    /// correction table.
    pub fn identify(
        dark: &Projection,
        bright: &Projection,
        options: BadPixelOptions,
    ) -> Result<Self, CalibrationError> {
        assert_eq!(dark.dims(), bright.dims(), "calibration field dims mismatch");
        let dims = dark.dims();
        let mut mask = vec![false; dims.product()];
        let mut bad = Vec::new();

        for row in 0..dims[0] {
            for col in 0..dims[1] {
                let d = dark.at(row, col);
                let b = bright.at(row, col);
                let flat_field_bad = b - d < options.flat_field_bad_threshold;
                let dark_field_bad = d > options.dark_field_bad_threshold;
                let inverted = b <= d;
                if flat_field_bad || dark_field_bad || inverted {
                    mask[row * dims[1] + col] = true;
                    bad.push((row, col));
                }
            }
        }

        info!(
            target: "calibration",
            bad_pixels = bad.len(),
            total = dims.product(),
            "bad pixel identification complete"
        );

        let mut corrector = Self {
            dims,
            bad,
            mask,
            table: Vec::new(),
        };
        corrector.construct_correction_table()?;
        Ok(corrector)
    }

    pub fn dims(&self) -> Dims2 {
        self.dims
    }

    pub fn bad_pixels(&self) -> &[(usize, usize)] {
        &self.bad
    }

    pub fn num_bad_pixels(&self) -> usize {
        self.bad.len()
    }

    /// O(1); safe to call concurrently from any thread.
    #[inline]
    pub fn is_bad(&self, row: usize, col: usize) -> bool {
        self.mask[row * self.dims[1] + col]
    }

    fn construct_correction_table(&mut self) -> Result<(), CalibrationError> {
        // Quadratic in the number of bad pixels in the worst case, which is
        // fine for realistic detectors where bad pixels are scarce.
        let mut table = Vec::with_capacity(self.bad.len());
        for &(row, col) in &self.bad {
            let mut neighbours = [(0usize, 0usize); 4];
            let mut found = 0;
            for (r, c) in NeighborhoodWalker::new(self.dims, (row, col)) {
                if !self.is_bad(r, c) {
                    neighbours[found] = (r, c);
                    found += 1;
                    if found == 4 {
                        break;
                    }
                }
            }
            if found < 4 {
                return Err(CalibrationError::InsufficientGoodPixels { row, col });
            }
            table.push(CorrectionEntry { neighbours });
        }
        self.table = table;
        Ok(())
    }

    /// Zeroes every bad pixel. Safe to run concurrently on disjoint projections.
    pub fn zero_bad_pixels(&self, projection: &mut Projection) {
        assert_eq!(projection.dims(), self.dims);
        for &(row, col) in &self.bad {
            *projection.at_mut(row, col) = 0.0;
        }
    }

    /// Replaces every bad pixel with the mean of its table neighbours.
    ///
    /// Neighbours are good by construction, so every read sees a
    /// pre-correction value regardless of the order bad pixels are written.
    pub fn correct_bad_pixels(&self, projection: &mut Projection) {
        assert_eq!(projection.dims(), self.dims);
        for (&(row, col), entry) in self.bad.iter().zip(&self.table) {
            let mut sum = 0.0f32;
            for &(r, c) in &entry.neighbours {
                sum += projection.at(r, c);
            }
            *projection.at_mut(row, col) = sum * NEIGHBOUR_WEIGHT;
        }
    }
}

/// Walks grid positions around a starting point in rings of increasing
/// Chebyshev distance, skipping out-of-bounds positions. The starting point
/// itself is not emitted.
///
/// The in-ring order is fixed: ring 1 visits the four edge-adjacent
/// neighbours (south, east, north, west) then the four diagonals; ring
/// r >= 2 enters the ring at (r, -(r-1)), sweeps the bottom row eastwards,
/// the east column northwards, the top row westwards and the west column
/// southwards. The iterator ends once the rings can no longer intersect the
/// grid.
#[derive(Debug)]
pub struct NeighborhoodWalker {
    dims: Dims2,
    start: (i64, i64),
    radius: i64,
    step: i64,
}

const RING_ONE: [(i64, i64); 8] = [
    (1, 0),
    (0, 1),
    (-1, 0),
    (0, -1),
    (1, 1),
    (-1, 1),
    (-1, -1),
    (1, -1),
];

impl NeighborhoodWalker {
    pub fn new(dims: Dims2, start: (usize, usize)) -> Self {
        Self {
            dims,
            start: (start.0 as i64, start.1 as i64),
            radius: 1,
            step: 0,
        }
    }

    fn relative(&self) -> (i64, i64) {
        let r = self.radius;
        if r == 1 {
            return RING_ONE[self.step as usize];
        }
        let t = self.step;
        let side = 2 * r;
        if t < side {
            (r, -(r - 1) + t)
        } else if t < 2 * side {
            (r - 1 - (t - side), r)
        } else if t < 3 * side {
            (-r, r - 1 - (t - 2 * side))
        } else {
            (-r + 1 + (t - 3 * side), -r)
        }
    }

    fn advance(&mut self) {
        self.step += 1;
        if self.step == 8 * self.radius {
            self.radius += 1;
            self.step = 0;
        }
    }
}

impl Iterator for NeighborhoodWalker {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        // Once the ring radius covers the whole grid from any starting
        // point, there is nothing left to visit.
        let limit = (self.dims[0] + self.dims[1]) as i64;
        loop {
            if self.radius > limit {
                return None;
            }
            let (dr, dc) = self.relative();
            let row = self.start.0 + dr;
            let col = self.start.1 + dc;
            self.advance();
            if row >= 0 && col >= 0 && (row as usize) < self.dims[0] && (col as usize) < self.dims[1]
            {
                return Some((row as usize, col as usize));
            }
        }
    }
}
