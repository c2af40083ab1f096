//! Beam-power (illumination-drift) correction.
//!
//! X-ray tubes and synchrotron beams lose power over a scan. Because
//! attenuation is a log quantity, an exponential power decay appears as a
//! uniform additive shift of each attenuation projection, so correction is
//! a single scalar subtraction per projection. The variants differ only in
//! how that scalar is estimated.
//!
//! Every variant is resolved to one enum value at pipeline construction;
//! `process_projection` is then called concurrently from worker threads
//! through a shared reference, one projection at a time in acquisition
//! order.

use std::io::Write;
use std::sync::OnceLock;

use core_geom::Projection;
use tracing::info;

use crate::bad_pixels::BadPixelCorrector;
use crate::calibration::Calibration;
use crate::error::CalibrationError;
use crate::linear_fit::linear_fit;

/// The beam-power correction strategies.
#[derive(Debug)]
pub enum BeamPowerCorrector {
    /// No correction; the applied shift is always 0.
    None,
    /// Shift `constant + linear * index` with user-supplied coefficients.
    /// `index` is the acquisition index, so coefficients are independent of
    /// any projection stride.
    Manual { constant: f64, linear: f64 },
    /// As `Manual`, but with the coefficients fitted from the mean log-drift
    /// between the pre-scan and post-scan bright fields. Construct with
    /// [`BeamPowerCorrector::before_and_after_bright`].
    BeforeAndAfterBright { constant: f64, linear: f64 },
    /// Shift each projection so its total integrated attenuation matches the
    /// first processed projection's, plus a constant background term.
    ConstantAttenuation {
        constant: f64,
        /// Mean attenuation of the reference projection; set exactly once,
        /// by the first call to `process_projection`.
        reference: OnceLock<f64>,
    },
    /// Shift by the mean attenuation over strips of `edge_width` pixels on
    /// both u edges. Requires that the object never occludes those columns.
    NullProjectionEdge { edge_width: usize },
}

impl BeamPowerCorrector {
    /// Builds a `Manual` corrector, requiring the linear coefficient.
    pub fn manual(constant: f64, linear: Option<f64>) -> Result<Self, CalibrationError> {
        let linear = linear.ok_or(CalibrationError::MissingCoefficient {
            variant: "Manual",
            missing: "a beam-decay linear term",
        })?;
        Ok(Self::Manual { constant, linear })
    }

    pub fn constant_attenuation(constant: f64) -> Self {
        Self::ConstantAttenuation {
            constant,
            reference: OnceLock::new(),
        }
    }

    pub fn null_projection_edge(edge_width: usize) -> Self {
        Self::NullProjectionEdge { edge_width }
    }

    /// Derives `Manual`-style coefficients from the pre- and post-scan
    /// bright fields.
    ///
    /// The mean log-ratio of the two bright fields over good pixels is the
    /// total beam decay across the scan; a line is fitted through
    /// (-advance_interval, 0) and (n_projections - 1 + post_interval, decay)
    /// so that the shift interpolates correctly at every projection index.
    pub fn before_and_after_bright(
        calibration: &Calibration,
        n_projections: usize,
        bad_pixels: Option<&BadPixelCorrector>,
        user_constant: f64,
    ) -> Result<Self, CalibrationError> {
        let bright = calibration.bright_field();
        let post = calibration
            .post_scan_bright_field()
            .ok_or(CalibrationError::MissingPostScanBright)?;

        let dims = bright.dims();
        let mut sum = 0.0f64;
        let mut count = 0usize;
        for row in 0..dims[0] {
            for col in 0..dims[1] {
                if bad_pixels.is_some_and(|b| b.is_bad(row, col)) {
                    continue;
                }
                let before = bright.at(row, col) as f64;
                let after = post.at(row, col) as f64;
                if before > 0.0 && after > 0.0 {
                    sum += (before / after).ln();
                    count += 1;
                }
            }
        }
        if count == 0 {
            return Err(CalibrationError::NoUsableBrightPixels);
        }
        let decay = sum / count as f64;

        let x0 = -calibration.bright_field_advance_interval();
        let x1 = (n_projections as f64 - 1.0) + calibration.post_scan_bright_field_interval();
        let (a, b) = linear_fit(&[x0, x1], &[0.0, decay])?;

        info!(
            target: "calibration",
            constant = a + user_constant,
            linear = b,
            total_decay = decay,
            "fitted beam decay from bright field pair"
        );
        Ok(Self::BeforeAndAfterBright {
            constant: a + user_constant,
            linear: b,
        })
    }

    /// Applies the correction in place and returns the subtracted shift.
    ///
    /// `index` is the acquisition index of the projection (0 for the first
    /// projection in the file, counting unstrided positions).
    pub fn process_projection(&self, index: usize, projection: &mut Projection) -> f64 {
        let shift = match self {
            Self::None => 0.0,
            Self::Manual { constant, linear } | Self::BeforeAndAfterBright { constant, linear } => {
                constant + linear * index as f64
            }
            Self::ConstantAttenuation {
                constant,
                reference,
            } => {
                let mean = mean_attenuation(projection);
                let reference = *reference.get_or_init(|| mean);
                (mean - reference) + constant
            }
            Self::NullProjectionEdge { edge_width } => mean_edge_strips(projection, *edge_width),
        };
        if shift != 0.0 {
            let s = shift as f32;
            for v in projection.data_mut().iter_mut() {
                *v -= s;
            }
        }
        shift
    }
}

fn mean_attenuation(projection: &Projection) -> f64 {
    let sum: f64 = projection.data().iter().map(|&v| v as f64).sum();
    sum / projection.data().len() as f64
}

fn mean_edge_strips(projection: &Projection, edge_width: usize) -> f64 {
    let dims = projection.dims();
    let width = edge_width.min(dims[1] / 2);
    if width == 0 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for row in 0..dims[0] {
        for col in 0..width {
            sum += projection.at(row, col) as f64;
            sum += projection.at(row, dims[1] - 1 - col) as f64;
        }
    }
    sum / (2 * width * dims[0]) as f64
}

/// Tab-separated (projection index, applied shift) log, one line per
/// projection, written as the attenuation-corrections output.
#[derive(Debug)]
pub struct BeamPowerLog<W: Write> {
    sink: W,
}

impl<W: Write> BeamPowerLog<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn record(&mut self, index: usize, shift: f64) -> std::io::Result<()> {
        writeln!(self.sink, "{index}\t{shift}")
    }

    pub fn finish(mut self) -> std::io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core_geom::{Dims2, Vec2f};

    fn projection(dims: [usize; 2], data: Vec<f32>) -> Projection {
        Projection::from_vec(Dims2::new(dims), Vec2f::ones(), Vec2f::zeros(), data)
    }

    #[test]
    fn none_applies_nothing() {
        let corrector = BeamPowerCorrector::None;
        let mut proj = projection([1, 2], vec![1.0, 2.0]);
        assert_eq!(corrector.process_projection(5, &mut proj), 0.0);
        assert_eq!(proj.data(), &[1.0, 2.0]);
    }

    #[test]
    fn manual_subtracts_linear_shift() {
        let corrector = BeamPowerCorrector::manual(0.5, Some(3.0)).unwrap();
        let data: Vec<f32> = (1..=8).map(|v| (2 * v) as f32).collect();
        let mut proj = projection([2, 4], data.clone());
        let shift = corrector.process_projection(9, &mut proj);
        assert_relative_eq!(shift, 27.5);
        for (i, &v) in proj.data().iter().enumerate() {
            assert_relative_eq!(v, data[i] - 27.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn manual_requires_linear_term() {
        assert!(matches!(
            BeamPowerCorrector::manual(0.5, None),
            Err(CalibrationError::MissingCoefficient { .. })
        ));
    }

    #[test]
    fn constant_attenuation_matches_reference_total() {
        let corrector = BeamPowerCorrector::constant_attenuation(0.0);
        let mut first = projection([2, 4], (1..=8).map(|v| (2 * v) as f32).collect());
        let shift0 = corrector.process_projection(0, &mut first);
        assert_relative_eq!(shift0, 0.0);

        // Sum 76 against reference sum 72 over 8 pixels: shift 0.5.
        let mut second = projection(
            [2, 4],
            vec![2.5, 4.0, 6.5, 8.0, 10.0, 12.0, 14.5, 16.5],
        );
        let shift1 = corrector.process_projection(1, &mut second);
        assert_relative_eq!(shift1, 0.5, epsilon = 1e-6);
        assert_relative_eq!(second.at(0, 0), 2.0, epsilon = 1e-5);
    }

    #[test]
    fn constant_attenuation_applies_background_term_to_reference() {
        let corrector = BeamPowerCorrector::constant_attenuation(0.5);
        let mut first = projection([2, 4], (1..=8).map(|v| (2 * v) as f32).collect());
        let shift = corrector.process_projection(0, &mut first);
        assert_relative_eq!(shift, 0.5);
        assert_relative_eq!(first.at(0, 0), 1.5, epsilon = 1e-5);
    }

    #[test]
    fn null_edge_subtracts_strip_mean() {
        let corrector = BeamPowerCorrector::null_projection_edge(1);
        let mut proj = projection(
            [2, 4],
            vec![2.0, 1004.0, 1006.0, 8.0, 10.0, 1012.0, 1014.0, 16.0],
        );
        let shift = corrector.process_projection(9, &mut proj);
        // Edge columns: 2 + 8 + 10 + 16 = 36 over 4 samples.
        assert_relative_eq!(shift, 9.0);
        assert_relative_eq!(proj.at(0, 0), -7.0, epsilon = 1e-5);
        assert_relative_eq!(proj.at(1, 2), 1005.0, epsilon = 1e-4);
    }

    #[test]
    fn before_and_after_bright_fits_decay_line() {
        let dims = [2usize, 4usize];
        let n = dims[0] * dims[1];
        let bright = projection(dims, vec![100.0; n]);
        let factor = 0.9f32;
        let post = projection(dims, vec![100.0 * factor; n]);
        let dark = projection(dims, vec![0.0; n]);
        let mut calibration = Calibration::new(dark, bright, Some(post)).unwrap();
        calibration.set_bright_field_advance_interval(10.0);
        calibration.set_post_scan_bright_field_interval(4.5);

        let n_projections = 20;
        let corrector = BeamPowerCorrector::before_and_after_bright(
            &calibration,
            n_projections,
            None,
            0.0,
        )
        .unwrap();

        let expected_linear =
            (1.0f64 / factor as f64).ln() / (n_projections as f64 - 1.0 + 10.0 + 4.5);
        let expected_constant = expected_linear * 10.0;
        match corrector {
            BeamPowerCorrector::BeforeAndAfterBright { constant, linear } => {
                assert_relative_eq!(linear, expected_linear, epsilon = 1e-9);
                assert_relative_eq!(constant, expected_constant, epsilon = 1e-9);
            }
            other => panic!("expected fitted coefficients, got {other:?}"),
        }
    }

    #[test]
    fn before_and_after_bright_requires_post_field() {
        let dims = [1usize, 2usize];
        let calibration = Calibration::new(
            projection(dims, vec![0.0, 0.0]),
            projection(dims, vec![100.0, 100.0]),
            None,
        )
        .unwrap();
        assert!(matches!(
            BeamPowerCorrector::before_and_after_bright(&calibration, 10, None, 0.0),
            Err(CalibrationError::MissingPostScanBright)
        ));
    }

    #[test]
    fn log_is_tab_separated() {
        let mut buffer = Vec::new();
        {
            let mut log = BeamPowerLog::new(&mut buffer);
            log.record(0, 0.0).unwrap();
            log.record(1, 0.125).unwrap();
            log.finish().unwrap();
        }
        assert_eq!(String::from_utf8(buffer).unwrap(), "0\t0\n1\t0.125\n");
    }
}
