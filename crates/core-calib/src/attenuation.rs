//! Raw projection → attenuation projection conversion.

use core_geom::{Array2, Projection};

use crate::bad_pixels::BadPixelCorrector;
use crate::calibration::Calibration;
use crate::error::CalibrationError;

/// Converts raw transmission values to attenuation:
/// `A = -ln(max(raw - dark, sigma) / (bright - dark))`.
///
/// The flat-field denominator is precomputed once at construction so the
/// per-projection loop is a subtract, clamp, divide and log per pixel.
/// Construction fails if any bright-field pixel does not exceed its
/// dark-field pixel, unless that pixel is marked bad (its denominator is
/// then replaced by 1; the value written there is overwritten by the
/// bad-pixel corrector in the next stage).
#[derive(Debug)]
pub struct AttenuationConverter {
    dark: Projection,
    inverse_denominator: Array2<f32>,
    floor: f32,
}

impl AttenuationConverter {
    pub fn new(
        calibration: &Calibration,
        bad_pixels: Option<&BadPixelCorrector>,
    ) -> Result<Self, CalibrationError> {
        let dark = calibration.dark_field();
        let bright = calibration.bright_field();
        let dims = dark.dims();

        let mut inverse_denominator = Array2::<f32>::new(dims);
        for row in 0..dims[0] {
            for col in 0..dims[1] {
                let denom = bright.at(row, col) - dark.at(row, col);
                if denom > 0.0 {
                    *inverse_denominator.at_mut(row, col) = 1.0 / denom;
                } else if bad_pixels.is_some_and(|b| b.is_bad(row, col)) {
                    *inverse_denominator.at_mut(row, col) = 1.0;
                } else {
                    return Err(CalibrationError::InvalidCalibration { row, col });
                }
            }
        }

        // A user floor of 0 (the default) must still never reach ln(0).
        let floor = calibration.sensitivity_limit().max(f32::MIN_POSITIVE);

        Ok(Self {
            dark: dark.clone(),
            inverse_denominator,
            floor,
        })
    }

    /// Converts `projection` in place from raw counts to attenuation.
    ///
    /// Thread-safe over disjoint projections: `&self` is read-only.
    pub fn convert(&self, projection: &mut Projection) {
        assert_eq!(projection.dims(), self.dark.dims(), "projection/calibration dims mismatch");
        let dark = self.dark.data();
        let inv = self.inverse_denominator.data();
        let floor = self.floor;
        for (pixel, (&d, &i)) in projection.data_mut().iter_mut().zip(dark.iter().zip(inv)) {
            let numerator = (*pixel - d).max(floor);
            *pixel = -(numerator * i).ln();
        }
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

    fn calibration(dark: f32, bright: f32, dims: [usize; 2]) -> Calibration {
        let n = dims[0] * dims[1];
        Calibration::new(
            projection(dims, vec![dark; n]),
            projection(dims, vec![bright; n]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn flat_field_converts_to_zero_attenuation() {
        let cal = calibration(0.0, 1000.0, [2, 3]);
        let converter = AttenuationConverter::new(&cal, None).unwrap();
        let mut proj = projection([2, 3], vec![1000.0; 6]);
        converter.convert(&mut proj);
        for &a in proj.data() {
            assert_relative_eq!(a, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn attenuation_is_positive_below_flat_field() {
        let cal = calibration(10.0, 1010.0, [1, 2]);
        let converter = AttenuationConverter::new(&cal, None).unwrap();
        let mut proj = projection([1, 2], vec![510.0, 1010.0]);
        converter.convert(&mut proj);
        assert_relative_eq!(proj.at(0, 0), -(0.5f32).ln(), epsilon = 1e-6);
        assert_relative_eq!(proj.at(0, 1), 0.0, epsilon = 1e-6);
        assert!(proj.at(0, 0) > 0.0);
    }

    #[test]
    fn extinction_is_clamped_finite() {
        let mut cal = calibration(100.0, 1100.0, [1, 1]);
        cal.set_sensitivity_limit(2.0);
        let converter = AttenuationConverter::new(&cal, None).unwrap();
        // Raw below the dark level: numerator clamps to the sensitivity floor.
        let mut proj = projection([1, 1], vec![50.0]);
        converter.convert(&mut proj);
        assert_relative_eq!(proj.at(0, 0), -(2.0f32 / 1000.0).ln(), epsilon = 1e-5);
        assert!(proj.at(0, 0).is_finite());
    }

    #[test]
    fn inverted_pixel_without_mask_is_an_error() {
        let cal = calibration(100.0, 100.0, [1, 1]);
        let err = AttenuationConverter::new(&cal, None).unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::InvalidCalibration { row: 0, col: 0 }
        ));
    }
}
