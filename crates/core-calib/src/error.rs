use thiserror::Error;

/// Failures arising from calibration data or the correction stages.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("dark field dims {dark} do not match bright field dims {bright}")]
    FieldDimsMismatch { dark: String, bright: String },

    #[error(
        "bright field <= dark field at pixel ({row}, {col}) and the pixel is not \
         marked bad; enable bad-pixel correction to mask it"
    )]
    InvalidCalibration { row: usize, col: usize },

    #[error("could not find 4 good neighbours for bad pixel ({row}, {col})")]
    InsufficientGoodPixels { row: usize, col: usize },

    #[error("beam-power correction '{variant}' requires {missing}")]
    MissingCoefficient {
        variant: &'static str,
        missing: &'static str,
    },

    #[error("BeforeAndAfterBrightField correction requires a post-scan bright field")]
    MissingPostScanBright,

    #[error("bright-field pair has no usable pixels for the beam-decay fit")]
    NoUsableBrightPixels,

    #[error("linear fit requires at least 2 points with distinct x values")]
    DegenerateFit,
}
