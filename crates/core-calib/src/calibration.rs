//! The calibration store: dark field, bright field, optional post-scan
//! bright field, plus the timing metadata the beam-power correctors need.

use core_geom::Projection;

use crate::error::CalibrationError;

/// Calibration fields for one scan. Immutable once constructed; every
/// pipeline stage takes a shared reference that outlives it.
///
/// The intervals are expressed in units of projection measurement periods
/// (index 0 is the instant of the first projection); real time units work
/// too as long as they are used consistently, since the pipeline never
/// converts them. Both default to 1, which is a slight under-estimate,
/// since moving the sample into the beam takes a finite amount of time.
#[derive(Debug)]
pub struct Calibration {
    dark: Projection,
    bright: Projection,
    post_scan_bright: Option<Projection>,
    /// "Time" between the bright field and the first projection.
    bright_field_advance_interval: f64,
    /// "Time" between the last projection and the post-scan bright field.
    post_scan_bright_field_interval: f64,
    /// Floor on `raw - dark`; a ceiling on attenuation. Prevents the few
    /// pixels that reach extinction from blowing up to near-infinite values.
    sensitivity_limit: f32,
}

impl Calibration {
    pub fn new(
        dark: Projection,
        bright: Projection,
        post_scan_bright: Option<Projection>,
    ) -> Result<Self, CalibrationError> {
        if dark.dims() != bright.dims() {
            return Err(CalibrationError::FieldDimsMismatch {
                dark: dark.dims().to_string(),
                bright: bright.dims().to_string(),
            });
        }
        if let Some(post) = &post_scan_bright {
            if post.dims() != bright.dims() {
                return Err(CalibrationError::FieldDimsMismatch {
                    dark: post.dims().to_string(),
                    bright: bright.dims().to_string(),
                });
            }
        }
        Ok(Self {
            dark,
            bright,
            post_scan_bright,
            bright_field_advance_interval: 1.0,
            post_scan_bright_field_interval: 1.0,
            sensitivity_limit: 0.0,
        })
    }

    pub fn dark_field(&self) -> &Projection {
        &self.dark
    }

    pub fn bright_field(&self) -> &Projection {
        &self.bright
    }

    pub fn post_scan_bright_field(&self) -> Option<&Projection> {
        self.post_scan_bright.as_ref()
    }

    pub fn bright_field_advance_interval(&self) -> f64 {
        self.bright_field_advance_interval
    }

    pub fn set_bright_field_advance_interval(&mut self, interval: f64) {
        self.bright_field_advance_interval = interval;
    }

    pub fn post_scan_bright_field_interval(&self) -> f64 {
        self.post_scan_bright_field_interval
    }

    pub fn set_post_scan_bright_field_interval(&mut self, interval: f64) {
        self.post_scan_bright_field_interval = interval;
    }

    pub fn sensitivity_limit(&self) -> f32 {
        self.sensitivity_limit
    }

    pub fn set_sensitivity_limit(&mut self, limit: f32) {
        self.sensitivity_limit = limit;
    }
}
