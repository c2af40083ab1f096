//! The projection filterer and its three back-ends.

use std::sync::{Arc, Mutex};

use core_geom::{Dims2, Projection};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::error::FilterError;
use crate::fft_length::next_fft_length;
use crate::ramp::ramp_kernel;
use crate::smoothing::SmoothingFilter;

/// Which convolution back-end performs the row filtering.
///
/// All three produce numerically equivalent results up to round-off; they
/// differ in speed and in whether a smoothing filter can be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilteringModule {
    RealSpaceConvolution,
    RustFft,
    RealFft,
}

// FFT plan creation is not guaranteed re-entrant by every FFT library, and
// the cost is paid once per worker; execution stays concurrent. One
// process-wide lock covers both libraries.
static PLAN_CREATION: Mutex<()> = Mutex::new(());

/// Convolves each projection row with the ramp kernel (times an optional
/// smoothing transfer function).
///
/// One instance is created per worker thread and owns its plans and scratch
/// buffers; nothing here is shared between threads.
pub struct ProjectionFilterer {
    dims: Dims2,
    pixel_spacing: f32,
    backend: Backend,
}

impl std::fmt::Debug for ProjectionFilterer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectionFilterer")
            .field("dims", &self.dims)
            .field("pixel_spacing", &self.pixel_spacing)
            .finish_non_exhaustive()
    }
}

enum Backend {
    Convolution {
        /// Real-space kernel of length 2·U, indexed by |k - j|.
        kernel: Vec<f32>,
    },
    RustFft(RustFftState),
    RealFft(RealFftState),
}

struct RustFftState {
    fft_len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    /// Frequency response of ramp × smoothing × weight / L. Real-valued
    /// because the ramp is even about zero.
    kernel: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

struct RealFftState {
    fft_len: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    /// Real frequency response over the L/2 + 1 retained bins, Nyquist
    /// included.
    kernel: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    restored: Vec<f32>,
    scratch_fwd: Vec<Complex<f32>>,
    scratch_inv: Vec<Complex<f32>>,
}

impl ProjectionFilterer {
    /// Builds a filterer for projections of shape `dims` = (v, u).
    ///
    /// `weight` is the overall scaling, normally Δθ (the angular separation
    /// between processed projections, in radians). Plan creation is
    /// serialised process-wide; call this freely from worker threads.
    pub fn new(
        module: FilteringModule,
        dims: Dims2,
        pixel_spacing: f32,
        weight: f32,
        smoothing: Option<SmoothingFilter>,
    ) -> Result<Self, FilterError> {
        let u = dims[1];
        assert!(u > 0 && dims[0] > 0, "projection dims must be non-zero");

        let backend = match module {
            FilteringModule::RealSpaceConvolution => {
                if smoothing.is_some() {
                    return Err(FilterError::SmoothingUnsupported);
                }
                // Twice the width: the kernel is a wrap-around function.
                Backend::Convolution {
                    kernel: ramp_kernel(2 * u, pixel_spacing, weight),
                }
            }
            FilteringModule::RustFft => {
                let fft_len = next_fft_length(2 * u);
                let (forward, inverse) = {
                    let _guard = PLAN_CREATION.lock().expect("FFT plan lock poisoned");
                    let mut planner = FftPlanner::<f32>::new();
                    (planner.plan_fft_forward(fft_len), planner.plan_fft_inverse(fft_len))
                };

                // The inverse transform is unnormalised, so fold 1/L into
                // the kernel along with the weight.
                let ramp = ramp_kernel(fft_len, pixel_spacing, weight / fft_len as f32);
                let mut buffer: Vec<Complex<f32>> =
                    ramp.iter().map(|&g| Complex::new(g, 0.0)).collect();
                let mut scratch =
                    vec![Complex::new(0.0, 0.0); forward.get_inplace_scratch_len()];
                forward.process_with_scratch(&mut buffer, &mut scratch);
                let mut kernel: Vec<f32> = buffer.iter().map(|c| c.re).collect();
                apply_smoothing(&mut kernel, smoothing, fft_len);

                let scratch_len = forward
                    .get_inplace_scratch_len()
                    .max(inverse.get_inplace_scratch_len());
                scratch.resize(scratch_len, Complex::new(0.0, 0.0));

                debug!(target: "filter", fft_len, "rustfft filterer initialised");
                Backend::RustFft(RustFftState {
                    fft_len,
                    forward,
                    inverse,
                    kernel,
                    buffer: vec![Complex::new(0.0, 0.0); fft_len],
                    scratch,
                })
            }
            FilteringModule::RealFft => {
                let fft_len = next_fft_length(2 * u);
                let (r2c, c2r) = {
                    let _guard = PLAN_CREATION.lock().expect("FFT plan lock poisoned");
                    let mut planner = RealFftPlanner::<f32>::new();
                    (planner.plan_fft_forward(fft_len), planner.plan_fft_inverse(fft_len))
                };

                let mut input = r2c.make_input_vec();
                let ramp = ramp_kernel(fft_len, pixel_spacing, weight / fft_len as f32);
                input.copy_from_slice(&ramp);
                let mut spectrum = r2c.make_output_vec();
                let mut scratch_fwd = r2c.make_scratch_vec();
                r2c.process_with_scratch(&mut input, &mut spectrum, &mut scratch_fwd)
                    .map_err(|e| FilterError::Backend(e.to_string()))?;
                let mut kernel: Vec<f32> = spectrum.iter().map(|c| c.re).collect();
                apply_smoothing(&mut kernel, smoothing, fft_len);

                let restored = c2r.make_output_vec();
                let scratch_inv = c2r.make_scratch_vec();
                debug!(target: "filter", fft_len, "realfft filterer initialised");
                Backend::RealFft(RealFftState {
                    fft_len,
                    r2c,
                    c2r,
                    kernel,
                    input,
                    spectrum,
                    restored,
                    scratch_fwd,
                    scratch_inv,
                })
            }
        };

        Ok(Self {
            dims,
            pixel_spacing,
            backend,
        })
    }

    pub fn dims(&self) -> Dims2 {
        self.dims
    }

    /// Filters every row of `input` into `output`. Not in-place: the two
    /// projections must be distinct buffers of the configured shape.
    pub fn filter_projection(
        &mut self,
        input: &Projection,
        output: &mut Projection,
    ) -> Result<(), FilterError> {
        assert_eq!(input.dims(), self.dims, "input dims mismatch");
        assert_eq!(output.dims(), self.dims, "output dims mismatch");
        debug_assert!((input.spacing()[1] - self.pixel_spacing).abs() < 1e-6);

        let (rows, u) = (self.dims[0], self.dims[1]);
        match &mut self.backend {
            Backend::Convolution { kernel } => {
                for i in 0..rows {
                    let in_row = input.array().row(i);
                    let out_row = output.array_mut().row_mut(i);
                    for (j, out) in out_row.iter_mut().enumerate() {
                        let mut acc = 0.0f32;
                        for (k, &v) in in_row.iter().enumerate() {
                            acc += v * kernel[k.abs_diff(j)];
                        }
                        *out = acc;
                    }
                }
            }
            Backend::RustFft(state) => {
                for i in 0..rows {
                    let in_row = input.array().row(i);
                    for (b, &v) in state.buffer.iter_mut().zip(in_row) {
                        *b = Complex::new(v, 0.0);
                    }
                    for b in state.buffer[u..].iter_mut() {
                        *b = Complex::new(0.0, 0.0);
                    }
                    state
                        .forward
                        .process_with_scratch(&mut state.buffer, &mut state.scratch);
                    for (b, &k) in state.buffer.iter_mut().zip(&state.kernel) {
                        *b *= k;
                    }
                    state
                        .inverse
                        .process_with_scratch(&mut state.buffer, &mut state.scratch);
                    let out_row = output.array_mut().row_mut(i);
                    for (out, b) in out_row.iter_mut().zip(&state.buffer) {
                        *out = b.re;
                    }
                }
            }
            Backend::RealFft(state) => {
                for i in 0..rows {
                    let in_row = input.array().row(i);
                    state.input[..u].copy_from_slice(in_row);
                    state.input[u..].fill(0.0);
                    state
                        .r2c
                        .process_with_scratch(
                            &mut state.input,
                            &mut state.spectrum,
                            &mut state.scratch_fwd,
                        )
                        .map_err(|e| FilterError::Backend(e.to_string()))?;
                    for (s, &k) in state.spectrum.iter_mut().zip(&state.kernel) {
                        *s *= k;
                    }
                    // The c2r transform requires exactly-real DC and Nyquist
                    // bins.
                    state.spectrum[0].im = 0.0;
                    if let Some(last) = state.spectrum.last_mut() {
                        last.im = 0.0;
                    }
                    state
                        .c2r
                        .process_with_scratch(
                            &mut state.spectrum,
                            &mut state.restored,
                            &mut state.scratch_inv,
                        )
                        .map_err(|e| FilterError::Backend(e.to_string()))?;
                    let out_row = output.array_mut().row_mut(i);
                    out_row.copy_from_slice(&state.restored[..u]);
                }
            }
        }
        Ok(())
    }
}

/// Multiplies the sampled smoothing transfer function into a frequency-domain
/// kernel. Works for both the full-spectrum (rustfft) and the half-spectrum
/// (realfft) layouts: the transfer function is sampled with symmetric wrap
/// over the full length and the kernel just takes its leading bins.
fn apply_smoothing(kernel: &mut [f32], smoothing: Option<SmoothingFilter>, fft_len: usize) {
    if let Some(filter) = smoothing {
        let w = filter.sample(fft_len);
        for (k, kernel_bin) in kernel.iter_mut().enumerate() {
            *kernel_bin *= w[k];
        }
    }
}
