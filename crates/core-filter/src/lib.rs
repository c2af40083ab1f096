//! Row-wise ramp filtering of attenuation projections.
//!
//! Filtered back-projection owes the "filtered" in its name to this crate:
//! every projection row is convolved with a discrete ramp kernel before
//! back-projection. The kernel must be constructed in real space (sampling
//! |f| directly in k-space bakes in a DC bias and wrap-around artefacts)
//! and then carried to the frequency domain once at initialisation.
//!
//! Three interchangeable back-ends perform the convolution: direct
//! real-space convolution (no smoothing support, mainly a reference), and
//! two FFT libraries (`rustfft`'s complex planner and `realfft`'s
//! real-to-complex planner). All scaling, meaning the library's
//! inverse-transform normalisation and the Δθ projection weight, is folded
//! into the precomputed kernel, so the hot loop is one complex multiply per
//! bin per row.

mod error;
mod fft_length;
mod filterer;
mod ramp;
mod smoothing;

pub use error::FilterError;
pub use fft_length::next_fft_length;
pub use filterer::{FilteringModule, ProjectionFilterer};
pub use ramp::ramp_kernel;
pub use smoothing::SmoothingFilter;
