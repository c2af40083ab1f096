//! The real-space ramp kernel.

use std::f64::consts::PI;

/// Samples the discrete ramp kernel of length `len` for pixel spacing
/// `spacing`, scaled by `weight`:
///
/// ```text
/// g[0] = w / (4 Δ)
/// g[k] = 0                  k even, k != 0
/// g[k] = -w / (π² k² Δ)     k odd
/// ```
///
/// The kernel is symmetric about zero and stored with wrap-around: index
/// k > len/2 holds the value for argument -(len - k). It must be generated
/// at the full padded FFT length, since zero-padding a shorter kernel would
/// destroy the wrap-around symmetry.
///
/// (The odd-index sum 1 + 1/9 + 1/25 + … converges to π²/8, which is what
/// makes the kernel integrate against a constant row to zero.)
pub fn ramp_kernel(len: usize, spacing: f32, weight: f32) -> Vec<f32> {
    assert!(len > 0, "ramp kernel length must be positive");
    let mut g = vec![0.0f32; len];
    let w = weight as f64;
    let delta = spacing as f64;
    g[0] = (w / (4.0 * delta)) as f32;
    let c = -w / (PI * PI * delta);
    let half = len / 2;
    let mut k = 1;
    while k <= half {
        let value = (c / (k * k) as f64) as f32;
        g[k] = value;
        g[len - k] = value;
        k += 2;
    }
    g
}
