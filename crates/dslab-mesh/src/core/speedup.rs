//! Speedup model of a parallel application.

/// Expected speedup of an application with average parallelism `a` and variability `sigma` running on `n` nodes.
///
/// Uses the piecewise-rational model with a low-variability regime (`sigma <= 1`) and a high-variability regime.
/// The speedup grows with `n` and saturates at `a`.
pub fn speedup(n: u32, a: f64, sigma: f64) -> f64 {
    let n = n as f64;
    if sigma <= 1.0 {
        if n <= a {
            a * n / (a + sigma / 2. * (n - 1.))
        } else if n < 2. * a - 1. {
            a * n / (sigma * (a - 0.5) + n * (1. - sigma / 2.))
        } else {
            a
        }
    } else if n < a * sigma + a - sigma {
        n * a * (sigma + 1.) / (sigma * (n + a - 1.) + a)
    } else {
        a
    }
}

/// Number of nodes starting from which the speedup equals `a`.
pub fn saturation_point(a: f64, sigma: f64) -> u32 {
    let threshold = if sigma <= 1.0 {
        2. * a - 1.
    } else {
        a * sigma + a - sigma
    };
    threshold.max(1.).ceil() as u32
}
