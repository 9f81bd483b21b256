//! Testing utilities for forest-tensor.
//!
//! Assertion helpers shared by unit tests, integration tests and benchmarks,
//! plus fixture data generators and a small tree grower producing fitted
//! scikit-learn-shaped models.
//!
//! ```ignore
//! use forest_tensor::testing::{assert_allclose, data, fit};
//! ```

pub mod data;
pub mod fit;

// =============================================================================
// Constants
// =============================================================================

/// Default relative tolerance, matching `numpy.testing.assert_allclose`.
pub const DEFAULT_RTOL: f64 = 1e-5;

/// Default absolute tolerance.
pub const DEFAULT_ATOL: f64 = 1e-8;

// =============================================================================
// Assertions
// =============================================================================

/// Whether `actual` is within `atol + rtol * |expected|` of `expected`.
#[inline]
pub fn is_close(actual: f64, expected: f64, rtol: f64, atol: f64) -> bool {
    if actual == expected {
        return true;
    }
    (actual - expected).abs() <= atol + rtol * expected.abs()
}

/// Assert compiled f32 outputs match f64 reference outputs with the default
/// tolerances.
///
/// # Panics
///
/// Panics with a listing of every differing element.
pub fn assert_allclose(actual: &[f32], expected: &[f64], context: &str) {
    assert_allclose_with(actual, expected, DEFAULT_RTOL, DEFAULT_ATOL, context);
}

/// [`assert_allclose`] with explicit tolerances.
pub fn assert_allclose_with(actual: &[f32], expected: &[f64], rtol: f64, atol: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    let mismatches: Vec<String> = actual
        .iter()
        .zip(expected)
        .enumerate()
        .filter(|&(_, (&a, &e))| !is_close(a as f64, e, rtol, atol))
        .map(|(i, (&a, &e))| format!("[{i:4}] - {e:>14.8}  (expected)\n       + {a:>14.8}  (actual, diff={:+.2e})", a as f64 - e))
        .collect();

    if !mismatches.is_empty() {
        panic!(
            "{context}: {} of {} elements differ (rtol={rtol:.0e}, atol={atol:.0e})\n{}",
            mismatches.len(),
            actual.len(),
            mismatches.join("\n")
        );
    }
}
