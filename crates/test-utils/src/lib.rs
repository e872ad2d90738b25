//! Test support shared by the tile-bench crates.
//!
//! - [`fixtures`]: Apache Bench outputs and timing files as constants
//! - [`captures`]: output recorded against a live server, when present
//! - float assertions for metrics and RPS series
//!
//! Pull it in as a dev-dependency with
//! `test-utils = { path = "../../crates/test-utils" }`.

pub mod captures;
pub mod fixtures;

pub use captures::*;

/// Read a captured run or return early from the test when it is absent.
///
/// Captures are not checked in; see [`find_capture`] for where they are
/// looked up.
///
/// ```ignore
/// let stdout = test_utils::require_capture!("geoserver_c100.log");
/// ```
#[macro_export]
macro_rules! require_capture {
    ($name:expr) => {{
        match $crate::read_capture($name) {
            Some(text) => text,
            None => {
                eprintln!(
                    "SKIPPED: capture '{}' not found; set {} to a directory of ab logs.",
                    $name,
                    $crate::CAPTURES_ENV
                );
                return;
            }
        }
    }};
}

/// Assert two numbers differ by at most `epsilon`, compared as `f64`.
///
/// ```ignore
/// assert_approx_eq!(record.requests_per_second().value().unwrap(), 847.23, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let (actual, expected, epsilon) = ($actual as f64, $expected as f64, $epsilon as f64);
        if !((actual - expected).abs() <= epsilon) {
            panic!(
                "values not within {}: actual {} vs expected {} ({})",
                epsilon,
                actual,
                expected,
                stringify!($actual)
            );
        }
    }};
}

/// Assert a `(concurrency, value)` series matches level for level.
///
/// Concurrency levels must be equal and in the same order; values are
/// compared with [`assert_approx_eq!`].
#[macro_export]
macro_rules! assert_series_approx_eq {
    ($actual:expr, $expected:expr, $epsilon:expr) => {{
        let actual: Vec<(u32, f64)> = $actual.iter().copied().collect();
        let expected: Vec<(u32, f64)> = $expected.iter().copied().collect();
        let levels = |s: &[(u32, f64)]| s.iter().map(|p| p.0).collect::<Vec<_>>();
        assert_eq!(levels(&actual), levels(&expected), "concurrency levels differ");
        for ((_, a), (_, e)) in actual.iter().zip(&expected) {
            $crate::assert_approx_eq!(*a, *e, $epsilon);
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_rounded_rates_compare_equal() {
        assert_approx_eq!(99.0, 100.0 * 4950.0 / 5000.0, 1e-12);
        assert_approx_eq!(0.33, 0.3333, 0.01);
    }

    #[test]
    #[should_panic(expected = "values not within")]
    fn test_distant_values_panic() {
        assert_approx_eq!(847.23, 847.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "values not within")]
    fn test_nan_never_matches() {
        assert_approx_eq!(f64::NAN, f64::NAN, 1.0);
    }

    #[test]
    fn test_series_match() {
        let series = vec![(1u32, 900.0001f64), (100, 400.0)];
        assert_series_approx_eq!(series, [(1u32, 900.0f64), (100, 400.0)], 0.001);
    }

    #[test]
    #[should_panic(expected = "concurrency levels differ")]
    fn test_series_levels_must_match() {
        let series = vec![(1u32, 900.0f64)];
        assert_series_approx_eq!(series, [(10u32, 900.0f64)], 0.001);
    }
}
