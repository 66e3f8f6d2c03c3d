use serde::{Deserialize, Serialize};

pub const DEFAULT_RTOL: f64 = 1.0e-5;
pub const DEFAULT_ATOL: f64 = 1.0e-8;

/// Relative + absolute closeness bound: `|actual - expected| <= atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Tolerance {
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
}

impl Tolerance {
    pub const fn new(rtol: f64, atol: f64) -> Self {
        Self { rtol, atol }
    }

    /// Both bounds finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.rtol.is_finite() && self.rtol >= 0.0 && self.atol.is_finite() && self.atol >= 0.0
    }

    pub fn bound_for(&self, expected: f64) -> f64 {
        self.atol + self.rtol * expected.abs()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
        }
    }
}

fn default_rtol() -> f64 {
    DEFAULT_RTOL
}

fn default_atol() -> f64 {
    DEFAULT_ATOL
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToleranceComparison {
    pub abs_diff: f64,
    pub rel_diff: f64,
    pub passes: bool,
}

pub fn compare_with_tolerance(
    expected: f64,
    actual: f64,
    tolerance: Tolerance,
) -> ToleranceComparison {
    let abs_diff = (actual - expected).abs();
    let rel_diff = relative_difference(expected, abs_diff);
    let passes = abs_diff <= tolerance.bound_for(expected);

    ToleranceComparison {
        abs_diff,
        rel_diff,
        passes,
    }
}

pub fn compare_exact(expected: f64, actual: f64) -> ToleranceComparison {
    let abs_diff = (actual - expected).abs();
    ToleranceComparison {
        abs_diff,
        rel_diff: relative_difference(expected, abs_diff),
        passes: expected == actual,
    }
}

fn relative_difference(expected: f64, abs_diff: f64) -> f64 {
    if abs_diff == 0.0 {
        0.0
    } else if expected == 0.0 {
        f64::INFINITY
    } else {
        abs_diff / expected.abs()
    }
}

/// NaN matches only NaN, infinities match only the same-signed infinity.
pub fn non_finite_values_match(expected: f64, actual: f64) -> bool {
    if expected.is_nan() || actual.is_nan() {
        return expected.is_nan() && actual.is_nan();
    }

    if expected.is_infinite() || actual.is_infinite() {
        return expected.is_infinite()
            && actual.is_infinite()
            && expected.signum() == actual.signum();
    }

    true
}

pub fn format_numeric(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }

    if value == f64::INFINITY {
        return "inf".to_string();
    }

    if value == f64::NEG_INFINITY {
        return "-inf".to_string();
    }

    format!("{value:.6E}")
}

/// Parses a whitespace-delimited numeric token, accepting Fortran `D` exponents.
pub fn parse_numeric_token(token: &str) -> Option<f64> {
    if let Ok(value) = token.parse::<f64>() {
        return Some(value);
    }

    if !token.contains(['D', 'd']) {
        return None;
    }

    token.replace(['D', 'd'], "E").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::{
        Tolerance, compare_exact, compare_with_tolerance, format_numeric, non_finite_values_match,
        parse_numeric_token,
    };

    #[test]
    fn default_tolerance_matches_conventional_array_closeness() {
        let tolerance = Tolerance::default();
        assert_eq!(tolerance.rtol, 1.0e-5);
        assert_eq!(tolerance.atol, 1.0e-8);
    }

    #[test]
    fn negative_or_non_finite_bounds_are_invalid() {
        assert!(Tolerance::default().is_valid());
        assert!(Tolerance::new(0.0, 0.0).is_valid());
        assert!(!Tolerance::new(-1.0e-5, 1.0e-8).is_valid());
        assert!(!Tolerance::new(1.0e-5, f64::NAN).is_valid());
        assert!(!Tolerance::new(f64::INFINITY, 0.0).is_valid());
    }

    #[test]
    fn tolerance_bound_is_inclusive() {
        let tolerance = Tolerance::new(0.5, 0.0);
        let comparison = compare_with_tolerance(1.0, 1.5, tolerance);
        assert_eq!(comparison.abs_diff, 0.5);
        assert!(comparison.passes);

        let beyond = compare_with_tolerance(1.0, 1.5000001, tolerance);
        assert!(!beyond.passes);
    }

    #[test]
    fn tolerance_scales_with_expected_magnitude_only() {
        let tolerance = Tolerance::default();
        assert!(compare_with_tolerance(1.0e-3, 1.0000001e-3, tolerance).passes);
        assert!(!compare_with_tolerance(1.0e-3, 2.0e-3, tolerance).passes);

        let comparison = compare_with_tolerance(2.0, 2.19, Tolerance::new(0.1, 0.0));
        assert!((comparison.abs_diff - 0.19).abs() < 1.0e-12);
        assert!((comparison.rel_diff - 0.095).abs() < 1.0e-12);
        assert!(comparison.passes);
    }

    #[test]
    fn relative_difference_against_zero_is_infinite_unless_equal() {
        let tolerance = Tolerance::default();
        assert_eq!(compare_with_tolerance(0.0, 0.0, tolerance).rel_diff, 0.0);
        let comparison = compare_with_tolerance(0.0, 1.0e-9, tolerance);
        assert!(comparison.rel_diff.is_infinite());
        assert!(comparison.passes);
    }

    #[test]
    fn exact_comparison_rejects_any_drift() {
        assert!(compare_exact(42.0, 42.0).passes);
        assert!(!compare_exact(42.0, 42.000000001).passes);
    }

    #[test]
    fn non_finite_values_match_by_kind_and_sign() {
        assert!(non_finite_values_match(f64::NAN, f64::NAN));
        assert!(!non_finite_values_match(f64::NAN, 1.0));
        assert!(non_finite_values_match(f64::INFINITY, f64::INFINITY));
        assert!(!non_finite_values_match(f64::INFINITY, f64::NEG_INFINITY));
        assert!(!non_finite_values_match(f64::NEG_INFINITY, 3.0));
    }

    #[test]
    fn numeric_tokens_accept_fortran_exponents() {
        assert_eq!(parse_numeric_token("1.5"), Some(1.5));
        assert_eq!(parse_numeric_token("1.0D+00"), Some(1.0));
        assert_eq!(parse_numeric_token("2.5d-1"), Some(0.25));
        assert_eq!(parse_numeric_token("phi"), None);
        assert_eq!(parse_numeric_token("Dphi"), None);
        assert!(parse_numeric_token("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_numeric_token("-inf"), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn format_numeric_handles_special_values() {
        assert_eq!(format_numeric(f64::NAN), "NaN");
        assert_eq!(format_numeric(f64::INFINITY), "inf");
        assert_eq!(format_numeric(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_numeric(12.5), "1.250000E1");
    }
}
