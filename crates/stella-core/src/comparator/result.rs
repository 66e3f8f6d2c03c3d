use super::policy::ComparisonRule;
use crate::numerics::{
    ToleranceComparison, compare_exact, compare_with_tolerance, format_numeric,
    non_finite_values_match,
};
use serde::Serialize;

/// Number of differing elements kept for diagnostics.
pub const MAX_REPORTED_MISMATCHES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Structured,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub name: String,
    pub kind: ArtifactKind,
    pub rule: ComparisonRule,
    pub matched_category: Option<String>,
    pub passed: bool,
    pub reason: Option<String>,
    pub metrics: ComparisonMetrics,
}

impl ComparisonResult {
    pub fn status_label(&self) -> &'static str {
        if self.passed { "PASS" } else { "FAIL" }
    }

    /// One human-readable line naming the quantity and the discrepancy.
    pub fn diagnostic_line(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} {}: {}", self.status_label(), self.name, reason),
            None => format!(
                "{} {}: {} value(s) match",
                self.status_label(),
                self.name,
                self.metrics.compared_values
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonMetrics {
    pub shape: Vec<usize>,
    pub compared_values: usize,
    pub failing_values: usize,
    pub max_abs_diff: f64,
    pub max_rel_diff: f64,
    pub mismatches: Vec<ValueMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueMismatch {
    pub location: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug)]
pub(super) struct MetricsAccumulator {
    rule: ComparisonRule,
    metrics: ComparisonMetrics,
}

impl MetricsAccumulator {
    pub(super) fn new(rule: ComparisonRule, shape: Vec<usize>) -> Self {
        Self {
            rule,
            metrics: ComparisonMetrics {
                shape,
                compared_values: 0,
                failing_values: 0,
                max_abs_diff: 0.0,
                max_rel_diff: 0.0,
                mismatches: Vec::new(),
            },
        }
    }

    pub(super) fn record_numeric(
        &mut self,
        location: impl FnOnce() -> String,
        expected: f64,
        actual: f64,
    ) {
        self.metrics.compared_values += 1;

        if !(expected.is_finite() && actual.is_finite()) {
            if !non_finite_values_match(expected, actual) {
                self.push_mismatch(location(), format_numeric(expected), format_numeric(actual));
            }
            return;
        }

        let comparison: ToleranceComparison = match self.rule {
            ComparisonRule::Tolerance(tolerance) => {
                compare_with_tolerance(expected, actual, tolerance)
            }
            ComparisonRule::Exact => compare_exact(expected, actual),
        };
        self.metrics.max_abs_diff = self.metrics.max_abs_diff.max(comparison.abs_diff);
        self.metrics.max_rel_diff = self.metrics.max_rel_diff.max(comparison.rel_diff);

        if !comparison.passes {
            self.push_mismatch(location(), format_numeric(expected), format_numeric(actual));
        }
    }

    pub(super) fn record_text(
        &mut self,
        location: impl FnOnce() -> String,
        expected: &str,
        actual: &str,
    ) {
        self.metrics.compared_values += 1;
        if expected != actual {
            self.push_mismatch(location(), expected.to_string(), actual.to_string());
        }
    }

    fn push_mismatch(&mut self, location: String, expected: String, actual: String) {
        self.metrics.failing_values += 1;
        if self.metrics.mismatches.len() < MAX_REPORTED_MISMATCHES {
            self.metrics.mismatches.push(ValueMismatch {
                location,
                expected,
                actual,
            });
        }
    }

    pub(super) fn finish(
        self,
        name: &str,
        kind: ArtifactKind,
        matched_category: Option<String>,
    ) -> ComparisonResult {
        let passed = self.metrics.failing_values == 0;
        let reason = (!passed).then(|| mismatch_reason(self.rule, &self.metrics));

        ComparisonResult {
            name: name.to_string(),
            kind,
            rule: self.rule,
            matched_category,
            passed,
            reason,
            metrics: self.metrics,
        }
    }
}

fn mismatch_reason(rule: ComparisonRule, metrics: &ComparisonMetrics) -> String {
    let criterion = match rule {
        ComparisonRule::Tolerance(tolerance) => format!(
            "outside tolerance (rtol={}, atol={})",
            format_numeric(tolerance.rtol),
            format_numeric(tolerance.atol)
        ),
        ComparisonRule::Exact => "not exactly equal".to_string(),
    };
    let first_mismatches = metrics
        .mismatches
        .iter()
        .map(|mismatch| {
            format!(
                "{} expected={} actual={}",
                mismatch.location, mismatch.expected, mismatch.actual
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    format!(
        "{} of {} value(s) {}; max_abs_diff={} max_rel_diff={}; first: {}",
        metrics.failing_values,
        metrics.compared_values,
        criterion,
        format_numeric(metrics.max_abs_diff),
        format_numeric(metrics.max_rel_diff),
        first_mismatches
    )
}

#[cfg(test)]
mod tests {
    use super::{ArtifactKind, MAX_REPORTED_MISMATCHES, MetricsAccumulator};
    use crate::comparator::policy::ComparisonRule;
    use crate::numerics::Tolerance;

    #[test]
    fn accumulator_keeps_only_first_mismatches_but_counts_all() {
        let mut accumulator =
            MetricsAccumulator::new(ComparisonRule::Tolerance(Tolerance::default()), vec![8]);
        for index in 0..8 {
            accumulator.record_numeric(|| format!("[{index}]"), 1.0, 2.0);
        }
        let result = accumulator.finish("phi2", ArtifactKind::Structured, None);

        assert!(!result.passed);
        assert_eq!(result.metrics.compared_values, 8);
        assert_eq!(result.metrics.failing_values, 8);
        assert_eq!(result.metrics.mismatches.len(), MAX_REPORTED_MISMATCHES);
        assert_eq!(result.metrics.mismatches[0].location, "[0]");
        assert_eq!(result.metrics.max_abs_diff, 1.0);

        let line = result.diagnostic_line();
        assert!(line.starts_with("FAIL phi2: 8 of 8 value(s) outside tolerance"));
        assert!(line.contains("[0] expected=1.000000E0 actual=2.000000E0"));
    }

    #[test]
    fn non_finite_values_fail_only_on_kind_mismatch() {
        let mut accumulator = MetricsAccumulator::new(ComparisonRule::Exact, vec![3]);
        accumulator.record_numeric(|| "[0]".to_string(), f64::NAN, f64::NAN);
        accumulator.record_numeric(|| "[1]".to_string(), f64::INFINITY, f64::INFINITY);
        accumulator.record_numeric(|| "[2]".to_string(), f64::INFINITY, f64::NEG_INFINITY);
        let result = accumulator.finish("flux", ArtifactKind::Structured, None);

        assert_eq!(result.metrics.failing_values, 1);
        assert_eq!(result.metrics.mismatches[0].location, "[2]");
        assert_eq!(result.metrics.max_abs_diff, 0.0);
    }

    #[test]
    fn passing_result_has_no_reason() {
        let mut accumulator = MetricsAccumulator::new(ComparisonRule::Exact, Vec::new());
        accumulator.record_text(|| "line 1 token 1".to_string(), "phi", "phi");
        let result = accumulator.finish("Final fields", ArtifactKind::Text, None);

        assert!(result.passed);
        assert_eq!(result.reason, None);
        assert_eq!(result.diagnostic_line(), "PASS Final fields: 1 value(s) match");
    }
}
