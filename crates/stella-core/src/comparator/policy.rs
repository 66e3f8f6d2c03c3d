use super::ComparatorError;
use crate::artifact::TextParsingOptions;
use crate::numerics::Tolerance;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const COMPARISON_POLICY_PATH: &str = "tasks/comparison-policy.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Tolerance,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonRule {
    Tolerance(Tolerance),
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRule {
    pub rule: ComparisonRule,
    pub category_id: Option<String>,
}

/// Per-quantity comparison rules, first matching key glob wins.
#[derive(Debug, Clone)]
pub struct ComparisonPolicy {
    default_rule: RuleKind,
    default_tolerance: Tolerance,
    text_parsing: TextParsingOptions,
    categories: Vec<CompiledCategory>,
}

#[derive(Debug, Clone)]
struct CompiledCategory {
    id: String,
    kind: RuleKind,
    tolerance: Option<Tolerance>,
    matchers: Vec<GlobMatcher>,
}

impl CompiledCategory {
    fn matches(&self, key: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.is_match(key))
    }
}

impl Default for ComparisonPolicy {
    fn default() -> Self {
        Self {
            default_rule: RuleKind::Tolerance,
            default_tolerance: Tolerance::default(),
            text_parsing: TextParsingOptions::default(),
            categories: Vec::new(),
        }
    }
}

impl ComparisonPolicy {
    pub fn from_policy_path(policy_path: impl AsRef<Path>) -> Result<Self, ComparatorError> {
        let policy_path = policy_path.as_ref();
        let content =
            fs::read_to_string(policy_path).map_err(|source| ComparatorError::ReadPolicy {
                path: policy_path.to_path_buf(),
                source,
            })?;
        let raw: RawPolicy =
            serde_json::from_str(&content).map_err(|source| ComparatorError::ParsePolicy {
                path: policy_path.to_path_buf(),
                source,
            })?;
        Self::from_raw_policy(raw)
    }

    pub fn from_policy_json(policy_json: &str) -> Result<Self, ComparatorError> {
        let raw: RawPolicy =
            serde_json::from_str(policy_json).map_err(|source| ComparatorError::ParsePolicy {
                path: PathBuf::from("<inline-policy>"),
                source,
            })?;
        Self::from_raw_policy(raw)
    }

    pub fn with_default_tolerance(
        mut self,
        tolerance: Tolerance,
    ) -> Result<Self, ComparatorError> {
        self.default_tolerance = checked_tolerance(tolerance, "default tolerance")?;
        Ok(self)
    }

    pub fn default_tolerance(&self) -> Tolerance {
        self.default_tolerance
    }

    pub fn text_parsing(&self) -> &TextParsingOptions {
        &self.text_parsing
    }

    pub fn resolve_rule(&self, key: &str) -> ResolvedRule {
        if let Some(category) = self.categories.iter().find(|category| category.matches(key)) {
            return ResolvedRule {
                rule: self.rule_for_kind(category.kind, category.tolerance),
                category_id: Some(category.id.clone()),
            };
        }

        ResolvedRule {
            rule: self.rule_for_kind(self.default_rule, None),
            category_id: None,
        }
    }

    fn rule_for_kind(&self, kind: RuleKind, tolerance: Option<Tolerance>) -> ComparisonRule {
        match kind {
            RuleKind::Tolerance => {
                ComparisonRule::Tolerance(tolerance.unwrap_or(self.default_tolerance))
            }
            RuleKind::Exact => ComparisonRule::Exact,
        }
    }

    fn from_raw_policy(raw: RawPolicy) -> Result<Self, ComparatorError> {
        let mut policy = Self {
            default_rule: raw.default_rule,
            default_tolerance: checked_tolerance(
                raw.default_tolerance.unwrap_or_default(),
                "defaultTolerance",
            )?,
            text_parsing: raw.text_parsing,
            categories: Vec::with_capacity(raw.categories.len()),
        };

        for category in raw.categories {
            if category.key_globs.is_empty() {
                return Err(ComparatorError::InvalidPolicy(format!(
                    "category '{}' does not define any keyGlobs",
                    category.id
                )));
            }
            if category.rule == RuleKind::Exact && category.tolerance.is_some() {
                return Err(ComparatorError::InvalidPolicy(format!(
                    "category '{}' uses exact comparison but defines a tolerance",
                    category.id
                )));
            }

            if let Some(tolerance) = category.tolerance {
                checked_tolerance(tolerance, &format!("category '{}' tolerance", category.id))?;
            }

            let mut matchers = Vec::with_capacity(category.key_globs.len());
            for pattern in category.key_globs {
                let matcher = Glob::new(&pattern)
                    .map_err(|source| ComparatorError::InvalidGlob {
                        pattern: pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                matchers.push(matcher);
            }

            policy.categories.push(CompiledCategory {
                id: category.id,
                kind: category.rule,
                tolerance: category.tolerance,
                matchers,
            });
        }

        Ok(policy)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicy {
    #[serde(rename = "defaultRule", default = "default_rule_kind")]
    default_rule: RuleKind,
    #[serde(rename = "defaultTolerance", default)]
    default_tolerance: Option<Tolerance>,
    #[serde(rename = "textParsing", default)]
    text_parsing: TextParsingOptions,
    #[serde(default)]
    categories: Vec<RawPolicyCategory>,
}

fn checked_tolerance(tolerance: Tolerance, context: &str) -> Result<Tolerance, ComparatorError> {
    if tolerance.is_valid() {
        Ok(tolerance)
    } else {
        Err(ComparatorError::InvalidPolicy(format!(
            "{context} must be finite and non-negative (rtol={}, atol={})",
            tolerance.rtol, tolerance.atol
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicyCategory {
    id: String,
    rule: RuleKind,
    #[serde(rename = "keyGlobs", default)]
    key_globs: Vec<String>,
    tolerance: Option<Tolerance>,
}

fn default_rule_kind() -> RuleKind {
    RuleKind::Tolerance
}

#[cfg(test)]
mod tests {
    use super::{COMPARISON_POLICY_PATH, ComparisonPolicy, ComparisonRule};
    use crate::comparator::ComparatorError;
    use crate::numerics::Tolerance;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn default_policy_uses_conventional_tolerance_for_every_key() {
        let policy = ComparisonPolicy::default();
        let rule = policy.resolve_rule("phi2");
        assert_eq!(rule.rule, ComparisonRule::Tolerance(Tolerance::default()));
        assert_eq!(rule.category_id, None);
    }

    #[test]
    fn loads_policy_from_file_and_resolves_categories() {
        let temp = TempDir::new().expect("tempdir should be created");
        let policy_path = temp.path().join("policy.json");
        fs::write(
            &policy_path,
            r#"
            {
              "defaultRule": "tolerance",
              "defaultTolerance": { "rtol": 1e-6, "atol": 1e-10 },
              "categories": [
                {
                  "id": "counters",
                  "rule": "exact",
                  "keyGlobs": ["nstep", "iter_*"]
                },
                {
                  "id": "fluxes",
                  "rule": "tolerance",
                  "keyGlobs": ["*flux*"],
                  "tolerance": { "rtol": 1e-3, "atol": 1e-6 }
                }
              ]
            }
            "#,
        )
        .expect("policy should be written");

        let policy = ComparisonPolicy::from_policy_path(&policy_path).expect("policy should parse");

        let counters = policy.resolve_rule("iter_count");
        assert_eq!(counters.rule, ComparisonRule::Exact);
        assert_eq!(counters.category_id.as_deref(), Some("counters"));

        let fluxes = policy.resolve_rule("heat_flux");
        assert_eq!(
            fluxes.rule,
            ComparisonRule::Tolerance(Tolerance::new(1.0e-3, 1.0e-6))
        );

        let fallback = policy.resolve_rule("t");
        assert_eq!(
            fallback.rule,
            ComparisonRule::Tolerance(Tolerance::new(1.0e-6, 1.0e-10))
        );
        assert_eq!(fallback.category_id, None);
    }

    #[test]
    fn first_matching_category_wins() {
        let policy = ComparisonPolicy::from_policy_json(
            r#"
            {
              "categories": [
                { "id": "everything_exact", "rule": "exact", "keyGlobs": ["*"] },
                { "id": "phi", "rule": "tolerance", "keyGlobs": ["phi*"] }
              ]
            }
            "#,
        )
        .expect("policy should parse");

        let rule = policy.resolve_rule("phi2");
        assert_eq!(rule.category_id.as_deref(), Some("everything_exact"));
        assert_eq!(rule.rule, ComparisonRule::Exact);
    }

    #[test]
    fn tolerance_category_without_tolerance_inherits_default() {
        let policy = ComparisonPolicy::from_policy_json(
            r#"
            {
              "defaultTolerance": { "rtol": 1e-4 },
              "categories": [
                { "id": "phi", "rule": "tolerance", "keyGlobs": ["phi*"] }
              ]
            }
            "#,
        )
        .expect("policy should parse");

        assert_eq!(
            policy.resolve_rule("phi2").rule,
            ComparisonRule::Tolerance(Tolerance::new(1.0e-4, 1.0e-8))
        );
    }

    #[test]
    fn rejects_invalid_categories() {
        let exact_with_tolerance = ComparisonPolicy::from_policy_json(
            r#"
            {
              "categories": [
                {
                  "id": "bad",
                  "rule": "exact",
                  "keyGlobs": ["nstep"],
                  "tolerance": { "rtol": 1e-3, "atol": 0.0 }
                }
              ]
            }
            "#,
        );
        assert!(matches!(
            exact_with_tolerance,
            Err(ComparatorError::InvalidPolicy(_))
        ));

        let no_globs = ComparisonPolicy::from_policy_json(
            r#"{ "categories": [ { "id": "empty", "rule": "exact" } ] }"#,
        );
        assert!(matches!(no_globs, Err(ComparatorError::InvalidPolicy(_))));

        let bad_glob = ComparisonPolicy::from_policy_json(
            r#"{ "categories": [ { "id": "glob", "rule": "exact", "keyGlobs": ["phi[2"] } ] }"#,
        );
        assert!(matches!(bad_glob, Err(ComparatorError::InvalidGlob { .. })));

        let misspelled_tolerance = ComparisonPolicy::from_policy_json(
            r#"
            {
              "categories": [
                {
                  "id": "fluxes",
                  "rule": "tolerance",
                  "keyGlobs": ["*flux*"],
                  "tolerence": { "rtol": 1e-3 }
                }
              ]
            }
            "#,
        );
        assert!(matches!(
            misspelled_tolerance,
            Err(ComparatorError::ParsePolicy { .. })
        ));

        let negative_tolerance = ComparisonPolicy::from_policy_json(
            r#"
            {
              "categories": [
                {
                  "id": "fluxes",
                  "rule": "tolerance",
                  "keyGlobs": ["*flux*"],
                  "tolerance": { "rtol": -1e-3 }
                }
              ]
            }
            "#,
        );
        assert!(matches!(
            negative_tolerance,
            Err(ComparatorError::InvalidPolicy(_))
        ));

        let negative_default = ComparisonPolicy::from_policy_json(
            r#"{ "defaultTolerance": { "rtol": 1e-5, "atol": -1.0 } }"#,
        );
        assert!(matches!(
            negative_default,
            Err(ComparatorError::InvalidPolicy(_))
        ));

        let overridden =
            ComparisonPolicy::default().with_default_tolerance(Tolerance::new(-1.0, 0.0));
        assert!(matches!(overridden, Err(ComparatorError::InvalidPolicy(_))));

        let unknown_rule =
            ComparisonPolicy::from_policy_json(r#"{ "defaultRule": "approximately" }"#);
        assert!(matches!(
            unknown_rule,
            Err(ComparatorError::ParsePolicy { .. })
        ));
    }

    #[test]
    fn workspace_policy_declares_exact_counters() {
        let workspace_root = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .and_then(Path::parent)
            .expect("crate should live two levels below the workspace root");
        let policy = ComparisonPolicy::from_policy_path(workspace_root.join(COMPARISON_POLICY_PATH))
            .expect("workspace policy should load");

        assert_eq!(policy.resolve_rule("nstep").rule, ComparisonRule::Exact);
        assert_eq!(
            policy.resolve_rule("phi2").rule,
            ComparisonRule::Tolerance(Tolerance::default())
        );
    }
}
