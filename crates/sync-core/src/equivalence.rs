//! Column value comparison with optional equivalence rules.
//!
//! Used by the offline comparator when drilling into a sample of changed
//! rows: two values that differ byte-for-byte may still be considered the
//! same under a configured rule.

use crate::normalize::is_zero_date_text;
use crate::values::CellValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule that made two differing values count as equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EquivalenceRule {
    NullVsEmpty,
    NullVsZeroDate,
    NumericTolerance,
}

impl fmt::Display for EquivalenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquivalenceRule::NullVsEmpty => write!(f, "null-vs-empty"),
            EquivalenceRule::NullVsZeroDate => write!(f, "null-vs-zero-date"),
            EquivalenceRule::NumericTolerance => write!(f, "numeric-tolerance"),
        }
    }
}

/// Result of comparing two values.
#[derive(Debug, Clone, PartialEq)]
pub enum CompareResult {
    /// Values are identical.
    Equal,
    /// Values differ but a rule treats them as equal.
    Equivalent(EquivalenceRule),
    /// Values differ.
    Different { left: String, right: String },
}

impl CompareResult {
    pub fn is_different(&self) -> bool {
        matches!(self, CompareResult::Different { .. })
    }
}

/// Toggles for value equivalence. All rules are off by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquivalenceRules {
    /// NULL equals the empty string
    pub ignore_null_vs_empty: bool,

    /// NULL equals `0000-00-00` / `0000-00-00 00:00:00`
    pub ignore_null_vs_zero_date: bool,

    /// Numbers within this relative tolerance are equal
    pub numeric_tolerance: Option<f64>,
}

impl EquivalenceRules {
    pub fn compare(&self, left: &CellValue, right: &CellValue) -> CompareResult {
        if left == right {
            return CompareResult::Equal;
        }
        if self.ignore_null_vs_empty && null_vs(left, right, CellValue::is_empty_text) {
            return CompareResult::Equivalent(EquivalenceRule::NullVsEmpty);
        }
        if self.ignore_null_vs_zero_date && null_vs(left, right, is_zero_date) {
            return CompareResult::Equivalent(EquivalenceRule::NullVsZeroDate);
        }
        if let Some(tolerance) = self.numeric_tolerance {
            if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
                if within_tolerance(l, r, tolerance) {
                    return CompareResult::Equivalent(EquivalenceRule::NumericTolerance);
                }
            }
        }
        CompareResult::Different {
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

fn null_vs(left: &CellValue, right: &CellValue, other: impl Fn(&CellValue) -> bool) -> bool {
    (left.is_null() && other(right)) || (right.is_null() && other(left))
}

fn is_zero_date(value: &CellValue) -> bool {
    match value {
        CellValue::ZeroDate => true,
        CellValue::Text(s) => is_zero_date_text(s),
        _ => false,
    }
}

fn within_tolerance(l: f64, r: f64, tolerance: f64) -> bool {
    if l == r {
        return true;
    }
    let scale = l.abs().max(r.abs());
    (l - r).abs() <= tolerance * scale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_rules() -> EquivalenceRules {
        EquivalenceRules {
            ignore_null_vs_empty: true,
            ignore_null_vs_zero_date: true,
            numeric_tolerance: Some(0.001),
        }
    }

    #[test]
    fn test_rules_off_by_default() {
        let rules = EquivalenceRules::default();
        assert_eq!(
            rules.compare(&CellValue::Int(1), &CellValue::Int(1)),
            CompareResult::Equal
        );
        assert!(rules
            .compare(&CellValue::Null, &CellValue::Text(String::new()))
            .is_different());
        assert!(rules
            .compare(&CellValue::Null, &CellValue::ZeroDate)
            .is_different());
    }

    #[test]
    fn test_null_vs_empty_both_directions() {
        let rules = all_rules();
        let empty = CellValue::Text(String::new());
        assert_eq!(
            rules.compare(&CellValue::Null, &empty),
            CompareResult::Equivalent(EquivalenceRule::NullVsEmpty)
        );
        assert_eq!(
            rules.compare(&empty, &CellValue::Null),
            CompareResult::Equivalent(EquivalenceRule::NullVsEmpty)
        );
    }

    #[test]
    fn test_null_vs_zero_date() {
        let rules = all_rules();
        assert_eq!(
            rules.compare(&CellValue::ZeroDate, &CellValue::Null),
            CompareResult::Equivalent(EquivalenceRule::NullVsZeroDate)
        );
        assert_eq!(
            rules.compare(&CellValue::Null, &CellValue::Text("0000-00-00".into())),
            CompareResult::Equivalent(EquivalenceRule::NullVsZeroDate)
        );
    }

    #[test]
    fn test_numeric_tolerance() {
        let rules = all_rules();
        assert_eq!(
            rules.compare(&CellValue::Float(10.0), &CellValue::Float(10.005)),
            CompareResult::Equivalent(EquivalenceRule::NumericTolerance)
        );
        assert_eq!(
            rules.compare(&CellValue::Decimal("100.00".into()), &CellValue::Int(100)),
            CompareResult::Equivalent(EquivalenceRule::NumericTolerance)
        );
        assert!(rules
            .compare(&CellValue::Float(10.0), &CellValue::Float(10.5))
            .is_different());
    }

    #[test]
    fn test_deserialize_partial() {
        let rules: EquivalenceRules =
            serde_json::from_str(r#"{"ignore_null_vs_empty": true}"#).unwrap();
        assert!(rules.ignore_null_vs_empty);
        assert!(!rules.ignore_null_vs_zero_date);
        assert_eq!(rules.numeric_tolerance, None);
    }
}
