//! Validation result model and scoring.

use serde::{Deserialize, Serialize};

/// Severity of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Scoring bucket of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Structural,
    Compatibility,
    Content,
    Performance,
    Accessibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub category: IssueCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: String,
    pub message: String,
    pub category: IssueCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Point deductions used to turn findings into a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreWeights {
    pub structural_error: u32,
    pub compatibility_error: u32,
    pub general_warning: u32,
    pub performance_warning: u32,
}

impl ScoreWeights {
    pub const MARKUP: ScoreWeights = ScoreWeights {
        structural_error: 20,
        compatibility_error: 10,
        general_warning: 5,
        performance_warning: 3,
    };

    pub const HTML: ScoreWeights = ScoreWeights {
        structural_error: 15,
        ..Self::MARKUP
    };
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub score: u8,
}

impl ValidationResult {
    /// Builds a result and scores it with the given weights.
    pub fn scored(
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationWarning>,
        weights: ScoreWeights,
    ) -> Self {
        let mut deduction: u32 = 0;
        for error in &errors {
            deduction += match error.category {
                IssueCategory::Compatibility => weights.compatibility_error,
                _ => weights.structural_error,
            };
        }
        for warning in &warnings {
            deduction += match warning.category {
                IssueCategory::Performance => weights.performance_warning,
                _ => weights.general_warning,
            };
        }
        let score = 100u32.saturating_sub(deduction) as u8;

        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            score,
        }
    }

    /// Combines two validations: lists concatenated, score averaged and rounded.
    pub fn merge(self, other: ValidationResult) -> ValidationResult {
        let score = ((u32::from(self.score) + u32::from(other.score)) as f64 / 2.0).round() as u8;
        let mut errors = self.errors;
        errors.extend(other.errors);
        let mut warnings = self.warnings;
        warnings.extend(other.warnings);

        ValidationResult {
            is_valid: self.is_valid && other.is_valid,
            errors,
            warnings,
            score,
        }
    }

    /// Adds a hard error after scoring, re-applying its deduction.
    pub fn push_error(&mut self, error: ValidationError, weights: ScoreWeights) {
        let deduction = match error.category {
            IssueCategory::Compatibility => weights.compatibility_error,
            _ => weights.structural_error,
        };
        self.score = u32::from(self.score).saturating_sub(deduction) as u8;
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    pub fn critical_error_count(&self) -> usize {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Critical)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(category: IssueCategory) -> ValidationError {
        ValidationError {
            code: "E".to_string(),
            message: "m".to_string(),
            severity: Severity::High,
            category,
            location: None,
            fix: None,
        }
    }

    fn warning(category: IssueCategory) -> ValidationWarning {
        ValidationWarning {
            code: "W".to_string(),
            message: "m".to_string(),
            category,
            location: None,
            recommendation: None,
        }
    }

    #[test]
    fn test_perfect_score() {
        let result = ValidationResult::scored(vec![], vec![], ScoreWeights::MARKUP);
        assert!(result.is_valid);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_markup_weights() {
        let result = ValidationResult::scored(
            vec![error(IssueCategory::Structural), error(IssueCategory::Compatibility)],
            vec![warning(IssueCategory::Content), warning(IssueCategory::Performance)],
            ScoreWeights::MARKUP,
        );
        assert!(!result.is_valid);
        assert_eq!(result.score, 100 - 20 - 10 - 5 - 3);
    }

    #[test]
    fn test_html_structural_weight() {
        let result = ValidationResult::scored(
            vec![error(IssueCategory::Structural)],
            vec![],
            ScoreWeights::HTML,
        );
        assert_eq!(result.score, 85);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let errors = (0..10).map(|_| error(IssueCategory::Structural)).collect();
        let result = ValidationResult::scored(errors, vec![], ScoreWeights::MARKUP);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_merge_averages_and_rounds() {
        let a = ValidationResult::scored(vec![], vec![warning(IssueCategory::Performance)], ScoreWeights::MARKUP);
        let b = ValidationResult::scored(vec![error(IssueCategory::Structural)], vec![], ScoreWeights::HTML);
        // (97 + 85) / 2 = 91
        let merged = a.merge(b);
        assert_eq!(merged.score, 91);
        assert!(!merged.is_valid);
        assert_eq!(merged.errors.len(), 1);
        assert_eq!(merged.warnings.len(), 1);

        let c = ValidationResult::scored(vec![], vec![warning(IssueCategory::Content)], ScoreWeights::MARKUP);
        let d = ValidationResult::scored(vec![], vec![], ScoreWeights::MARKUP);
        // (95 + 100) / 2 = 97.5 rounds to 98
        assert_eq!(c.merge(d).score, 98);
    }

    #[test]
    fn test_push_error_deducts() {
        let mut result = ValidationResult::scored(vec![], vec![], ScoreWeights::HTML);
        result.push_error(error(IssueCategory::Performance), ScoreWeights::HTML);
        assert_eq!(result.score, 85);
        assert!(!result.is_valid);
    }
}
