#![allow(clippy::result_large_err)]

use crate::core::error::{codes, AppError};
use genflow_types::GenericWorkflow;
use serde::Serialize;
use std::fmt;

pub mod rules;
pub use rules::*;

/// Diagnostic severity levels emitted by workflow lint rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LintSeverity {
    Error,
    Warning,
    Info,
}

impl LintSeverity {
    fn rank(&self) -> u8 {
        match self {
            LintSeverity::Error => 3,
            LintSeverity::Warning => 2,
            LintSeverity::Info => 1,
        }
    }
}

impl fmt::Display for LintSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LintSeverity::Error => write!(f, "Error"),
            LintSeverity::Warning => write!(f, "Warning"),
            LintSeverity::Info => write!(f, "Info"),
        }
    }
}

/// One finding about an assembled workflow.
#[derive(Debug, Clone, Serialize)]
pub struct LintResult {
    pub code: String,
    pub severity: LintSeverity,
    pub message: String,
    pub location: Option<String>,
    pub suggestion: Option<String>,
}

impl LintResult {
    pub fn new(
        code: impl Into<String>,
        severity: LintSeverity,
        message: impl Into<String>,
        location: Option<String>,
        suggestion: Option<String>,
    ) -> Self {
        Self {
            code: code.into(),
            severity,
            message: message.into(),
            location,
            suggestion,
        }
    }
}

/// Trait implemented by workflow lint rules.
pub trait WorkflowLintRule {
    fn validate(&self, workflow: &GenericWorkflow) -> Vec<LintResult>;
}

/// Runs the built-in rules over a generic workflow.
pub struct LintRegistry {
    rules: Vec<Box<dyn WorkflowLintRule>>,
}

impl LintRegistry {
    pub fn new() -> Self {
        Self {
            rules: built_in_rules(),
        }
    }

    /// Results sorted by `(severity desc, code asc, location asc)`.
    pub fn run(&self, workflow: &GenericWorkflow) -> Vec<LintResult> {
        let mut results = Vec::new();
        for rule in &self.rules {
            results.extend(rule.validate(workflow));
        }
        results.sort_by(|a, b| {
            let severity_cmp = b.severity.rank().cmp(&a.severity.rank());
            severity_cmp
                .then(a.code.cmp(&b.code))
                .then(a.location.cmp(&b.location))
        });
        results
    }

    /// Fail with `GWF-ASM-005` when the report holds any error.
    /// Warnings are logged and let through.
    pub fn ensure_clean(results: &[LintResult]) -> Result<(), AppError> {
        for result in results.iter().filter(|r| r.severity == LintSeverity::Warning) {
            tracing::warn!(
                code = %result.code,
                location = result.location.as_deref().unwrap_or("-"),
                "{}",
                result.message
            );
        }
        let errors: Vec<&LintResult> = results
            .iter()
            .filter(|r| r.severity == LintSeverity::Error)
            .collect();
        let Some(first) = errors.first() else {
            return Ok(());
        };
        let mut error = AppError::assembly(
            codes::VALIDATION_FAILED,
            format!(
                "workflow validation failed with {} error(s); first: {}",
                errors.len(),
                first.message
            ),
        )
        .with_detail("rule", first.code.clone());
        if let Some(location) = &first.location {
            error = error.with_detail("location", location.clone());
        }
        Err(error)
    }
}

impl Default for LintRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lint `workflow` and fail on errors; returns every finding otherwise.
pub fn validate(workflow: &GenericWorkflow) -> Result<Vec<LintResult>, AppError> {
    let results = LintRegistry::new().run(workflow);
    LintRegistry::ensure_clean(&results)?;
    Ok(results)
}
