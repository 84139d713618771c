//! Field-level validation of a rule batch.
//!
//! [`validate`] is pure and total: it never fails, it inspects every rule
//! independently and accumulates every violated constraint. A batch is only
//! runnable when the returned [`ValidationResult`] is `valid`.

use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rule::{ImageRule, ReplacementRule, ScriptRule, IMAGE_DATA_ENGINE};

/// One violated constraint on one field of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Position of the offending rule in the submitted list.
    pub rule_index: usize,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(rule_index: usize, field: &str, message: impl Into<String>) -> Self {
        Self {
            rule_index,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of validating a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate every rule in `rules`, in order.
pub fn validate(rules: &[ReplacementRule]) -> ValidationResult {
    let mut errors = Vec::new();

    for (index, rule) in rules.iter().enumerate() {
        check_target_path(index, rule.target_path(), &mut errors);

        match rule {
            ReplacementRule::Script(script) => check_script(index, script, &mut errors),
            ReplacementRule::Image(image) => check_image(index, image, &mut errors),
        }
    }

    if !errors.is_empty() {
        tracing::debug!(
            rules = rules.len(),
            errors = errors.len(),
            "Rule batch failed validation"
        );
    }

    ValidationResult::from_errors(errors)
}

/// Whether `path` is usable as a workspace-relative target.
///
/// Mirrors the path checks in [`validate`]; the applier uses it to refuse
/// rules that slipped past validation.
pub fn is_safe_target_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains("..") && !path.starts_with('/')
}

fn check_target_path(index: usize, path: &str, errors: &mut Vec<ValidationError>) {
    if path.trim().is_empty() {
        errors.push(ValidationError::new(
            index,
            "target_path",
            "target_path must not be empty",
        ));
        return;
    }

    // Both checks run; an absolute path with a traversal segment reports twice.
    if path.contains("..") {
        errors.push(ValidationError::new(
            index,
            "target_path",
            "target_path must not contain '..' path traversal",
        ));
    }

    if path.starts_with('/') {
        errors.push(ValidationError::new(
            index,
            "target_path",
            "target_path must be relative and must not start with '/'",
        ));
    }
}

fn check_script(index: usize, rule: &ScriptRule, errors: &mut Vec<ValidationError>) {
    if rule.pattern.trim().is_empty() {
        errors.push(ValidationError::new(
            index,
            "pattern",
            "pattern must not be empty",
        ));
        return;
    }

    if rule.use_regex {
        if let Err(e) = Regex::new(&rule.pattern) {
            errors.push(ValidationError::new(
                index,
                "pattern",
                format!("invalid regular expression: {e}"),
            ));
        }
    }
}

fn check_image(index: usize, rule: &ImageRule, errors: &mut Vec<ValidationError>) {
    if rule.image_data.trim().is_empty() {
        errors.push(ValidationError::new(
            index,
            "image_data",
            "image_data must not be empty",
        ));
        return;
    }

    if let Err(e) = IMAGE_DATA_ENGINE.decode(&rule.image_data) {
        errors.push(ValidationError::new(
            index,
            "image_data",
            format!("image_data is not valid base64: {e}"),
        ));
    }
}
