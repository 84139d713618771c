//! # af-rules
//!
//! Declarative replacement rules for decompiled Android packages.
//!
//! - [`ReplacementRule`] -- closed sum of [`ScriptRule`] and [`ImageRule`].
//! - [`validate`] -- pure batch validation producing field-level errors.
//! - [`apply`] / [`apply_all`] -- in-place mutation of a file tree, one
//!   [`RuleResult`] per rule.

pub mod apply;
pub mod rule;
pub mod validate;

pub use apply::{apply, apply_all, RuleOutcome, RuleResult};
pub use rule::{ImageRule, ReplacementRule, ScriptRule};
pub use validate::{is_safe_target_path, validate, ValidationError, ValidationResult};

/// Deserialize a rule list from a JSON string.
///
/// Accepts either a bare array or an object with a `rules` array, the shape
/// of a task-creation request body.
pub fn parse_rules(json: &str) -> Result<Vec<ReplacementRule>, serde_json::Error> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum RulesDocument {
        List(Vec<ReplacementRule>),
        Wrapped { rules: Vec<ReplacementRule> },
    }

    Ok(match serde_json::from_str(json)? {
        RulesDocument::List(rules) => rules,
        RulesDocument::Wrapped { rules } => rules,
    })
}
