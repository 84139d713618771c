//! Applying a single rule to a rooted file tree.
//!
//! Application never returns an error: a missing target, an unreadable file
//! or bad payload all become a failed [`RuleOutcome`]. The caller assigns the
//! rule's position in the batch with [`RuleOutcome::indexed`].

use std::fs;
use std::path::Path;

use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rule::{ImageRule, ReplacementRule, ScriptRule, IMAGE_DATA_ENGINE};
use crate::validate::is_safe_target_path;

/// Result of applying one rule, without its batch position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub success: bool,
    pub message: String,
}

impl RuleOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Attach the rule's position in the submitted batch.
    pub fn indexed(self, rule_index: usize) -> RuleResult {
        RuleResult {
            rule_index,
            success: self.success,
            message: self.message,
        }
    }
}

/// Per-rule accounting recorded on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_index: usize,
    pub success: bool,
    pub message: String,
}

/// Apply `rule` to the file tree rooted at `root`.
pub fn apply(root: &Path, rule: &ReplacementRule) -> RuleOutcome {
    let target_path = rule.target_path();
    if !is_safe_target_path(target_path) {
        return RuleOutcome::failed(format!("unsafe target path rejected: {target_path}"));
    }

    let target = root.join(target_path);
    if !target.exists() {
        return RuleOutcome::failed(format!("target file does not exist: {target_path}"));
    }

    match rule {
        ReplacementRule::Script(script) => apply_script(&target, script),
        ReplacementRule::Image(image) => apply_image(&target, image),
    }
}

/// Apply `rules` in order against `root`, one result per rule.
///
/// A failed rule never stops the batch; later rules observe the writes of
/// earlier ones.
pub fn apply_all(root: &Path, rules: &[ReplacementRule]) -> Vec<RuleResult> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let result = apply(root, rule).indexed(index);
            tracing::debug!(
                rule_index = index,
                kind = rule.kind(),
                target = rule.target_path(),
                success = result.success,
                "{}",
                result.message
            );
            result
        })
        .collect()
}

fn apply_script(target: &Path, rule: &ScriptRule) -> RuleOutcome {
    match substitute(target, rule) {
        Ok(count) => RuleOutcome::ok(format!(
            "script replaced in {}: {count} occurrence(s)",
            rule.target_path
        )),
        Err(e) => RuleOutcome::failed(format!(
            "script replacement failed for {}: {e}",
            rule.target_path
        )),
    }
}

fn substitute(target: &Path, rule: &ScriptRule) -> Result<usize, String> {
    if rule.pattern.is_empty() {
        return Err("pattern is empty".into());
    }

    let content = fs::read_to_string(target).map_err(|e| e.to_string())?;

    let (updated, count) = if rule.use_regex {
        let re = Regex::new(&rule.pattern).map_err(|e| e.to_string())?;
        let count = re.find_iter(&content).count();
        (
            re.replace_all(&content, rule.replacement.as_str())
                .into_owned(),
            count,
        )
    } else {
        let count = content.matches(rule.pattern.as_str()).count();
        (content.replace(&rule.pattern, &rule.replacement), count)
    };

    // Zero matches leaves the file byte-identical.
    if count > 0 {
        fs::write(target, updated).map_err(|e| e.to_string())?;
    }
    Ok(count)
}

fn apply_image(target: &Path, rule: &ImageRule) -> RuleOutcome {
    let bytes = match IMAGE_DATA_ENGINE.decode(&rule.image_data) {
        Ok(bytes) => bytes,
        Err(e) => {
            return RuleOutcome::failed(format!(
                "image replacement failed for {}: invalid base64: {e}",
                rule.target_path
            ))
        }
    };

    match fs::write(target, &bytes) {
        Ok(()) => RuleOutcome::ok(format!(
            "image replaced in {}: {} byte(s)",
            rule.target_path,
            bytes.len()
        )),
        Err(e) => RuleOutcome::failed(format!(
            "image replacement failed for {}: {e}",
            rule.target_path
        )),
    }
}
