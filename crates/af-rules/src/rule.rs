//! The [`ReplacementRule`] sum type and its two variants.

use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};

/// One declarative modification of a single file in a decompiled tree.
///
/// Serialized with an internal `type` tag (`"script"` or `"image"`). Rules
/// are applied in list order, so a later rule sees the writes of an earlier
/// rule that targets the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReplacementRule {
    /// Text substitution inside one file.
    Script(ScriptRule),
    /// Full binary replacement of one file.
    Image(ImageRule),
}

impl ReplacementRule {
    /// Workspace-relative, POSIX-style path of the file this rule targets.
    pub fn target_path(&self) -> &str {
        match self {
            ReplacementRule::Script(rule) => &rule.target_path,
            ReplacementRule::Image(rule) => &rule.target_path,
        }
    }

    /// Short name of the rule kind, matching the serialized tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplacementRule::Script(_) => "script",
            ReplacementRule::Image(_) => "image",
        }
    }
}

/// Replace every occurrence of `pattern` in the target file with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRule {
    pub target_path: String,
    pub pattern: String,
    pub replacement: String,
    /// Treat `pattern` as a regular expression. `replacement` may then use
    /// `$1` / `${name}` capture references.
    #[serde(default)]
    pub use_regex: bool,
}

/// Decoder for [`ImageRule::image_data`]: standard alphabet, canonical
/// padding required, non-zero trailing bits tolerated.
pub(crate) const IMAGE_DATA_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Overwrite the target file with base64-decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRule {
    pub target_path: String,
    /// Standard-alphabet, padded base64. Trailing bits need not be zero.
    pub image_data: String,
}

impl From<ScriptRule> for ReplacementRule {
    fn from(rule: ScriptRule) -> Self {
        ReplacementRule::Script(rule)
    }
}

impl From<ImageRule> for ReplacementRule {
    fn from(rule: ImageRule) -> Self {
        ReplacementRule::Image(rule)
    }
}
