//! Per-file YAML validation.

use crate::error::YamlError;

/// Check that `content` parses as a YAML document. The error keeps the
/// file's source-relative path next to the parser diagnostic so a failed
/// batch names the offending file.
pub fn validate(path: &str, content: &str) -> Result<(), YamlError> {
    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(_) => Ok(()),
        Err(source) => Err(YamlError {
            path: path.to_string(),
            source,
        }),
    }
}
