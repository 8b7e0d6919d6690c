//! Reference name validation following git-style conventions.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not start or end with `.` or `/`, nor end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{ModelError, ModelResult};

/// Characters that are forbidden anywhere in a reference name.
const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Validate a branch or tag name.
///
/// # Examples
///
/// ```
/// use strata_model::validate_reference_name;
///
/// assert!(validate_reference_name("main").is_ok());
/// assert!(validate_reference_name("release/2024.1").is_ok());
/// assert!(validate_reference_name("").is_err());
/// assert!(validate_reference_name("bad..name").is_err());
/// ```
pub fn validate_reference_name(name: &str) -> ModelResult<()> {
    let invalid = |reason: String| ModelError::InvalidReferenceName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty".into()));
    }
    if let Some(ch) = name
        .chars()
        .find(|ch| ch.is_whitespace() || ch.is_control() || FORBIDDEN_CHARS.contains(ch))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    if name.contains("@{") {
        return Err(invalid("must not contain '@{'".into()));
    }
    if name.starts_with(['.', '/']) || name.ends_with(['.', '/']) {
        return Err(invalid("must not start or end with '.' or '/'".into()));
    }
    if name.ends_with(".lock") {
        return Err(invalid("must not end with '.lock'".into()));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty".into()));
        }
        if component.starts_with('.') {
            return Err(invalid(format!(
                "component must not start with '.': {component:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        for name in ["main", "dev", "feature/auth", "release/v1.2", "user/alice/wip", "a-b_c"] {
            assert!(validate_reference_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_bad_names() {
        for name in [
            "",
            "has space",
            "tab\there",
            "tilde~",
            "caret^",
            "colon:",
            "q?",
            "star*",
            "br[",
            "back\\slash",
            "a..b",
            "at@{1}",
            ".hidden",
            "trailing.",
            "/lead",
            "trail/",
            "x.lock",
            "a//b",
            "a/.b",
        ] {
            assert!(validate_reference_name(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn error_names_the_reference() {
        match validate_reference_name("a..b") {
            Err(ModelError::InvalidReferenceName { name, .. }) => assert_eq!(name, "a..b"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
