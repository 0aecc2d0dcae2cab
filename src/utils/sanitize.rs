//! Script name validation.
//!
//! Script names arrive over the wire (`task_name`, `start_task:<name>`) and
//! end up as directory names under the scripts root, so they are restricted
//! to a single safe path component.

use crate::AutodriveError;

/// Prefix of per-script capability entries.
pub const TASK_ACTION_PREFIX: &str = "start_task:";

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Validate that `name` is a safe script directory name.
///
/// ```ignore
/// assert!(validate_script_name("checkout_v2").is_ok());
/// assert!(validate_script_name("../etc").is_err());
/// ```
pub fn validate_script_name(name: &str) -> Result<&str, AutodriveError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AutodriveError::invalid("task_name", "script name is empty"));
    }
    if trimmed.starts_with('.') || !trimmed.chars().all(is_valid_name_char) {
        return Err(AutodriveError::invalid(
            "task_name",
            format!(
                "invalid script name '{}': must be alphanumeric with underscores, hyphens or dots",
                name
            ),
        ));
    }
    Ok(trimmed)
}

/// Split `start_task:<name>` into the script name.
pub fn task_action_script(action: &str) -> Option<&str> {
    action
        .strip_prefix(TASK_ACTION_PREFIX)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_script_name("demo").is_ok());
        assert!(validate_script_name("order_flow-2").is_ok());
        assert!(validate_script_name("v1.2").is_ok());
        assert_eq!(validate_script_name("  demo ").unwrap(), "demo");
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_script_name("").is_err());
        assert!(validate_script_name("   ").is_err());
        assert!(validate_script_name("..").is_err());
        assert!(validate_script_name(".hidden").is_err());
        assert!(validate_script_name("a/b").is_err());
        assert!(validate_script_name("a\\b").is_err());
        assert!(validate_script_name("name with space").is_err());
    }

    #[test]
    fn test_task_action_script() {
        assert_eq!(task_action_script("start_task:demo"), Some("demo"));
        assert_eq!(task_action_script("start_task:"), None);
        assert_eq!(task_action_script("start_task"), None);
    }

    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_valid_names_always_pass(name in "[a-zA-Z0-9_][a-zA-Z0-9_.-]{0,30}") {
                prop_assert!(validate_script_name(&name).is_ok(), "should accept {}", name);
            }

            #[test]
            fn prop_separators_never_pass(
                head in "[a-z]{1,5}",
                sep in "[/\\\\]",
                tail in "[a-z.]{0,5}",
            ) {
                let name = format!("{}{}{}", head, sep, tail);
                prop_assert!(validate_script_name(&name).is_err(), "should reject {}", name);
            }
        }
    }
}
