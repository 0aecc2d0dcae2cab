//! Variable resolution for selector placeholders.
//!
//! Scene selectors may embed `${path}` placeholders that are filled from the
//! scenario context each time the selector is evaluated.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::json_path;

/// Looks up dotted paths against a captured copy of the context data.
#[derive(Debug, Clone, Default)]
pub struct VariableResolver {
    data: Map<String, Value>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([\w.]+)\}").expect("placeholder pattern compiles"))
}

impl VariableResolver {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Resolve `path` to its rendered string value. Null and missing values
    /// resolve to `None`.
    pub fn resolve(&self, path: &str) -> Option<String> {
        json_path::get_present(&self.data, path).map(json_path::render)
    }

    /// Substitute every `${path}` in `input`. Placeholders that do not
    /// resolve are left as written.
    pub fn substitute<'a>(&self, input: &'a str) -> Cow<'a, str> {
        if !input.contains("${") {
            return Cow::Borrowed(input);
        }
        placeholder_pattern().replace_all(input, |caps: &Captures| {
            self.resolve(&caps[1])
                .unwrap_or_else(|| caps[0].to_string())
        })
    }

    pub fn has_placeholders(input: &str) -> bool {
        placeholder_pattern().is_match(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver(v: Value) -> VariableResolver {
        VariableResolver::new(v.as_object().cloned().unwrap())
    }

    #[test]
    fn test_resolves_nested_values() {
        let r = resolver(json!({"user": {"name": "ada", "age": 36}}));
        assert_eq!(r.resolve("user.name").as_deref(), Some("ada"));
        assert_eq!(r.resolve("user.age").as_deref(), Some("36"));
        assert_eq!(r.resolve("user.email"), None);
    }

    #[test]
    fn test_malformed_path_resolves_nothing() {
        let r = resolver(json!({"user": {"name": "ada"}}));
        assert_eq!(r.resolve(".user"), None);
        assert_eq!(r.resolve("user."), None);
        assert_eq!(r.resolve("user..name"), None);
    }

    #[test]
    fn test_substitute_known_and_unknown() {
        let r = resolver(json!({"shop": {"name": "Corner"}}));
        assert_eq!(r.substitute("Open ${shop.name}"), "Open Corner");
        assert_eq!(r.substitute("Hi ${nobody}"), "Hi ${nobody}");
        assert!(matches!(r.substitute("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_null_value_stays_unresolved() {
        let r = resolver(json!({"a": null}));
        assert_eq!(r.substitute("${a}"), "${a}");
    }
}
