//! Declarative predicates over UI nodes.

use std::borrow::Cow;
use std::fmt;

use regex::Regex;
use serde_json::{Map, Value};

use crate::perception::NodeAttributes;
use crate::utils::VariableResolver;
use crate::AutodriveError;

pub const DEFAULT_SELECTOR_TIMEOUT_MS: u64 = 1200;

/// A regex compiled for whole-string matching, remembering its source.
#[derive(Clone)]
struct FullMatch {
    source: String,
    regex: Regex,
}

impl FullMatch {
    fn compile(source: &str) -> Result<Self, AutodriveError> {
        let regex = Regex::new(&format!("^(?:{})$", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    fn is_match(&self, value: Option<&str>) -> bool {
        value.is_some_and(|v| self.regex.is_match(v))
    }
}

impl fmt::Debug for FullMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

/// Matches a single UI node by attribute equality, substring, prefix,
/// full-match regex and boolean flags. Every configured attribute must hold.
#[derive(Debug, Clone, Default)]
pub struct SelectorCondition {
    raw: Map<String, Value>,
    templated: bool,
    timeout_ms: u64,

    resource_id: Option<String>,
    resource_id_matches: Option<FullMatch>,
    text: Option<String>,
    text_contains: Option<String>,
    text_starts_with: Option<String>,
    text_matches: Option<FullMatch>,
    content_description: Option<String>,
    content_description_contains: Option<String>,
    content_description_starts_with: Option<String>,
    content_description_matches: Option<FullMatch>,
    class_name: Option<String>,
    class_name_matches: Option<FullMatch>,
    package_name: Option<String>,
    package_name_matches: Option<FullMatch>,

    clickable: Option<bool>,
    enabled: Option<bool>,
    selected: Option<bool>,
    checkable: Option<bool>,
    checked: Option<bool>,
    focusable: Option<bool>,
    focused: Option<bool>,
    scrollable: Option<bool>,
    long_clickable: Option<bool>,
}

fn as_text(key: &str, value: &Value) -> Result<Option<String>, AutodriveError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(AutodriveError::Selector(format!(
            "'{}' must be a string",
            key
        ))),
    }
}

fn as_flag(key: &str, value: &Value) -> Result<Option<bool>, AutodriveError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Some(true)),
            "false" | "0" => Ok(Some(false)),
            _ => Err(AutodriveError::Selector(format!(
                "'{}' must be a boolean",
                key
            ))),
        },
        _ => Err(AutodriveError::Selector(format!(
            "'{}' must be a boolean",
            key
        ))),
    }
}

fn as_millis(key: &str, value: &Value) -> Result<u64, AutodriveError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AutodriveError::Selector(format!("'{}' must be milliseconds", key)))
}

fn regex_of(key: &str, value: &Value) -> Result<Option<FullMatch>, AutodriveError> {
    as_text(key, value)?
        .map(|s| FullMatch::compile(&s))
        .transpose()
}

fn holds_text(expected: &Option<String>, actual: Option<&str>, f: fn(&str, &str) -> bool) -> bool {
    match expected {
        None => true,
        Some(e) => actual.is_some_and(|a| f(a, e)),
    }
}

fn holds_flag(expected: Option<bool>, actual: bool) -> bool {
    expected.is_none_or(|e| e == actual)
}

impl SelectorCondition {
    pub fn builder() -> SelectorBuilder {
        SelectorBuilder::default()
    }

    /// Parse a selector from its configuration map. Unknown keys are ignored;
    /// at least one node attribute must be present.
    pub fn from_map(raw: &Map<String, Value>) -> Result<Self, AutodriveError> {
        let mut cond = SelectorCondition {
            raw: raw.clone(),
            timeout_ms: DEFAULT_SELECTOR_TIMEOUT_MS,
            ..Default::default()
        };
        for (key, value) in raw {
            if let Value::String(s) = value {
                cond.templated |= VariableResolver::has_placeholders(s);
            }
            match key.as_str() {
                "resourceId" => cond.resource_id = as_text(key, value)?,
                "resourceIdMatches" => cond.resource_id_matches = regex_of(key, value)?,
                "text" => cond.text = as_text(key, value)?,
                "textContains" => cond.text_contains = as_text(key, value)?,
                "textStartsWith" => cond.text_starts_with = as_text(key, value)?,
                "textMatches" => cond.text_matches = regex_of(key, value)?,
                "contentDescription" => cond.content_description = as_text(key, value)?,
                "contentDescriptionContains" => {
                    cond.content_description_contains = as_text(key, value)?
                }
                "contentDescriptionStartsWith" => {
                    cond.content_description_starts_with = as_text(key, value)?
                }
                "contentDescriptionMatches" => {
                    cond.content_description_matches = regex_of(key, value)?
                }
                "className" => cond.class_name = as_text(key, value)?,
                "classNameMatches" => cond.class_name_matches = regex_of(key, value)?,
                "packageName" => cond.package_name = as_text(key, value)?,
                "packageNameMatches" => cond.package_name_matches = regex_of(key, value)?,
                "clickable" => cond.clickable = as_flag(key, value)?,
                "enabled" => cond.enabled = as_flag(key, value)?,
                "selected" => cond.selected = as_flag(key, value)?,
                "checkable" => cond.checkable = as_flag(key, value)?,
                "checked" => cond.checked = as_flag(key, value)?,
                "focusable" => cond.focusable = as_flag(key, value)?,
                "focused" => cond.focused = as_flag(key, value)?,
                "scrollable" => cond.scrollable = as_flag(key, value)?,
                "longClickable" => cond.long_clickable = as_flag(key, value)?,
                "timeout" => cond.timeout_ms = as_millis(key, value)?,
                _ => {}
            }
        }
        if !cond.has_attributes() {
            return Err(AutodriveError::Selector(
                "selector requires at least one attribute".into(),
            ));
        }
        Ok(cond)
    }

    /// Parse from a JSON value that must be an object.
    pub fn from_value(value: &Value) -> Result<Self, AutodriveError> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(AutodriveError::Selector(format!(
                "selector must be a map, got {}",
                other
            ))),
        }
    }

    fn has_attributes(&self) -> bool {
        self.resource_id.is_some()
            || self.resource_id_matches.is_some()
            || self.text.is_some()
            || self.text_contains.is_some()
            || self.text_starts_with.is_some()
            || self.text_matches.is_some()
            || self.content_description.is_some()
            || self.content_description_contains.is_some()
            || self.content_description_starts_with.is_some()
            || self.content_description_matches.is_some()
            || self.class_name.is_some()
            || self.class_name_matches.is_some()
            || self.package_name.is_some()
            || self.package_name_matches.is_some()
            || [
                self.clickable,
                self.enabled,
                self.selected,
                self.checkable,
                self.checked,
                self.focusable,
                self.focused,
                self.scrollable,
                self.long_clickable,
            ]
            .iter()
            .any(Option::is_some)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Whether any string attribute carries a `${path}` placeholder.
    pub fn is_templated(&self) -> bool {
        self.templated
    }

    /// Fill `${path}` placeholders from `resolver`. Selectors without
    /// placeholders are returned as-is.
    pub fn resolve(&self, resolver: &VariableResolver) -> Result<Cow<'_, Self>, AutodriveError> {
        if !self.templated {
            return Ok(Cow::Borrowed(self));
        }
        let substituted: Map<String, Value> = self
            .raw
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => Value::String(resolver.substitute(s).into_owned()),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        Self::from_map(&substituted).map(Cow::Owned)
    }

    pub fn matches_node(&self, node: &NodeAttributes) -> bool {
        let resource_id = node.resource_id.as_deref();
        let text = node.text.as_deref();
        let desc = node.content_description.as_deref();
        let class_name = node.class_name.as_deref();
        let package_name = node.package_name.as_deref();

        holds_text(&self.resource_id, resource_id, |a, e| a == e)
            && self
                .resource_id_matches
                .as_ref()
                .is_none_or(|p| p.is_match(resource_id))
            && holds_text(&self.text, text, |a, e| a == e)
            && holds_text(&self.text_contains, text, |a, e| a.contains(e))
            && holds_text(&self.text_starts_with, text, |a, e| a.starts_with(e))
            && self.text_matches.as_ref().is_none_or(|p| p.is_match(text))
            && holds_text(&self.content_description, desc, |a, e| a == e)
            && holds_text(&self.content_description_contains, desc, |a, e| a.contains(e))
            && holds_text(&self.content_description_starts_with, desc, |a, e| {
                a.starts_with(e)
            })
            && self
                .content_description_matches
                .as_ref()
                .is_none_or(|p| p.is_match(desc))
            && holds_text(&self.class_name, class_name, |a, e| a == e)
            && self
                .class_name_matches
                .as_ref()
                .is_none_or(|p| p.is_match(class_name))
            && holds_text(&self.package_name, package_name, |a, e| a == e)
            && self
                .package_name_matches
                .as_ref()
                .is_none_or(|p| p.is_match(package_name))
            && holds_flag(self.clickable, node.clickable)
            && holds_flag(self.enabled, node.enabled)
            && holds_flag(self.selected, node.selected)
            && holds_flag(self.checkable, node.checkable)
            && holds_flag(self.checked, node.checked)
            && holds_flag(self.focusable, node.focusable)
            && holds_flag(self.focused, node.focused)
            && holds_flag(self.scrollable, node.scrollable)
            && holds_flag(self.long_clickable, node.long_clickable)
    }
}

impl fmt::Display for SelectorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.raw.clone()))
    }
}

/// Programmatic construction using the same keys as script files.
#[derive(Debug, Default)]
pub struct SelectorBuilder {
    raw: Map<String, Value>,
}

impl SelectorBuilder {
    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.raw.insert(key.to_string(), value.into());
        self
    }

    pub fn resource_id(self, v: &str) -> Self {
        self.with("resourceId", v)
    }

    pub fn text(self, v: &str) -> Self {
        self.with("text", v)
    }

    pub fn text_contains(self, v: &str) -> Self {
        self.with("textContains", v)
    }

    pub fn text_matches(self, v: &str) -> Self {
        self.with("textMatches", v)
    }

    pub fn content_description(self, v: &str) -> Self {
        self.with("contentDescription", v)
    }

    pub fn class_name(self, v: &str) -> Self {
        self.with("className", v)
    }

    pub fn package_name(self, v: &str) -> Self {
        self.with("packageName", v)
    }

    pub fn clickable(self, v: bool) -> Self {
        self.with("clickable", v)
    }

    pub fn timeout_ms(self, v: u64) -> Self {
        self.with("timeout", v)
    }

    pub fn build(self) -> Result<SelectorCondition, AutodriveError> {
        SelectorCondition::from_map(&self.raw)
    }
}
