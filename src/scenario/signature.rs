use serde_json::Value;
use tracing::warn;

use super::selector::SelectorCondition;
use crate::perception::Snapshot;
use crate::utils::VariableResolver;
use crate::AutodriveError;

/// Four selector groups that together recognise a screen.
#[derive(Debug, Clone, Default)]
pub struct SceneSignature {
    pub required_all: Vec<SelectorCondition>,
    pub required_any: Vec<SelectorCondition>,
    pub forbidden_any: Vec<SelectorCondition>,
    pub forbidden_all: Vec<SelectorCondition>,
}

impl SceneSignature {
    pub fn is_empty(&self) -> bool {
        self.required_all.is_empty()
            && self.required_any.is_empty()
            && self.forbidden_any.is_empty()
            && self.forbidden_all.is_empty()
    }

    /// Parse one group from either a single selector map or a list of them.
    pub fn parse_group(value: Option<&Value>) -> Result<Vec<SelectorCondition>, AutodriveError> {
        match value {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(SelectorCondition::from_value).collect(),
            Some(single @ Value::Object(_)) => Ok(vec![SelectorCondition::from_value(single)?]),
            Some(other) => Err(AutodriveError::Selector(format!(
                "selector group must be a map or a list, got {}",
                other
            ))),
        }
    }

    /// Evaluate against a snapshot.
    ///
    /// An empty snapshot only satisfies a signature with no conditions.
    pub fn matches(&self, snapshot: &Snapshot, resolver: &VariableResolver) -> bool {
        if snapshot.is_empty() {
            return self.is_empty();
        }
        let present = |cond: &SelectorCondition| -> bool {
            match cond.resolve(resolver) {
                Ok(resolved) => snapshot.exists(&resolved),
                Err(e) => {
                    warn!(selector = %cond, error = %e, "Selector failed to resolve, treating as absent");
                    false
                }
            }
        };

        if self.forbidden_any.iter().any(present) {
            return false;
        }
        if !self.forbidden_all.is_empty() && self.forbidden_all.iter().all(present) {
            return false;
        }
        if !self.required_all.iter().all(present) {
            return false;
        }
        if !self.required_any.is_empty() && !self.required_any.iter().any(present) {
            return false;
        }
        true
    }
}
