//! Named condition evaluation.
//!
//! Conditions may only depend on parameters, pseudo-parameters, mappings and
//! other conditions, so they are all evaluated eagerly before any resource.

use indexmap::IndexMap;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

use super::{
    ConditionResolver, ParameterResolver, PseudoParameterResolver, ResolveError, TemplateResolver,
};
use crate::template::Template;

/// The boolean value of every declared condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionValues {
    values: IndexMap<String, bool>,
}

impl ConditionValues {
    /// Evaluate all declared conditions of a template.
    pub fn evaluate(
        template: &Template,
        parameters: &dyn ParameterResolver,
        pseudo: &dyn PseudoParameterResolver,
    ) -> Result<Self, ResolveError> {
        let scope = Scope {
            template,
            parameters,
            pseudo,
            memo: RefCell::new(HashMap::new()),
            visiting: RefCell::new(Vec::new()),
        };
        let mut values = IndexMap::with_capacity(template.conditions.len());
        for name in template.conditions.keys() {
            values.insert(name.clone(), scope.condition(name)?);
        }
        tracing::debug!(
            "Evaluated {} condition(s): {}",
            values.len(),
            values.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ")
        );
        Ok(Self { values })
    }

    /// Build directly from known values.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = (String, bool)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// The value of a condition, if declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<bool> {
        self.values.get(name).copied()
    }

    /// Whether a resource or output guarded by `condition` is active.
    ///
    /// Unguarded items are always active.
    pub fn is_active(&self, condition: Option<&str>) -> Result<bool, ResolveError> {
        condition.map_or(Ok(true), |name| self.condition(name))
    }

    /// All values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl ConditionResolver for ConditionValues {
    fn condition(&self, name: &str) -> Result<bool, ResolveError> {
        self.get(name).ok_or_else(|| ResolveError::UnknownCondition(name.to_string()))
    }
}

/// Memoizing evaluator used while conditions are being computed.
struct Scope<'a> {
    template: &'a Template,
    parameters: &'a dyn ParameterResolver,
    pseudo: &'a dyn PseudoParameterResolver,
    memo: RefCell<HashMap<String, bool>>,
    visiting: RefCell<Vec<String>>,
}

impl ConditionResolver for Scope<'_> {
    fn condition(&self, name: &str) -> Result<bool, ResolveError> {
        if let Some(value) = self.memo.borrow().get(name) {
            return Ok(*value);
        }
        if self.visiting.borrow().iter().any(|v| v == name) {
            return Err(ResolveError::ConditionCycle(name.to_string()));
        }
        let expression = self
            .template
            .conditions
            .get(name)
            .ok_or_else(|| ResolveError::UnknownCondition(name.to_string()))?;

        self.visiting.borrow_mut().push(name.to_string());
        let resolution = TemplateResolver::new(self.template)
            .with_parameters(self.parameters)
            .with_pseudo_parameters(self.pseudo)
            .with_conditions(self)
            .evaluate(expression);
        self.visiting.borrow_mut().pop();

        let value = match resolution?.realize()? {
            Value::Bool(value) => value,
            other => {
                return Err(ResolveError::TypeMismatch {
                    function: "Condition",
                    expected: "a boolean",
                    actual: match other {
                        Value::String(_) => "string",
                        Value::Number(_) => "number",
                        Value::Array(_) => "list",
                        Value::Object(_) => "object",
                        _ => "null",
                    },
                });
            }
        };
        self.memo.borrow_mut().insert(name.to_string(), value);
        Ok(value)
    }
}
