//! Pre-flight validation: parameters, conditions and rule assertions.
//!
//! Everything here runs before any provider call. A failure aborts the run.

use serde_json::Value;

use crate::core::StackError;
use crate::resolver::{ConditionValues, PseudoParameters, ResolveError, TemplateResolver};
use crate::template::parameters::{ParameterValues, ResolvedParameters, validate_parameters};
use crate::template::{Expression, Template};

/// Parameters and conditions ready for a run.
#[derive(Debug, Clone, Default)]
pub struct ValidatedInputs {
    /// Validated parameter values
    pub parameters: ResolvedParameters,
    /// Evaluated condition values
    pub conditions: ConditionValues,
}

/// Validate supplied parameters, evaluate conditions and check every rule.
pub fn validate_inputs(
    template: &Template,
    supplied: &ParameterValues,
    pseudo: &PseudoParameters,
) -> Result<ValidatedInputs, StackError> {
    let parameters = validate_parameters(&template.parameters, supplied)?;
    let conditions = ConditionValues::evaluate(template, &parameters, pseudo).map_err(|source| {
        StackError::Resolution {
            logical_id: "Conditions".to_string(),
            source,
        }
    })?;
    check_rules(template, &parameters, &conditions, pseudo)?;
    Ok(ValidatedInputs {
        parameters,
        conditions,
    })
}

fn check_rules(
    template: &Template,
    parameters: &ResolvedParameters,
    conditions: &ConditionValues,
    pseudo: &PseudoParameters,
) -> Result<(), StackError> {
    let resolver = TemplateResolver::new(template)
        .with_parameters(parameters)
        .with_conditions(conditions)
        .with_pseudo_parameters(pseudo);

    for (name, rule) in &template.rules {
        let to_rule_error = |e: ResolveError| StackError::RuleAssertion {
            rule: name.clone(),
            description: e.to_string(),
        };

        if let Some(condition) = &rule.rule_condition
            && !evaluate_bool(&resolver, condition).map_err(to_rule_error)?
        {
            tracing::debug!("Rule {name} skipped: condition is false");
            continue;
        }

        for (index, assertion) in rule.assertions.iter().enumerate() {
            if !evaluate_bool(&resolver, &assertion.assert).map_err(to_rule_error)? {
                let description = assertion
                    .assert_description
                    .clone()
                    .unwrap_or_else(|| format!("assertion #{} evaluated to false", index + 1));
                return Err(StackError::RuleAssertion {
                    rule: name.clone(),
                    description,
                });
            }
        }
    }
    Ok(())
}

fn evaluate_bool(resolver: &TemplateResolver<'_>, expression: &Expression) -> Result<bool, ResolveError> {
    match resolver.evaluate(expression)?.realize()? {
        Value::Bool(value) => Ok(value),
        other => Err(ResolveError::TypeMismatch {
            function: "Assert",
            expected: "a boolean",
            actual: if other.is_string() { "string" } else { "non-boolean value" },
        }),
    }
}
