//! Parameter declarations and constraint validation.
//!
//! Supplied parameter values are strings (as a caller would pass them on a
//! command line). Validation checks them against the declared type and
//! constraints and produces [`ResolvedParameters`]: list types become JSON
//! arrays, everything else stays a JSON string.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::core::StackError;
use crate::resolver::ParameterResolver;

/// Caller-supplied parameter values, keyed by parameter name.
pub type ParameterValues = IndexMap<String, String>;

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParameterType {
    /// `String`
    String,
    /// `Number`
    Number,
    /// `List<Number>`
    NumberList,
    /// `CommaDelimitedList`
    CommaDelimitedList,
    /// Any other type name, validated as a string
    Other(String),
}

impl ParameterType {
    /// Whether values of this type are comma-separated lists.
    #[must_use]
    pub fn is_list(&self) -> bool {
        match self {
            Self::NumberList | Self::CommaDelimitedList => true,
            Self::Other(name) => name.starts_with("List<"),
            _ => false,
        }
    }
}

impl From<String> for ParameterType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "String" => Self::String,
            "Number" => Self::Number,
            "List<Number>" => Self::NumberList,
            "CommaDelimitedList" => Self::CommaDelimitedList,
            _ => Self::Other(value),
        }
    }
}

impl From<ParameterType> for String {
    fn from(value: ParameterType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
            Self::NumberList => write!(f, "List<Number>"),
            Self::CommaDelimitedList => write!(f, "CommaDelimitedList"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// A parameter declared in a template's `Parameters` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterDefinition {
    /// Declared type
    #[serde(rename = "Type")]
    pub parameter_type: ParameterType,
    /// Value used when none is supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Exhaustive list of permitted values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    /// Regular expression the whole value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_pattern: Option<String>,
    /// Minimum string length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum string length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Minimum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    /// Maximum numeric value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Mask the value in plans and logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<Value>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Message shown when a constraint is violated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_description: Option<String>,
}

impl ParameterDefinition {
    /// A parameter of the given type with no constraints.
    #[must_use]
    pub fn new(parameter_type: ParameterType) -> Self {
        Self {
            parameter_type,
            default: None,
            allowed_values: None,
            allowed_pattern: None,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            no_echo: None,
            description: None,
            constraint_description: None,
        }
    }

    /// Whether the value should be masked. Accepts `true` or `"true"`.
    #[must_use]
    pub fn is_no_echo(&self) -> bool {
        match &self.no_echo {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn violation(&self, name: &str, reason: String) -> StackError {
        let reason = match &self.constraint_description {
            Some(description) => format!("{reason} ({description})"),
            None => reason,
        };
        StackError::ParameterValidation {
            parameter: name.to_string(),
            reason,
        }
    }

    /// Validate a raw value and convert it to its resolved JSON form.
    pub fn validate(&self, name: &str, raw: &str) -> Result<Value, StackError> {
        if self.parameter_type.is_list() {
            let items: Vec<String> = if raw.trim().is_empty() {
                Vec::new()
            } else {
                raw.split(',').map(|item| item.trim().to_string()).collect()
            };
            for item in &items {
                self.validate_scalar(name, item)?;
            }
            Ok(Value::Array(items.into_iter().map(Value::String).collect()))
        } else {
            self.validate_scalar(name, raw)?;
            Ok(Value::String(raw.to_string()))
        }
    }

    fn validate_scalar(&self, name: &str, value: &str) -> Result<(), StackError> {
        let numeric = matches!(self.parameter_type, ParameterType::Number | ParameterType::NumberList);

        if numeric {
            let number: f64 = value.parse().map_err(|_| {
                self.violation(name, format!("'{value}' is not a number"))
            })?;
            if let Some(min) = self.min_value
                && number < min
            {
                return Err(self.violation(name, format!("{value} is less than MinValue {min}")));
            }
            if let Some(max) = self.max_value
                && number > max
            {
                return Err(self.violation(name, format!("{value} is greater than MaxValue {max}")));
            }
        } else {
            let length = value.chars().count();
            if let Some(min) = self.min_length
                && length < min
            {
                return Err(self.violation(
                    name,
                    format!("length {length} is shorter than MinLength {min}"),
                ));
            }
            if let Some(max) = self.max_length
                && length > max
            {
                return Err(self.violation(
                    name,
                    format!("length {length} is longer than MaxLength {max}"),
                ));
            }
        }

        if let Some(pattern) = &self.allowed_pattern {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                self.violation(name, format!("AllowedPattern '{pattern}' is not a valid regex: {e}"))
            })?;
            if !regex.is_match(value) {
                return Err(self.violation(
                    name,
                    format!("'{value}' does not match AllowedPattern '{pattern}'"),
                ));
            }
        }

        if let Some(allowed) = &self.allowed_values {
            let permitted = allowed.iter().any(|candidate| allowed_value_matches(candidate, value));
            if !permitted {
                let choices = allowed.iter().map(scalar_text).collect::<Vec<_>>().join(", ");
                return Err(self.violation(
                    name,
                    format!("'{value}' is not one of the AllowedValues [{choices}]"),
                ));
            }
        }

        Ok(())
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn allowed_value_matches(candidate: &Value, value: &str) -> bool {
    scalar_text(candidate) == value
}

/// Parameter values after validation, with their declared types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters {
    values: IndexMap<String, Value>,
    types: IndexMap<String, ParameterType>,
    masked: Vec<String>,
}

impl ResolvedParameters {
    /// The resolved value of a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// All resolved values in declaration order.
    #[must_use]
    pub const fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Whether the parameter is declared `NoEcho`.
    #[must_use]
    pub fn is_masked(&self, name: &str) -> bool {
        self.masked.iter().any(|m| m == name)
    }

    /// Values of every parameter declared with the given type, in declaration order.
    #[must_use]
    pub fn parameters_of_type(&self, parameter_type: &str) -> Vec<Value> {
        self.types
            .iter()
            .filter(|(_, ty)| ty.to_string() == parameter_type)
            .filter_map(|(name, _)| self.values.get(name).cloned())
            .collect()
    }
}

impl ParameterResolver for ResolvedParameters {
    fn parameter(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }
}

/// Validate supplied values against the declared parameters.
///
/// Every declared parameter must receive a value, either supplied or from its
/// `Default`. Supplying a value for an undeclared parameter is an error.
pub fn validate_parameters(
    declared: &IndexMap<String, ParameterDefinition>,
    supplied: &ParameterValues,
) -> Result<ResolvedParameters, StackError> {
    if let Some(unknown) = supplied.keys().find(|name| !declared.contains_key(*name)) {
        return Err(StackError::ParameterValidation {
            parameter: unknown.clone(),
            reason: "parameter is not declared by the template".to_string(),
        });
    }

    let mut resolved = ResolvedParameters::default();
    for (name, definition) in declared {
        let raw = match (supplied.get(name), &definition.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default_text(default),
            (None, None) => {
                return Err(StackError::ParameterValidation {
                    parameter: name.clone(),
                    reason: "no value supplied and no Default declared".to_string(),
                });
            }
        };

        let value = definition.validate(name, &raw)?;
        tracing::debug!(
            "Parameter {} = {}",
            name,
            if definition.is_no_echo() {
                "****".to_string()
            } else {
                value.to_string()
            }
        );
        resolved.values.insert(name.clone(), value);
        resolved.types.insert(name.clone(), definition.parameter_type.clone());
        if definition.is_no_echo() {
            resolved.masked.push(name.clone());
        }
    }
    Ok(resolved)
}

fn default_text(default: &Value) -> String {
    match default {
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => scalar_text(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared(entries: Value) -> IndexMap<String, ParameterDefinition> {
        serde_json::from_value(entries).unwrap()
    }

    fn values(pairs: &[(&str, &str)]) -> ParameterValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_allowed_values_violation_names_parameter() {
        let params = declared(json!({"HashKey": {"Type": "String", "AllowedValues": ["Album"]}}));

        let err = validate_parameters(&params, &values(&[("HashKey", "Other")])).unwrap_err();
        match err {
            StackError::ParameterValidation { parameter, reason } => {
                assert_eq!(parameter, "HashKey");
                assert!(reason.contains("AllowedValues"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = validate_parameters(&params, &values(&[("HashKey", "Album")])).unwrap();
        assert_eq!(ok.get("HashKey"), Some(&json!("Album")));
    }

    #[test]
    fn test_default_used_when_not_supplied() {
        let params = declared(json!({"Size": {"Type": "Number", "Default": 5, "MaxValue": 10}}));
        let resolved = validate_parameters(&params, &ParameterValues::new()).unwrap();
        assert_eq!(resolved.get("Size"), Some(&json!("5")));
    }

    #[test]
    fn test_missing_value_without_default() {
        let params = declared(json!({"Env": {"Type": "String"}}));
        let err = validate_parameters(&params, &ParameterValues::new()).unwrap_err();
        assert!(err.to_string().contains("no value supplied"));
    }

    #[test]
    fn test_undeclared_parameter_rejected() {
        let params = declared(json!({}));
        let err = validate_parameters(&params, &values(&[("Ghost", "x")])).unwrap_err();
        assert!(matches!(err, StackError::ParameterValidation { parameter, .. } if parameter == "Ghost"));
    }

    #[test]
    fn test_number_bounds_and_type() {
        let params =
            declared(json!({"Port": {"Type": "Number", "MinValue": 1024, "MaxValue": 65535}}));
        assert!(validate_parameters(&params, &values(&[("Port", "8080")])).is_ok());
        assert!(validate_parameters(&params, &values(&[("Port", "80")])).is_err());
        assert!(validate_parameters(&params, &values(&[("Port", "70000")])).is_err());
        let err = validate_parameters(&params, &values(&[("Port", "http")])).unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_pattern_is_full_match_and_length() {
        let params = declared(json!({
            "Name": {
                "Type": "String",
                "AllowedPattern": "[a-z]+",
                "MinLength": 2,
                "MaxLength": 5,
                "ConstraintDescription": "lowercase letters only"
            }
        }));
        assert!(validate_parameters(&params, &values(&[("Name", "abc")])).is_ok());
        let err = validate_parameters(&params, &values(&[("Name", "abc1")])).unwrap_err();
        assert!(err.to_string().contains("lowercase letters only"));
        assert!(validate_parameters(&params, &values(&[("Name", "a")])).is_err());
        assert!(validate_parameters(&params, &values(&[("Name", "abcdef")])).is_err());
    }

    #[test]
    fn test_list_types_split_and_validate_members() {
        let params = declared(json!({
            "Zones": {"Type": "CommaDelimitedList", "AllowedValues": ["a", "b", "c"]},
            "Ports": {"Type": "List<Number>", "Default": "80, 443"}
        }));
        let resolved = validate_parameters(&params, &values(&[("Zones", "a, c")])).unwrap();
        assert_eq!(resolved.get("Zones"), Some(&json!(["a", "c"])));
        assert_eq!(resolved.get("Ports"), Some(&json!(["80", "443"])));

        assert!(validate_parameters(&params, &values(&[("Zones", "a,d")])).is_err());
    }

    #[test]
    fn test_parameters_of_type_and_no_echo() {
        let params = declared(json!({
            "VpcA": {"Type": "AWS::EC2::VPC::Id", "Default": "vpc-1"},
            "VpcB": {"Type": "AWS::EC2::VPC::Id", "Default": "vpc-2"},
            "Secret": {"Type": "String", "Default": "hunter2", "NoEcho": "true"}
        }));
        let resolved = validate_parameters(&params, &ParameterValues::new()).unwrap();
        assert_eq!(
            resolved.parameters_of_type("AWS::EC2::VPC::Id"),
            vec![json!("vpc-1"), json!("vpc-2")]
        );
        assert!(resolved.is_masked("Secret"));
        assert!(!resolved.is_masked("VpcA"));
    }
}
