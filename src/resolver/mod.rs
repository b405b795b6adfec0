//! Template resolver: evaluates [`Expression`]s against pluggable resolvers.
//!
//! Evaluation is two-phase. [`TemplateResolver::evaluate`] walks the expression
//! and returns a [`Resolution`] describing which dependencies were available
//! (resolved) and which were not (unresolved). The value itself is only
//! obtained through [`Resolution::realize`], which fails loudly when any
//! dependency is still unresolved.
//!
//! Each resolver capability is optional. A reference whose resolver is not
//! supplied, or whose resource has not been materialized yet, is recorded as
//! an unresolved [`Dependency`] rather than an error. Type errors, missing
//! attributes on existing resources, out-of-range indexes and the like are
//! terminal [`ResolveError`]s.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use stackwright::resolver::{Dependency, TemplateResolver};
//! use stackwright::template::{Expression, Template};
//!
//! let template = Template::from_value(json!({
//!     "Resources": {"Topic": {"Type": "Test::Topic"}}
//! }))
//! .unwrap();
//! let expr = Expression::parse(json!({"Fn::Join": ["-", ["a", {"Ref": "Topic"}]]})).unwrap();
//!
//! // No resource resolver supplied: the reference is reported, not failed.
//! let resolution = TemplateResolver::new(&template).evaluate(&expr).unwrap();
//! assert!(resolution.unresolved_dependencies().contains(&Dependency::Resource("Topic".into())));
//! assert!(resolution.realize().is_err());
//! ```

pub mod conditions;
pub mod pseudo;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::state::PhysicalResource;
use crate::template::expression::{SubSegment, parse_sub_template};
use crate::template::{ConditionRef, Expression, Intrinsic, Template, is_pseudo_parameter};

pub use conditions::ConditionValues;
pub use pseudo::{NO_VALUE, PseudoParameters};

/// A terminal evaluation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    /// A value was requested from a resolution that still has unresolved dependencies.
    #[error("value accessed while dependencies are unresolved: {}", dependencies.join(", "))]
    UnresolvedAccess {
        /// The unresolved dependencies, rendered
        dependencies: Vec<String>,
    },

    /// A `Ref` names nothing the template declares.
    #[error("'{0}' is not a declared parameter, resource or pseudo-parameter")]
    UnknownReference(String),

    /// A declared parameter has no value in the supplied parameter resolver.
    #[error("parameter '{0}' has no value")]
    MissingParameterValue(String),

    /// A pseudo-parameter name the engine does not provide.
    #[error("pseudo-parameter '{0}' is not supported")]
    UnknownPseudoParameter(String),

    /// A resource whose condition is false was referenced.
    #[error("resource '{0}' is excluded by its condition and cannot be referenced")]
    ResourceExcluded(String),

    /// The resource exists but does not expose the requested attribute.
    #[error("resource '{logical_id}' has no attribute '{attribute}'")]
    MissingAttribute {
        /// The resource that was found
        logical_id: String,
        /// The attribute that was requested
        attribute: String,
    },

    /// Wrong number or shape of arguments.
    #[error("{function}: {reason}")]
    InvalidArguments {
        /// The intrinsic being evaluated
        function: &'static str,
        /// What was wrong
        reason: String,
    },

    /// An index outside the list bounds.
    #[error("{function}: index {index} is out of range for a list of {len} item(s)")]
    IndexOutOfRange {
        /// The intrinsic being evaluated
        function: &'static str,
        /// The requested index
        index: i64,
        /// The list length
        len: usize,
    },

    /// An operand of the wrong type.
    #[error("{function}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The intrinsic being evaluated
        function: &'static str,
        /// The required type
        expected: &'static str,
        /// The type actually found
        actual: &'static str,
    },

    /// An `Fn::Sub` placeholder that matches nothing.
    #[error(
        "Fn::Sub: '${{{0}}}' is neither a supplied variable, a pseudo-parameter, a parameter nor a resource"
    )]
    UnknownSubVariable(String),

    /// An `Fn::FindInMap` lookup with no entry.
    #[error("Fn::FindInMap: no value at [{map}, {top_key}, {second_key}]")]
    MappingLookup {
        /// Mapping name
        map: String,
        /// First-level key
        top_key: String,
        /// Second-level key
        second_key: String,
    },

    /// A condition name that is not declared.
    #[error("unknown condition '{0}'")]
    UnknownCondition(String),

    /// A condition that (transitively) refers to itself.
    #[error("condition '{0}' depends on itself")]
    ConditionCycle(String),
}

/// Something an evaluation depended on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dependency {
    /// A declared parameter
    Parameter(String),
    /// A pseudo-parameter such as `AWS::Region`
    PseudoParameter(String),
    /// A named condition
    Condition(String),
    /// A logical id
    Resource(String),
}

impl Dependency {
    /// The logical id, if this is a resource dependency.
    #[must_use]
    pub fn logical_id(&self) -> Option<&str> {
        match self {
            Self::Resource(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(name) => write!(f, "parameter {name}"),
            Self::PseudoParameter(name) => write!(f, "pseudo-parameter {name}"),
            Self::Condition(name) => write!(f, "condition {name}"),
            Self::Resource(name) => write!(f, "resource {name}"),
        }
    }
}

/// Supplies parameter values.
pub trait ParameterResolver {
    /// The value of a declared parameter.
    fn parameter(&self, name: &str) -> Option<Value>;
}

/// Supplies named condition values.
pub trait ConditionResolver {
    /// The boolean value of a declared condition.
    fn condition(&self, name: &str) -> Result<bool, ResolveError>;
}

/// Supplies pseudo-parameter values.
pub trait PseudoParameterResolver {
    /// The value of a pseudo-parameter, `None` if unsupported.
    fn pseudo_parameter(&self, name: &str) -> Option<Value>;
}

/// Availability of a referenced resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceLookup {
    /// Materialized; its attributes may be read
    Available(PhysicalResource),
    /// Not materialized yet
    Pending,
    /// Its condition is false, it will never exist in this run
    Excluded,
}

/// Supplies materialized resources.
pub trait ResourceResolver {
    /// Look up a declared logical id.
    fn lookup(&self, logical_id: &str) -> ResourceLookup;

    /// The attribute `Ref` returns for this resource type, if not the physical id.
    fn ref_attribute(&self, _resource_type: &str) -> Option<String> {
        None
    }
}

/// The outcome of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    value: Option<Value>,
    resolved: BTreeSet<Dependency>,
    unresolved: BTreeSet<Dependency>,
}

impl Resolution {
    /// Whether every dependency was available.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Dependencies that were available during evaluation.
    #[must_use]
    pub const fn resolved_dependencies(&self) -> &BTreeSet<Dependency> {
        &self.resolved
    }

    /// Dependencies that were not available during evaluation.
    #[must_use]
    pub const fn unresolved_dependencies(&self) -> &BTreeSet<Dependency> {
        &self.unresolved
    }

    /// Logical ids among the unresolved dependencies.
    pub fn unresolved_resources(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().filter_map(Dependency::logical_id)
    }

    /// Produce the value.
    ///
    /// Calling this while dependencies are unresolved is a caller bug and is
    /// reported as [`ResolveError::UnresolvedAccess`].
    pub fn realize(&self) -> Result<Value, ResolveError> {
        match &self.value {
            Some(value) if self.unresolved.is_empty() => Ok(value.clone()),
            _ => Err(ResolveError::UnresolvedAccess {
                dependencies: self.unresolved.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

/// Intermediate evaluation result.
enum Slot {
    Ready(Value),
    /// The `AWS::NoValue` sentinel; elided from arrays and objects
    NoValue,
    Pending,
}

#[derive(Default)]
struct Trace {
    resolved: BTreeSet<Dependency>,
    unresolved: BTreeSet<Dependency>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn mismatch(function: &'static str, expected: &'static str, actual: &Value) -> ResolveError {
    ResolveError::TypeMismatch {
        function,
        expected,
        actual: type_name(actual),
    }
}

fn scalar_text(function: &'static str, value: &Value) -> Result<String, ResolveError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(mismatch(function, "a string, number or boolean", other)),
    }
}

fn expect_str(function: &'static str, value: Value) -> Result<String, ResolveError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(mismatch(function, "a string", &other)),
    }
}

fn expect_bool(function: &'static str, value: &Value) -> Result<bool, ResolveError> {
    value.as_bool().ok_or_else(|| mismatch(function, "a boolean", value))
}

fn expect_list(function: &'static str, value: Value) -> Result<Vec<Value>, ResolveError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(function, "a list", &other)),
    }
}

fn expect_string_list(function: &'static str, value: Value) -> Result<Vec<String>, ResolveError> {
    let items = expect_list(function, value)?;
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            other => Err(mismatch(function, "a list of strings", &other)),
        })
        .collect()
}

/// Evaluates expressions of one template against a bundle of resolvers.
#[derive(Clone, Copy)]
pub struct TemplateResolver<'a> {
    template: &'a Template,
    parameters: Option<&'a dyn ParameterResolver>,
    conditions: Option<&'a dyn ConditionResolver>,
    pseudo: Option<&'a dyn PseudoParameterResolver>,
    resources: Option<&'a dyn ResourceResolver>,
}

impl<'a> TemplateResolver<'a> {
    /// A resolver with no capabilities: every reference is unresolved.
    #[must_use]
    pub const fn new(template: &'a Template) -> Self {
        Self {
            template,
            parameters: None,
            conditions: None,
            pseudo: None,
            resources: None,
        }
    }

    /// Supply parameter values.
    #[must_use]
    pub const fn with_parameters(mut self, parameters: &'a dyn ParameterResolver) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Supply condition values.
    #[must_use]
    pub const fn with_conditions(mut self, conditions: &'a dyn ConditionResolver) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Supply pseudo-parameter values.
    #[must_use]
    pub const fn with_pseudo_parameters(mut self, pseudo: &'a dyn PseudoParameterResolver) -> Self {
        self.pseudo = Some(pseudo);
        self
    }

    /// Supply materialized resources.
    #[must_use]
    pub const fn with_resources(mut self, resources: &'a dyn ResourceResolver) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Evaluate an expression.
    pub fn evaluate(&self, expression: &Expression) -> Result<Resolution, ResolveError> {
        let mut trace = Trace::default();
        let slot = self.eval(expression, &mut trace)?;
        let value = match slot {
            Slot::Ready(value) => Some(value),
            Slot::NoValue => Some(Value::Null),
            Slot::Pending => None,
        };
        Ok(Resolution {
            value,
            resolved: trace.resolved,
            unresolved: trace.unresolved,
        })
    }

    /// Evaluate a named condition to a boolean, if it can be decided.
    pub fn evaluate_condition(&self, name: &str) -> Result<Resolution, ResolveError> {
        let mut trace = Trace::default();
        let value = self.named_condition(name, &mut trace)?.map(Value::Bool);
        Ok(Resolution {
            value,
            resolved: trace.resolved,
            unresolved: trace.unresolved,
        })
    }

    fn eval(&self, expression: &Expression, trace: &mut Trace) -> Result<Slot, ResolveError> {
        match expression {
            Expression::Null => Ok(Slot::Ready(Value::Null)),
            Expression::Bool(b) => Ok(Slot::Ready(Value::Bool(*b))),
            Expression::Number(n) => Ok(Slot::Ready(Value::Number(n.clone()))),
            Expression::String(s) => Ok(Slot::Ready(Value::String(s.clone()))),
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                let mut pending = false;
                for item in items {
                    match self.eval(item, trace)? {
                        Slot::Ready(value) => values.push(value),
                        Slot::NoValue => {}
                        Slot::Pending => pending = true,
                    }
                }
                Ok(if pending {
                    Slot::Pending
                } else {
                    Slot::Ready(Value::Array(values))
                })
            }
            Expression::Object(map) => {
                let mut values = Map::new();
                let mut pending = false;
                for (key, item) in map {
                    match self.eval(item, trace)? {
                        Slot::Ready(value) => {
                            values.insert(key.clone(), value);
                        }
                        Slot::NoValue => {}
                        Slot::Pending => pending = true,
                    }
                }
                Ok(if pending {
                    Slot::Pending
                } else {
                    Slot::Ready(Value::Object(values))
                })
            }
            Expression::Intrinsic(intrinsic) => self.eval_intrinsic(intrinsic, trace),
        }
    }

    /// Evaluate a function argument. `None` means pending; `AWS::NoValue` becomes `null`.
    fn arg(&self, expression: &Expression, trace: &mut Trace) -> Result<Option<Value>, ResolveError> {
        Ok(match self.eval(expression, trace)? {
            Slot::Ready(value) => Some(value),
            Slot::NoValue => Some(Value::Null),
            Slot::Pending => None,
        })
    }

    fn eval_intrinsic(&self, intrinsic: &Intrinsic, trace: &mut Trace) -> Result<Slot, ResolveError> {
        let function = intrinsic.function_name();
        match intrinsic {
            Intrinsic::Ref(name) => self.eval_ref(name, trace),
            Intrinsic::GetAtt {
                logical_id,
                attribute,
            } => self.eval_get_att(logical_id, attribute, trace),
            Intrinsic::Sub {
                template,
                variables,
            } => {
                let mut text = String::new();
                let mut pending = false;
                for segment in parse_sub_template(template) {
                    match segment {
                        SubSegment::Literal(literal) => text.push_str(&literal),
                        SubSegment::Placeholder(name) => {
                            let slot = if let Some(variable) = variables.get(&name) {
                                self.eval(variable, trace)?
                            } else if is_pseudo_parameter(&name)
                                || self.template.is_parameter(&name)
                                || self.template.is_resource(&name)
                            {
                                self.eval_ref(&name, trace)?
                            } else if let Some((logical_id, attribute)) = name.split_once('.')
                                && self.template.is_resource(logical_id)
                            {
                                self.eval_get_att(logical_id, attribute, trace)?
                            } else {
                                return Err(ResolveError::UnknownSubVariable(name));
                            };
                            match slot {
                                Slot::Ready(value) => text.push_str(&scalar_text(function, &value)?),
                                Slot::NoValue => {}
                                Slot::Pending => pending = true,
                            }
                        }
                    }
                }
                Ok(if pending {
                    Slot::Pending
                } else {
                    Slot::Ready(Value::String(text))
                })
            }
            Intrinsic::Join { delimiter, values } => {
                let Some(values) = self.arg(values, trace)? else {
                    return Ok(Slot::Pending);
                };
                let parts = expect_list(function, values)?
                    .iter()
                    .map(|item| scalar_text(function, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Slot::Ready(Value::String(parts.join(delimiter))))
            }
            Intrinsic::Select { index, list } => {
                let index = self.arg(index, trace)?;
                let list = self.arg(list, trace)?;
                let (Some(index), Some(list)) = (index, list) else {
                    return Ok(Slot::Pending);
                };
                let index = match &index {
                    Value::Number(n) => n.as_i64().ok_or_else(|| mismatch(function, "an integer index", &index))?,
                    Value::String(s) => s.trim().parse::<i64>().map_err(|_| mismatch(function, "an integer index", &index))?,
                    other => return Err(mismatch(function, "an integer index", other)),
                };
                let mut items = expect_list(function, list)?;
                let len = items.len();
                match usize::try_from(index) {
                    Ok(position) if position < len => Ok(Slot::Ready(items.swap_remove(position))),
                    _ => Err(ResolveError::IndexOutOfRange {
                        function,
                        index,
                        len,
                    }),
                }
            }
            Intrinsic::Split { delimiter, source } => {
                if delimiter.is_empty() {
                    return Err(ResolveError::InvalidArguments {
                        function,
                        reason: "delimiter must not be empty".to_string(),
                    });
                }
                let Some(source) = self.arg(source, trace)? else {
                    return Ok(Slot::Pending);
                };
                let source = expect_str(function, source)?;
                Ok(Slot::Ready(Value::Array(
                    source.split(delimiter.as_str()).map(|s| Value::String(s.to_string())).collect(),
                )))
            }
            Intrinsic::Base64(inner) => {
                let Some(value) = self.arg(inner, trace)? else {
                    return Ok(Slot::Pending);
                };
                let text = expect_str(function, value)?;
                Ok(Slot::Ready(Value::String(BASE64.encode(text.as_bytes()))))
            }
            Intrinsic::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                let map = self.arg(map, trace)?;
                let top_key = self.arg(top_key, trace)?;
                let second_key = self.arg(second_key, trace)?;
                let (Some(map), Some(top_key), Some(second_key)) = (map, top_key, second_key) else {
                    return Ok(Slot::Pending);
                };
                let map = scalar_text(function, &map)?;
                let top_key = scalar_text(function, &top_key)?;
                let second_key = scalar_text(function, &second_key)?;
                let value = self
                    .template
                    .mappings
                    .get(&map)
                    .and_then(|table| table.get(&top_key))
                    .and_then(|entry| entry.get(&second_key))
                    .cloned();
                value.map(Slot::Ready).ok_or(ResolveError::MappingLookup {
                    map,
                    top_key,
                    second_key,
                })
            }
            Intrinsic::RefAll(parameter_type) => {
                let names: Vec<&String> = self
                    .template
                    .parameters
                    .iter()
                    .filter(|(_, definition)| definition.parameter_type.to_string() == *parameter_type)
                    .map(|(name, _)| name)
                    .collect();
                let mut values = Vec::with_capacity(names.len());
                let mut pending = false;
                for name in names {
                    match self.eval_ref(name, trace)? {
                        Slot::Ready(value) => values.push(value),
                        Slot::NoValue => {}
                        Slot::Pending => pending = true,
                    }
                }
                Ok(if pending {
                    Slot::Pending
                } else {
                    Slot::Ready(Value::Array(values))
                })
            }
            Intrinsic::If {
                condition,
                then,
                otherwise,
            } => {
                let decision = match condition {
                    ConditionRef::Named(name) => self.named_condition(name, trace)?,
                    ConditionRef::Inline(expression) => match self.arg(expression, trace)? {
                        Some(value) => Some(expect_bool(function, &value)?),
                        None => None,
                    },
                };
                // Only the winning branch is evaluated, so the losing branch
                // contributes no dependencies.
                match decision {
                    None => Ok(Slot::Pending),
                    Some(true) => self.eval(then, trace),
                    Some(false) => self.eval(otherwise, trace),
                }
            }
            Intrinsic::Equals(a, b) => {
                let a = self.arg(a, trace)?;
                let b = self.arg(b, trace)?;
                Ok(match (a, b) {
                    (Some(a), Some(b)) => Slot::Ready(Value::Bool(a == b)),
                    _ => Slot::Pending,
                })
            }
            Intrinsic::Not(inner) => {
                let Some(value) = self.arg(inner, trace)? else {
                    return Ok(Slot::Pending);
                };
                Ok(Slot::Ready(Value::Bool(!expect_bool(function, &value)?)))
            }
            Intrinsic::And(items) | Intrinsic::Or(items) => {
                if !(2..=10).contains(&items.len()) {
                    return Err(ResolveError::InvalidArguments {
                        function,
                        reason: format!("expected between 2 and 10 conditions, got {}", items.len()),
                    });
                }
                let mut operands = Vec::with_capacity(items.len());
                let mut pending = false;
                for item in items {
                    match self.arg(item, trace)? {
                        Some(value) => operands.push(expect_bool(function, &value)?),
                        None => pending = true,
                    }
                }
                if pending {
                    return Ok(Slot::Pending);
                }
                let result = if matches!(intrinsic, Intrinsic::And(_)) {
                    operands.iter().all(|b| *b)
                } else {
                    operands.iter().any(|b| *b)
                };
                Ok(Slot::Ready(Value::Bool(result)))
            }
            Intrinsic::Contains { list, value } => {
                let list = self.arg(list, trace)?;
                let value = self.arg(value, trace)?;
                let (Some(list), Some(value)) = (list, value) else {
                    return Ok(Slot::Pending);
                };
                let list = expect_string_list(function, list)?;
                let value = expect_str(function, value)?;
                Ok(Slot::Ready(Value::Bool(list.contains(&value))))
            }
            Intrinsic::EachMemberEquals { list, value } => {
                let list = self.arg(list, trace)?;
                let value = self.arg(value, trace)?;
                let (Some(list), Some(value)) = (list, value) else {
                    return Ok(Slot::Pending);
                };
                let list = expect_string_list(function, list)?;
                let value = expect_str(function, value)?;
                Ok(Slot::Ready(Value::Bool(list.iter().all(|member| *member == value))))
            }
            Intrinsic::EachMemberIn { members, allowed } => {
                let members = self.arg(members, trace)?;
                let allowed = self.arg(allowed, trace)?;
                let (Some(members), Some(allowed)) = (members, allowed) else {
                    return Ok(Slot::Pending);
                };
                let members = expect_string_list(function, members)?;
                let allowed = expect_string_list(function, allowed)?;
                Ok(Slot::Ready(Value::Bool(members.iter().all(|member| allowed.contains(member)))))
            }
            Intrinsic::Condition(name) => Ok(match self.named_condition(name, trace)? {
                Some(value) => Slot::Ready(Value::Bool(value)),
                None => Slot::Pending,
            }),
            Intrinsic::GetAZs(region) => {
                let Some(region) = self.arg(region, trace)? else {
                    return Ok(Slot::Pending);
                };
                let region = match region {
                    Value::Null => String::new(),
                    other => expect_str(function, other)?,
                };
                let region = if region.is_empty() {
                    match self.eval_ref("AWS::Region", trace)? {
                        Slot::Ready(value) => expect_str(function, value)?,
                        _ => return Ok(Slot::Pending),
                    }
                } else {
                    region
                };
                Ok(Slot::Ready(Value::Array(
                    ["a", "b", "c"].iter().map(|zone| Value::String(format!("{region}{zone}"))).collect(),
                )))
            }
            Intrinsic::Length(inner) => {
                let Some(value) = self.arg(inner, trace)? else {
                    return Ok(Slot::Pending);
                };
                let items = expect_list(function, value)?;
                Ok(Slot::Ready(Value::from(items.len())))
            }
            Intrinsic::ToJsonString(inner) => {
                let Some(value) = self.arg(inner, trace)? else {
                    return Ok(Slot::Pending);
                };
                let text = serde_json::to_string(&value).map_err(|e| ResolveError::InvalidArguments {
                    function,
                    reason: e.to_string(),
                })?;
                Ok(Slot::Ready(Value::String(text)))
            }
        }
    }

    fn eval_ref(&self, name: &str, trace: &mut Trace) -> Result<Slot, ResolveError> {
        if name == NO_VALUE {
            return Ok(Slot::NoValue);
        }

        if is_pseudo_parameter(name) {
            let dependency = Dependency::PseudoParameter(name.to_string());
            let Some(pseudo) = self.pseudo else {
                trace.unresolved.insert(dependency);
                return Ok(Slot::Pending);
            };
            let value = pseudo
                .pseudo_parameter(name)
                .ok_or_else(|| ResolveError::UnknownPseudoParameter(name.to_string()))?;
            trace.resolved.insert(dependency);
            return Ok(Slot::Ready(value));
        }

        if self.template.is_parameter(name) {
            let dependency = Dependency::Parameter(name.to_string());
            let Some(parameters) = self.parameters else {
                trace.unresolved.insert(dependency);
                return Ok(Slot::Pending);
            };
            let value = parameters
                .parameter(name)
                .ok_or_else(|| ResolveError::MissingParameterValue(name.to_string()))?;
            trace.resolved.insert(dependency);
            return Ok(Slot::Ready(value));
        }

        if self.template.is_resource(name) {
            return Ok(match self.lookup_resource(name, trace)? {
                Some(resource) => Slot::Ready(self.ref_value(&resource)),
                None => Slot::Pending,
            });
        }

        Err(ResolveError::UnknownReference(name.to_string()))
    }

    fn eval_get_att(
        &self,
        logical_id: &str,
        attribute: &str,
        trace: &mut Trace,
    ) -> Result<Slot, ResolveError> {
        if !self.template.is_resource(logical_id) {
            return Err(ResolveError::UnknownReference(logical_id.to_string()));
        }
        let Some(resource) = self.lookup_resource(logical_id, trace)? else {
            return Ok(Slot::Pending);
        };
        resource.attribute(attribute).cloned().map(Slot::Ready).ok_or_else(|| {
            ResolveError::MissingAttribute {
                logical_id: logical_id.to_string(),
                attribute: attribute.to_string(),
            }
        })
    }

    fn lookup_resource(
        &self,
        logical_id: &str,
        trace: &mut Trace,
    ) -> Result<Option<PhysicalResource>, ResolveError> {
        let dependency = Dependency::Resource(logical_id.to_string());
        let Some(resources) = self.resources else {
            trace.unresolved.insert(dependency);
            return Ok(None);
        };
        match resources.lookup(logical_id) {
            ResourceLookup::Available(resource) => {
                trace.resolved.insert(dependency);
                Ok(Some(resource))
            }
            ResourceLookup::Pending => {
                trace.unresolved.insert(dependency);
                Ok(None)
            }
            ResourceLookup::Excluded => Err(ResolveError::ResourceExcluded(logical_id.to_string())),
        }
    }

    fn ref_value(&self, resource: &PhysicalResource) -> Value {
        let projected = self
            .resources
            .and_then(|resources| resources.ref_attribute(&resource.resource_type))
            .and_then(|attribute| resource.attribute(&attribute).cloned());
        projected.unwrap_or_else(|| {
            resource.physical_id.clone().map_or(Value::Null, Value::String)
        })
    }

    fn named_condition(&self, name: &str, trace: &mut Trace) -> Result<Option<bool>, ResolveError> {
        let dependency = Dependency::Condition(name.to_string());
        let Some(conditions) = self.conditions else {
            trace.unresolved.insert(dependency);
            return Ok(None);
        };
        let value = conditions.condition(name)?;
        trace.resolved.insert(dependency);
        Ok(Some(value))
    }
}
