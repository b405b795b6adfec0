//! The expression model: JSON-like values augmented with intrinsic function nodes.
//!
//! Expressions are pure data. They are parsed from `serde_json::Value` (which is
//! also what YAML templates deserialize into) and serialize back to the same
//! shape, so a template survives a round trip through a persisted stack state.
//!
//! An object with exactly one key naming an intrinsic (`Ref`, `Fn::*`, or
//! `Condition` with a string value) is parsed as that intrinsic; every other
//! object is a plain map.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use thiserror::Error;

/// An expression failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{function}: {reason}")]
pub struct ExpressionParseError {
    /// The intrinsic (or `expression`) that failed to parse
    pub function: String,
    /// What was wrong
    pub reason: String,
}

impl ExpressionParseError {
    fn new(function: &str, reason: impl Into<String>) -> Self {
        Self {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}

/// A recursive, JSON-like value with intrinsic function nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Expression {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Any JSON number
    Number(Number),
    /// A string literal
    String(String),
    /// A list of expressions
    Array(Vec<Expression>),
    /// An order-preserving map of expressions
    Object(IndexMap<String, Expression>),
    /// A deferred computation
    Intrinsic(Box<Intrinsic>),
}

/// The condition operand of `Fn::If`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionRef {
    /// A condition declared in the template's `Conditions` section
    Named(String),
    /// An inline boolean expression
    Inline(Expression),
}

/// Intrinsic function nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Intrinsic {
    /// `{"Ref": name}` - a parameter, pseudo-parameter or logical id
    Ref(String),
    /// `{"Fn::GetAtt": [logicalId, attribute]}`
    GetAtt {
        /// The referenced resource
        logical_id: String,
        /// The attribute name
        attribute: String,
    },
    /// `{"Fn::Sub": template}` or `{"Fn::Sub": [template, variables]}`
    Sub {
        /// The string with `${name}` placeholders
        template: String,
        /// Explicit placeholder values, consulted first
        variables: IndexMap<String, Expression>,
    },
    /// `{"Fn::Join": [delimiter, list]}`
    Join {
        /// Separator placed between items
        delimiter: String,
        /// An expression producing a list of scalars
        values: Expression,
    },
    /// `{"Fn::Select": [index, list]}`
    Select {
        /// Zero-based index
        index: Expression,
        /// An expression producing a list
        list: Expression,
    },
    /// `{"Fn::Split": [delimiter, string]}`
    Split {
        /// Separator
        delimiter: String,
        /// An expression producing a string
        source: Expression,
    },
    /// `{"Fn::Base64": string}`
    Base64(Expression),
    /// `{"Fn::FindInMap": [mapName, topKey, secondKey]}`
    FindInMap {
        /// Mapping name
        map: Expression,
        /// First-level key
        top_key: Expression,
        /// Second-level key
        second_key: Expression,
    },
    /// `{"Fn::RefAll": parameterType}` - values of every parameter of that type
    RefAll(String),
    /// `{"Fn::If": [condition, then, else]}`
    If {
        /// Named or inline condition
        condition: ConditionRef,
        /// Value when the condition holds
        then: Expression,
        /// Value when it does not
        otherwise: Expression,
    },
    /// `{"Fn::Equals": [a, b]}`
    Equals(Expression, Expression),
    /// `{"Fn::Not": [condition]}`
    Not(Expression),
    /// `{"Fn::And": [conditions...]}`
    And(Vec<Expression>),
    /// `{"Fn::Or": [conditions...]}`
    Or(Vec<Expression>),
    /// `{"Fn::Contains": [listOfStrings, string]}`
    Contains {
        /// Candidate list
        list: Expression,
        /// Value to look for
        value: Expression,
    },
    /// `{"Fn::EachMemberEquals": [listOfStrings, string]}`
    EachMemberEquals {
        /// List whose members are compared
        list: Expression,
        /// Value every member must equal
        value: Expression,
    },
    /// `{"Fn::EachMemberIn": [listOfStrings, listOfStrings]}`
    EachMemberIn {
        /// Members to check
        members: Expression,
        /// Permitted values
        allowed: Expression,
    },
    /// `{"Condition": name}` - a named condition's boolean value
    Condition(String),
    /// `{"Fn::GetAZs": region}` - availability zones of a region (empty = current)
    GetAZs(Expression),
    /// `{"Fn::Length": list}`
    Length(Expression),
    /// `{"Fn::ToJsonString": value}`
    ToJsonString(Expression),
}

/// A name referenced from inside an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `Ref` or a `${name}` placeholder
    Name(&'a str),
    /// `Fn::GetAtt` or a `${name.Attr}` placeholder, carrying the logical id
    Attribute(&'a str),
}

impl<'a> Reference<'a> {
    /// The referenced name (for attributes, the logical id part).
    #[must_use]
    pub const fn name(&self) -> &'a str {
        match self {
            Reference::Name(name) | Reference::Attribute(name) => name,
        }
    }
}

/// A piece of an `Fn::Sub` template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubSegment {
    /// Text copied verbatim (escapes already applied)
    Literal(String),
    /// A `${name}` placeholder
    Placeholder(String),
}

/// Split an `Fn::Sub` template into literal and placeholder segments.
///
/// `${!Literal}` is an escape producing the text `${Literal}`. An unterminated
/// `${` is kept as literal text.
#[must_use]
pub fn parse_sub_template(template: &str) -> Vec<SubSegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        literal.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(escaped) = name.strip_prefix('!') {
                    literal.push_str("${");
                    literal.push_str(escaped);
                    literal.push('}');
                } else {
                    if !literal.is_empty() {
                        segments.push(SubSegment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(SubSegment::Placeholder(name.trim().to_string()));
                }
                rest = &after[end + 1..];
            }
            None => {
                literal.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(SubSegment::Literal(literal));
    }
    segments
}

impl Expression {
    /// Shorthand for a string literal.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Shorthand for `{"Ref": name}`.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Intrinsic(Box::new(Intrinsic::Ref(name.into())))
    }

    /// Shorthand for `{"Fn::GetAtt": [logical_id, attribute]}`.
    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Intrinsic(Box::new(Intrinsic::GetAtt {
            logical_id: logical_id.into(),
            attribute: attribute.into(),
        }))
    }

    /// Parse an expression from a JSON value.
    pub fn parse(value: Value) -> Result<Self, ExpressionParseError> {
        Self::try_from(value)
    }

    /// Convert back to the JSON representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::from(self.clone())
    }

    /// Visit every name referenced anywhere in this expression tree.
    ///
    /// Both branches of `Fn::If` are visited, so the result is a superset of
    /// what any single evaluation can touch. `Fn::Sub` placeholders that are
    /// bound by the substitution's own variable map are not reported.
    pub fn visit_references<'a>(&'a self, visit: &mut impl FnMut(Reference<'a>)) {
        match self {
            Expression::Null | Expression::Bool(_) | Expression::Number(_) | Expression::String(_) => {}
            Expression::Array(items) => {
                for item in items {
                    item.visit_references(visit);
                }
            }
            Expression::Object(map) => {
                for item in map.values() {
                    item.visit_references(visit);
                }
            }
            Expression::Intrinsic(intrinsic) => intrinsic.visit_references(visit),
        }
    }

    /// Collect the distinct names referenced by this expression.
    #[must_use]
    pub fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        self.visit_references(&mut |r| {
            if !refs.contains(&r) {
                refs.push(r);
            }
        });
        refs
    }
}

impl Intrinsic {
    /// The template-facing function name, e.g. `Fn::Join`.
    #[must_use]
    pub const fn function_name(&self) -> &'static str {
        match self {
            Intrinsic::Ref(_) => "Ref",
            Intrinsic::GetAtt { .. } => "Fn::GetAtt",
            Intrinsic::Sub { .. } => "Fn::Sub",
            Intrinsic::Join { .. } => "Fn::Join",
            Intrinsic::Select { .. } => "Fn::Select",
            Intrinsic::Split { .. } => "Fn::Split",
            Intrinsic::Base64(_) => "Fn::Base64",
            Intrinsic::FindInMap { .. } => "Fn::FindInMap",
            Intrinsic::RefAll(_) => "Fn::RefAll",
            Intrinsic::If { .. } => "Fn::If",
            Intrinsic::Equals(..) => "Fn::Equals",
            Intrinsic::Not(_) => "Fn::Not",
            Intrinsic::And(_) => "Fn::And",
            Intrinsic::Or(_) => "Fn::Or",
            Intrinsic::Contains { .. } => "Fn::Contains",
            Intrinsic::EachMemberEquals { .. } => "Fn::EachMemberEquals",
            Intrinsic::EachMemberIn { .. } => "Fn::EachMemberIn",
            Intrinsic::Condition(_) => "Condition",
            Intrinsic::GetAZs(_) => "Fn::GetAZs",
            Intrinsic::Length(_) => "Fn::Length",
            Intrinsic::ToJsonString(_) => "Fn::ToJsonString",
        }
    }

    fn visit_references<'a>(&'a self, visit: &mut impl FnMut(Reference<'a>)) {
        match self {
            Intrinsic::Ref(name) => visit(Reference::Name(name)),
            Intrinsic::GetAtt { logical_id, .. } => visit(Reference::Attribute(logical_id)),
            Intrinsic::Sub {
                template,
                variables,
            } => {
                for variable in variables.values() {
                    variable.visit_references(visit);
                }
                // Placeholder names borrow from the template string.
                let mut rest = template.as_str();
                while let Some(start) = rest.find("${") {
                    let after = &rest[start + 2..];
                    let Some(end) = after.find('}') else {
                        break;
                    };
                    let name = after[..end].trim();
                    rest = &after[end + 1..];
                    if name.starts_with('!') || variables.contains_key(name) {
                        continue;
                    }
                    match name.split_once('.') {
                        Some((logical_id, _)) => visit(Reference::Attribute(logical_id)),
                        None => visit(Reference::Name(name)),
                    }
                }
            }
            Intrinsic::Join { values, .. } => values.visit_references(visit),
            Intrinsic::Select { index, list } => {
                index.visit_references(visit);
                list.visit_references(visit);
            }
            Intrinsic::Split { source, .. } => source.visit_references(visit),
            Intrinsic::Base64(inner)
            | Intrinsic::Not(inner)
            | Intrinsic::GetAZs(inner)
            | Intrinsic::Length(inner)
            | Intrinsic::ToJsonString(inner) => inner.visit_references(visit),
            Intrinsic::FindInMap {
                map,
                top_key,
                second_key,
            } => {
                map.visit_references(visit);
                top_key.visit_references(visit);
                second_key.visit_references(visit);
            }
            Intrinsic::RefAll(_) | Intrinsic::Condition(_) => {}
            Intrinsic::If {
                condition,
                then,
                otherwise,
            } => {
                if let ConditionRef::Inline(expr) = condition {
                    expr.visit_references(visit);
                }
                then.visit_references(visit);
                otherwise.visit_references(visit);
            }
            Intrinsic::Equals(a, b) => {
                a.visit_references(visit);
                b.visit_references(visit);
            }
            Intrinsic::And(items) | Intrinsic::Or(items) => {
                for item in items {
                    item.visit_references(visit);
                }
            }
            Intrinsic::Contains { list, value } | Intrinsic::EachMemberEquals { list, value } => {
                list.visit_references(visit);
                value.visit_references(visit);
            }
            Intrinsic::EachMemberIn { members, allowed } => {
                members.visit_references(visit);
                allowed.visit_references(visit);
            }
        }
    }
}

fn expect_string(function: &str, value: Value) -> Result<String, ExpressionParseError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ExpressionParseError::new(function, format!("expected a string, got {other}"))),
    }
}

fn expect_args<const N: usize>(
    function: &str,
    value: Value,
) -> Result<[Value; N], ExpressionParseError> {
    match value {
        Value::Array(items) if items.len() == N => {
            let items: [Value; N] = items.try_into().map_err(|_| {
                ExpressionParseError::new(function, format!("expected exactly {N} arguments"))
            })?;
            Ok(items)
        }
        Value::Array(items) => Err(ExpressionParseError::new(
            function,
            format!("expected exactly {N} arguments, got {}", items.len()),
        )),
        other => Err(ExpressionParseError::new(
            function,
            format!("expected a list of {N} arguments, got {other}"),
        )),
    }
}

fn expect_list(function: &str, value: Value) -> Result<Vec<Expression>, ExpressionParseError> {
    match value {
        Value::Array(items) => items.into_iter().map(Expression::try_from).collect(),
        other => Err(ExpressionParseError::new(function, format!("expected a list, got {other}"))),
    }
}

fn is_intrinsic_key(key: &str, value: &Value) -> bool {
    key == "Ref" || key.starts_with("Fn::") || (key == "Condition" && value.is_string())
}

fn parse_intrinsic(key: &str, value: Value) -> Result<Intrinsic, ExpressionParseError> {
    let intrinsic = match key {
        "Ref" => Intrinsic::Ref(expect_string(key, value)?),
        "Condition" => Intrinsic::Condition(expect_string(key, value)?),
        "Fn::GetAtt" => match value {
            Value::String(dotted) => {
                let (logical_id, attribute) = dotted.split_once('.').ok_or_else(|| {
                    ExpressionParseError::new(key, "expected 'LogicalId.Attribute'")
                })?;
                Intrinsic::GetAtt {
                    logical_id: logical_id.to_string(),
                    attribute: attribute.to_string(),
                }
            }
            other => {
                let [logical_id, attribute] = expect_args::<2>(key, other)?;
                Intrinsic::GetAtt {
                    logical_id: expect_string(key, logical_id)?,
                    attribute: expect_string(key, attribute)?,
                }
            }
        },
        "Fn::Sub" => match value {
            Value::String(template) => Intrinsic::Sub {
                template,
                variables: IndexMap::new(),
            },
            other => {
                let [template, variables] = expect_args::<2>(key, other)?;
                let variables = match variables {
                    Value::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| Ok((k, Expression::try_from(v)?)))
                        .collect::<Result<IndexMap<_, _>, ExpressionParseError>>()?,
                    other => {
                        return Err(ExpressionParseError::new(
                            key,
                            format!("variables must be a map, got {other}"),
                        ));
                    }
                };
                Intrinsic::Sub {
                    template: expect_string(key, template)?,
                    variables,
                }
            }
        },
        "Fn::Join" => {
            let [delimiter, values] = expect_args::<2>(key, value)?;
            Intrinsic::Join {
                delimiter: expect_string(key, delimiter)?,
                values: Expression::try_from(values)?,
            }
        }
        "Fn::Select" => {
            let [index, list] = expect_args::<2>(key, value)?;
            Intrinsic::Select {
                index: Expression::try_from(index)?,
                list: Expression::try_from(list)?,
            }
        }
        "Fn::Split" => {
            let [delimiter, source] = expect_args::<2>(key, value)?;
            Intrinsic::Split {
                delimiter: expect_string(key, delimiter)?,
                source: Expression::try_from(source)?,
            }
        }
        "Fn::Base64" => Intrinsic::Base64(Expression::try_from(value)?),
        "Fn::FindInMap" => {
            let [map, top_key, second_key] = expect_args::<3>(key, value)?;
            Intrinsic::FindInMap {
                map: Expression::try_from(map)?,
                top_key: Expression::try_from(top_key)?,
                second_key: Expression::try_from(second_key)?,
            }
        }
        "Fn::RefAll" => Intrinsic::RefAll(expect_string(key, value)?),
        "Fn::If" => {
            let [condition, then, otherwise] = expect_args::<3>(key, value)?;
            let condition = match condition {
                Value::String(name) => ConditionRef::Named(name),
                inline => ConditionRef::Inline(Expression::try_from(inline)?),
            };
            Intrinsic::If {
                condition,
                then: Expression::try_from(then)?,
                otherwise: Expression::try_from(otherwise)?,
            }
        }
        "Fn::Equals" => {
            let [a, b] = expect_args::<2>(key, value)?;
            Intrinsic::Equals(Expression::try_from(a)?, Expression::try_from(b)?)
        }
        "Fn::Not" => {
            let [inner] = expect_args::<1>(key, value)?;
            Intrinsic::Not(Expression::try_from(inner)?)
        }
        "Fn::And" => Intrinsic::And(expect_list(key, value)?),
        "Fn::Or" => Intrinsic::Or(expect_list(key, value)?),
        "Fn::Contains" => {
            let [list, item] = expect_args::<2>(key, value)?;
            Intrinsic::Contains {
                list: Expression::try_from(list)?,
                value: Expression::try_from(item)?,
            }
        }
        "Fn::EachMemberEquals" => {
            let [list, item] = expect_args::<2>(key, value)?;
            Intrinsic::EachMemberEquals {
                list: Expression::try_from(list)?,
                value: Expression::try_from(item)?,
            }
        }
        "Fn::EachMemberIn" => {
            let [members, allowed] = expect_args::<2>(key, value)?;
            Intrinsic::EachMemberIn {
                members: Expression::try_from(members)?,
                allowed: Expression::try_from(allowed)?,
            }
        }
        "Fn::GetAZs" => Intrinsic::GetAZs(Expression::try_from(value)?),
        "Fn::Length" => Intrinsic::Length(Expression::try_from(value)?),
        "Fn::ToJsonString" => Intrinsic::ToJsonString(Expression::try_from(value)?),
        unknown => {
            return Err(ExpressionParseError::new(unknown, "unsupported intrinsic function"));
        }
    };
    Ok(intrinsic)
}

impl TryFrom<Value> for Expression {
    type Error = ExpressionParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Expression::Null,
            Value::Bool(b) => Expression::Bool(b),
            Value::Number(n) => Expression::Number(n),
            Value::String(s) => Expression::String(s),
            Value::Array(items) => Expression::Array(
                items.into_iter().map(Expression::try_from).collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let single_intrinsic = map.len() == 1
                    && map.iter().next().is_some_and(|(key, value)| is_intrinsic_key(key, value));
                if single_intrinsic {
                    let (key, value) = map.into_iter().next().ok_or_else(|| {
                        ExpressionParseError::new("expression", "empty intrinsic object")
                    })?;
                    return Ok(Expression::Intrinsic(Box::new(parse_intrinsic(&key, value)?)));
                }
                Expression::parse_object(map)?
            }
        })
    }
}

impl Expression {
    fn parse_object(map: Map<String, Value>) -> Result<Self, ExpressionParseError> {
        Ok(Expression::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, Expression::try_from(v)?)))
                .collect::<Result<IndexMap<_, _>, ExpressionParseError>>()?,
        ))
    }
}

impl From<Intrinsic> for Value {
    fn from(intrinsic: Intrinsic) -> Self {
        let name = intrinsic.function_name();
        let args = match intrinsic {
            Intrinsic::Ref(n) | Intrinsic::Condition(n) | Intrinsic::RefAll(n) => Value::String(n),
            Intrinsic::GetAtt {
                logical_id,
                attribute,
            } => json!([logical_id, attribute]),
            Intrinsic::Sub {
                template,
                variables,
            } => {
                if variables.is_empty() {
                    Value::String(template)
                } else {
                    let vars: Map<String, Value> =
                        variables.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
                    json!([template, vars])
                }
            }
            Intrinsic::Join { delimiter, values } => json!([delimiter, Value::from(values)]),
            Intrinsic::Select { index, list } => json!([Value::from(index), Value::from(list)]),
            Intrinsic::Split { delimiter, source } => json!([delimiter, Value::from(source)]),
            Intrinsic::Base64(inner)
            | Intrinsic::GetAZs(inner)
            | Intrinsic::Length(inner)
            | Intrinsic::ToJsonString(inner) => Value::from(inner),
            Intrinsic::FindInMap {
                map,
                top_key,
                second_key,
            } => json!([Value::from(map), Value::from(top_key), Value::from(second_key)]),
            Intrinsic::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = match condition {
                    ConditionRef::Named(name) => Value::String(name),
                    ConditionRef::Inline(expr) => Value::from(expr),
                };
                json!([condition, Value::from(then), Value::from(otherwise)])
            }
            Intrinsic::Equals(a, b) => json!([Value::from(a), Value::from(b)]),
            Intrinsic::Not(inner) => json!([Value::from(inner)]),
            Intrinsic::And(items) | Intrinsic::Or(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            Intrinsic::Contains { list, value } | Intrinsic::EachMemberEquals { list, value } => {
                json!([Value::from(list), Value::from(value)])
            }
            Intrinsic::EachMemberIn { members, allowed } => {
                json!([Value::from(members), Value::from(allowed)])
            }
        };
        let mut map = Map::new();
        map.insert(name.to_string(), args);
        Value::Object(map)
    }
}

impl From<Expression> for Value {
    fn from(expression: Expression) -> Self {
        match expression {
            Expression::Null => Value::Null,
            Expression::Bool(b) => Value::Bool(b),
            Expression::Number(n) => Value::Number(n),
            Expression::String(s) => Value::String(s),
            Expression::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Expression::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
            Expression::Intrinsic(intrinsic) => Value::from(*intrinsic),
        }
    }
}
