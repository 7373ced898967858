//! Self-describing parameter schemas and the validator that interprets them
//!
//! Tool arguments arrive as arbitrary JSON. Every tool declares a [`Schema`], and a single
//! generic validator checks the arguments against it, inserting declared defaults, before
//! any handler runs.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Root path used in validation issues when the offending value is the whole input.
pub const ROOT_PATH: &str = "$";

#[derive(Debug, Clone)]
pub enum Schema {
    String(StringRules),
    Number(NumberRules),
    Integer(NumberRules),
    Boolean,
    Object(ObjectSchema),
    Array(ArraySchema),
    /// Accepts an absent or `null` value; `default` is inserted when present.
    Optional {
        inner: Box<Schema>,
        default: Option<Value>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct StringRules {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub allowed: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberRules {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    pub deny_unknown: bool,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub description: Option<String>,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

impl Schema {
    pub fn string() -> Self {
        Self::String(StringRules::default())
    }

    pub fn number() -> Self {
        Self::Number(NumberRules::default())
    }

    pub fn integer() -> Self {
        Self::Integer(NumberRules::default())
    }

    pub fn boolean() -> Self {
        Self::Boolean
    }

    pub fn array(items: Schema) -> Self {
        Self::Array(ArraySchema {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    pub fn optional(self) -> Self {
        match self {
            optional @ Self::Optional { .. } => optional,
            other => Self::Optional {
                inner: Box::new(other),
                default: None,
            },
        }
    }

    pub fn with_default(self, default: impl Into<Value>) -> Self {
        let inner = match self {
            Self::Optional { inner, .. } => inner,
            other => Box::new(other),
        };

        Self::Optional {
            inner,
            default: Some(default.into()),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional { .. })
    }

    /// Short human-readable shape, used as the `expected` side of a validation issue.
    pub fn expected(&self) -> String {
        match self {
            Self::String(rules) => match &rules.allowed {
                Some(allowed) => format!("one of: {}", allowed.join(", ")),
                None => "string".to_string(),
            },
            Self::Number(_) => "number".to_string(),
            Self::Integer(_) => "integer".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Array(array) => format!("array of {}", array.items.expected()),
            Self::Optional { inner, .. } => format!("optional {}", inner.expected()),
        }
    }

    /// Renders the schema as a JSON Schema document, the form clients see as `inputSchema`.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String(rules) => {
                let mut schema = Map::from_iter([("type".to_string(), json!("string"))]);
                if let Some(min) = rules.min_length {
                    schema.insert("minLength".to_string(), json!(min));
                }
                if let Some(max) = rules.max_length {
                    schema.insert("maxLength".to_string(), json!(max));
                }
                if let Some(pattern) = &rules.pattern {
                    schema.insert("pattern".to_string(), json!(pattern.as_str()));
                }
                if let Some(allowed) = &rules.allowed {
                    schema.insert("enum".to_string(), json!(allowed));
                }
                Value::Object(schema)
            }
            Self::Number(rules) => number_json_schema("number", rules),
            Self::Integer(rules) => number_json_schema("integer", rules),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Object(object) => object.to_json_schema(),
            Self::Array(array) => {
                let mut schema = Map::from_iter([
                    ("type".to_string(), json!("array")),
                    ("items".to_string(), array.items.to_json_schema()),
                ]);
                if let Some(min) = array.min_items {
                    schema.insert("minItems".to_string(), json!(min));
                }
                if let Some(max) = array.max_items {
                    schema.insert("maxItems".to_string(), json!(max));
                }
                Value::Object(schema)
            }
            Self::Optional { inner, default } => {
                let mut schema = inner.to_json_schema();
                if let (Some(default), Some(object)) = (default, schema.as_object_mut()) {
                    object.insert("default".to_string(), default.clone());
                }
                schema
            }
        }
    }
}

fn number_json_schema(kind: &str, rules: &NumberRules) -> Value {
    let integral = kind == "integer";
    let mut schema = Map::from_iter([("type".to_string(), json!(kind))]);
    if let Some(min) = rules.minimum {
        schema.insert("minimum".to_string(), bound_json(min, integral));
    }
    if let Some(max) = rules.maximum {
        schema.insert("maximum".to_string(), bound_json(max, integral));
    }
    Value::Object(schema)
}

/// Integer bounds render as JSON integers (`0`, not `0.0`) when they are whole.
fn bound_json(bound: f64, integral: bool) -> Value {
    if integral && bound.fract() == 0.0 && bound >= i64::MIN as f64 && bound <= i64::MAX as f64 {
        json!(bound as i64)
    } else {
        json!(bound)
    }
}

impl StringRules {
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
            ..Self::default()
        })
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn length(min: Option<usize>, max: Option<usize>) -> Self {
        Self {
            min_length: min,
            max_length: max,
            ..Self::default()
        }
    }
}

impl NumberRules {
    pub fn range(minimum: Option<f64>, maximum: Option<f64>) -> Self {
        Self { minimum, maximum }
    }
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.push(Property {
            name: name.into(),
            description: None,
            schema,
        });
        self
    }

    pub fn described_property(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Schema,
    ) -> Self {
        self.properties.push(Property {
            name: name.into(),
            description: Some(description.into()),
            schema,
        });
        self
    }

    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for property in &self.properties {
            let mut rendered = property.schema.to_json_schema();
            if let (Some(description), Some(object)) =
                (&property.description, rendered.as_object_mut())
            {
                object.insert("description".to_string(), json!(description));
            }
            properties.insert(property.name.clone(), rendered);

            if !property.schema.is_optional() {
                required.push(property.name.clone());
            }
        }

        let mut schema = Map::from_iter([
            ("type".to_string(), json!("object")),
            ("properties".to_string(), Value::Object(properties)),
        ]);
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        if self.deny_unknown {
            schema.insert("additionalProperties".to_string(), json!(false));
        }
        Value::Object(schema)
    }
}

impl From<ObjectSchema> for Schema {
    fn from(object: ObjectSchema) -> Self {
        Self::Object(object)
    }
}

/// One offending field: where it is, what shape was expected, and what was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub path: String,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub issues: Vec<FieldIssue>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .issues
            .iter()
            .map(|issue| {
                format!(
                    "{} (expected {}, found {})",
                    issue.path, issue.expected, issue.found
                )
            })
            .collect::<Vec<_>>();
        write!(f, "{}", fields.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

impl ValidationFailure {
    pub fn paths(&self) -> Vec<&str> {
        self.issues.iter().map(|issue| issue.path.as_str()).collect()
    }
}

/// Validates `value` against `schema`, returning the normalized value.
///
/// All offending fields are collected rather than stopping at the first one. The
/// returned value carries inserted defaults; unknown object fields pass through unless
/// the object schema denies them. No implicit type coercion is performed.
pub fn validate(schema: &Schema, value: &Value) -> Result<Value, ValidationFailure> {
    let mut issues = Vec::new();
    let validated = check(schema, value, ROOT_PATH, &mut issues);

    if issues.is_empty() {
        Ok(validated)
    } else {
        Err(ValidationFailure { issues })
    }
}

fn check(schema: &Schema, value: &Value, path: &str, issues: &mut Vec<FieldIssue>) -> Value {
    match schema {
        Schema::Optional { inner, default } => {
            if value.is_null() {
                return default.clone().unwrap_or(Value::Null);
            }
            check(inner, value, path, issues)
        }
        Schema::String(rules) => {
            match value.as_str() {
                Some(text) => check_string(rules, text, path, issues),
                None => issues.push(mismatch(path, schema, value)),
            }
            value.clone()
        }
        Schema::Number(rules) => {
            match value.as_f64() {
                Some(number) => check_range(rules, number, path, issues),
                None => issues.push(mismatch(path, schema, value)),
            }
            value.clone()
        }
        Schema::Integer(rules) => {
            if value.is_i64() || value.is_u64() {
                if let Some(number) = value.as_f64() {
                    check_range(rules, number, path, issues);
                }
            } else {
                issues.push(mismatch(path, schema, value));
            }
            value.clone()
        }
        Schema::Boolean => {
            if !value.is_boolean() {
                issues.push(mismatch(path, schema, value));
            }
            value.clone()
        }
        Schema::Object(object) => {
            let Some(fields) = value.as_object() else {
                issues.push(mismatch(path, schema, value));
                return value.clone();
            };
            Value::Object(check_object(object, fields, path, issues))
        }
        Schema::Array(array) => {
            let Some(items) = value.as_array() else {
                issues.push(mismatch(path, schema, value));
                return value.clone();
            };

            if let Some(min) = array.min_items.filter(|min| items.len() < *min) {
                issues.push(FieldIssue {
                    path: path.to_string(),
                    expected: format!("at least {min} items"),
                    found: format!("{} items", items.len()),
                });
            }
            if let Some(max) = array.max_items.filter(|max| items.len() > *max) {
                issues.push(FieldIssue {
                    path: path.to_string(),
                    expected: format!("at most {max} items"),
                    found: format!("{} items", items.len()),
                });
            }

            Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        check(&array.items, item, &format!("{path}[{index}]"), issues)
                    })
                    .collect(),
            )
        }
    }
}

fn check_object(
    object: &ObjectSchema,
    fields: &Map<String, Value>,
    path: &str,
    issues: &mut Vec<FieldIssue>,
) -> Map<String, Value> {
    let mut validated = Map::new();

    for property in &object.properties {
        let field_path = child_path(path, &property.name);
        let present = fields
            .get(&property.name)
            .filter(|value| !(value.is_null() && property.schema.is_optional()));

        match (present, &property.schema) {
            (Some(value), schema) => {
                let checked = check(schema, value, &field_path, issues);
                validated.insert(property.name.clone(), checked);
            }
            (None, Schema::Optional { default, .. }) => {
                if let Some(default) = default {
                    validated.insert(property.name.clone(), default.clone());
                }
            }
            (None, schema) => issues.push(FieldIssue {
                path: field_path,
                expected: schema.expected(),
                found: "missing".to_string(),
            }),
        }
    }

    for (name, value) in fields {
        if object.properties.iter().any(|property| &property.name == name) {
            continue;
        }

        if object.deny_unknown {
            issues.push(FieldIssue {
                path: child_path(path, name),
                expected: "no such field".to_string(),
                found: json_type_name(value).to_string(),
            });
        } else {
            validated.insert(name.clone(), value.clone());
        }
    }

    validated
}

fn check_string(rules: &StringRules, text: &str, path: &str, issues: &mut Vec<FieldIssue>) {
    let length = text.chars().count();

    if let Some(min) = rules.min_length.filter(|min| length < *min) {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("string of at least {min} characters"),
            found: format!("string of {length} characters"),
        });
    }
    if let Some(max) = rules.max_length.filter(|max| length > *max) {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("string of at most {max} characters"),
            found: format!("string of {length} characters"),
        });
    }
    if let Some(pattern) = rules.pattern.as_ref().filter(|pattern| !pattern.is_match(text)) {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("string matching /{}/", pattern.as_str()),
            found: "non-matching string".to_string(),
        });
    }
    if let Some(allowed) = rules
        .allowed
        .as_ref()
        .filter(|allowed| !allowed.iter().any(|candidate| candidate == text))
    {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("one of: {}", allowed.join(", ")),
            found: format!("\"{text}\""),
        });
    }
}

fn check_range(rules: &NumberRules, number: f64, path: &str, issues: &mut Vec<FieldIssue>) {
    if let Some(min) = rules.minimum.filter(|min| number < *min) {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("number >= {min}"),
            found: number.to_string(),
        });
    }
    if let Some(max) = rules.maximum.filter(|max| number > *max) {
        issues.push(FieldIssue {
            path: path.to_string(),
            expected: format!("number <= {max}"),
            found: number.to_string(),
        });
    }
}

fn mismatch(path: &str, schema: &Schema, value: &Value) -> FieldIssue {
    FieldIssue {
        path: path.to_string(),
        expected: schema.expected(),
        found: json_type_name(value).to_string(),
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
