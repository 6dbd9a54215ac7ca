//! Structural validation of JSON values against compiled schemas
//!
//! Validation walks the schema and the value in lockstep and records every
//! mismatch it finds. It never stops at the first violation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compile::CompiledSchema;
use crate::error::SchemaValidationError;
use crate::schema::{
    escape_pointer, ArrayRules, Items, NumberRules, ObjectRules, Schema, SchemaKind, StringRules,
};

/// Longest rendering of an actual value kept in a violation
const MAX_RENDERED_VALUE: usize = 80;

/// Schema keyword responsible for a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Keyword {
    Type,
    Required,
    AdditionalProperties,
    MinItems,
    MaxItems,
    UniqueItems,
    Enum,
    Const,
    Format,
    Minimum,
    Maximum,
    ExclusiveMinimum,
    ExclusiveMaximum,
    MultipleOf,
    MinLength,
    MaxLength,
    Pattern,
    AnyOf,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Type => "type",
            Keyword::Required => "required",
            Keyword::AdditionalProperties => "additionalProperties",
            Keyword::MinItems => "minItems",
            Keyword::MaxItems => "maxItems",
            Keyword::UniqueItems => "uniqueItems",
            Keyword::Enum => "enum",
            Keyword::Const => "const",
            Keyword::Format => "format",
            Keyword::Minimum => "minimum",
            Keyword::Maximum => "maximum",
            Keyword::ExclusiveMinimum => "exclusiveMinimum",
            Keyword::ExclusiveMaximum => "exclusiveMaximum",
            Keyword::MultipleOf => "multipleOf",
            Keyword::MinLength => "minLength",
            Keyword::MaxLength => "maxLength",
            Keyword::Pattern => "pattern",
            Keyword::AnyOf => "anyOf",
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mismatch between a value and its schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer into the validated value (`""` is the root)
    pub path: String,
    pub keyword: Keyword,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "<root>" } else { &self.path };
        write!(
            f,
            "{}: expected {}, found {} [{}]",
            path, self.expected, self.actual, self.keyword
        )
    }
}

/// Outcome of [`check`]
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    /// Always non-empty, in detection order
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        if violations.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(violations)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(violations) => violations,
        }
    }

    pub fn into_result(self) -> Result<(), SchemaValidationError> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(violations) => Err(SchemaValidationError { violations }),
        }
    }
}

/// Checks `value` against `schema`, collecting every violation.
///
/// Data mismatches are reported in the result, never as an error.
pub fn check(schema: &CompiledSchema, value: &Value) -> ValidationResult {
    let mut violations = Vec::new();
    validate_node(schema.root(), value, "", &mut violations);
    ValidationResult::from_violations(violations)
}

/// Like [`check`], but fails with the complete violation list
pub fn assert_valid(schema: &CompiledSchema, value: &Value) -> Result<(), SchemaValidationError> {
    let result = check(schema, value);
    if let ValidationResult::Invalid(violations) = &result {
        tracing::debug!(violations = violations.len(), "value does not match schema");
    }
    result.into_result()
}

pub(crate) fn validate_node(schema: &Schema, value: &Value, path: &str, out: &mut Vec<Violation>) {
    validate_kind(&schema.kind, value, path, out);

    if let Some(allowed) = &schema.enumeration {
        if !allowed.iter().any(|candidate| json_equal(candidate, value)) {
            out.push(Violation {
                path: path.to_string(),
                keyword: Keyword::Enum,
                expected: format!("one of {}", render(&Value::Array(allowed.clone()))),
                actual: render(value),
            });
        }
    }

    if let Some(constant) = &schema.constant {
        if !json_equal(constant, value) {
            out.push(Violation {
                path: path.to_string(),
                keyword: Keyword::Const,
                expected: format!("constant {}", render(constant)),
                actual: render(value),
            });
        }
    }
}

pub(crate) fn validate_kind(kind: &SchemaKind, value: &Value, path: &str, out: &mut Vec<Violation>) {
    match kind {
        SchemaKind::Any => {}
        SchemaKind::TypeUnion(kinds) => match kinds.iter().find(|k| accepts_type(k, value)) {
            Some(branch) => validate_kind(branch, value, path, out),
            None => out.push(type_violation(kind, value, path)),
        },
        SchemaKind::AnyOf(alternatives) => {
            let matched = alternatives.iter().any(|alternative| {
                let mut scratch = Vec::new();
                validate_node(alternative, value, path, &mut scratch);
                scratch.is_empty()
            });
            if !matched {
                out.push(Violation {
                    path: path.to_string(),
                    keyword: Keyword::AnyOf,
                    expected: format!("a match for one of {} alternatives", alternatives.len()),
                    actual: render(value),
                });
            }
        }
        _ if !accepts_type(kind, value) => out.push(type_violation(kind, value, path)),
        SchemaKind::Null | SchemaKind::Boolean => {}
        SchemaKind::String(rules) => {
            if let Value::String(s) = value {
                validate_string(rules, s, path, out);
            }
        }
        SchemaKind::Number(rules) => {
            if let Some(n) = value.as_f64() {
                validate_number(rules, n, path, out);
            }
        }
        SchemaKind::Object(rules) => {
            if let Value::Object(map) = value {
                validate_object(rules, map, path, out);
            }
        }
        SchemaKind::Array(rules) => {
            if let Value::Array(items) = value {
                validate_array(rules, items, path, out);
            }
        }
    }
}

/// Whether the value's runtime type is accepted by `kind`, ignoring rules
fn accepts_type(kind: &SchemaKind, value: &Value) -> bool {
    match kind {
        SchemaKind::Any | SchemaKind::AnyOf(_) => true,
        SchemaKind::Null => value.is_null(),
        SchemaKind::Boolean => value.is_boolean(),
        SchemaKind::String(_) => value.is_string(),
        SchemaKind::Number(rules) if rules.integer => is_integer(value),
        SchemaKind::Number(_) => value.is_number(),
        SchemaKind::Object(_) => value.is_object(),
        SchemaKind::Array(_) => value.is_array(),
        SchemaKind::TypeUnion(kinds) => kinds.iter().any(|k| accepts_type(k, value)),
    }
}

fn type_violation(kind: &SchemaKind, value: &Value, path: &str) -> Violation {
    Violation {
        path: path.to_string(),
        keyword: Keyword::Type,
        expected: kind.describe(),
        actual: format!("{} {}", json_type(value), render(value)),
    }
}

fn validate_string(rules: &StringRules, s: &str, path: &str, out: &mut Vec<Violation>) {
    let length = s.chars().count() as u64;
    let mut push = |keyword: Keyword, expected: String, actual: String| {
        out.push(Violation {
            path: path.to_string(),
            keyword,
            expected,
            actual,
        })
    };

    if let Some(min) = rules.min_length {
        if length < min {
            push(
                Keyword::MinLength,
                format!("at least {} characters", min),
                format!("{} characters", length),
            );
        }
    }
    if let Some(max) = rules.max_length {
        if length > max {
            push(
                Keyword::MaxLength,
                format!("at most {} characters", max),
                format!("{} characters", length),
            );
        }
    }
    if let Some(pattern) = &rules.pattern {
        if !pattern.is_match(s) {
            push(
                Keyword::Pattern,
                format!("a string matching /{}/", pattern.as_str()),
                render_str(s),
            );
        }
    }
    if let Some(format) = rules.format {
        if !format.matches(s) {
            push(Keyword::Format, format!("format `{}`", format), render_str(s));
        }
    }
}

fn validate_number(rules: &NumberRules, n: f64, path: &str, out: &mut Vec<Violation>) {
    let checks = [
        (Keyword::Minimum, rules.minimum, ">=", n >= rules.minimum.unwrap_or(f64::MIN)),
        (Keyword::Maximum, rules.maximum, "<=", n <= rules.maximum.unwrap_or(f64::MAX)),
        (
            Keyword::ExclusiveMinimum,
            rules.exclusive_minimum,
            ">",
            rules.exclusive_minimum.map_or(true, |bound| n > bound),
        ),
        (
            Keyword::ExclusiveMaximum,
            rules.exclusive_maximum,
            "<",
            rules.exclusive_maximum.map_or(true, |bound| n < bound),
        ),
    ];
    for (keyword, bound, operator, holds) in checks {
        if let (Some(bound), false) = (bound, holds) {
            out.push(Violation {
                path: path.to_string(),
                keyword,
                expected: format!("a number {} {}", operator, bound),
                actual: n.to_string(),
            });
        }
    }

    if let Some(divisor) = rules.multiple_of {
        let quotient = n / divisor;
        if (quotient - quotient.round()).abs() > 1e-9 {
            out.push(Violation {
                path: path.to_string(),
                keyword: Keyword::MultipleOf,
                expected: format!("a multiple of {}", divisor),
                actual: n.to_string(),
            });
        }
    }
}

fn validate_object(
    rules: &ObjectRules,
    map: &serde_json::Map<String, Value>,
    path: &str,
    out: &mut Vec<Violation>,
) {
    for name in &rules.required {
        if !map.contains_key(name) {
            out.push(Violation {
                path: child_path(path, name),
                keyword: Keyword::Required,
                expected: format!("required property `{}`", name),
                actual: "nothing".to_string(),
            });
        }
    }

    for (key, child) in map {
        match rules.properties.get(key) {
            Some(schema) => validate_node(schema, child, &child_path(path, key), out),
            None if !rules.additional_properties => out.push(Violation {
                path: child_path(path, key),
                keyword: Keyword::AdditionalProperties,
                expected: format!("no property `{}` (additional properties are not allowed)", key),
                actual: render(child),
            }),
            None => {}
        }
    }
}

fn validate_array(rules: &ArrayRules, items: &[Value], path: &str, out: &mut Vec<Violation>) {
    let length = items.len() as u64;
    if let Some(min) = rules.min_items {
        if length < min {
            out.push(Violation {
                path: path.to_string(),
                keyword: Keyword::MinItems,
                expected: format!("at least {} items", min),
                actual: format!("{} items", length),
            });
        }
    }
    if let Some(max) = rules.max_items {
        if length > max {
            out.push(Violation {
                path: path.to_string(),
                keyword: Keyword::MaxItems,
                expected: format!("at most {} items", max),
                actual: format!("{} items", length),
            });
        }
    }

    if rules.unique_items {
        for (j, later) in items.iter().enumerate().skip(1) {
            if let Some(i) = items[..j].iter().position(|earlier| json_equal(earlier, later)) {
                out.push(Violation {
                    path: path.to_string(),
                    keyword: Keyword::UniqueItems,
                    expected: "unique items".to_string(),
                    actual: format!("items {} and {} are equal ({})", i, j, render(later)),
                });
            }
        }
    }

    match &rules.items {
        None => {}
        Some(Items::Uniform(schema)) => {
            for (i, item) in items.iter().enumerate() {
                validate_node(schema, item, &format!("{}/{}", path, i), out);
            }
        }
        Some(Items::Positional(schemas)) => {
            for (i, (schema, item)) in schemas.iter().zip(items).enumerate() {
                validate_node(schema, item, &format!("{}/{}", path, i), out);
            }
        }
    }
}

fn child_path(parent: &str, key: &str) -> String {
    format!("{}/{}", parent, escape_pointer(key))
}

/// Deep structural equality where numbers compare by numeric value
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).map_or(false, |y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// JSON type name of a value; whole numbers report as `integer`
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) if is_integer(value) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().map_or(false, |f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

fn render(value: &Value) -> String {
    truncate(value.to_string())
}

fn render_str(s: &str) -> String {
    truncate(Value::String(s.to_string()).to_string())
}

fn truncate(mut rendered: String) -> String {
    if rendered.chars().count() > MAX_RENDERED_VALUE {
        rendered = rendered.chars().take(MAX_RENDERED_VALUE).collect();
        rendered.push('…');
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_json;
    use serde_json::json;

    fn violations(schema: Value, value: Value) -> Vec<Violation> {
        let compiled = compile_json(&schema).expect("schema should compile");
        check(&compiled, &value).violations().to_vec()
    }

    #[test]
    fn integer_rejects_fractions_but_accepts_whole_floats() {
        let schema = json!({"type": "integer"});
        assert!(violations(schema.clone(), json!(5.0)).is_empty());
        let found = violations(schema, json!(5.5));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keyword, Keyword::Type);
        assert_eq!(found[0].expected, "integer");
    }

    #[test]
    fn union_dispatches_on_runtime_type() {
        let schema = json!({"type": ["string", "null"], "format": "uri"});
        assert!(violations(schema.clone(), json!(null)).is_empty());
        assert!(violations(schema.clone(), json!("https://opensupplyhub.org/api/facilities/?page=2")).is_empty());

        let found = violations(schema.clone(), json!("page=2"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keyword, Keyword::Format);
        assert!(found[0].expected.contains("uri"));

        let found = violations(schema, json!(3));
        assert_eq!(found[0].keyword, Keyword::Type);
        assert_eq!(found[0].expected, "string or null");
    }

    #[test]
    fn const_uses_deep_equality() {
        let schema = json!({"const": {"a": [1, 2.0]}});
        assert!(violations(schema.clone(), json!({"a": [1.0, 2]})).is_empty());
        let found = violations(schema, json!({"a": [2, 1]}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keyword, Keyword::Const);
    }

    #[test]
    fn nested_paths_are_json_pointers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "features": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"a/b": {"type": "string"}}
                    }
                }
            }
        });
        let found = violations(schema, json!({"features": [{"a/b": "ok"}, {"a/b": 7}]}));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/features/1/a~1b");
    }

    #[test]
    fn collects_all_violations_in_one_pass() {
        let schema = json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "string"},
                "name": {"type": "string"},
                "coordinates": {"type": "array", "items": {"type": "number"}, "minItems": 2, "maxItems": 2}
            },
            "additionalProperties": false
        });
        let found = violations(schema, json!({"coordinates": [1, "x", 3], "extra": 1}));
        let keywords: Vec<Keyword> = found.iter().map(|v| v.keyword).collect();
        assert_eq!(
            keywords,
            vec![
                Keyword::Required,
                Keyword::Required,
                Keyword::MaxItems,
                Keyword::Type,
                Keyword::AdditionalProperties,
            ]
        );
    }

    #[test]
    fn any_of_reports_single_violation() {
        let schema = json!({"anyOf": [{"type": "integer"}, {"type": "string"}]});
        assert!(violations(schema.clone(), json!(12)).is_empty());
        assert!(violations(schema.clone(), json!("12")).is_empty());
        let found = violations(schema, json!(true));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].keyword, Keyword::AnyOf);
    }

    #[test]
    fn string_and_number_rules() {
        let schema = json!({"type": "string", "minLength": 2, "maxLength": 3, "pattern": "^[A-Z]+$"});
        assert!(violations(schema.clone(), json!("CN")).is_empty());
        let keywords: Vec<Keyword> = violations(schema, json!("cnxx")).iter().map(|v| v.keyword).collect();
        assert_eq!(keywords, vec![Keyword::MaxLength, Keyword::Pattern]);

        let schema = json!({"type": "number", "exclusiveMinimum": 0, "maximum": 10, "multipleOf": 0.5});
        assert!(violations(schema.clone(), json!(2.5)).is_empty());
        let keywords: Vec<Keyword> = violations(schema, json!(0)).iter().map(|v| v.keyword).collect();
        assert_eq!(keywords, vec![Keyword::ExclusiveMinimum]);
    }

    #[test]
    fn violation_display_names_path_expected_and_actual() {
        let violation = Violation {
            path: "/count".to_string(),
            keyword: Keyword::Minimum,
            expected: "a number >= 0".to_string(),
            actual: "-1".to_string(),
        };
        assert_eq!(violation.to_string(), "/count: expected a number >= 0, found -1 [minimum]");
    }
}
